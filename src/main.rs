#[tokio::main]
async fn main() -> anyhow::Result<()> {
    media_resolver_lib::run().await
}
