// HTTP page fetcher used by the native and scrape extractors

use std::time::Duration;

use async_trait::async_trait;

use super::diagnostics::classify_status;
use crate::resolver::errors::ExtractError;
use crate::resolver::profiles::HeaderPreset;
use crate::resolver::traits::PageFetcher;

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn transport_error(err: reqwest::Error, limit: Duration) -> ExtractError {
    if err.is_timeout() {
        ExtractError::Timeout(limit)
    } else {
        ExtractError::UpstreamError(err.to_string())
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch_text(
        &self,
        url: &str,
        headers: &HeaderPreset,
        timeout: Duration,
    ) -> Result<String, ExtractError> {
        let request = headers
            .apply(self.client.get(url))
            .header(
                reqwest::header::ACCEPT,
                "text/html,application/json;q=0.9,*/*;q=0.8",
            )
            .header(reqwest::header::ACCEPT_LANGUAGE, "en-US,en;q=0.9")
            .timeout(timeout);

        let response = request
            .send()
            .await
            .map_err(|e| transport_error(e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            tracing::debug!(%url, status = status.as_u16(), "page fetch rejected");
            return Err(classify_status(status.as_u16(), url));
        }

        response.text().await.map_err(|e| transport_error(e, timeout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::test_support::spawn_origin;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::get;
    use axum::Router;

    #[tokio::test]
    async fn test_fetch_sends_preset_headers() {
        let app = Router::new().route(
            "/page",
            get(|headers: HeaderMap| async move {
                let referer = headers
                    .get("referer")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("none")
                    .to_string();
                format!("referer={}", referer)
            }),
        );
        let origin = spawn_origin(app).await;
        let fetcher = HttpFetcher::new(reqwest::Client::new());
        let preset = HeaderPreset {
            referer: Some("https://www.tiktok.com/"),
            ..HeaderPreset::browser()
        };

        let body = fetcher
            .fetch_text(&format!("{}/page", origin), &preset, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(body, "referer=https://www.tiktok.com/");
    }

    #[tokio::test]
    async fn test_fetch_classifies_status() {
        let app = Router::new()
            .route("/gone", get(|| async { StatusCode::NOT_FOUND }))
            .route("/blocked", get(|| async { StatusCode::FORBIDDEN }));
        let origin = spawn_origin(app).await;
        let fetcher = HttpFetcher::new(reqwest::Client::new());
        let preset = HeaderPreset::browser();

        let gone = fetcher
            .fetch_text(&format!("{}/gone", origin), &preset, Duration::from_secs(5))
            .await;
        assert!(matches!(gone, Err(ExtractError::NotFound(_))));

        let blocked = fetcher
            .fetch_text(&format!("{}/blocked", origin), &preset, Duration::from_secs(5))
            .await;
        assert!(matches!(blocked, Err(ExtractError::UpstreamError(_))));
    }
}
