// Resolution pipeline - classify, resolve, normalize, deliver
//
// The single entry point used by the HTTP surface. Classification happens
// before any network call; every step after it runs inside a span carrying
// the request id and platform.

use std::sync::Arc;
use std::time::Duration;

use tracing::Instrument;

use super::chain::{ChainResolver, ExtractorRegistry};
use super::delivery::{DeliveredMedia, DeliveryProxy};
use super::errors::{PipelineError, ResolveError};
use super::extractors::{
    GenericToolExtractor, HttpFetcher, NativeApiExtractor, ScrapeExtractor,
    SearchSubstitutionExtractor, ToolCatalogSearch, YtDlpTool,
};
use super::models::{ExtractOptions, MediaResult, RequestId};
use super::normalizer::normalize;
use super::platform::{classify, parse_input_url, Platform};
use super::temp_store::TempAssetStore;
use super::traits::{MediaTool, PageFetcher};
use super::utils::{build_http_client, effective_proxy};
use super::validator::{CandidateValidator, ValidatorConfig};
use crate::config::AppConfig;

pub struct MediaPipeline {
    resolver: ChainResolver,
    proxy: DeliveryProxy,
    extract_timeout: Duration,
    download_timeout: Duration,
}

impl MediaPipeline {
    pub fn new(resolver: ChainResolver, proxy: DeliveryProxy, extract_timeout: Duration) -> Self {
        Self {
            resolver,
            proxy,
            extract_timeout,
            download_timeout: ExtractOptions::default().download_timeout,
        }
    }

    /// Separate budget for materializing media into the temp store
    pub fn with_download_timeout(mut self, download_timeout: Duration) -> Self {
        self.download_timeout = download_timeout;
        self
    }

    /// Wire up the production extractors, validator and proxy
    pub fn from_config(config: &AppConfig, store: Arc<TempAssetStore>) -> anyhow::Result<Self> {
        let proxy = effective_proxy(&config.network);
        let client = build_http_client(&config.network, proxy.as_deref())?;
        let fetcher: Arc<dyn PageFetcher> = Arc::new(HttpFetcher::new(client.clone()));
        let tool: Arc<dyn MediaTool> = Arc::new(YtDlpTool::new(&config.tool, proxy));
        let catalog = Arc::new(ToolCatalogSearch::new(
            tool.clone(),
            config.tool.search_prefix.clone(),
        ));

        let registry = ExtractorRegistry::new()
            .with(Arc::new(NativeApiExtractor::new(fetcher.clone())))
            .with(Arc::new(GenericToolExtractor::new(tool, store.clone())))
            .with(Arc::new(ScrapeExtractor::new(fetcher.clone())))
            .with(Arc::new(SearchSubstitutionExtractor::new(
                fetcher, catalog, store,
            )));

        let validator = CandidateValidator::new(
            client.clone(),
            ValidatorConfig::from(&config.resolver),
        );
        let resolver = ChainResolver::new(registry, Arc::new(validator));
        let proxy = DeliveryProxy::new(client, &config.delivery);

        Ok(Self::new(resolver, proxy, config.resolver.extract_timeout())
            .with_download_timeout(config.tool.download_timeout()))
    }

    /// Resolve without delivering. Strategies that would need a temp
    /// download fail instead, so nothing is left on disk.
    pub async fn resolve_only(&self, source_url: &str) -> Result<MediaResult, ResolveError> {
        let options = ExtractOptions {
            timeout: self.extract_timeout,
            download_timeout: self.download_timeout,
            allow_download: false,
        };
        let (canonical, platform, request_id) = Self::admit(source_url)?;
        self.resolve(&canonical, platform, request_id, &options)
            .instrument(tracing::info_span!("resolve", %request_id, %platform))
            .await
    }

    /// Resolve a page URL and stream the media behind it
    pub async fn resolve_and_deliver(
        &self,
        source_url: &str,
        range: Option<&str>,
    ) -> Result<DeliveredMedia, PipelineError> {
        let options = ExtractOptions {
            timeout: self.extract_timeout,
            download_timeout: self.download_timeout,
            allow_download: true,
        };
        let (canonical, platform, request_id) = Self::admit(source_url)?;

        async {
            let result = self
                .resolve(&canonical, platform, request_id, &options)
                .await?;
            let delivered = self.proxy.stream(result, range).await?;
            tracing::info!(status = delivered.status.as_u16(), "delivering media");
            Ok::<_, PipelineError>(delivered)
        }
        .instrument(tracing::info_span!("deliver", %request_id, %platform))
        .await
    }

    /// Classify the input, rejecting unsupported links up front. Returns the
    /// canonical absolute URL extractors work from, so `imgur.com/a/x` and
    /// `https://imgur.com/a/x` resolve the same way.
    fn admit(source_url: &str) -> Result<(String, Platform, RequestId), ResolveError> {
        let unsupported = || ResolveError::UnsupportedPlatform {
            url: source_url.to_string(),
        };
        let canonical = parse_input_url(source_url).ok_or_else(unsupported)?;
        let platform = classify(canonical.as_str()).ok_or_else(unsupported)?;
        Ok((canonical.to_string(), platform, RequestId::new()))
    }

    async fn resolve(
        &self,
        source_url: &str,
        platform: Platform,
        request_id: RequestId,
        options: &ExtractOptions,
    ) -> Result<MediaResult, ResolveError> {
        tracing::info!(url = %source_url, "resolving");
        let resolved = self
            .resolver
            .resolve(source_url, platform, request_id, options)
            .await?;

        let result = normalize(
            resolved.candidate,
            &resolved.outcome,
            platform,
            resolved.strategy,
        );
        tracing::info!(
            extractor = result.extractor,
            class = %result.media_class,
            confidence = ?result.confidence,
            validation = ?result.validation,
            substitution = result.is_substitution(),
            "resolved"
        );
        Ok(result)
    }
}
