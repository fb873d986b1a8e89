// Extractor capability and the engine seams extractors are built on

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use super::errors::ExtractError;
use super::models::{ExtractOptions, ExtractionRequest, MediaCandidate, MediaClass, StrategyKind};
use super::profiles::HeaderPreset;

/// One extraction strategy
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Name of the extractor (for logging and failure reports)
    fn name(&self) -> &'static str;

    fn kind(&self) -> StrategyKind;

    /// Try to turn the request's URL into a candidate
    async fn attempt(
        &self,
        request: &ExtractionRequest,
        options: &ExtractOptions,
    ) -> Result<MediaCandidate, ExtractError>;
}

/// Fetches page bodies and API documents
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_text(
        &self,
        url: &str,
        headers: &HeaderPreset,
        timeout: Duration,
    ) -> Result<String, ExtractError>;
}

/// Parameters for one media tool invocation
#[derive(Debug, Clone)]
pub struct ToolRequest {
    pub media_class: MediaClass,
    pub timeout: Duration,
    pub headers: HeaderPreset,
}

impl ToolRequest {
    /// Same request with the time limit swapped for a download budget
    pub fn for_download(&self, timeout: Duration) -> Self {
        Self {
            timeout,
            ..self.clone()
        }
    }
}

/// What a media tool reports about a URL without downloading it
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolProbe {
    pub title: Option<String>,
    pub thumbnail: Option<String>,
    /// Directly fetchable URL, absent when the tool has to merge streams
    pub direct_url: Option<String>,
    pub ext: Option<String>,
    pub media_class: Option<MediaClass>,
    pub quality: Option<String>,
    pub webpage_url: Option<String>,
}

/// General-purpose media extraction engine (yt-dlp and the like)
#[async_trait]
pub trait MediaTool: Send + Sync {
    fn name(&self) -> &'static str;

    /// Check if the tool can run at all
    async fn is_available(&self) -> bool;

    async fn probe(&self, target: &str, request: &ToolRequest) -> Result<ToolProbe, ExtractError>;

    /// Download the media into `dest`
    async fn download(
        &self,
        target: &str,
        dest: &Path,
        request: &ToolRequest,
    ) -> Result<(), ExtractError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct CatalogHit {
    pub catalog: &'static str,
    pub probe: ToolProbe,
}

/// Secondary catalog used to substitute media for metadata-only platforms
#[async_trait]
pub trait CatalogSearch: Send + Sync {
    fn name(&self) -> &'static str;

    async fn search_first(&self, query: &str, request: &ToolRequest)
        -> Result<CatalogHit, ExtractError>;

    async fn download(
        &self,
        hit: &CatalogHit,
        dest: &Path,
        request: &ToolRequest,
    ) -> Result<(), ExtractError>;
}
