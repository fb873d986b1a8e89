// Extractor variants
//
// Four strategies behind the same `Extractor` trait:
// - Native: platform APIs from an endpoint table
// - Generic tool: yt-dlp, with temp-file download as a last resort
// - Scrape: ordered pattern list over page HTML
// - Search substitution: metadata + secondary catalog search
//
// The engines they sit on (page fetcher, media tool, catalog search) are
// injected, so tests swap them for mocks.

mod diagnostics;
mod fetch;
mod html;
mod native;
mod scrape;
mod search;
mod tool;

pub use diagnostics::{classify_status, classify_tool_failure, diagnose, FailureSignal};
pub use fetch::HttpFetcher;
pub use native::{default_endpoints, ApiEndpoint, NativeApiExtractor};
pub use scrape::{ScrapeExtractor, ScrapePattern};
pub use search::{SearchSubstitutionExtractor, TrackMetadata};
pub use tool::{GenericToolExtractor, ToolCatalogSearch, YtDlpTool};

