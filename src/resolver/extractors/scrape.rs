// HTML scrape extractor
//
// Fetches the page with a browser-like preset and runs an ordered pattern
// list over it. The first pattern that yields a URL wins:
//   1. JSON-LD blocks (VideoObject / AudioObject / ImageObject contentUrl)
//   2. Hydration JSON in inline scripts (playAddr, video_url, ...)
//   3. Open Graph / Twitter card meta tags
//   4. Raw CDN URL shapes anywhere in the document

use std::sync::Arc;

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::Url;
use serde_json::Value;

use super::html::{best_title, meta_content, unescape_inline};
use crate::resolver::errors::ExtractError;
use crate::resolver::models::{
    Confidence, ExtractOptions, ExtractionRequest, MediaCandidate, MediaClass, StrategyKind,
};
use crate::resolver::platform::Platform;
use crate::resolver::profiles::profile;
use crate::resolver::traits::{Extractor, PageFetcher};

lazy_static! {
    static ref JSON_LD: Regex = Regex::new(
        r#"(?is)<script[^>]*type\s*=\s*["']application/ld\+json["'][^>]*>(.*?)</script>"#
    )
    .unwrap();
    static ref HYDRATION_KEY: Regex = Regex::new(
        r#""(?:playAddr|downloadAddr|video_url|videoUrl|contentUrl|playbackUrl|playback_url|hd_src|sd_src|browser_native_hd_url|browser_native_sd_url|playable_url_quality_hd|playable_url|stream_url|audio_url)"\s*:\s*"(https?:(?:\\?/){2}[^"]+)""#
    )
    .unwrap();
    static ref CDN_URL: Regex = Regex::new(
        r#"https?:(?:\\?/){2}[^"'\s<>()]+?\.(?:mp4|m4v|webm|m4a|mp3)(?:\?[^"'\s<>()]*)?"#
    )
    .unwrap();
}

/// Scrape patterns in priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrapePattern {
    JsonLd,
    HydrationJson,
    OpenGraph,
    CdnRegex,
}

impl ScrapePattern {
    pub const ORDER: [ScrapePattern; 4] = [
        Self::JsonLd,
        Self::HydrationJson,
        Self::OpenGraph,
        Self::CdnRegex,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::JsonLd => "json-ld",
            Self::HydrationJson => "hydration-json",
            Self::OpenGraph => "open-graph",
            Self::CdnRegex => "cdn-regex",
        }
    }

    fn confidence(&self) -> Confidence {
        match self {
            Self::CdnRegex => Confidence::Low,
            _ => Confidence::Medium,
        }
    }

    fn find(&self, html: &str, platform: Platform) -> Option<Found> {
        match self {
            Self::JsonLd => find_json_ld(html),
            Self::HydrationJson => find_hydration(html),
            Self::OpenGraph => find_open_graph(html, platform),
            Self::CdnRegex => find_cdn_url(html),
        }
    }
}

/// A media URL located by one pattern
#[derive(Debug, Clone, PartialEq)]
struct Found {
    url: String,
    media_class: Option<MediaClass>,
    title: Option<String>,
    thumbnail: Option<String>,
}

impl Found {
    fn url(url: String) -> Self {
        let media_class = MediaClass::from_url(&url);
        Self {
            url,
            media_class,
            title: None,
            thumbnail: None,
        }
    }
}

fn find_json_ld(html: &str) -> Option<Found> {
    JSON_LD.captures_iter(html).find_map(|caps| {
        let doc: Value = serde_json::from_str(caps[1].trim()).ok()?;
        media_object(&doc)
    })
}

/// Walk a JSON-LD document (objects, arrays, @graph) for a media object
fn media_object(value: &Value) -> Option<Found> {
    match value {
        Value::Array(items) => items.iter().find_map(media_object),
        Value::Object(map) => {
            let media_class = match map.get("@type").and_then(Value::as_str) {
                Some("VideoObject") => Some(MediaClass::Video),
                Some("AudioObject") => Some(MediaClass::Audio),
                Some("ImageObject") => Some(MediaClass::Image),
                _ => None,
            };
            if let (Some(class), Some(url)) = (
                media_class,
                map.get("contentUrl").and_then(Value::as_str),
            ) {
                let thumbnail = match map.get("thumbnailUrl") {
                    Some(Value::String(s)) => Some(s.clone()),
                    Some(Value::Array(items)) => {
                        items.first().and_then(Value::as_str).map(str::to_string)
                    }
                    _ => None,
                };
                return Some(Found {
                    url: url.to_string(),
                    media_class: Some(class),
                    title: map.get("name").and_then(Value::as_str).map(str::to_string),
                    thumbnail,
                });
            }
            map.values()
                .filter(|v| v.is_object() || v.is_array())
                .find_map(media_object)
        }
        _ => None,
    }
}

fn find_hydration(html: &str) -> Option<Found> {
    let caps = HYDRATION_KEY.captures(html)?;
    Some(Found::url(unescape_inline(&caps[1])))
}

fn find_open_graph(html: &str, platform: Platform) -> Option<Found> {
    let video_is_player_page = meta_content(html, "og:video:type")
        .map(|t| t.to_ascii_lowercase().contains("html"))
        .unwrap_or(false);

    if !video_is_player_page {
        for key in ["og:video:secure_url", "og:video:url", "og:video"] {
            if let Some(url) = meta_content(html, key) {
                let mut found = Found::url(url);
                found.media_class.get_or_insert(MediaClass::Video);
                return Some(found);
            }
        }
    }

    if let Some(url) = meta_content(html, "twitter:player:stream") {
        let mut found = Found::url(url);
        found.media_class.get_or_insert(MediaClass::Video);
        return Some(found);
    }

    for key in ["og:audio:secure_url", "og:audio"] {
        if let Some(url) = meta_content(html, key) {
            let mut found = Found::url(url);
            found.media_class.get_or_insert(MediaClass::Audio);
            return Some(found);
        }
    }

    // On video sites og:image is only a poster frame
    if platform.may_serve_images() {
        if let Some(url) = meta_content(html, "og:image") {
            let mut found = Found::url(url);
            found.media_class = Some(MediaClass::Image);
            return Some(found);
        }
    }

    None
}

fn find_cdn_url(html: &str) -> Option<Found> {
    CDN_URL
        .find(html)
        .map(|m| Found::url(unescape_inline(m.as_str())))
}

pub struct ScrapeExtractor {
    fetcher: Arc<dyn PageFetcher>,
}

impl ScrapeExtractor {
    pub fn new(fetcher: Arc<dyn PageFetcher>) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl Extractor for ScrapeExtractor {
    fn name(&self) -> &'static str {
        "html-scrape"
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::Scrape
    }

    async fn attempt(
        &self,
        request: &ExtractionRequest,
        options: &ExtractOptions,
    ) -> Result<MediaCandidate, ExtractError> {
        let headers = profile(request.platform).headers;
        let html = self
            .fetcher
            .fetch_text(&request.source_url, &headers, options.timeout)
            .await?;

        let (pattern, found) = ScrapePattern::ORDER
            .iter()
            .find_map(|pattern| pattern.find(&html, request.platform).map(|f| (*pattern, f)))
            .ok_or_else(|| ExtractError::NotFound("no media pattern matched the page".to_string()))?;

        tracing::debug!(pattern = pattern.as_str(), url = %found.url, "scrape pattern matched");

        let base = Url::parse(&request.source_url).ok();
        let resolve = |raw: String| match &base {
            Some(base) => base.join(&raw).map(String::from).unwrap_or(raw),
            None => raw,
        };

        let media_url = resolve(found.url);
        let thumbnail = found
            .thumbnail
            .or_else(|| match found.media_class {
                Some(MediaClass::Image) => None,
                _ => meta_content(&html, "og:image"),
            })
            .map(resolve);
        let media_class = found
            .media_class
            .unwrap_or_else(|| request.platform.media_class());

        Ok(
            MediaCandidate::remote(media_url, media_class, pattern.confidence())
                .with_title(found.title.or_else(|| best_title(&html)))
                .with_thumbnail(thumbnail),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::models::RequestId;
    use crate::resolver::test_support::MockFetcher;

    const PAGE: &str = "https://www.tiktok.com/@u/video/1";

    fn request(platform: Platform) -> ExtractionRequest {
        ExtractionRequest {
            source_url: PAGE.to_string(),
            platform,
            attempt_index: 1,
            request_id: RequestId::new(),
        }
    }

    async fn scrape(html: &str, platform: Platform) -> Result<MediaCandidate, ExtractError> {
        let fetcher = MockFetcher::new().with_body(PAGE, html);
        ScrapeExtractor::new(Arc::new(fetcher))
            .attempt(&request(platform), &ExtractOptions::default())
            .await
    }

    #[tokio::test]
    async fn test_json_ld_beats_open_graph() {
        let html = r#"<html><head>
            <meta property="og:video" content="https://cdn.x/og.mp4">
            <script type="application/ld+json">
              {"@context":"https://schema.org","@graph":[{"@type":"WebPage"},
               {"@type":"VideoObject","name":"From LD","contentUrl":"https://cdn.x/ld.mp4",
                "thumbnailUrl":["https://cdn.x/t.jpg"]}]}
            </script></head></html>"#;
        let candidate = scrape(html, Platform::TikTok).await.unwrap();
        assert_eq!(candidate.raw_url(), Some("https://cdn.x/ld.mp4"));
        assert_eq!(candidate.title.as_deref(), Some("From LD"));
        assert_eq!(candidate.thumbnail_url.as_deref(), Some("https://cdn.x/t.jpg"));
        assert_eq!(candidate.confidence, Confidence::Medium);
    }

    #[tokio::test]
    async fn test_hydration_json_unescaped() {
        let html = r#"<script>window.__DATA__={"video":{"playAddr":"https:\/\/v16.tiktokcdn.com\/a\/b.mp4?x=1&y=2"}}</script>
            <meta property="og:video" content="https://cdn.x/og.mp4">"#;
        let candidate = scrape(html, Platform::TikTok).await.unwrap();
        assert_eq!(
            candidate.raw_url(),
            Some("https://v16.tiktokcdn.com/a/b.mp4?x=1&y=2")
        );
        assert_eq!(candidate.media_class, MediaClass::Video);
    }

    #[tokio::test]
    async fn test_og_video_player_page_is_skipped() {
        let html = r#"<meta property="og:video" content="https://www.tiktok.com/embed/1">
            <meta property="og:video:type" content="text/html">
            <meta property="og:image" content="https://cdn.x/poster.jpg">
            <title>Clip</title>"#;
        // Video platform: the poster frame is not media
        let err = scrape(html, Platform::TikTok).await.unwrap_err();
        assert!(matches!(err, ExtractError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_og_image_on_image_platform() {
        let html = r#"<meta property="og:image" content="https://i.imgur.com/abc.jpg">
            <meta property="og:title" content="A cat">"#;
        let candidate = scrape(html, Platform::Imgur).await.unwrap();
        assert_eq!(candidate.raw_url(), Some("https://i.imgur.com/abc.jpg"));
        assert_eq!(candidate.media_class, MediaClass::Image);
        assert_eq!(candidate.title.as_deref(), Some("A cat"));
        assert!(candidate.thumbnail_url.is_none());
    }

    #[tokio::test]
    async fn test_cdn_regex_is_last_resort() {
        let html = r#"<div data-src="https://video.cdn.example/path/clip.mp4?token=abc"></div>"#;
        let candidate = scrape(html, Platform::Vimeo).await.unwrap();
        assert_eq!(
            candidate.raw_url(),
            Some("https://video.cdn.example/path/clip.mp4?token=abc")
        );
        assert_eq!(candidate.confidence, Confidence::Low);

        // Playlists are left to the tool, which can merge segments
        let html = r#"<div data-src="https://video.cdn.example/path/master.m3u8"></div>"#;
        assert!(scrape(html, Platform::Vimeo).await.is_err());
    }

    #[tokio::test]
    async fn test_fetch_failure_propagates() {
        let fetcher = MockFetcher::new();
        let err = ScrapeExtractor::new(Arc::new(fetcher))
            .attempt(&request(Platform::TikTok), &ExtractOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::NotFound(_)));
    }
}
