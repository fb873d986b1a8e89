// Native API extractor - structured endpoints exposed by (or for) a platform
//
// Each platform is one row in an endpoint table: how to build the API URL
// from the page URL, and which JSON pointers hold the media URL, title,
// thumbnail and quality. Pointers are tried in order; the first non-empty
// string wins.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Url;
use serde_json::Value;

use super::html::unescape_inline;
use crate::resolver::errors::ExtractError;
use crate::resolver::models::{
    Confidence, ExtractOptions, ExtractionRequest, MediaCandidate, MediaClass, StrategyKind,
};
use crate::resolver::platform::{parse_input_url, Platform};
use crate::resolver::profiles::profile;
use crate::resolver::traits::{Extractor, PageFetcher};

const IMGUR_CLIENT_ID: &str = "546c25a59c58ad7";

#[derive(Clone)]
pub struct ApiEndpoint {
    pub platform: Platform,
    /// Builds the API URL from the page URL; `None` when the page URL
    /// does not carry the identifier the API needs
    pub build_url: fn(&Url) -> Option<String>,
    pub media: &'static [&'static str],
    pub title: &'static [&'static str],
    pub thumbnail: &'static [&'static str],
    pub quality: &'static [&'static str],
    /// Used when no quality pointer matches
    pub quality_label: Option<&'static str>,
    /// Class assumed when the media URL's extension says nothing
    pub media_class: MediaClass,
}

fn path_segments(url: &Url) -> Vec<&str> {
    url.path_segments()
        .map(|segments| segments.filter(|s| !s.is_empty()).collect())
        .unwrap_or_default()
}

/// Segment following `marker`, e.g. the id after `/video/`
fn segment_after<'a>(url: &'a Url, marker: &str) -> Option<&'a str> {
    let mut segments = url.path_segments()?.filter(|s| !s.is_empty());
    segments.find(|s| *s == marker)?;
    segments.next()
}

fn numeric(segment: &str) -> Option<&str> {
    if !segment.is_empty() && segment.chars().all(|c| c.is_ascii_digit()) {
        Some(segment)
    } else {
        None
    }
}

fn tikwm_url(url: &Url) -> Option<String> {
    Url::parse_with_params(
        "https://www.tikwm.com/api/",
        &[("url", url.as_str()), ("hd", "1")],
    )
    .ok()
    .map(String::from)
}

fn vxtwitter_url(url: &Url) -> Option<String> {
    let segments = path_segments(url);
    let status = segments.iter().position(|s| *s == "status")?;
    let user = segments.get(status.checked_sub(1)?)?;
    let id = numeric(segments.get(status + 1)?)?;
    Some(format!("https://api.vxtwitter.com/{}/status/{}", user, id))
}

fn reddit_url(url: &Url) -> Option<String> {
    let segments = path_segments(url);
    if !segments.contains(&"comments") {
        return None;
    }
    Some(format!(
        "https://www.reddit.com/{}.json?raw_json=1",
        segments.join("/")
    ))
}

fn vimeo_url(url: &Url) -> Option<String> {
    let id = path_segments(url).into_iter().rev().find_map(numeric)?;
    Some(format!("https://player.vimeo.com/video/{}/config", id))
}

fn dailymotion_url(url: &Url) -> Option<String> {
    let host = url.host_str().unwrap_or_default();
    let raw = if host.ends_with("dai.ly") {
        path_segments(url).into_iter().next()?
    } else {
        segment_after(url, "video")?
    };
    // "x8abc12_some-title" -> "x8abc12"
    let id = raw.split('_').next().filter(|id| !id.is_empty())?;
    Some(format!(
        "https://www.dailymotion.com/player/metadata/video/{}",
        id
    ))
}

fn pinterest_url(url: &Url) -> Option<String> {
    let raw = segment_after(url, "pin")?;
    // Pin slugs sometimes end with the numeric id: "some-title--1234"
    let id = raw.rsplit('-').next().and_then(numeric)?;
    Some(format!(
        "https://widgets.pinterest.com/v3/pidgets/pins/info/?pin_ids={}",
        id
    ))
}

fn imgur_url(url: &Url) -> Option<String> {
    let last = path_segments(url).into_iter().last()?;
    let stem = last.split('.').next().unwrap_or(last);
    // "funny-cat-AbC12" -> "AbC12"
    let id = stem.rsplit('-').next().filter(|id| !id.is_empty())?;
    let kind = if segment_after(url, "a").is_some() || segment_after(url, "gallery").is_some() {
        "posts"
    } else {
        "media"
    };
    Some(format!(
        "https://api.imgur.com/post/v1/{}/{}?client_id={}&include=media",
        kind, id, IMGUR_CLIENT_ID
    ))
}

fn deezer_url(url: &Url) -> Option<String> {
    let id = numeric(segment_after(url, "track")?)?;
    Some(format!("https://api.deezer.com/track/{}", id))
}

fn itunes_url(url: &Url) -> Option<String> {
    let id = url
        .query_pairs()
        .find(|(k, _)| k == "i")
        .map(|(_, v)| v.into_owned())
        .or_else(|| {
            path_segments(url)
                .into_iter()
                .last()
                .and_then(|last| numeric(last.trim_start_matches("id")))
                .map(str::to_string)
        })?;
    Some(format!("https://itunes.apple.com/lookup?id={}&entity=song", id))
}

/// The built-in endpoint table
pub fn default_endpoints() -> Vec<ApiEndpoint> {
    vec![
        ApiEndpoint {
            platform: Platform::TikTok,
            build_url: tikwm_url,
            media: &["/data/hdplay", "/data/play", "/data/images/0"],
            title: &["/data/title"],
            thumbnail: &["/data/origin_cover", "/data/cover"],
            quality: &[],
            quality_label: Some("hd"),
            media_class: MediaClass::Video,
        },
        ApiEndpoint {
            platform: Platform::Twitter,
            build_url: vxtwitter_url,
            media: &["/media_extended/0/url", "/mediaURLs/0"],
            title: &["/text"],
            thumbnail: &["/media_extended/0/thumbnail_url"],
            quality: &[],
            quality_label: None,
            media_class: MediaClass::Video,
        },
        ApiEndpoint {
            platform: Platform::Reddit,
            build_url: reddit_url,
            media: &[
                "/0/data/children/0/data/secure_media/reddit_video/fallback_url",
                "/0/data/children/0/data/media/reddit_video/fallback_url",
                "/0/data/children/0/data/preview/reddit_video_preview/fallback_url",
                "/0/data/children/0/data/preview/images/0/source/url",
            ],
            title: &["/0/data/children/0/data/title"],
            thumbnail: &["/0/data/children/0/data/thumbnail"],
            quality: &[],
            quality_label: None,
            media_class: MediaClass::Video,
        },
        ApiEndpoint {
            platform: Platform::Vimeo,
            build_url: vimeo_url,
            media: &["/request/files/progressive/0/url"],
            title: &["/video/title"],
            thumbnail: &["/video/thumbs/base", "/video/thumbs/640"],
            quality: &["/request/files/progressive/0/quality"],
            quality_label: None,
            media_class: MediaClass::Video,
        },
        ApiEndpoint {
            platform: Platform::Dailymotion,
            build_url: dailymotion_url,
            media: &["/qualities/auto/0/url"],
            title: &["/title"],
            thumbnail: &["/posters/720", "/thumbnails/720"],
            quality: &[],
            quality_label: Some("auto"),
            media_class: MediaClass::Video,
        },
        ApiEndpoint {
            platform: Platform::Pinterest,
            build_url: pinterest_url,
            media: &[
                "/data/0/videos/video_list/V_720P/url",
                "/data/0/images/orig/url",
                "/data/0/images/564x/url",
            ],
            title: &["/data/0/description"],
            thumbnail: &["/data/0/images/237x/url"],
            quality: &[],
            quality_label: None,
            media_class: MediaClass::Image,
        },
        ApiEndpoint {
            platform: Platform::Imgur,
            build_url: imgur_url,
            media: &["/media/0/url", "/url"],
            title: &["/title"],
            thumbnail: &[],
            quality: &[],
            quality_label: Some("original"),
            media_class: MediaClass::Image,
        },
        ApiEndpoint {
            platform: Platform::Deezer,
            build_url: deezer_url,
            media: &["/preview"],
            title: &["/title_short", "/title"],
            thumbnail: &["/album/cover_xl", "/album/cover_big"],
            quality: &[],
            quality_label: Some("preview"),
            media_class: MediaClass::Audio,
        },
        ApiEndpoint {
            platform: Platform::AppleMusic,
            build_url: itunes_url,
            media: &["/results/0/previewUrl"],
            title: &["/results/0/trackName", "/results/0/collectionName"],
            thumbnail: &["/results/0/artworkUrl100"],
            quality: &[],
            quality_label: Some("preview"),
            media_class: MediaClass::Audio,
        },
    ]
}

fn first_string(doc: &Value, pointers: &[&str]) -> Option<String> {
    pointers.iter().find_map(|pointer| {
        doc.pointer(pointer)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    })
}

/// Resolve relative media paths against the API URL
fn absolute(api_url: &str, raw: &str) -> Option<String> {
    let raw = unescape_inline(raw);
    Url::parse(api_url)
        .and_then(|base| base.join(&raw))
        .ok()
        .map(String::from)
}

pub struct NativeApiExtractor {
    fetcher: Arc<dyn PageFetcher>,
    endpoints: Vec<ApiEndpoint>,
}

impl NativeApiExtractor {
    pub fn new(fetcher: Arc<dyn PageFetcher>) -> Self {
        Self::with_endpoints(fetcher, default_endpoints())
    }

    pub fn with_endpoints(fetcher: Arc<dyn PageFetcher>, endpoints: Vec<ApiEndpoint>) -> Self {
        Self { fetcher, endpoints }
    }

    fn endpoint(&self, platform: Platform) -> Option<&ApiEndpoint> {
        self.endpoints.iter().find(|e| e.platform == platform)
    }
}

#[async_trait]
impl Extractor for NativeApiExtractor {
    fn name(&self) -> &'static str {
        "native-api"
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::Native
    }

    async fn attempt(
        &self,
        request: &ExtractionRequest,
        options: &ExtractOptions,
    ) -> Result<MediaCandidate, ExtractError> {
        let endpoint = self.endpoint(request.platform).ok_or_else(|| {
            ExtractError::UnsupportedShape(format!("no API endpoint for {}", request.platform))
        })?;

        let page_url = parse_input_url(&request.source_url).ok_or_else(|| {
            ExtractError::UnsupportedShape(format!("not a URL: {}", request.source_url))
        })?;
        let api_url = (endpoint.build_url)(&page_url).ok_or_else(|| {
            ExtractError::UnsupportedShape(format!(
                "no {} id in {}",
                request.platform, request.source_url
            ))
        })?;

        tracing::debug!(api_url = %api_url, "calling platform API");
        let headers = profile(request.platform).headers;
        let body = self
            .fetcher
            .fetch_text(&api_url, &headers, options.timeout)
            .await?;

        let doc: Value = serde_json::from_str(&body).map_err(|e| {
            ExtractError::UnsupportedShape(format!("API response is not JSON: {}", e))
        })?;

        let media_url = first_string(&doc, endpoint.media)
            .and_then(|raw| absolute(&api_url, &raw))
            .ok_or_else(|| ExtractError::NotFound("API response carries no media".to_string()))?;

        let media_class = MediaClass::from_url(&media_url).unwrap_or(endpoint.media_class);
        let quality = first_string(&doc, endpoint.quality)
            .or_else(|| endpoint.quality_label.map(str::to_string));
        let thumbnail =
            first_string(&doc, endpoint.thumbnail).and_then(|raw| absolute(&api_url, &raw));

        Ok(MediaCandidate::remote(media_url, media_class, Confidence::High)
            .with_title(first_string(&doc, endpoint.title))
            .with_thumbnail(thumbnail)
            .with_quality(quality))
    }
}
