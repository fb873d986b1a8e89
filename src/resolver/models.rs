// Common data models for the resolution pipeline

use std::fmt;
use std::time::Duration;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use uuid::Uuid;

use super::platform::Platform;
use super::temp_store::TempAsset;

/// Broad kind of media a URL resolves to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaClass {
    Video,
    Audio,
    Image,
    #[default]
    Unknown,
}

impl MediaClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Image => "image",
            Self::Unknown => "unknown",
        }
    }

    /// Extension used when nothing better is known
    pub fn default_extension(&self) -> &'static str {
        match self {
            Self::Video => "mp4",
            Self::Audio => "mp3",
            Self::Image => "jpg",
            Self::Unknown => "bin",
        }
    }

    pub fn default_mime(&self) -> &'static str {
        match self {
            Self::Video => "video/mp4",
            Self::Audio => "audio/mpeg",
            Self::Image => "image/jpeg",
            Self::Unknown => "application/octet-stream",
        }
    }

    /// Guess from a file extension (no leading dot)
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "mp4" | "m4v" | "webm" | "mov" | "mkv" | "flv" | "ts" | "m3u8" | "3gp" => {
                Some(Self::Video)
            }
            "mp3" | "m4a" | "aac" | "ogg" | "oga" | "opus" | "flac" | "wav" => Some(Self::Audio),
            "jpg" | "jpeg" | "png" | "gif" | "webp" | "avif" | "heic" => Some(Self::Image),
            _ => None,
        }
    }

    /// Guess from the extension of a URL's path
    pub fn from_url(url: &str) -> Option<Self> {
        url_extension(url).and_then(|ext| Self::from_extension(&ext))
    }

    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let ct = content_type.trim().to_ascii_lowercase();
        if ct.starts_with("video/") || ct.contains("mpegurl") {
            Some(Self::Video)
        } else if ct.starts_with("audio/") {
            Some(Self::Audio)
        } else if ct.starts_with("image/") {
            Some(Self::Image)
        } else {
            None
        }
    }
}

impl fmt::Display for MediaClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Extension of the last path segment of a URL, lowercased
pub fn url_extension(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next()?;
    let segment = path.rsplit('/').next()?;
    let (_, ext) = segment.rsplit_once('.')?;
    if ext.is_empty() || ext.len() > 5 || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// The closed set of extraction strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Native,
    GenericTool,
    Scrape,
    SearchSubstitution,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Native => write!(f, "native"),
            Self::GenericTool => write!(f, "generic-tool"),
            Self::Scrape => write!(f, "scrape"),
            Self::SearchSubstitution => write!(f, "search-substitution"),
        }
    }
}

/// How sure an extractor is about its result. Reported, never used to
/// swap one candidate for another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

/// Unique token for one inbound resolution request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// Input handed to an extractor for one attempt
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    pub source_url: String,
    pub platform: Platform,
    pub attempt_index: usize,
    pub request_id: RequestId,
}

/// Per-attempt knobs
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub timeout: Duration,
    /// Extra budget for a strategy that downloads into the temp store
    pub download_timeout: Duration,
    /// When false, strategies that cannot expose a direct URL fail instead
    /// of downloading into the temp store
    pub allow_download: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(45),
            download_timeout: Duration::from_secs(600),
            allow_download: true,
        }
    }
}

impl ExtractOptions {
    /// Wall-clock limit for one attempt: extraction plus, when allowed, a download
    pub fn attempt_budget(&self) -> Duration {
        if self.allow_download {
            self.timeout + self.download_timeout
        } else {
            self.timeout
        }
    }
}

/// Where the bytes of a candidate live
#[derive(Debug)]
pub enum MediaSource {
    Remote(String),
    Local(TempAsset),
}

impl Serialize for MediaSource {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        match self {
            Self::Remote(url) => map.serialize_entry("mediaUrl", url)?,
            Self::Local(asset) => map.serialize_entry("localAssetPath", asset.path())?,
        }
        map.end()
    }
}

/// Marks a result that came from a secondary catalog instead of the
/// platform the user linked
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Substitution {
    pub catalog: String,
    pub query: String,
    pub matched_title: Option<String>,
    pub matched_url: Option<String>,
}

/// Unvalidated output of one extractor attempt
#[derive(Debug)]
pub struct MediaCandidate {
    pub title: Option<String>,
    pub source: MediaSource,
    pub thumbnail_url: Option<String>,
    pub media_class: MediaClass,
    pub quality_hint: Option<String>,
    pub confidence: Confidence,
    pub substitution: Option<Substitution>,
}

impl MediaCandidate {
    pub fn new(source: MediaSource, media_class: MediaClass, confidence: Confidence) -> Self {
        Self {
            title: None,
            source,
            thumbnail_url: None,
            media_class,
            quality_hint: None,
            confidence,
            substitution: None,
        }
    }

    pub fn remote(url: impl Into<String>, media_class: MediaClass, confidence: Confidence) -> Self {
        Self::new(MediaSource::Remote(url.into()), media_class, confidence)
    }

    pub fn with_title(mut self, title: Option<String>) -> Self {
        self.title = title;
        self
    }

    pub fn with_thumbnail(mut self, thumbnail: Option<String>) -> Self {
        self.thumbnail_url = thumbnail;
        self
    }

    pub fn with_quality(mut self, quality: Option<String>) -> Self {
        self.quality_hint = quality;
        self
    }

    pub fn with_substitution(mut self, substitution: Substitution) -> Self {
        self.substitution = Some(substitution);
        self
    }

    pub fn raw_url(&self) -> Option<&str> {
        match &self.source {
            MediaSource::Remote(url) => Some(url),
            MediaSource::Local(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Valid,
    Invalid,
    /// Probing failed or was inconclusive; the candidate passes through
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationOutcome {
    pub verdict: Verdict,
    pub probed_content_type: Option<String>,
    pub probed_length: Option<u64>,
    pub probed_status: Option<u16>,
    /// Container signature found in the leading bytes, if any
    pub signature: Option<&'static str>,
}

impl ValidationOutcome {
    pub fn unknown() -> Self {
        Self {
            verdict: Verdict::Unknown,
            probed_content_type: None,
            probed_length: None,
            probed_status: None,
            signature: None,
        }
    }
}

/// Canonical output of the pipeline
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaResult {
    pub title: String,
    /// Serialized as `mediaUrl` or `localAssetPath`
    #[serde(flatten)]
    pub source: MediaSource,
    pub thumbnail_url: String,
    pub media_class: MediaClass,
    pub quality_label: String,
    pub source_platform: Platform,
    pub extractor: &'static str,
    pub confidence: Confidence,
    pub validation: Verdict,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub substitution: Option<Substitution>,
}

impl MediaResult {
    pub fn media_url(&self) -> Option<&str> {
        match &self.source {
            MediaSource::Remote(url) => Some(url),
            MediaSource::Local(_) => None,
        }
    }

    pub fn is_substitution(&self) -> bool {
        self.substitution.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_extension() {
        assert_eq!(url_extension("https://cdn.x/v/clip.MP4?sig=1").as_deref(), Some("mp4"));
        assert_eq!(url_extension("https://cdn.x/a/b.jpg#frag").as_deref(), Some("jpg"));
        assert_eq!(url_extension("https://cdn.x/watch"), None);
        assert_eq!(url_extension("https://cdn.x/v1.2/stream"), None);
    }

    #[test]
    fn test_class_guessing() {
        assert_eq!(MediaClass::from_url("https://a/b.m4a"), Some(MediaClass::Audio));
        assert_eq!(MediaClass::from_url("https://a/b.webp"), Some(MediaClass::Image));
        assert_eq!(
            MediaClass::from_content_type("application/vnd.apple.mpegurl"),
            Some(MediaClass::Video)
        );
        assert_eq!(MediaClass::from_content_type("text/html; charset=utf-8"), None);
    }

    #[test]
    fn test_remote_result_serializes_media_url() {
        let result = MediaResult {
            title: "t".to_string(),
            source: MediaSource::Remote("https://cdn/x.mp4".to_string()),
            thumbnail_url: "https://cdn/x.jpg".to_string(),
            media_class: MediaClass::Video,
            quality_label: "720p".to_string(),
            source_platform: Platform::Vimeo,
            extractor: "native-api",
            confidence: Confidence::High,
            validation: Verdict::Valid,
            substitution: None,
        };
        let json = serde_json::to_value(&result).expect("serialize");
        assert_eq!(json["mediaUrl"], "https://cdn/x.mp4");
        assert_eq!(json["sourcePlatform"], "vimeo");
        assert_eq!(json["mediaClass"], "video");
        assert!(json.get("localAssetPath").is_none());
        assert!(json.get("substitution").is_none());
    }
}
