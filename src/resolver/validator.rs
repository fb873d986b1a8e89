// Candidate Validator - probes a candidate before it is handed out
//
// Probing is a heuristic: it never fails, it only produces a verdict.
// Network errors, blocked HEADs and odd statuses all degrade to Unknown.
// A refused ranged GET or a streaming manifest is Invalid: delivery would
// send that same GET, and a playlist is not a relayable file.

use std::path::Path;
use std::time::Duration;

use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, RANGE};
use reqwest::{Response, StatusCode};
use tokio::io::AsyncReadExt;

use crate::config::ResolverConfig;
use crate::resolver::models::{MediaCandidate, MediaClass, MediaSource, ValidationOutcome, Verdict};
use crate::resolver::platform::Platform;
use crate::resolver::profiles::{profile, HeaderPreset};

#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    pub probe_timeout: Duration,
    pub video_min_bytes: u64,
    pub audio_min_bytes: u64,
    pub sniff_bytes: u64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self::from(&ResolverConfig::default())
    }
}

impl From<&ResolverConfig> for ValidatorConfig {
    fn from(config: &ResolverConfig) -> Self {
        Self {
            probe_timeout: config.probe_timeout(),
            video_min_bytes: config.video_min_bytes,
            audio_min_bytes: config.audio_min_bytes,
            sniff_bytes: config.sniff_bytes.max(16),
        }
    }
}

/// Identify a container or file format from its leading bytes
pub fn detect_signature(bytes: &[u8]) -> Option<&'static str> {
    if bytes.len() >= 8 && matches!(&bytes[4..8], b"ftyp" | b"styp" | b"moov" | b"moof") {
        return Some("iso-bmff");
    }
    if bytes.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]) {
        return Some("matroska");
    }
    if bytes.starts_with(b"GIF8") {
        return Some("gif");
    }
    if bytes.len() > 188 && bytes[0] == 0x47 && bytes[188] == 0x47 {
        return Some("mpeg-ts");
    }
    if bytes.starts_with(&[0x00, 0x00, 0x00, 0x01]) {
        return Some("h264-annexb");
    }
    if bytes.starts_with(&[0x00, 0x00, 0x01, 0xBA]) {
        return Some("mpeg-ps");
    }
    if bytes.starts_with(b"FLV") {
        return Some("flv");
    }
    if bytes.starts_with(b"OggS") {
        return Some("ogg");
    }
    if bytes.starts_with(b"fLaC") {
        return Some("flac");
    }
    if bytes.starts_with(b"ID3") {
        return Some("mp3-id3");
    }
    if bytes.len() >= 12 && bytes.starts_with(b"RIFF") {
        match &bytes[8..12] {
            b"WAVE" => return Some("wav"),
            b"WEBP" => return Some("webp"),
            b"AVI " => return Some("avi"),
            _ => {}
        }
    }
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some("jpeg");
    }
    if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
        return Some("png");
    }
    // MPEG audio frame sync, also covers ADTS AAC
    if bytes.len() >= 2 && bytes[0] == 0xFF && (bytes[1] & 0xE0) == 0xE0 {
        return Some("mpeg-audio");
    }
    None
}

/// HLS playlist or DASH MPD: an index of segments, not the media itself
pub fn detect_manifest(bytes: &[u8]) -> Option<&'static str> {
    let start = bytes
        .iter()
        .position(|b| !(b.is_ascii_whitespace() || *b == 0xEF || *b == 0xBB || *b == 0xBF))
        .unwrap_or(bytes.len());
    let head = &bytes[start..];
    if head.starts_with(b"#EXTM3U") {
        return Some("hls-playlist");
    }
    let window = &head[..head.len().min(512)];
    if window.windows(4).any(|w| w == b"<MPD") {
        return Some("dash-manifest");
    }
    None
}

fn is_manifest_type(content_type: &str) -> bool {
    let ct = content_type.to_ascii_lowercase();
    ct.contains("mpegurl") || ct.contains("dash+xml")
}

/// An HTML document where media was promised: an error or login page
pub fn looks_like_html(bytes: &[u8]) -> bool {
    let head: Vec<u8> = bytes
        .iter()
        .skip_while(|b| b.is_ascii_whitespace() || **b == 0xEF || **b == 0xBB || **b == 0xBF)
        .take(64)
        .map(u8::to_ascii_lowercase)
        .collect();
    head.starts_with(b"<!doctype html") || head.starts_with(b"<html") || head.starts_with(b"<head")
}

fn matches_family(content_type: &str, class: MediaClass) -> bool {
    let ct = content_type.to_ascii_lowercase();
    match class {
        MediaClass::Video => ct.starts_with("video/"),
        MediaClass::Audio => ct.starts_with("audio/"),
        MediaClass::Image => ct.starts_with("image/"),
        MediaClass::Unknown => ct.starts_with("video/") || ct.starts_with("audio/"),
    }
}

fn header_str(response: &Response, name: reqwest::header::HeaderName) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Total size from `Content-Range: bytes 0-8191/123456`
fn total_from_content_range(value: &str) -> Option<u64> {
    value.rsplit('/').next()?.trim().parse().ok()
}

pub struct CandidateValidator {
    client: reqwest::Client,
    config: ValidatorConfig,
}

impl CandidateValidator {
    pub fn new(client: reqwest::Client, config: ValidatorConfig) -> Self {
        Self { client, config }
    }

    pub async fn validate(&self, candidate: &MediaCandidate, platform: Platform) -> ValidationOutcome {
        match &candidate.source {
            MediaSource::Local(asset) => self.validate_local(asset.path()).await,
            MediaSource::Remote(url) => {
                self.validate_remote(url, candidate.media_class, &profile(platform).headers)
                    .await
            }
        }
    }

    async fn validate_local(&self, path: &Path) -> ValidationOutcome {
        let mut outcome = ValidationOutcome::unknown();
        outcome.probed_content_type = mime_guess::from_path(path)
            .first()
            .map(|mime| mime.essence_str().to_string());

        let mut file = match tokio::fs::File::open(path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                outcome.verdict = Verdict::Invalid;
                return outcome;
            }
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "local probe failed");
                return outcome;
            }
        };

        let len = file.metadata().await.map(|m| m.len()).ok();
        outcome.probed_length = len;
        if len == Some(0) {
            outcome.verdict = Verdict::Invalid;
            return outcome;
        }

        let mut head = Vec::with_capacity(self.config.sniff_bytes as usize);
        if let Err(e) = (&mut file)
            .take(self.config.sniff_bytes)
            .read_to_end(&mut head)
            .await
        {
            tracing::debug!(path = %path.display(), error = %e, "local sniff failed");
            return outcome;
        }

        if let Some(manifest) = detect_manifest(&head) {
            outcome.signature = Some(manifest);
            outcome.verdict = Verdict::Invalid;
        } else if let Some(signature) = detect_signature(&head) {
            outcome.signature = Some(signature);
            outcome.verdict = Verdict::Valid;
        }
        outcome
    }

    async fn validate_remote(
        &self,
        url: &str,
        class: MediaClass,
        headers: &HeaderPreset,
    ) -> ValidationOutcome {
        let mut outcome = ValidationOutcome::unknown();

        let head = headers
            .apply(self.client.head(url))
            .timeout(self.config.probe_timeout)
            .send()
            .await;

        match head {
            Ok(response) => {
                let status = response.status();
                outcome.probed_status = Some(status.as_u16());
                if matches!(status, StatusCode::NOT_FOUND | StatusCode::GONE) {
                    outcome.verdict = Verdict::Invalid;
                    return outcome;
                }
                if status.is_success() {
                    outcome.probed_content_type = header_str(&response, CONTENT_TYPE);
                    outcome.probed_length = response
                        .headers()
                        .get(CONTENT_LENGTH)
                        .and_then(|v| v.to_str().ok())
                        .and_then(|v| v.parse().ok());
                }
                tracing::debug!(
                    %url,
                    status = status.as_u16(),
                    content_type = outcome.probed_content_type.as_deref().unwrap_or("-"),
                    "HEAD probe"
                );
            }
            Err(e) => {
                tracing::debug!(%url, error = %e, "HEAD probe failed");
            }
        }

        let content_type = outcome.probed_content_type.clone().unwrap_or_default();
        if is_manifest_type(&content_type) {
            outcome.verdict = Verdict::Invalid;
            return outcome;
        }

        if class == MediaClass::Image {
            // Many image CDNs omit or mislabel content-type; never reject here
            if matches_family(&content_type, MediaClass::Image) {
                outcome.verdict = Verdict::Valid;
            }
            return outcome;
        }

        let min_bytes = match class {
            MediaClass::Video => self.config.video_min_bytes,
            _ => self.config.audio_min_bytes,
        };
        if matches_family(&content_type, class)
            && outcome.probed_length.map_or(false, |len| len > min_bytes)
        {
            outcome.verdict = Verdict::Valid;
            return outcome;
        }

        self.sniff_remote(url, headers, outcome).await
    }

    /// Ranged GET of the first few KB, then signature sniffing
    async fn sniff_remote(
        &self,
        url: &str,
        headers: &HeaderPreset,
        mut outcome: ValidationOutcome,
    ) -> ValidationOutcome {
        let range = format!("bytes=0-{}", self.config.sniff_bytes - 1);
        let response = match headers
            .apply(self.client.get(url))
            .header(RANGE, range)
            .timeout(self.config.probe_timeout)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!(%url, error = %e, "ranged GET probe failed");
                return outcome;
            }
        };

        let status = response.status();
        outcome.probed_status = Some(status.as_u16());
        // Throttling may clear up by delivery time; any other 4xx will not
        if status.is_client_error()
            && !matches!(status, StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS)
        {
            outcome.verdict = Verdict::Invalid;
            return outcome;
        }
        if !status.is_success() {
            return outcome;
        }

        if outcome.probed_content_type.is_none() {
            outcome.probed_content_type = header_str(&response, CONTENT_TYPE);
        }
        if outcome
            .probed_content_type
            .as_deref()
            .map_or(false, is_manifest_type)
        {
            outcome.verdict = Verdict::Invalid;
            return outcome;
        }
        if outcome.probed_length.is_none() {
            outcome.probed_length = header_str(&response, CONTENT_RANGE)
                .as_deref()
                .and_then(total_from_content_range)
                .or_else(|| response.content_length());
        }

        let head = match self.read_head(response).await {
            Ok(head) => head,
            Err(e) => {
                tracing::debug!(%url, error = %e, "ranged GET body failed");
                return outcome;
            }
        };

        if let Some(manifest) = detect_manifest(&head) {
            outcome.signature = Some(manifest);
            outcome.verdict = Verdict::Invalid;
        } else if let Some(signature) = detect_signature(&head) {
            outcome.signature = Some(signature);
            outcome.verdict = Verdict::Valid;
        } else if looks_like_html(&head) {
            outcome.verdict = Verdict::Invalid;
        }
        outcome
    }

    /// Read at most `sniff_bytes`, even if the origin ignored the Range header
    async fn read_head(&self, mut response: Response) -> reqwest::Result<Vec<u8>> {
        let limit = self.config.sniff_bytes as usize;
        let mut head = Vec::with_capacity(limit);
        while head.len() < limit {
            match response.chunk().await? {
                Some(chunk) => {
                    let take = (limit - head.len()).min(chunk.len());
                    head.extend_from_slice(&chunk[..take]);
                }
                None => break,
            }
        }
        Ok(head)
    }
}
