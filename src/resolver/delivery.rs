// Delivery Proxy - relays resolved media to the client
//
// Remote results are fetched with the platform's header preset and streamed
// through; local results are read from their TempAsset. Both honor a single
// byte range. A TempAsset lives exactly as long as its stream: it is deleted
// when the body is fully read, fails, or is dropped by a disconnecting client.

use std::fmt;
use std::io::{self, SeekFrom};
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::{Stream, TryStreamExt};
use http::header::{self, HeaderName};
use http::{HeaderMap, HeaderValue, StatusCode};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;

use super::errors::DeliveryError;
use super::models::{url_extension, MediaClass, MediaResult, MediaSource};
use super::platform::Platform;
use super::profiles::profile;
use super::temp_store::TempAsset;
use crate::config::{DeliveryConfig, Disposition};

pub type MediaBody = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

/// Status, headers and body ready to hand to an HTTP response
pub struct DeliveredMedia {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: MediaBody,
}

impl DeliveredMedia {
    pub fn header(&self, name: impl header::AsHeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

impl fmt::Debug for DeliveredMedia {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeliveredMedia")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// A `Range` header resolved against a known size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeSpec {
    /// No usable range: send everything
    Full,
    /// Inclusive byte bounds
    Satisfiable { start: u64, end: u64 },
    Unsatisfiable,
}

/// Parse a single `bytes=` range. Malformed and multi-range headers are
/// ignored (full content), as HTTP allows.
pub fn parse_range(header: Option<&str>, size: u64) -> RangeSpec {
    let Some(value) = header else {
        return RangeSpec::Full;
    };
    let Some(spec) = value.trim().strip_prefix("bytes=") else {
        return RangeSpec::Full;
    };
    if spec.contains(',') {
        return RangeSpec::Full;
    }
    let Some((first, last)) = spec.split_once('-') else {
        return RangeSpec::Full;
    };
    let (first, last) = (first.trim(), last.trim());

    if first.is_empty() {
        // Suffix form: the last N bytes
        let Ok(suffix) = last.parse::<u64>() else {
            return RangeSpec::Full;
        };
        if suffix == 0 || size == 0 {
            return RangeSpec::Unsatisfiable;
        }
        return RangeSpec::Satisfiable {
            start: size.saturating_sub(suffix),
            end: size - 1,
        };
    }

    let Ok(start) = first.parse::<u64>() else {
        return RangeSpec::Full;
    };
    let end = if last.is_empty() {
        None
    } else {
        match last.parse::<u64>() {
            Ok(end) if end >= start => Some(end),
            _ => return RangeSpec::Full,
        }
    };

    if start >= size {
        return RangeSpec::Unsatisfiable;
    }
    RangeSpec::Satisfiable {
        start,
        end: end.map_or(size - 1, |end| end.min(size - 1)),
    }
}

/// Whether a range header is a single `bytes=` range an origin can be asked for
fn forwardable_range(value: &str) -> bool {
    let Some(spec) = value.trim().strip_prefix("bytes=") else {
        return false;
    };
    match spec.split_once('-') {
        Some((first, last)) if !spec.contains(',') => {
            let digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
            digits(first) && digits(last) && !(first.is_empty() && last.is_empty())
        }
        _ => false,
    }
}

/// "bytes 0-999/1000" -> true when it spans the whole entity
fn covers_whole(content_range: &str) -> bool {
    let Some(rest) = content_range.trim().strip_prefix("bytes ") else {
        return false;
    };
    let Some((span, total)) = rest.split_once('/') else {
        return false;
    };
    let Some((start, end)) = span.split_once('-') else {
        return false;
    };
    match (start.parse::<u64>(), end.parse::<u64>(), total.parse::<u64>()) {
        (Ok(0), Ok(end), Ok(total)) => end + 1 == total,
        _ => false,
    }
}

/// "bytes */1000" -> 1000
fn unsatisfied_size(content_range: Option<&str>) -> u64 {
    content_range
        .and_then(|v| v.rsplit_once('/'))
        .and_then(|(_, total)| total.trim().parse().ok())
        .unwrap_or(0)
}

/// Build a `Content-Disposition` value from a display title
pub fn content_disposition(disposition: Disposition, title: &str, ext: &str) -> String {
    let ascii: String = title
        .chars()
        .map(|c| match c {
            c if c.is_ascii_alphanumeric() => c,
            ' ' | '-' | '_' | '.' | '(' | ')' => c,
            _ => '_',
        })
        .collect();
    let mut stem = ascii
        .split(|c: char| c == '_' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
        .trim_matches('.')
        .to_string();
    stem.truncate(120);
    if stem.is_empty() {
        stem = "media".to_string();
    }

    let mut value = format!("{}; filename=\"{}.{}\"", disposition.as_str(), stem, ext);
    if !title.is_ascii() {
        let full: String = title.chars().filter(|c| !c.is_control()).take(120).collect();
        value.push_str(&format!(
            "; filename*=UTF-8''{}.{}",
            percent_encode(full.trim()),
            ext
        ));
    }
    value
}

/// RFC 5987 attr-char encoding
fn percent_encode(text: &str) -> String {
    let mut out = String::with_capacity(text.len() * 3);
    for byte in text.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

fn insert_header(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(value) => {
            headers.insert(name, value);
        }
        Err(_) => tracing::warn!(header = %name, "dropping header with invalid value"),
    }
}

/// Body over a local file that owns the TempAsset backing it
struct AssetStream {
    inner: ReaderStream<tokio::io::Take<tokio::fs::File>>,
    asset: Option<TempAsset>,
}

impl Stream for AssetStream {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let poll = Pin::new(&mut this.inner).poll_next(cx);
        if matches!(poll, Poll::Ready(None) | Poll::Ready(Some(Err(_)))) {
            if let Some(asset) = this.asset.take() {
                asset.release();
            }
        }
        poll
    }
}

pub struct DeliveryProxy {
    client: reqwest::Client,
    disposition: Disposition,
    chunk_size: usize,
}

impl DeliveryProxy {
    pub fn new(client: reqwest::Client, config: &DeliveryConfig) -> Self {
        Self {
            client,
            disposition: config.disposition,
            chunk_size: config.chunk_size.max(1),
        }
    }

    /// Stream a result, consuming it. For local results the TempAsset moves
    /// into the returned body.
    pub async fn stream(
        &self,
        result: MediaResult,
        range: Option<&str>,
    ) -> Result<DeliveredMedia, DeliveryError> {
        let MediaResult {
            title,
            source,
            media_class,
            source_platform,
            ..
        } = result;

        match source {
            MediaSource::Local(asset) => self.relay_local(asset, &title, media_class, range).await,
            MediaSource::Remote(url) => {
                self.relay_remote(&url, source_platform, &title, media_class, range)
                    .await
            }
        }
    }

    async fn relay_local(
        &self,
        asset: TempAsset,
        title: &str,
        media_class: MediaClass,
        range: Option<&str>,
    ) -> Result<DeliveredMedia, DeliveryError> {
        let size = match tokio::fs::metadata(asset.path()).await {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::error!(
                    path = %asset.path().display(),
                    request_id = %asset.owner_request_id(),
                    "temp asset vanished before delivery"
                );
                return Err(DeliveryError::AssetGone {
                    path: asset.path().to_path_buf(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        let (status, start, length) = match parse_range(range, size) {
            RangeSpec::Full => (StatusCode::OK, 0, size),
            RangeSpec::Satisfiable { start, end } => {
                (StatusCode::PARTIAL_CONTENT, start, end - start + 1)
            }
            RangeSpec::Unsatisfiable => return Err(DeliveryError::RangeNotSatisfiable { size }),
        };

        let mut file = tokio::fs::File::open(asset.path()).await?;
        if start > 0 {
            file.seek(SeekFrom::Start(start)).await?;
        }

        let content_type = mime_guess::from_path(asset.path())
            .first_raw()
            .unwrap_or_else(|| media_class.default_mime());
        let ext = asset
            .extension()
            .unwrap_or_else(|| media_class.default_extension())
            .to_string();

        let mut headers = HeaderMap::new();
        insert_header(&mut headers, header::CONTENT_TYPE, content_type);
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
        if status == StatusCode::PARTIAL_CONTENT {
            insert_header(
                &mut headers,
                header::CONTENT_RANGE,
                &format!("bytes {}-{}/{}", start, start + length - 1, size),
            );
        }
        self.common_headers(&mut headers, title, &ext);

        tracing::debug!(path = %asset.path().display(), size, start, length, "relaying temp asset");
        let body = AssetStream {
            inner: ReaderStream::with_capacity(file.take(length), self.chunk_size),
            asset: Some(asset),
        };

        Ok(DeliveredMedia {
            status,
            headers,
            body: Box::pin(body),
        })
    }

    async fn relay_remote(
        &self,
        url: &str,
        platform: Platform,
        title: &str,
        media_class: MediaClass,
        range: Option<&str>,
    ) -> Result<DeliveredMedia, DeliveryError> {
        let forwarded = range.filter(|r| forwardable_range(r));
        let request = profile(platform)
            .headers
            .apply(self.client.get(url))
            .header(header::RANGE, forwarded.unwrap_or("bytes=0-"));

        let response = request
            .send()
            .await
            .map_err(|e| DeliveryError::UpstreamTransport(e.to_string()))?;
        let upstream = response.headers().clone();
        let upstream_header =
            |name: HeaderName| upstream.get(name).and_then(|v| v.to_str().ok());

        let mut status = response.status();
        if status == StatusCode::RANGE_NOT_SATISFIABLE && forwarded.is_some() {
            return Err(DeliveryError::RangeNotSatisfiable {
                size: unsatisfied_size(upstream_header(header::CONTENT_RANGE)),
            });
        }
        if !(status.is_success() || status.is_redirection()) {
            tracing::warn!(%url, status = status.as_u16(), "upstream refused delivery");
            return Err(DeliveryError::UpstreamDelivery {
                status: status.as_u16(),
            });
        }

        let mut headers = HeaderMap::new();
        let content_range = upstream_header(header::CONTENT_RANGE).map(str::to_string);
        // Our own probe range came back whole: present it as a plain 200
        let whole = forwarded.is_none()
            && status == StatusCode::PARTIAL_CONTENT
            && content_range.as_deref().is_some_and(covers_whole);
        if whole {
            status = StatusCode::OK;
        } else if let Some(value) = &content_range {
            insert_header(&mut headers, header::CONTENT_RANGE, value);
        }

        for name in [header::CONTENT_LENGTH, header::LAST_MODIFIED, header::ETAG] {
            if let Some(value) = upstream.get(&name) {
                headers.insert(name, value.clone());
            }
        }

        let content_type = upstream_header(header::CONTENT_TYPE)
            .filter(|ct| !ct.starts_with("application/octet-stream"))
            .map(str::to_string)
            .or_else(|| {
                url_extension(url)
                    .and_then(|ext| mime_guess::from_ext(&ext).first_raw())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| media_class.default_mime().to_string());
        insert_header(&mut headers, header::CONTENT_TYPE, &content_type);

        let ext = url_extension(url)
            .filter(|ext| ext.len() <= 5)
            .or_else(|| {
                mime_guess::get_mime_extensions_str(&content_type)
                    .and_then(|exts| exts.first())
                    .map(|ext| ext.to_string())
            })
            .unwrap_or_else(|| media_class.default_extension().to_string());
        self.common_headers(&mut headers, title, &ext);

        tracing::debug!(%url, status = status.as_u16(), "relaying upstream media");
        let body = response.bytes_stream().map_err(io::Error::other);

        Ok(DeliveredMedia {
            status,
            headers,
            body: Box::pin(body),
        })
    }

    fn common_headers(&self, headers: &mut HeaderMap, title: &str, ext: &str) {
        headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
        insert_header(
            headers,
            header::CONTENT_DISPOSITION,
            &content_disposition(self.disposition, title, ext),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::models::{Confidence, MediaCandidate, RequestId, ValidationOutcome};
    use crate::resolver::normalizer::normalize;
    use crate::resolver::temp_store::TempAssetStore;
    use crate::resolver::test_support::spawn_origin;
    use axum::response::{IntoResponse, Response};
    use axum::routing::get;
    use axum::Router;
    use futures::StreamExt;

    fn proxy(chunk_size: usize) -> DeliveryProxy {
        DeliveryProxy::new(
            reqwest::Client::new(),
            &DeliveryConfig {
                chunk_size,
                ..DeliveryConfig::default()
            },
        )
    }

    fn local_result(store: &TempAssetStore, data: &[u8]) -> (MediaResult, std::path::PathBuf) {
        let asset = store.allocate(Platform::YouTube, "mp4", RequestId::new());
        std::fs::write(asset.path(), data).unwrap();
        let path = asset.path().to_path_buf();
        let candidate = MediaCandidate::new(MediaSource::Local(asset), MediaClass::Video, Confidence::Medium)
            .with_title(Some("Clip".to_string()));
        let result = normalize(candidate, &ValidationOutcome::unknown(), Platform::YouTube, "yt-dlp");
        (result, path)
    }

    fn remote_result(url: &str) -> MediaResult {
        let candidate = MediaCandidate::remote(url, MediaClass::Video, Confidence::High);
        normalize(candidate, &ValidationOutcome::unknown(), Platform::Vimeo, "native-api")
    }

    async fn collect(mut body: MediaBody) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some(chunk) = body.next().await {
            out.extend_from_slice(&chunk.unwrap());
        }
        out
    }

    #[test]
    fn test_parse_range() {
        assert_eq!(parse_range(None, 1000), RangeSpec::Full);
        assert_eq!(
            parse_range(Some("bytes=100-199"), 1000),
            RangeSpec::Satisfiable { start: 100, end: 199 }
        );
        assert_eq!(
            parse_range(Some("bytes=900-"), 1000),
            RangeSpec::Satisfiable { start: 900, end: 999 }
        );
        assert_eq!(
            parse_range(Some("bytes=-100"), 1000),
            RangeSpec::Satisfiable { start: 900, end: 999 }
        );
        assert_eq!(
            parse_range(Some("bytes=500-5000"), 1000),
            RangeSpec::Satisfiable { start: 500, end: 999 }
        );
        assert_eq!(parse_range(Some("bytes=1000-"), 1000), RangeSpec::Unsatisfiable);
        assert_eq!(parse_range(Some("bytes=-0"), 1000), RangeSpec::Unsatisfiable);
        assert_eq!(parse_range(Some("bytes=0-1,5-9"), 1000), RangeSpec::Full);
        assert_eq!(parse_range(Some("items=0-1"), 1000), RangeSpec::Full);
        assert_eq!(parse_range(Some("bytes=9-1"), 1000), RangeSpec::Full);
    }

    #[test]
    fn test_content_range_helpers() {
        assert!(covers_whole("bytes 0-999/1000"));
        assert!(!covers_whole("bytes 0-499/1000"));
        assert!(!covers_whole("bytes 0-999/*"));
        assert_eq!(unsatisfied_size(Some("bytes */1000")), 1000);
        assert!(forwardable_range("bytes=10-"));
        assert!(!forwardable_range("bytes=-"));
        assert!(!forwardable_range("bytes=0-1,4-5"));
    }

    #[test]
    fn test_content_disposition() {
        assert_eq!(
            content_disposition(Disposition::Attachment, "My \"clip\" / take 2", "mp4"),
            "attachment; filename=\"My_clip_take_2.mp4\""
        );
        assert_eq!(
            content_disposition(Disposition::Inline, "???", "jpg"),
            "inline; filename=\"media.jpg\""
        );
        let value = content_disposition(Disposition::Attachment, "Café", "mp3");
        assert!(value.starts_with("attachment; filename=\"Caf.mp3\""));
        assert!(value.ends_with("filename*=UTF-8''Caf%C3%A9.mp3"));
    }

    #[tokio::test]
    async fn test_local_full_then_removed() {
        let dir = tempfile::tempdir().unwrap();
        let store = TempAssetStore::open(dir.path()).unwrap();
        let data: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
        let (result, path) = local_result(&store, &data);

        let delivered = proxy(64).stream(result, None).await.unwrap();
        assert_eq!(delivered.status, StatusCode::OK);
        assert_eq!(delivered.header(header::CONTENT_LENGTH), Some("1000"));
        assert_eq!(delivered.header(header::CONTENT_TYPE), Some("video/mp4"));
        assert_eq!(delivered.header(header::ACCEPT_RANGES), Some("bytes"));
        assert_eq!(
            delivered.header(header::CONTENT_DISPOSITION),
            Some("attachment; filename=\"Clip.mp4\"")
        );
        assert_eq!(collect(delivered.body).await, data);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_local_range() {
        let dir = tempfile::tempdir().unwrap();
        let store = TempAssetStore::open(dir.path()).unwrap();
        let data: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
        let (result, _path) = local_result(&store, &data);

        let delivered = proxy(64).stream(result, Some("bytes=100-199")).await.unwrap();
        assert_eq!(delivered.status, StatusCode::PARTIAL_CONTENT);
        assert_eq!(delivered.header(header::CONTENT_RANGE), Some("bytes 100-199/1000"));
        assert_eq!(delivered.header(header::CONTENT_LENGTH), Some("100"));
        assert_eq!(collect(delivered.body).await, data[100..200].to_vec());
    }

    #[tokio::test]
    async fn test_local_range_not_satisfiable() {
        let dir = tempfile::tempdir().unwrap();
        let store = TempAssetStore::open(dir.path()).unwrap();
        let (result, _path) = local_result(&store, &[1u8; 1000]);

        let err = proxy(64).stream(result, Some("bytes=5000-")).await.unwrap_err();
        assert!(matches!(err, DeliveryError::RangeNotSatisfiable { size: 1000 }));
    }

    #[tokio::test]
    async fn test_aborted_stream_removes_asset() {
        let dir = tempfile::tempdir().unwrap();
        let store = TempAssetStore::open(dir.path()).unwrap();
        let (result, path) = local_result(&store, &vec![0u8; 100_000]);

        let mut delivered = proxy(1024).stream(result, None).await.unwrap();
        let mut read = 0;
        while read < 50_000 {
            let chunk = delivered.body.next().await.unwrap().unwrap();
            read += chunk.len();
        }
        assert!(path.exists());

        drop(delivered);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_missing_asset_is_gone() {
        let dir = tempfile::tempdir().unwrap();
        let store = TempAssetStore::open(dir.path()).unwrap();
        let (result, path) = local_result(&store, b"data");
        std::fs::remove_file(&path).unwrap();

        let err = proxy(64).stream(result, None).await.unwrap_err();
        assert!(matches!(err, DeliveryError::AssetGone { .. }));
    }

    async fn clip(headers: http::HeaderMap) -> Response {
        let data: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
        match headers.get(header::RANGE).and_then(|v| v.to_str().ok()) {
            Some("bytes=0-") => (
                StatusCode::PARTIAL_CONTENT,
                [
                    (header::CONTENT_TYPE, "video/mp4"),
                    (header::CONTENT_RANGE, "bytes 0-999/1000"),
                ],
                data,
            )
                .into_response(),
            Some("bytes=10-19") => (
                StatusCode::PARTIAL_CONTENT,
                [(header::CONTENT_RANGE, "bytes 10-19/1000")],
                data[10..20].to_vec(),
            )
                .into_response(),
            Some("bytes=2000-") => (
                StatusCode::RANGE_NOT_SATISFIABLE,
                [(header::CONTENT_RANGE, "bytes */1000")],
            )
                .into_response(),
            _ => StatusCode::BAD_REQUEST.into_response(),
        }
    }

    fn origin() -> Router {
        Router::new()
            .route("/clip.mp4", get(clip))
            .route("/private.mp4", get(|| async { StatusCode::FORBIDDEN }))
    }

    #[tokio::test]
    async fn test_remote_whole_is_plain_ok() {
        let base = spawn_origin(origin()).await;
        let delivered = proxy(64)
            .stream(remote_result(&format!("{}/clip.mp4", base)), None)
            .await
            .unwrap();

        assert_eq!(delivered.status, StatusCode::OK);
        assert_eq!(delivered.header(header::CONTENT_RANGE), None);
        assert_eq!(delivered.header(header::CONTENT_TYPE), Some("video/mp4"));
        assert_eq!(delivered.header(header::CONTENT_LENGTH), Some("1000"));
        assert_eq!(collect(delivered.body).await.len(), 1000);
    }

    #[tokio::test]
    async fn test_remote_range_passthrough() {
        let base = spawn_origin(origin()).await;
        let delivered = proxy(64)
            .stream(remote_result(&format!("{}/clip.mp4", base)), Some("bytes=10-19"))
            .await
            .unwrap();

        assert_eq!(delivered.status, StatusCode::PARTIAL_CONTENT);
        assert_eq!(delivered.header(header::CONTENT_RANGE), Some("bytes 10-19/1000"));
        // Origin sent octet-stream; the URL's extension wins
        assert_eq!(delivered.header(header::CONTENT_TYPE), Some("video/mp4"));
        assert_eq!(collect(delivered.body).await.len(), 10);

        let err = proxy(64)
            .stream(remote_result(&format!("{}/clip.mp4", base)), Some("bytes=2000-"))
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::RangeNotSatisfiable { size: 1000 }));
    }

    #[tokio::test]
    async fn test_remote_refusal() {
        let base = spawn_origin(origin()).await;
        let err = proxy(64)
            .stream(remote_result(&format!("{}/private.mp4", base)), None)
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::UpstreamDelivery { status: 403 }));
    }
}
