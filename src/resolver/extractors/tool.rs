// Generic tool extractor - delegates to a general media extraction engine
//
// The engine is asked for a single directly fetchable URL first. When it
// cannot give one (merged formats, HLS/DASH manifests) and downloads are
// allowed, it downloads into a TempAsset instead.

use std::path::Path;
use std::process::Command as StdCommand;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::OnceCell;

use super::diagnostics::classify_tool_failure;
use crate::config::ToolConfig;
use crate::resolver::errors::ExtractError;
use crate::resolver::models::{
    Confidence, ExtractOptions, ExtractionRequest, MediaCandidate, MediaClass, MediaSource,
    StrategyKind,
};
use crate::resolver::profiles::profile;
use crate::resolver::temp_store::{TempAsset, TempAssetStore};
use crate::resolver::traits::{CatalogHit, CatalogSearch, Extractor, MediaTool, ToolProbe, ToolRequest};
use crate::resolver::utils::{proxy_args, run_output_with_timeout, ProcessError};

/// Check that a download actually produced bytes
pub(crate) async fn verify_download(asset: TempAsset) -> Result<TempAsset, ExtractError> {
    match tokio::fs::metadata(asset.path()).await {
        Ok(meta) if meta.len() > 0 => Ok(asset),
        Ok(_) => Err(ExtractError::UpstreamError(
            "download produced an empty file".to_string(),
        )),
        Err(e) => Err(ExtractError::UpstreamError(format!(
            "download produced no file: {}",
            e
        ))),
    }
}

pub(crate) fn download_disabled() -> ExtractError {
    ExtractError::UnsupportedShape("no direct URL and downloads are disabled".to_string())
}

pub struct GenericToolExtractor {
    tool: Arc<dyn MediaTool>,
    store: Arc<TempAssetStore>,
}

impl GenericToolExtractor {
    pub fn new(tool: Arc<dyn MediaTool>, store: Arc<TempAssetStore>) -> Self {
        Self { tool, store }
    }
}

#[async_trait]
impl Extractor for GenericToolExtractor {
    fn name(&self) -> &'static str {
        self.tool.name()
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::GenericTool
    }

    async fn attempt(
        &self,
        request: &ExtractionRequest,
        options: &ExtractOptions,
    ) -> Result<MediaCandidate, ExtractError> {
        if !self.tool.is_available().await {
            return Err(ExtractError::UnsupportedShape(format!(
                "{} is not installed",
                self.tool.name()
            )));
        }

        let tool_request = ToolRequest {
            media_class: request.platform.media_class(),
            timeout: options.timeout,
            headers: profile(request.platform).headers,
        };
        let probe = self.tool.probe(&request.source_url, &tool_request).await?;

        let media_class = probe
            .media_class
            .or_else(|| probe.direct_url.as_deref().and_then(MediaClass::from_url))
            .unwrap_or_else(|| request.platform.media_class());

        let source = match probe.direct_url.clone() {
            Some(url) => MediaSource::Remote(url),
            None if !options.allow_download => return Err(download_disabled()),
            None => {
                let ext = probe
                    .ext
                    .clone()
                    .unwrap_or_else(|| media_class.default_extension().to_string());
                let asset = self
                    .store
                    .allocate(request.platform, &ext, request.request_id);
                tracing::info!(path = %asset.path().display(), "no direct URL, downloading to temp asset");
                let download_request = tool_request.for_download(options.download_timeout);
                self.tool
                    .download(&request.source_url, asset.path(), &download_request)
                    .await?;
                MediaSource::Local(verify_download(asset).await?)
            }
        };

        Ok(MediaCandidate::new(source, media_class, Confidence::Medium)
            .with_title(probe.title)
            .with_thumbnail(probe.thumbnail)
            .with_quality(probe.quality))
    }
}

const VERSION_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// yt-dlp command-line engine
pub struct YtDlpTool {
    ytdlp_path: String,
    cookies_path: Option<String>,
    proxy: Option<String>,
    available: OnceCell<bool>,
}

impl YtDlpTool {
    pub fn new(config: &ToolConfig, proxy: Option<String>) -> Self {
        Self {
            ytdlp_path: config.ytdlp_path.clone().unwrap_or_else(Self::find_ytdlp),
            cookies_path: config.cookies_path.clone(),
            proxy,
            available: OnceCell::new(),
        }
    }

    /// Find yt-dlp binary
    fn find_ytdlp() -> String {
        let common_paths = [
            "/opt/homebrew/bin/yt-dlp", // Homebrew on Apple Silicon
            "/usr/local/bin/yt-dlp",
            "/usr/bin/yt-dlp",
        ];

        for path in common_paths {
            if Path::new(path).exists() {
                return path.to_string();
            }
        }

        if let Ok(output) = StdCommand::new("which").arg("yt-dlp").output() {
            if output.status.success() {
                let path = String::from_utf8_lossy(&output.stdout);
                let trimmed = path.trim();
                if !trimmed.is_empty() {
                    return trimmed.to_string();
                }
            }
        }

        "yt-dlp".to_string()
    }

    fn format_selector(media_class: MediaClass) -> &'static str {
        match media_class {
            MediaClass::Audio => "bestaudio/best",
            MediaClass::Image => "best",
            MediaClass::Video | MediaClass::Unknown => "best[ext=mp4]/best",
        }
    }

    /// Build command arguments shared by probe and download
    fn build_args(&self, request: &ToolRequest) -> Vec<String> {
        let mut args = vec![
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            "--socket-timeout".to_string(),
            request.timeout.as_secs().max(1).to_string(),
            "--retries".to_string(),
            "2".to_string(),
            "--user-agent".to_string(),
            request.headers.user_agent.to_string(),
            "-f".to_string(),
            Self::format_selector(request.media_class).to_string(),
        ];

        for line in request.headers.header_lines() {
            args.push("--add-header".to_string());
            args.push(line);
        }

        if let Some(path) = &self.cookies_path {
            args.push("--cookies".to_string());
            args.push(path.clone());
        }

        args.extend(proxy_args(self.proxy.as_deref()));
        args
    }

    async fn run(&self, args: Vec<String>, request: &ToolRequest) -> Result<Vec<u8>, ExtractError> {
        tracing::debug!(program = %self.ytdlp_path, args = %args.join(" "), "running media tool");

        match run_output_with_timeout(&self.ytdlp_path, &args, request.timeout).await {
            Ok(out) if out.status.success() => Ok(out.stdout),
            Ok(out) => {
                let stderr = String::from_utf8_lossy(&out.stderr);
                tracing::debug!(stderr = %stderr.trim(), "media tool failed");
                Err(classify_tool_failure(&stderr, request.timeout, false))
            }
            Err(ProcessError::TimedOut { .. }) => {
                Err(classify_tool_failure("", request.timeout, true))
            }
            Err(ProcessError::Spawn { source, .. }) => Err(ExtractError::UnsupportedShape(
                format!("cannot start {}: {}", self.ytdlp_path, source),
            )),
            Err(e) => Err(ExtractError::UpstreamError(e.to_string())),
        }
    }

    /// Parse the first JSON object in `--dump-json` output
    pub fn parse_probe(stdout: &[u8]) -> Result<ToolProbe, ExtractError> {
        let text = String::from_utf8_lossy(stdout);
        let line = text
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .ok_or_else(|| ExtractError::NotFound("media tool returned no entries".to_string()))?;

        let json: Value = serde_json::from_str(line).map_err(|e| {
            ExtractError::UnsupportedShape(format!("media tool output is not JSON: {}", e))
        })?;

        let text_field = |key: &str| {
            json[key]
                .as_str()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        // Manifests and fragmented streams cannot be relayed as one file
        let protocol = text_field("protocol").unwrap_or_default();
        let relayable = !protocol.contains("m3u8") && !protocol.contains("dash");
        let direct_url = text_field("url").filter(|_| relayable);

        let vcodec = text_field("vcodec");
        let acodec = text_field("acodec");
        let ext = text_field("ext");
        let media_class = match (vcodec.as_deref(), acodec.as_deref()) {
            (Some("none"), Some(a)) if a != "none" => Some(MediaClass::Audio),
            (Some(v), _) if v != "none" => Some(MediaClass::Video),
            _ => ext.as_deref().and_then(MediaClass::from_extension),
        };

        let quality = text_field("format_note")
            .or_else(|| json["height"].as_u64().map(|h| format!("{}p", h)))
            .or_else(|| text_field("resolution"));

        Ok(ToolProbe {
            title: text_field("title"),
            thumbnail: text_field("thumbnail"),
            direct_url,
            ext,
            media_class,
            quality,
            webpage_url: text_field("webpage_url"),
        })
    }
}

#[async_trait]
impl MediaTool for YtDlpTool {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn is_available(&self) -> bool {
        *self
            .available
            .get_or_init(|| async {
                let args = ["--version".to_string()];
                match run_output_with_timeout(&self.ytdlp_path, &args, VERSION_CHECK_TIMEOUT).await {
                    Ok(out) => out.status.success(),
                    Err(e) => {
                        tracing::warn!(program = %self.ytdlp_path, error = %e, "media tool unavailable");
                        false
                    }
                }
            })
            .await
    }

    async fn probe(&self, target: &str, request: &ToolRequest) -> Result<ToolProbe, ExtractError> {
        let mut args = self.build_args(request);
        args.push("--dump-json".to_string());
        args.push(target.to_string());

        let stdout = self.run(args, request).await?;
        Self::parse_probe(&stdout)
    }

    async fn download(
        &self,
        target: &str,
        dest: &Path,
        request: &ToolRequest,
    ) -> Result<(), ExtractError> {
        let mut args = self.build_args(request);
        args.extend([
            "--no-part".to_string(),
            "--force-overwrites".to_string(),
            "-o".to_string(),
            dest.to_string_lossy().into_owned(),
            target.to_string(),
        ]);

        self.run(args, request).await.map(|_| ())
    }
}

/// Catalog search backed by a media tool's search prefix (e.g. `ytsearch1:`)
pub struct ToolCatalogSearch {
    tool: Arc<dyn MediaTool>,
    prefix: String,
    catalog: &'static str,
}

impl ToolCatalogSearch {
    pub fn new(tool: Arc<dyn MediaTool>, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        let catalog = if prefix.starts_with("ytsearch") {
            "youtube"
        } else if prefix.starts_with("scsearch") {
            "soundcloud"
        } else {
            "search"
        };
        Self {
            tool,
            prefix,
            catalog,
        }
    }
}

#[async_trait]
impl CatalogSearch for ToolCatalogSearch {
    fn name(&self) -> &'static str {
        self.catalog
    }

    async fn search_first(
        &self,
        query: &str,
        request: &ToolRequest,
    ) -> Result<CatalogHit, ExtractError> {
        if !self.tool.is_available().await {
            return Err(ExtractError::UnsupportedShape(format!(
                "{} is not installed",
                self.tool.name()
            )));
        }

        let probe = self
            .tool
            .probe(&format!("{}{}", self.prefix, query), request)
            .await?;
        if probe.direct_url.is_none() && probe.webpage_url.is_none() {
            return Err(ExtractError::NotFound(format!("no {} result for {:?}", self.catalog, query)));
        }

        Ok(CatalogHit {
            catalog: self.catalog,
            probe,
        })
    }

    async fn download(
        &self,
        hit: &CatalogHit,
        dest: &Path,
        request: &ToolRequest,
    ) -> Result<(), ExtractError> {
        let target = hit
            .probe
            .webpage_url
            .as_deref()
            .or(hit.probe.direct_url.as_deref())
            .ok_or_else(|| ExtractError::NotFound("catalog hit has no URL".to_string()))?;
        self.tool.download(target, dest, request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::models::RequestId;
    use crate::resolver::platform::Platform;
    use crate::resolver::test_support::MockTool;

    fn request(platform: Platform) -> ExtractionRequest {
        ExtractionRequest {
            source_url: "https://www.youtube.com/watch?v=abc".to_string(),
            platform,
            attempt_index: 0,
            request_id: RequestId::new(),
        }
    }

    #[test]
    fn test_parse_probe_direct_url() {
        let out = br#"{"title":"Clip","url":"https://rr1.googlevideo.com/v.mp4","ext":"mp4","vcodec":"avc1","acodec":"mp4a","height":720,"protocol":"https","thumbnail":"https://i.ytimg.com/t.jpg"}"#;
        let probe = YtDlpTool::parse_probe(out).unwrap();
        assert_eq!(probe.direct_url.as_deref(), Some("https://rr1.googlevideo.com/v.mp4"));
        assert_eq!(probe.media_class, Some(MediaClass::Video));
        assert_eq!(probe.quality.as_deref(), Some("720p"));
    }

    #[test]
    fn test_parse_probe_manifest_is_not_direct() {
        let out = br#"{"title":"Live","url":"https://x/master.m3u8","ext":"mp4","protocol":"m3u8_native"}"#;
        let probe = YtDlpTool::parse_probe(out).unwrap();
        assert!(probe.direct_url.is_none());
        assert_eq!(probe.media_class, Some(MediaClass::Video));
    }

    #[test]
    fn test_parse_probe_audio_and_empty() {
        let out = b"{\"title\":\"Song\",\"url\":\"https://a/x.webm\",\"vcodec\":\"none\",\"acodec\":\"opus\",\"ext\":\"webm\"}\n";
        let probe = YtDlpTool::parse_probe(out).unwrap();
        assert_eq!(probe.media_class, Some(MediaClass::Audio));

        assert!(matches!(YtDlpTool::parse_probe(b"\n"), Err(ExtractError::NotFound(_))));
        assert!(matches!(
            YtDlpTool::parse_probe(b"garbage"),
            Err(ExtractError::UnsupportedShape(_))
        ));
    }

    #[test]
    fn test_build_args_carry_headers_and_proxy() {
        let tool = YtDlpTool::new(
            &ToolConfig {
                ytdlp_path: Some("/bin/false".to_string()),
                ..ToolConfig::default()
            },
            Some("socks5h://127.0.0.1:1080".to_string()),
        );
        let args = tool.build_args(&ToolRequest {
            media_class: MediaClass::Audio,
            timeout: Duration::from_secs(30),
            headers: profile(Platform::SoundCloud).headers,
        });
        assert!(args.windows(2).any(|w| w[0] == "-f" && w[1] == "bestaudio/best"));
        assert!(args.windows(2).any(|w| w[0] == "--add-header" && w[1] == "Referer:https://soundcloud.com/"));
        assert!(args.windows(2).any(|w| w[0] == "--proxy" && w[1] == "socks5h://127.0.0.1:1080"));
    }

    #[tokio::test]
    async fn test_direct_url_returns_remote_candidate() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(TempAssetStore::open(dir.path()).unwrap());
        let tool = MockTool::direct("https://cdn/x.mp4");
        let extractor = GenericToolExtractor::new(Arc::new(tool.clone()), store);

        let candidate = extractor
            .attempt(&request(Platform::YouTube), &ExtractOptions::default())
            .await
            .unwrap();
        assert_eq!(candidate.raw_url(), Some("https://cdn/x.mp4"));
        assert_eq!(tool.downloads(), 0);
    }

    #[tokio::test]
    async fn test_download_materializes_temp_asset() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(TempAssetStore::open(dir.path()).unwrap());
        let tool = MockTool::downloading(b"\x00\x00\x00\x18ftypisom".to_vec());
        let extractor = GenericToolExtractor::new(Arc::new(tool.clone()), store);

        let candidate = extractor
            .attempt(&request(Platform::YouTube), &ExtractOptions::default())
            .await
            .unwrap();
        let MediaSource::Local(asset) = &candidate.source else {
            panic!("expected local asset");
        };
        assert!(asset.path().exists());
        assert_eq!(tool.downloads(), 1);

        let path = asset.path().to_path_buf();
        drop(candidate);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_download_gets_its_own_budget() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(TempAssetStore::open(dir.path()).unwrap());
        let tool = MockTool::downloading(b"\x00\x00\x00\x18ftypisom".to_vec());
        let extractor = GenericToolExtractor::new(Arc::new(tool.clone()), store);
        let options = ExtractOptions {
            timeout: Duration::from_secs(5),
            download_timeout: Duration::from_secs(900),
            allow_download: true,
        };

        extractor
            .attempt(&request(Platform::YouTube), &options)
            .await
            .unwrap();
        assert_eq!(tool.download_timeout(), Some(Duration::from_secs(900)));
    }

    #[tokio::test]
    async fn test_missing_binary_is_unavailable() {
        let tool = YtDlpTool::new(
            &ToolConfig {
                ytdlp_path: Some("/nonexistent/bin/yt-dlp".to_string()),
                ..ToolConfig::default()
            },
            None,
        );
        assert!(!tool.is_available().await);

        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(TempAssetStore::open(dir.path()).unwrap());
        let err = GenericToolExtractor::new(Arc::new(tool), store)
            .attempt(&request(Platform::YouTube), &ExtractOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedShape(_)));
    }

    #[tokio::test]
    async fn test_resolve_only_refuses_download() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(TempAssetStore::open(dir.path()).unwrap());
        let tool = MockTool::downloading(b"data".to_vec());
        let extractor = GenericToolExtractor::new(Arc::new(tool.clone()), store);
        let options = ExtractOptions {
            allow_download: false,
            ..ExtractOptions::default()
        };

        let err = extractor
            .attempt(&request(Platform::YouTube), &options)
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedShape(_)));
        assert_eq!(tool.downloads(), 0);
    }

    #[tokio::test]
    async fn test_empty_download_is_rejected_and_removed() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(TempAssetStore::open(dir.path()).unwrap());
        let tool = MockTool::downloading(Vec::new());
        let extractor = GenericToolExtractor::new(Arc::new(tool), store);

        let err = extractor
            .attempt(&request(Platform::YouTube), &ExtractOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::UpstreamError(_)));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_catalog_search_uses_prefix() {
        let tool = MockTool::direct("https://cdn/a.m4a");
        let search = ToolCatalogSearch::new(Arc::new(tool.clone()), "ytsearch1:");
        let hit = search
            .search_first(
                "Daft Punk One More Time",
                &ToolRequest {
                    media_class: MediaClass::Audio,
                    timeout: Duration::from_secs(5),
                    headers: Default::default(),
                },
            )
            .await
            .unwrap();
        assert_eq!(hit.catalog, "youtube");
        assert_eq!(tool.last_target().as_deref(), Some("ytsearch1:Daft Punk One More Time"));
    }
}
