// Application configuration
//
// Loaded from an optional `media-resolver.{toml,json,yaml}` file, then
// overridden by `MEDIA_RESOLVER__SECTION__KEY` environment variables.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::resolver::temp_store;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub resolver: ResolverConfig,
    pub network: NetworkConfig,
    pub tool: ToolConfig,
    pub delivery: DeliveryConfig,
    /// Directory for temp assets; defaults to the user cache dir
    pub temp_dir: Option<PathBuf>,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from config file and environment variables
    pub fn load() -> anyhow::Result<Self> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("media-resolver").required(false))
            .add_source(
                config::Environment::with_prefix("MEDIA_RESOLVER")
                    .prefix_separator("__")
                    .separator("__"),
            );

        let config: AppConfig = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(temp_store::default_root)
    }
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            port: default_port(),
        }
    }
}

impl ServerConfig {
    /// Get the socket address to bind to
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        let addr_str = format!("{}:{}", self.bind_addr, self.port);
        Ok(addr_str.parse()?)
    }
}

/// Timeouts and thresholds for extraction and probing
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Budget for one extractor attempt
    pub extract_timeout_secs: u64,
    /// Budget for one validator probe request
    pub probe_timeout_secs: u64,
    /// Smallest Content-Length accepted as a real video
    pub video_min_bytes: u64,
    pub audio_min_bytes: u64,
    /// Leading bytes fetched for signature sniffing
    pub sniff_bytes: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            extract_timeout_secs: 45,
            probe_timeout_secs: 8,
            video_min_bytes: 50 * 1024,
            audio_min_bytes: 8 * 1024,
            sniff_bytes: 8 * 1024,
        }
    }
}

impl ResolverConfig {
    pub fn extract_timeout(&self) -> Duration {
        Duration::from_secs(self.extract_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

/// Network configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// SOCKS5/HTTP proxy URL (e.g. "socks5h://127.0.0.1:1080")
    pub proxy: Option<String>,

    /// Probe common local SOCKS5 ports when no proxy is set
    pub auto_detect_proxy: bool,

    pub connect_timeout_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            proxy: None,
            auto_detect_proxy: false,
            connect_timeout_secs: 10,
        }
    }
}

/// External media tool settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ToolConfig {
    /// Path to yt-dlp; discovered when absent
    pub ytdlp_path: Option<String>,
    /// Path to a cookies.txt file passed to the tool
    pub cookies_path: Option<String>,
    /// Prefix turning a query into a catalog search
    pub search_prefix: String,
    /// Budget for downloading media into the temp store
    pub download_timeout_secs: u64,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            ytdlp_path: None,
            cookies_path: None,
            search_prefix: "ytsearch1:".to_string(),
            download_timeout_secs: 600,
        }
    }
}

impl ToolConfig {
    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Disposition {
    #[default]
    Attachment,
    Inline,
}

impl Disposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Attachment => "attachment",
            Self::Inline => "inline",
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DeliveryConfig {
    pub disposition: Disposition,
    /// Read buffer size for local asset streaming
    pub chunk_size: usize,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            disposition: Disposition::Attachment,
            chunk_size: 64 * 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// EnvFilter directive, used when RUST_LOG is unset
    pub filter: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.resolver.extract_timeout(), Duration::from_secs(45));
        assert_eq!(config.resolver.video_min_bytes, 51_200);
        assert_eq!(config.tool.search_prefix, "ytsearch1:");
        assert_eq!(config.tool.download_timeout(), Duration::from_secs(600));
        assert_eq!(config.delivery.disposition, Disposition::Attachment);
        assert!(config.temp_dir().ends_with("assets") || config.temp_dir().ends_with("media-resolver-assets"));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: AppConfig = config::Config::builder()
            .add_source(config::File::from_str(
                "[server]\nport = 9000\n[delivery]\ndisposition = \"inline\"\n",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.bind_addr, "0.0.0.0");
        assert_eq!(config.delivery.disposition, Disposition::Inline);
        assert_eq!(config.delivery.chunk_size, 65_536);
        assert_eq!(config.resolver.probe_timeout_secs, 8);
    }

    #[test]
    fn test_socket_addr() {
        let server = ServerConfig {
            bind_addr: "127.0.0.1".to_string(),
            port: 3000,
        };
        assert_eq!(server.socket_addr().unwrap().port(), 3000);
    }
}
