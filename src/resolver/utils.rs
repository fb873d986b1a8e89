// Helper functions shared by extractors, validator and delivery

use std::net::{Ipv4Addr, SocketAddr, TcpStream};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::Command as TokioCommand;
use tokio::time::timeout;

use crate::config::NetworkConfig;

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {}s", .after.as_secs())]
    TimedOut { program: String, after: Duration },

    #[error("i/o error talking to {program}: {message}")]
    Io { program: String, message: String },
}

/// Run a command with a hard timeout, capturing stdout and stderr.
/// The child is killed when the timeout fires or the future is dropped.
pub async fn run_output_with_timeout(
    program: &str,
    args: &[String],
    limit: Duration,
) -> Result<std::process::Output, ProcessError> {
    let mut child = TokioCommand::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| ProcessError::Spawn {
            program: program.to_string(),
            source,
        })?;

    let io_error = |message: String| ProcessError::Io {
        program: program.to_string(),
        message,
    };

    let mut stdout_pipe = child
        .stdout
        .take()
        .ok_or_else(|| io_error("stdout not captured".to_string()))?;
    let mut stderr_pipe = child
        .stderr
        .take()
        .ok_or_else(|| io_error("stderr not captured".to_string()))?;

    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stdout_pipe.read_to_end(&mut buf).await.map(|_| buf)
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stderr_pipe.read_to_end(&mut buf).await.map(|_| buf)
    });

    match timeout(limit, child.wait()).await {
        Ok(status) => {
            let status = status.map_err(|e| io_error(e.to_string()))?;
            let stdout = stdout_task
                .await
                .map_err(|e| io_error(e.to_string()))?
                .map_err(|e| io_error(e.to_string()))?;
            let stderr = stderr_task
                .await
                .map_err(|e| io_error(e.to_string()))?
                .map_err(|e| io_error(e.to_string()))?;
            Ok(std::process::Output {
                status,
                stdout,
                stderr,
            })
        }
        Err(_) => {
            let _ = child.kill().await;
            stdout_task.abort();
            stderr_task.abort();
            Err(ProcessError::TimedOut {
                program: program.to_string(),
                after: limit,
            })
        }
    }
}

/// Build the shared outbound HTTP client.
///
/// No total request timeout is set here: streamed deliveries can run for a
/// long time. Callers put per-request timeouts on probes and page fetches.
pub fn build_http_client(
    config: &NetworkConfig,
    proxy: Option<&str>,
) -> reqwest::Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .redirect(reqwest::redirect::Policy::limited(10));

    if let Some(proxy_url) = proxy {
        tracing::info!(proxy = %proxy_url, "using outbound proxy");
        builder = builder.proxy(reqwest::Proxy::all(proxy_url)?);
    }

    builder.build()
}

/// Explicit proxy, or an auto-detected one when enabled
pub fn effective_proxy(config: &NetworkConfig) -> Option<String> {
    config.proxy.clone().or_else(|| {
        if config.auto_detect_proxy {
            auto_detect_proxy()
        } else {
            None
        }
    })
}

/// Auto-detect a local SOCKS5 proxy on common ports
pub fn auto_detect_proxy() -> Option<String> {
    let common_ports = [
        1080,  // Standard SOCKS5
        7890,  // Clash
        10808, // V2RayN
        1081,
        7891,
    ];

    for port in common_ports {
        if port_is_open(port) {
            tracing::info!(port, "detected local SOCKS5 proxy");
            return Some(format!("socks5h://127.0.0.1:{}", port));
        }
    }

    tracing::debug!("no local SOCKS5 proxy detected");
    None
}

fn port_is_open(port: u16) -> bool {
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
    TcpStream::connect_timeout(&addr, Duration::from_millis(200)).is_ok()
}

/// Build proxy arguments for yt-dlp
pub fn proxy_args(proxy: Option<&str>) -> Vec<String> {
    match proxy {
        Some(proxy) => vec!["--proxy".to_string(), proxy.to_string()],
        None => Vec::new(),
    }
}
