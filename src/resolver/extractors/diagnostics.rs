// Failure diagnostics - turns tool stderr and HTTP statuses into ExtractError
//
// Analyzes error text to determine:
// - Whether the content is gone for good (NotFound)
// - Whether the platform pushed back (UpstreamError)
// - Whether the input is something the engine cannot handle (UnsupportedShape)

use std::time::Duration;

use serde::Serialize;

use crate::resolver::errors::ExtractError;

/// Recognized failure signals in engine output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FailureSignal {
    /// DRM-protected or paid content; no engine can fetch it
    DrmProtected,

    /// The engine has no extractor for this URL
    UnsupportedUrl,

    /// Private post or account
    Private,

    /// Deleted, removed, or never existed
    Unavailable,

    /// Login or age gate
    LoginRequired,

    GeoBlocked,

    /// 429 or similar
    RateLimited,

    /// Captcha or bot wall
    BotDetection,

    /// HTTP 403
    Forbidden,

    NetworkTimeout,

    Unknown,
}

impl FailureSignal {
    /// Human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            Self::DrmProtected => "DRM-protected content",
            Self::UnsupportedUrl => "URL not supported by the extraction engine",
            Self::Private => "Private content",
            Self::Unavailable => "Content unavailable",
            Self::LoginRequired => "Login required",
            Self::GeoBlocked => "Geographic restriction",
            Self::RateLimited => "Rate limited by the platform",
            Self::BotDetection => "Bot detection triggered",
            Self::Forbidden => "Access denied (HTTP 403)",
            Self::NetworkTimeout => "Network timeout",
            Self::Unknown => "Unknown failure",
        }
    }

    pub fn into_error(self, context: String) -> ExtractError {
        let message = if context.is_empty() {
            self.description().to_string()
        } else {
            format!("{}: {}", self.description(), context)
        };
        match self {
            Self::Private | Self::Unavailable => ExtractError::NotFound(message),
            Self::DrmProtected | Self::UnsupportedUrl => ExtractError::UnsupportedShape(message),
            Self::LoginRequired
            | Self::GeoBlocked
            | Self::RateLimited
            | Self::BotDetection
            | Self::Forbidden
            | Self::NetworkTimeout
            | Self::Unknown => ExtractError::UpstreamError(message),
        }
    }
}

/// Analyze error text and return the failure signal
pub fn diagnose(error: &str) -> Option<FailureSignal> {
    let lower = error.to_lowercase();

    // Check patterns in order of specificity

    if lower.contains("drm")
        || lower.contains("widevine")
        || lower.contains("fairplay")
        || lower.contains("requires purchase")
        || lower.contains("this video requires payment")
    {
        return Some(FailureSignal::DrmProtected);
    }

    if lower.contains("unsupported url") || lower.contains("no suitable extractor") {
        return Some(FailureSignal::UnsupportedUrl);
    }

    if lower.contains("private video")
        || lower.contains("video is private")
        || lower.contains("this account is private")
        || lower.contains("private post")
    {
        return Some(FailureSignal::Private);
    }

    if lower.contains("video unavailable")
        || lower.contains("has been removed")
        || lower.contains("no longer available")
        || lower.contains("is unavailable")
        || lower.contains("does not exist")
        || lower.contains("http error 404")
        || lower.contains("http error 410")
        || lower.contains("no video could be found")
        || lower.contains("no media found")
    {
        return Some(FailureSignal::Unavailable);
    }

    if lower.contains("sign in to confirm your age")
        || lower.contains("age-restricted")
        || lower.contains("login required")
        || lower.contains("log in to")
        || lower.contains("requires authentication")
    {
        return Some(FailureSignal::LoginRequired);
    }

    if lower.contains("not available in your country")
        || lower.contains("blocked in your country")
        || lower.contains("geo restrict")
        || lower.contains("geo-restrict")
    {
        return Some(FailureSignal::GeoBlocked);
    }

    if lower.contains("429") || lower.contains("rate limit") || lower.contains("too many requests") {
        return Some(FailureSignal::RateLimited);
    }

    if lower.contains("captcha")
        || lower.contains("not a bot")
        || lower.contains("unusual traffic")
        || lower.contains("bot detection")
    {
        return Some(FailureSignal::BotDetection);
    }

    if lower.contains("403") || lower.contains("forbidden") {
        return Some(FailureSignal::Forbidden);
    }

    if lower.contains("timed out")
        || lower.contains("timeout")
        || lower.contains("connection refused")
        || lower.contains("network unreachable")
    {
        return Some(FailureSignal::NetworkTimeout);
    }

    if !error.trim().is_empty() {
        return Some(FailureSignal::Unknown);
    }

    None
}

/// First useful line of engine stderr, for failure messages
fn context_line(stderr: &str) -> String {
    stderr
        .lines()
        .map(str::trim)
        .find(|line| line.to_lowercase().starts_with("error:"))
        .or_else(|| stderr.lines().map(str::trim).find(|line| !line.is_empty()))
        .unwrap_or("")
        .chars()
        .take(300)
        .collect()
}

/// Classify a failed engine run
pub fn classify_tool_failure(stderr: &str, limit: Duration, timed_out: bool) -> ExtractError {
    if timed_out {
        return ExtractError::Timeout(limit);
    }
    let signal = diagnose(stderr).unwrap_or(FailureSignal::Unknown);
    signal.into_error(context_line(stderr))
}

/// Classify a non-success HTTP status from a page or API fetch
pub fn classify_status(status: u16, url: &str) -> ExtractError {
    match status {
        404 | 410 => ExtractError::NotFound(format!("HTTP {} from {}", status, url)),
        _ => ExtractError::UpstreamError(format!("HTTP {} from {}", status, url)),
    }
}
