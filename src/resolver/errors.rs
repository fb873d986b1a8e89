// Error types for the resolution pipeline

use std::path::PathBuf;
use std::time::Duration;

use http::StatusCode;
use serde::Serialize;

use super::models::StrategyKind;
use super::platform::Platform;

/// Failure of a single extractor attempt.
///
/// These never reach the caller directly: the chain resolver turns each one
/// into a [`StrategyFailure`] and moves on to the next strategy.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractError {
    /// Content is gone, private, or the response had no media in it
    #[error("not found: {0}")]
    NotFound(String),

    /// The platform refused or failed (403, 429, 5xx, bot walls)
    #[error("upstream error: {0}")]
    UpstreamError(String),

    #[error("timed out after {}s", .0.as_secs_f32())]
    Timeout(Duration),

    /// The response came back in a shape this extractor cannot read,
    /// or the extractor has nothing to offer for this platform
    #[error("unsupported shape: {0}")]
    UnsupportedShape(String),
}

impl ExtractError {
    pub fn class(&self) -> FailureClass {
        match self {
            Self::NotFound(_) => FailureClass::NotFound,
            Self::UpstreamError(_) => FailureClass::UpstreamError,
            Self::Timeout(_) => FailureClass::Timeout,
            Self::UnsupportedShape(_) => FailureClass::UnsupportedShape,
        }
    }
}

/// Coarse failure class reported in diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    NotFound,
    UpstreamError,
    Timeout,
    UnsupportedShape,
    /// The extractor produced a candidate but probing proved it broken
    InvalidCandidate,
}

/// One entry in the ordered failure log of a chain run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyFailure {
    pub strategy: &'static str,
    pub kind: StrategyKind,
    pub attempt_index: usize,
    pub class: FailureClass,
    pub message: String,
}

impl StrategyFailure {
    pub fn from_error(
        strategy: &'static str,
        kind: StrategyKind,
        attempt_index: usize,
        error: &ExtractError,
    ) -> Self {
        Self {
            strategy,
            kind,
            attempt_index,
            class: error.class(),
            message: error.to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// No classifier rule matched the input URL
    #[error("unsupported platform for url: {url}")]
    UnsupportedPlatform { url: String },

    /// Every strategy in the platform's chain failed
    #[error("all {} strategies failed for {platform}", .failures.len())]
    ExtractionExhausted {
        platform: Platform,
        failures: Vec<StrategyFailure>,
    },
}

impl ResolveError {
    pub fn strategies_tried(&self) -> usize {
        match self {
            Self::UnsupportedPlatform { .. } => 0,
            Self::ExtractionExhausted { failures, .. } => failures.len(),
        }
    }

    pub fn last_failure_class(&self) -> Option<FailureClass> {
        match self {
            Self::UnsupportedPlatform { .. } => None,
            Self::ExtractionExhausted { failures, .. } => failures.last().map(|f| f.class),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// Origin answered with a non-2xx/3xx status
    #[error("upstream responded with status {status}")]
    UpstreamDelivery { status: u16 },

    #[error("upstream transport error: {0}")]
    UpstreamTransport(String),

    /// The temp file backing a result vanished before it was streamed.
    /// Indicates a lifecycle bug, not a user error.
    #[error("temp asset is gone: {}", .path.display())]
    AssetGone { path: PathBuf },

    #[error("failed to read temp asset: {0}")]
    LocalRead(#[from] std::io::Error),

    #[error("range not satisfiable for {size} bytes")]
    RangeNotSatisfiable { size: u64 },
}

/// Everything `resolve_and_deliver` can surface to the command surface
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}

impl PipelineError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Resolve(ResolveError::UnsupportedPlatform { .. }) => StatusCode::BAD_REQUEST,
            Self::Resolve(ResolveError::ExtractionExhausted { failures, .. }) => {
                if !failures.is_empty() && failures.iter().all(|f| f.class == FailureClass::NotFound)
                {
                    StatusCode::NOT_FOUND
                } else {
                    StatusCode::BAD_GATEWAY
                }
            }
            Self::Delivery(DeliveryError::UpstreamDelivery { .. })
            | Self::Delivery(DeliveryError::UpstreamTransport(_)) => StatusCode::BAD_GATEWAY,
            Self::Delivery(DeliveryError::RangeNotSatisfiable { .. }) => {
                StatusCode::RANGE_NOT_SATISFIABLE
            }
            Self::Delivery(DeliveryError::AssetGone { .. })
            | Self::Delivery(DeliveryError::LocalRead(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Resolve(ResolveError::UnsupportedPlatform { .. }) => "UNSUPPORTED_PLATFORM",
            Self::Resolve(ResolveError::ExtractionExhausted { .. }) => "EXTRACTION_EXHAUSTED",
            Self::Delivery(DeliveryError::UpstreamDelivery { .. })
            | Self::Delivery(DeliveryError::UpstreamTransport(_)) => "UPSTREAM_DELIVERY_ERROR",
            Self::Delivery(DeliveryError::AssetGone { .. }) => "ASSET_GONE",
            Self::Delivery(DeliveryError::LocalRead(_)) => "ASSET_READ_ERROR",
            Self::Delivery(DeliveryError::RangeNotSatisfiable { .. }) => "RANGE_NOT_SATISFIABLE",
        }
    }

    /// Diagnostic payload safe to show to callers
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::Resolve(ResolveError::ExtractionExhausted { platform, failures }) => {
                Some(serde_json::json!({
                    "platform": platform,
                    "strategiesTried": failures.len(),
                    "lastFailureClass": failures.last().map(|f| f.class),
                    "failures": failures,
                }))
            }
            Self::Delivery(DeliveryError::UpstreamDelivery { status }) => {
                Some(serde_json::json!({ "upstreamStatus": status }))
            }
            Self::Delivery(DeliveryError::RangeNotSatisfiable { size }) => {
                Some(serde_json::json!({ "size": size }))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(class: FailureClass) -> StrategyFailure {
        StrategyFailure {
            strategy: "test",
            kind: StrategyKind::Scrape,
            attempt_index: 0,
            class,
            message: String::new(),
        }
    }

    #[test]
    fn test_exhausted_all_not_found_is_404() {
        let err = PipelineError::from(ResolveError::ExtractionExhausted {
            platform: Platform::Imgur,
            failures: vec![failure(FailureClass::NotFound), failure(FailureClass::NotFound)],
        });
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_exhausted_mixed_is_502() {
        let err = ResolveError::ExtractionExhausted {
            platform: Platform::TikTok,
            failures: vec![failure(FailureClass::NotFound), failure(FailureClass::Timeout)],
        };
        assert_eq!(err.strategies_tried(), 2);
        assert_eq!(err.last_failure_class(), Some(FailureClass::Timeout));
        assert_eq!(PipelineError::from(err).status_code(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_unsupported_platform_is_400() {
        let err = PipelineError::from(ResolveError::UnsupportedPlatform {
            url: "https://example.org".to_string(),
        });
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.error_code(), "UNSUPPORTED_PLATFORM");
    }

    #[test]
    fn test_details_include_failure_log() {
        let err = PipelineError::from(ResolveError::ExtractionExhausted {
            platform: Platform::Vimeo,
            failures: vec![failure(FailureClass::UpstreamError)],
        });
        let details = err.details().expect("details");
        assert_eq!(details["platform"], "vimeo");
        assert_eq!(details["strategiesTried"], 1);
        assert_eq!(details["lastFailureClass"], "upstream_error");
    }
}
