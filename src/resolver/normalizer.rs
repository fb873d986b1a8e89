// Media Normalizer - candidate + probe outcome -> canonical MediaResult
//
// Pure and deterministic: no I/O, same input gives the same result.

use super::models::{
    url_extension, MediaCandidate, MediaClass, MediaResult, MediaSource, ValidationOutcome,
};
use super::platform::Platform;

/// Neutral 16:9 placeholder used when nothing better is known
pub const PLACEHOLDER_THUMBNAIL: &str = "data:image/svg+xml,%3Csvg%20xmlns%3D%22http%3A%2F%2Fwww.w3.org%2F2000%2Fsvg%22%20viewBox%3D%220%200%2016%209%22%3E%3Crect%20width%3D%2216%22%20height%3D%229%22%20fill%3D%22%23222%22%2F%3E%3C%2Fsvg%3E";

pub fn normalize(
    candidate: MediaCandidate,
    outcome: &ValidationOutcome,
    platform: Platform,
    extractor: &'static str,
) -> MediaResult {
    let media_class = resolve_class(&candidate, outcome, platform);

    let title = candidate
        .title
        .as_deref()
        .map(collapse_whitespace)
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| format!("{} {}", platform.display_name(), media_class));

    let thumbnail_url = candidate
        .thumbnail_url
        .clone()
        .filter(|t| !t.trim().is_empty())
        .or_else(|| match (&candidate.source, media_class) {
            // An image is its own thumbnail
            (MediaSource::Remote(url), MediaClass::Image) => Some(url.clone()),
            _ => None,
        })
        .unwrap_or_else(|| PLACEHOLDER_THUMBNAIL.to_string());

    let quality_label = candidate
        .quality_hint
        .clone()
        .filter(|q| !q.trim().is_empty())
        .unwrap_or_else(|| {
            if candidate.substitution.is_some() {
                "substitute".to_string()
            } else if media_class == MediaClass::Image {
                "original".to_string()
            } else {
                "best".to_string()
            }
        });

    MediaResult {
        title,
        source: candidate.source,
        thumbnail_url,
        media_class,
        quality_label,
        source_platform: platform,
        extractor,
        confidence: candidate.confidence,
        validation: outcome.verdict,
        substitution: candidate.substitution,
    }
}

/// Candidate's own class, then what the probe saw, then the file
/// extension, then what the platform usually serves
fn resolve_class(
    candidate: &MediaCandidate,
    outcome: &ValidationOutcome,
    platform: Platform,
) -> MediaClass {
    if candidate.media_class != MediaClass::Unknown {
        return candidate.media_class;
    }
    let from_extension = match &candidate.source {
        MediaSource::Remote(url) => url_extension(url),
        MediaSource::Local(asset) => asset.extension().map(str::to_string),
    }
    .and_then(|ext| MediaClass::from_extension(&ext));

    outcome
        .probed_content_type
        .as_deref()
        .and_then(MediaClass::from_content_type)
        .or(from_extension)
        .unwrap_or_else(|| platform.media_class())
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::models::{Confidence, Substitution, Verdict};

    #[test]
    fn test_placeholders_when_absent() {
        let candidate =
            MediaCandidate::remote("https://cdn/x.mp4", MediaClass::Video, Confidence::Medium);
        let result = normalize(candidate, &ValidationOutcome::unknown(), Platform::Dailymotion, "scrape");

        assert_eq!(result.title, "Dailymotion video");
        assert_eq!(result.thumbnail_url, PLACEHOLDER_THUMBNAIL);
        assert_eq!(result.quality_label, "best");
        assert_eq!(result.validation, Verdict::Unknown);
        assert_eq!(result.media_url(), Some("https://cdn/x.mp4"));
    }

    #[test]
    fn test_image_is_its_own_thumbnail() {
        let candidate =
            MediaCandidate::remote("https://i.imgur.com/a.jpg", MediaClass::Image, Confidence::Medium)
                .with_title(Some("  A   cat \n".to_string()));
        let result = normalize(candidate, &ValidationOutcome::unknown(), Platform::Imgur, "scrape");

        assert_eq!(result.title, "A cat");
        assert_eq!(result.thumbnail_url, "https://i.imgur.com/a.jpg");
        assert_eq!(result.quality_label, "original");
    }

    #[test]
    fn test_unknown_class_from_probe_then_platform() {
        let candidate =
            MediaCandidate::remote("https://cdn/stream", MediaClass::Unknown, Confidence::Low);
        let outcome = ValidationOutcome {
            probed_content_type: Some("audio/mpeg".to_string()),
            ..ValidationOutcome::unknown()
        };
        assert_eq!(
            normalize(candidate, &outcome, Platform::Instagram, "x").media_class,
            MediaClass::Audio
        );

        let candidate =
            MediaCandidate::remote("https://cdn/stream", MediaClass::Unknown, Confidence::Low);
        assert_eq!(
            normalize(candidate, &ValidationOutcome::unknown(), Platform::Tumblr, "x").media_class,
            MediaClass::Unknown
        );
    }

    #[test]
    fn test_substitution_is_carried() {
        let candidate = MediaCandidate::remote("https://a/x.m4a", MediaClass::Audio, Confidence::Low)
            .with_substitution(Substitution {
                catalog: "youtube".to_string(),
                query: "Artist Song".to_string(),
                matched_title: None,
                matched_url: None,
            });
        let result = normalize(candidate, &ValidationOutcome::unknown(), Platform::Spotify, "search");
        assert!(result.is_substitution());
        assert_eq!(result.quality_label, "substitute");
    }

    #[test]
    fn test_deterministic() {
        let make = || {
            normalize(
                MediaCandidate::remote("https://cdn/x.mp4", MediaClass::Video, Confidence::High),
                &ValidationOutcome::unknown(),
                Platform::Vimeo,
                "native-api",
            )
        };
        let a = serde_json::to_value(make()).unwrap();
        let b = serde_json::to_value(make()).unwrap();
        assert_eq!(a, b);
    }
}
