// Search-substitution extractor
//
// For platforms that never expose playable files (streaming-service track
// pages): read the track metadata off the page, search a secondary catalog,
// and return the first hit. The result is always tagged as a substitution.

use std::sync::Arc;

use async_trait::async_trait;

use super::html::{meta_content, page_title};
use super::tool::{download_disabled, verify_download};
use crate::resolver::errors::ExtractError;
use crate::resolver::models::{
    Confidence, ExtractOptions, ExtractionRequest, MediaCandidate, MediaClass, MediaSource,
    StrategyKind, Substitution,
};
use crate::resolver::profiles::{profile, HeaderPreset};
use crate::resolver::temp_store::TempAssetStore;
use crate::resolver::traits::{CatalogSearch, Extractor, PageFetcher, ToolRequest};

/// Title and artist read from a track page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackMetadata {
    pub title: String,
    pub artist: Option<String>,
}

impl TrackMetadata {
    pub fn from_html(html: &str) -> Option<Self> {
        let og_title = meta_content(html, "og:title");
        let artist = meta_content(html, "music:musician_description")
            .or_else(|| meta_content(html, "twitter:audio:artist_name"))
            .or_else(|| artist_from_description(meta_content(html, "og:description")?.as_str()));

        if let Some(title) = og_title {
            // "Song by Artist on Service" style titles
            if artist.is_none() && title.contains(" on ") {
                if let Some((song, by)) = split_by(&title) {
                    return Some(Self {
                        title: song,
                        artist: Some(by),
                    });
                }
            }
            return Some(Self { title, artist });
        }

        let title = page_title(html)?;
        match split_by(&title).filter(|_| artist.is_none() && title.contains(" on ")) {
            Some((song, by)) => Some(Self {
                title: song,
                artist: Some(by),
            }),
            None => Some(Self {
                title,
                artist,
            }),
        }
    }

    pub fn query(&self) -> String {
        match &self.artist {
            Some(artist) => format!("{} {}", artist, self.title),
            None => self.title.clone(),
        }
    }

    pub fn display(&self) -> String {
        match &self.artist {
            Some(artist) => format!("{} - {}", artist, self.title),
            None => self.title.clone(),
        }
    }
}

/// "Listen to X on Spotify. Artist · Song · 2013." -> "Artist"
fn artist_from_description(description: &str) -> Option<String> {
    let (head, _) = description.split_once(" · ")?;
    let artist = head.rsplit(". ").next()?.trim();
    if artist.is_empty() {
        None
    } else {
        Some(artist.to_string())
    }
}

/// "Song by Artist on Apple Music" -> ("Song", "Artist")
fn split_by(title: &str) -> Option<(String, String)> {
    let (song, rest) = title.rsplit_once(" by ")?;
    let artist = rest.split(" on ").next().unwrap_or(rest).trim();
    let song = song.trim();
    if song.is_empty() || artist.is_empty() {
        return None;
    }
    Some((song.to_string(), artist.to_string()))
}

pub struct SearchSubstitutionExtractor {
    fetcher: Arc<dyn PageFetcher>,
    catalog: Arc<dyn CatalogSearch>,
    store: Arc<TempAssetStore>,
}

impl SearchSubstitutionExtractor {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        catalog: Arc<dyn CatalogSearch>,
        store: Arc<TempAssetStore>,
    ) -> Self {
        Self {
            fetcher,
            catalog,
            store,
        }
    }
}

#[async_trait]
impl Extractor for SearchSubstitutionExtractor {
    fn name(&self) -> &'static str {
        "search-substitution"
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::SearchSubstitution
    }

    async fn attempt(
        &self,
        request: &ExtractionRequest,
        options: &ExtractOptions,
    ) -> Result<MediaCandidate, ExtractError> {
        let html = self
            .fetcher
            .fetch_text(
                &request.source_url,
                &profile(request.platform).headers,
                options.timeout,
            )
            .await?;
        let track = TrackMetadata::from_html(&html)
            .ok_or_else(|| ExtractError::NotFound("no track metadata on page".to_string()))?;
        let query = track.query();

        let tool_request = ToolRequest {
            media_class: MediaClass::Audio,
            timeout: options.timeout,
            headers: HeaderPreset::browser(),
        };
        let hit = self.catalog.search_first(&query, &tool_request).await?;
        tracing::info!(
            catalog = hit.catalog,
            query = %query,
            matched = hit.probe.title.as_deref().unwrap_or("?"),
            "substituting catalog search result"
        );

        let substitution = Substitution {
            catalog: hit.catalog.to_string(),
            query,
            matched_title: hit.probe.title.clone(),
            matched_url: hit.probe.webpage_url.clone(),
        };

        let source = match hit.probe.direct_url.clone() {
            Some(url) => MediaSource::Remote(url),
            None if !options.allow_download => return Err(download_disabled()),
            None => {
                let ext = hit.probe.ext.as_deref().unwrap_or("m4a");
                let asset = self
                    .store
                    .allocate(request.platform, ext, request.request_id);
                let download_request = tool_request.for_download(options.download_timeout);
                self.catalog
                    .download(&hit, asset.path(), &download_request)
                    .await?;
                MediaSource::Local(verify_download(asset).await?)
            }
        };

        let thumbnail = meta_content(&html, "og:image").or(hit.probe.thumbnail);
        Ok(MediaCandidate::new(source, MediaClass::Audio, Confidence::Low)
            .with_title(Some(track.display()))
            .with_thumbnail(thumbnail)
            .with_substitution(substitution))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::models::RequestId;
    use crate::resolver::platform::Platform;
    use crate::resolver::test_support::{MockFetcher, MockTool};
    use crate::resolver::extractors::tool::ToolCatalogSearch;

    #[test]
    fn test_spotify_metadata() {
        let html = r#"<meta property="og:title" content="One More Time">
            <meta property="og:description" content="Listen to One More Time on Spotify. Daft Punk · Song · 2000.">"#;
        let track = TrackMetadata::from_html(html).unwrap();
        assert_eq!(track.title, "One More Time");
        assert_eq!(track.artist.as_deref(), Some("Daft Punk"));
        assert_eq!(track.query(), "Daft Punk One More Time");
    }

    #[test]
    fn test_apple_music_title() {
        let html = "<title>Get Lucky by Daft Punk on Apple Music</title>";
        let track = TrackMetadata::from_html(html).unwrap();
        assert_eq!(track.title, "Get Lucky");
        assert_eq!(track.artist.as_deref(), Some("Daft Punk"));
    }

    #[test]
    fn test_no_metadata() {
        assert!(TrackMetadata::from_html("<html></html>").is_none());
    }

    #[tokio::test]
    async fn test_result_is_tagged_substitution() {
        let page = "https://open.spotify.com/track/abc";
        let fetcher = MockFetcher::new().with_body(
            page,
            r#"<meta property="og:title" content="Song"><meta name="music:musician_description" content="Artist">"#,
        );
        let tool = MockTool::direct("https://rr.googlevideo.com/a.m4a");
        let catalog = ToolCatalogSearch::new(Arc::new(tool.clone()), "ytsearch1:");
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(TempAssetStore::open(dir.path()).unwrap());
        let extractor = SearchSubstitutionExtractor::new(Arc::new(fetcher), Arc::new(catalog), store);

        let candidate = extractor
            .attempt(
                &ExtractionRequest {
                    source_url: page.to_string(),
                    platform: Platform::Spotify,
                    attempt_index: 0,
                    request_id: RequestId::new(),
                },
                &ExtractOptions::default(),
            )
            .await
            .unwrap();

        let substitution = candidate.substitution.as_ref().expect("tagged");
        assert_eq!(substitution.catalog, "youtube");
        assert_eq!(substitution.query, "Artist Song");
        assert_eq!(candidate.title.as_deref(), Some("Artist - Song"));
        assert_eq!(candidate.confidence, Confidence::Low);
        assert_eq!(tool.last_target().as_deref(), Some("ytsearch1:Artist Song"));
    }
}
