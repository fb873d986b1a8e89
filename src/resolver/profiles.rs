// Per-platform configuration: strategy chain order and outbound header preset
//
// Platform behavior lives here as data. Adding a platform means adding a
// row, not writing new extraction code.

use reqwest::RequestBuilder;

use super::models::StrategyKind;
use super::platform::Platform;

pub const DESKTOP_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Headers sent to a platform's pages and CDNs. Several CDNs reject
/// requests whose Referer does not match the site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderPreset {
    pub user_agent: &'static str,
    pub referer: Option<&'static str>,
    pub origin: Option<&'static str>,
}

impl HeaderPreset {
    pub const fn browser() -> Self {
        Self {
            user_agent: DESKTOP_USER_AGENT,
            referer: None,
            origin: None,
        }
    }

    const fn site(referer: &'static str, origin: &'static str) -> Self {
        Self {
            user_agent: DESKTOP_USER_AGENT,
            referer: Some(referer),
            origin: Some(origin),
        }
    }

    pub fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        let mut request = request.header(reqwest::header::USER_AGENT, self.user_agent);
        if let Some(referer) = self.referer {
            request = request.header(reqwest::header::REFERER, referer);
        }
        if let Some(origin) = self.origin {
            request = request.header(reqwest::header::ORIGIN, origin);
        }
        request
    }

    /// `Key: Value` pairs for tools that take headers on the command line
    pub fn header_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if let Some(referer) = self.referer {
            lines.push(format!("Referer:{}", referer));
        }
        if let Some(origin) = self.origin {
            lines.push(format!("Origin:{}", origin));
        }
        lines
    }
}

impl Default for HeaderPreset {
    fn default() -> Self {
        Self::browser()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PlatformProfile {
    /// Strategies in the order they are attempted
    pub chain: &'static [StrategyKind],
    pub headers: HeaderPreset,
}

use StrategyKind::{GenericTool, Native, Scrape, SearchSubstitution};

const VIDEO_WITH_API: &[StrategyKind] = &[Native, GenericTool, Scrape];
const VIDEO: &[StrategyKind] = &[GenericTool, Scrape];
const AUDIO_CATALOG: &[StrategyKind] = &[Native, SearchSubstitution, Scrape];
const AUDIO_METADATA_ONLY: &[StrategyKind] = &[SearchSubstitution, Scrape];
const IMAGE_WITH_API: &[StrategyKind] = &[Native, Scrape, GenericTool];
const IMAGE: &[StrategyKind] = &[Scrape, GenericTool];

pub fn profile(platform: Platform) -> PlatformProfile {
    PlatformProfile {
        chain: chain_for(platform),
        headers: headers_for(platform),
    }
}

fn chain_for(platform: Platform) -> &'static [StrategyKind] {
    match platform {
        Platform::TikTok
        | Platform::Twitter
        | Platform::Reddit
        | Platform::Vimeo
        | Platform::Dailymotion => VIDEO_WITH_API,
        Platform::Deezer | Platform::AppleMusic => AUDIO_CATALOG,
        Platform::Spotify => AUDIO_METADATA_ONLY,
        Platform::Pinterest | Platform::Imgur => IMAGE_WITH_API,
        Platform::Flickr => IMAGE,
        _ => VIDEO,
    }
}

fn headers_for(platform: Platform) -> HeaderPreset {
    match platform {
        Platform::TikTok => HeaderPreset::site("https://www.tiktok.com/", "https://www.tiktok.com"),
        Platform::Instagram => {
            HeaderPreset::site("https://www.instagram.com/", "https://www.instagram.com")
        }
        Platform::Threads => HeaderPreset::site("https://www.threads.net/", "https://www.threads.net"),
        Platform::Facebook => {
            HeaderPreset::site("https://www.facebook.com/", "https://www.facebook.com")
        }
        Platform::Twitter => HeaderPreset::site("https://x.com/", "https://x.com"),
        Platform::Pinterest => {
            HeaderPreset::site("https://www.pinterest.com/", "https://www.pinterest.com")
        }
        Platform::Reddit => HeaderPreset::site("https://www.reddit.com/", "https://www.reddit.com"),
        Platform::Vimeo => HeaderPreset::site("https://player.vimeo.com/", "https://player.vimeo.com"),
        Platform::Bilibili => {
            HeaderPreset::site("https://www.bilibili.com/", "https://www.bilibili.com")
        }
        Platform::Dailymotion => {
            HeaderPreset::site("https://www.dailymotion.com/", "https://www.dailymotion.com")
        }
        Platform::SoundCloud => {
            HeaderPreset::site("https://soundcloud.com/", "https://soundcloud.com")
        }
        _ => HeaderPreset::browser(),
    }
}
