// Platform classifier - maps an input URL to the platform that serves it
//
// Rules are checked top to bottom and the first match wins. Order matters
// because several hosts overlap: `music.youtube.com` must be seen before
// `youtube.com`, short-link hosts (`fb.watch`, `vm.tiktok.com`, `v.redd.it`)
// sit above their parent domains so the intent stays explicit.

use std::fmt;

use reqwest::Url;
use serde::{Serialize, Serializer};

use super::models::MediaClass;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    YouTube,
    YouTubeMusic,
    TikTok,
    Facebook,
    Instagram,
    Threads,
    Twitter,
    Reddit,
    Pinterest,
    Tumblr,
    LinkedIn,
    Snapchat,
    Bluesky,
    Vimeo,
    Dailymotion,
    Twitch,
    Bilibili,
    CapCut,
    SoundCloud,
    Mixcloud,
    Bandcamp,
    Spotify,
    Deezer,
    AppleMusic,
    Imgur,
    Flickr,
}

impl Platform {
    pub const ALL: &'static [Platform] = &[
        Self::YouTube,
        Self::YouTubeMusic,
        Self::TikTok,
        Self::Facebook,
        Self::Instagram,
        Self::Threads,
        Self::Twitter,
        Self::Reddit,
        Self::Pinterest,
        Self::Tumblr,
        Self::LinkedIn,
        Self::Snapchat,
        Self::Bluesky,
        Self::Vimeo,
        Self::Dailymotion,
        Self::Twitch,
        Self::Bilibili,
        Self::CapCut,
        Self::SoundCloud,
        Self::Mixcloud,
        Self::Bandcamp,
        Self::Spotify,
        Self::Deezer,
        Self::AppleMusic,
        Self::Imgur,
        Self::Flickr,
    ];

    /// Stable slug, used in temp file names and JSON output
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::YouTube => "youtube",
            Self::YouTubeMusic => "youtube_music",
            Self::TikTok => "tiktok",
            Self::Facebook => "facebook",
            Self::Instagram => "instagram",
            Self::Threads => "threads",
            Self::Twitter => "twitter",
            Self::Reddit => "reddit",
            Self::Pinterest => "pinterest",
            Self::Tumblr => "tumblr",
            Self::LinkedIn => "linkedin",
            Self::Snapchat => "snapchat",
            Self::Bluesky => "bluesky",
            Self::Vimeo => "vimeo",
            Self::Dailymotion => "dailymotion",
            Self::Twitch => "twitch",
            Self::Bilibili => "bilibili",
            Self::CapCut => "capcut",
            Self::SoundCloud => "soundcloud",
            Self::Mixcloud => "mixcloud",
            Self::Bandcamp => "bandcamp",
            Self::Spotify => "spotify",
            Self::Deezer => "deezer",
            Self::AppleMusic => "apple_music",
            Self::Imgur => "imgur",
            Self::Flickr => "flickr",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::YouTube => "YouTube",
            Self::YouTubeMusic => "YouTube Music",
            Self::TikTok => "TikTok",
            Self::Facebook => "Facebook",
            Self::Instagram => "Instagram",
            Self::Threads => "Threads",
            Self::Twitter => "X",
            Self::Reddit => "Reddit",
            Self::Pinterest => "Pinterest",
            Self::Tumblr => "Tumblr",
            Self::LinkedIn => "LinkedIn",
            Self::Snapchat => "Snapchat",
            Self::Bluesky => "Bluesky",
            Self::Vimeo => "Vimeo",
            Self::Dailymotion => "Dailymotion",
            Self::Twitch => "Twitch",
            Self::Bilibili => "Bilibili",
            Self::CapCut => "CapCut",
            Self::SoundCloud => "SoundCloud",
            Self::Mixcloud => "Mixcloud",
            Self::Bandcamp => "Bandcamp",
            Self::Spotify => "Spotify",
            Self::Deezer => "Deezer",
            Self::AppleMusic => "Apple Music",
            Self::Imgur => "Imgur",
            Self::Flickr => "Flickr",
        }
    }

    /// What the platform usually serves
    pub fn media_class(&self) -> MediaClass {
        match self {
            Self::YouTubeMusic
            | Self::SoundCloud
            | Self::Mixcloud
            | Self::Bandcamp
            | Self::Spotify
            | Self::Deezer
            | Self::AppleMusic => MediaClass::Audio,
            Self::Pinterest | Self::Imgur | Self::Flickr => MediaClass::Image,
            Self::Instagram | Self::Threads | Self::Tumblr | Self::Bluesky => MediaClass::Unknown,
            _ => MediaClass::Video,
        }
    }

    /// Whether a still image is an acceptable result for this platform.
    /// On pure video/audio sites an `og:image` is only a thumbnail.
    pub fn may_serve_images(&self) -> bool {
        matches!(
            self,
            Self::Pinterest
                | Self::Imgur
                | Self::Flickr
                | Self::Instagram
                | Self::Threads
                | Self::Tumblr
                | Self::Bluesky
                | Self::Twitter
                | Self::Reddit
                | Self::Facebook
                | Self::Snapchat
                | Self::LinkedIn
        )
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Platform {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

enum HostMatch {
    /// Exact host or any subdomain of it
    Domain(&'static str),
    /// A non-TLD label anywhere in the host (covers country domains)
    Label(&'static str),
}

struct Rule {
    platform: Platform,
    hosts: &'static [HostMatch],
    /// Path must contain one of these; empty means any path
    paths: &'static [&'static str],
}

use HostMatch::{Domain, Label};

const RULES: &[Rule] = &[
    Rule { platform: Platform::YouTubeMusic, hosts: &[Domain("music.youtube.com")], paths: &[] },
    Rule {
        platform: Platform::YouTube,
        hosts: &[Domain("youtu.be"), Domain("youtube.com"), Domain("youtube-nocookie.com")],
        paths: &[],
    },
    Rule {
        platform: Platform::Facebook,
        hosts: &[Domain("fb.watch"), Domain("fb.com"), Domain("facebook.com")],
        paths: &[],
    },
    Rule {
        platform: Platform::Instagram,
        hosts: &[Domain("instagr.am"), Domain("instagram.com")],
        paths: &[],
    },
    Rule {
        platform: Platform::Threads,
        hosts: &[Domain("threads.net"), Domain("threads.com")],
        paths: &[],
    },
    Rule {
        platform: Platform::Twitter,
        hosts: &[Domain("x.com"), Domain("twitter.com")],
        paths: &[],
    },
    Rule {
        platform: Platform::TikTok,
        hosts: &[Domain("vm.tiktok.com"), Domain("vt.tiktok.com"), Domain("tiktok.com")],
        paths: &[],
    },
    Rule {
        platform: Platform::Reddit,
        hosts: &[Domain("v.redd.it"), Domain("redd.it"), Domain("reddit.com")],
        paths: &[],
    },
    Rule {
        platform: Platform::Pinterest,
        hosts: &[Domain("pin.it"), Label("pinterest")],
        paths: &[],
    },
    Rule { platform: Platform::Tumblr, hosts: &[Domain("tumblr.com")], paths: &[] },
    Rule {
        platform: Platform::LinkedIn,
        hosts: &[Domain("linkedin.com")],
        paths: &["/posts/", "/feed/update/", "/video/"],
    },
    Rule { platform: Platform::Snapchat, hosts: &[Domain("snapchat.com")], paths: &[] },
    Rule { platform: Platform::Bluesky, hosts: &[Domain("bsky.app")], paths: &[] },
    Rule { platform: Platform::Vimeo, hosts: &[Domain("vimeo.com")], paths: &[] },
    Rule {
        platform: Platform::Dailymotion,
        hosts: &[Domain("dai.ly"), Domain("dailymotion.com")],
        paths: &[],
    },
    Rule { platform: Platform::Twitch, hosts: &[Domain("twitch.tv")], paths: &[] },
    Rule {
        platform: Platform::Bilibili,
        hosts: &[Domain("b23.tv"), Domain("bilibili.com"), Domain("bilibili.tv")],
        paths: &[],
    },
    Rule { platform: Platform::CapCut, hosts: &[Domain("capcut.com")], paths: &[] },
    Rule {
        platform: Platform::SoundCloud,
        hosts: &[Domain("on.soundcloud.com"), Domain("soundcloud.app.goo.gl"), Domain("soundcloud.com")],
        paths: &[],
    },
    Rule { platform: Platform::Mixcloud, hosts: &[Domain("mixcloud.com")], paths: &[] },
    Rule {
        platform: Platform::Bandcamp,
        hosts: &[Domain("bandcamp.com")],
        paths: &["/track/", "/album/"],
    },
    Rule {
        platform: Platform::Spotify,
        hosts: &[Domain("open.spotify.com"), Domain("spotify.link")],
        paths: &[],
    },
    Rule {
        platform: Platform::Deezer,
        hosts: &[Domain("deezer.page.link"), Domain("link.deezer.com"), Domain("deezer.com")],
        paths: &[],
    },
    Rule { platform: Platform::AppleMusic, hosts: &[Domain("music.apple.com")], paths: &[] },
    Rule { platform: Platform::Imgur, hosts: &[Domain("imgur.com")], paths: &[] },
    Rule {
        platform: Platform::Flickr,
        hosts: &[Domain("flic.kr"), Domain("flickr.com")],
        paths: &[],
    },
];

impl HostMatch {
    fn matches(&self, host: &str) -> bool {
        match self {
            Domain(domain) => {
                host == *domain
                    || host
                        .strip_suffix(domain)
                        .map_or(false, |rest| rest.ends_with('.'))
            }
            Label(label) => {
                let labels: Vec<&str> = host.split('.').collect();
                labels.len() > 1 && labels[..labels.len() - 1].contains(label)
            }
        }
    }
}

/// Parse user input leniently: a missing scheme is treated as https
pub fn parse_input_url(input: &str) -> Option<Url> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }

    let url = if trimmed.contains("://") {
        Url::parse(trimmed).ok()?
    } else {
        Url::parse(&format!("https://{}", trimmed)).ok()?
    };

    match url.scheme() {
        "http" | "https" => Some(url),
        _ => None,
    }
}

/// Classify a URL. `None` means unsupported; callers must not attempt
/// extraction in that case.
pub fn classify(input: &str) -> Option<Platform> {
    let url = parse_input_url(input)?;
    let host = url.host_str()?.to_ascii_lowercase();
    let host = host.trim_end_matches('.');
    let host = host
        .strip_prefix("www.")
        .or_else(|| host.strip_prefix("m."))
        .unwrap_or(host);
    let path = url.path().to_ascii_lowercase();

    RULES
        .iter()
        .find(|rule| {
            rule.hosts.iter().any(|h| h.matches(host))
                && (rule.paths.is_empty() || rule.paths.iter().any(|p| path.contains(p)))
        })
        .map(|rule| rule.platform)
}
