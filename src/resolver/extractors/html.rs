// Minimal HTML helpers: meta tags, <title>, entity decoding

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref META_TAG: Regex = Regex::new(r"(?is)<meta\b[^>]*>").unwrap();
    static ref ATTRIBUTE: Regex =
        Regex::new(r#"(?is)([a-z_:-]+)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).unwrap();
    static ref TITLE_TAG: Regex = Regex::new(r"(?is)<title[^>]*>(.*?)</title>").unwrap();
    static ref NUMERIC_ENTITY: Regex = Regex::new(r"&#(x[0-9a-fA-F]+|[0-9]+);").unwrap();
}

/// Content of the first `<meta property|name="key" content="...">`,
/// with attributes in any order
pub fn meta_content(html: &str, key: &str) -> Option<String> {
    META_TAG.find_iter(html).find_map(|tag| {
        let mut matches_key = false;
        let mut content = None;
        for caps in ATTRIBUTE.captures_iter(tag.as_str()) {
            let name = caps[1].to_ascii_lowercase();
            let value = caps.get(2).or_else(|| caps.get(3)).map_or("", |m| m.as_str());
            match name.as_str() {
                "property" | "name" | "itemprop" if value.eq_ignore_ascii_case(key) => {
                    matches_key = true
                }
                "content" => content = Some(value),
                _ => {}
            }
        }
        match (matches_key, content) {
            (true, Some(value)) if !value.trim().is_empty() => Some(decode_entities(value.trim())),
            _ => None,
        }
    })
}

pub fn page_title(html: &str) -> Option<String> {
    let caps = TITLE_TAG.captures(html)?;
    let title = decode_entities(caps[1].trim());
    if title.is_empty() {
        None
    } else {
        Some(title)
    }
}

/// First non-empty of og:title, twitter:title, <title>
pub fn best_title(html: &str) -> Option<String> {
    meta_content(html, "og:title")
        .or_else(|| meta_content(html, "twitter:title"))
        .or_else(|| page_title(html))
}

pub fn decode_entities(text: &str) -> String {
    let named = text
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&nbsp;", " ");

    let numeric = NUMERIC_ENTITY.replace_all(&named, |caps: &regex::Captures| {
        let raw = &caps[1];
        let code = if let Some(hex) = raw.strip_prefix('x') {
            u32::from_str_radix(hex, 16).ok()
        } else {
            raw.parse::<u32>().ok()
        };
        code.and_then(char::from_u32)
            .map(|c| c.to_string())
            .unwrap_or_default()
    });

    // &amp; last so "&amp;lt;" stays "&lt;"
    numeric.replace("&amp;", "&")
}

/// Undo JSON-in-HTML escaping commonly seen in inline scripts
pub fn unescape_inline(url: &str) -> String {
    url.replace("\\/", "/")
        .replace("\\u0026", "&")
        .replace("\\u002F", "/")
        .replace("\\u003D", "=")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meta_any_attribute_order() {
        let html = r#"<head>
            <meta content="https://cdn.example/a.jpg" property="og:image">
            <meta property='og:title' content='Sunset &amp; Sea'>
        </head>"#;
        assert_eq!(
            meta_content(html, "og:image").as_deref(),
            Some("https://cdn.example/a.jpg")
        );
        assert_eq!(meta_content(html, "og:title").as_deref(), Some("Sunset & Sea"));
        assert_eq!(meta_content(html, "og:video"), None);
    }

    #[test]
    fn test_empty_content_skipped() {
        let html = r#"<meta property="og:video" content=""><meta property="og:video" content="https://v/x.mp4">"#;
        assert_eq!(meta_content(html, "og:video").as_deref(), Some("https://v/x.mp4"));
    }

    #[test]
    fn test_title_fallback() {
        let html = "<html><title> Plain &#8211; Title </title></html>";
        assert_eq!(best_title(html).as_deref(), Some("Plain \u{2013} Title"));
    }

    #[test]
    fn test_unescape_inline() {
        assert_eq!(
            unescape_inline(r"https:\/\/cdn.x\/v.mp4?a=1\u0026b=2"),
            "https://cdn.x/v.mp4?a=1&b=2"
        );
    }
}
