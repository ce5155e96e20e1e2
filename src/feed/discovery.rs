//! Feed autodiscovery from HTML pages.

use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;
use url::Url;

use crate::util::strip_control_chars;

static LINK_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<link\b[^>]*>").expect("link tag pattern is valid")
});

static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([A-Za-z][A-Za-z0-9_:-]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
        .expect("attribute pattern is valid")
});

const FEED_TYPES: [&str; 2] = ["application/rss+xml", "application/atom+xml"];

/// Errors that can occur during feed discovery.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The page URL or the advertised href could not be parsed or joined
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Finds the feed a page advertises through `<link rel="alternate">`.
///
/// Only links typed `application/rss+xml` or `application/atom+xml` count;
/// when a page lists several, the last one wins. Relative hrefs are
/// resolved against `source_url`. Returns `Ok(None)` when the page
/// advertises no feed.
pub fn extract_feed_link(source_url: &str, html: &str) -> Result<Option<String>, DiscoveryError> {
    let Some(href) = LINK_TAG
        .find_iter(html)
        .filter_map(|tag| feed_href(tag.as_str()))
        .last()
    else {
        return Ok(None);
    };

    if Url::parse(&href).is_ok() {
        return Ok(Some(href));
    }

    let base = Url::parse(source_url).map_err(|e| DiscoveryError::InvalidUrl(format!("{source_url}: {e}")))?;
    let resolved = base
        .join(&href)
        .map_err(|e| DiscoveryError::InvalidUrl(format!("{href}: {e}")))?;
    Ok(Some(resolved.to_string()))
}

/// The href of a `<link>` tag that advertises a feed.
fn feed_href(tag: &str) -> Option<String> {
    let mut rel = None;
    let mut kind = None;
    let mut href = None;

    for attr in ATTRIBUTE.captures_iter(tag) {
        let value = attr
            .get(2)
            .or_else(|| attr.get(3))
            .or_else(|| attr.get(4))
            .map_or("", |m| m.as_str());
        match attr[1].to_ascii_lowercase().as_str() {
            "rel" => rel = Some(value.to_ascii_lowercase()),
            "type" => kind = Some(value.trim().to_ascii_lowercase()),
            "href" => href = Some(value.trim()),
            _ => {}
        }
    }

    let is_alternate = rel?.split_ascii_whitespace().any(|r| r == "alternate");
    let is_feed = kind.is_some_and(|k| FEED_TYPES.contains(&k.as_str()));
    let href = href.filter(|h| !h.is_empty())?;

    // SEC-016: hrefs end up in terminal output
    (is_alternate && is_feed).then(|| strip_control_chars(&href.replace("&amp;", "&")).into_owned())
}
