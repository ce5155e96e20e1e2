use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::fmt;

use crate::sanitize::strip_unsafe;
use crate::util::truncate_chars;

/// The XML schema a feed was published in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Dialect {
    /// RDF-based RSS 1.0.
    #[serde(rename = "RSS1")]
    Rss1,
    /// RSS 0.9x / 2.0.
    #[serde(rename = "RSS2")]
    Rss2,
    /// Atom 1.0.
    Atom,
}

pub(crate) const RDF_NAMESPACE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
pub(crate) const ATOM_NAMESPACE: &str = "http://www.w3.org/2005/Atom";

impl Dialect {
    /// Selects a dialect from the document's root element.
    ///
    /// Checked in priority order: `rdf:RDF` is RSS1, any `rss` is RSS2,
    /// and an Atom-namespaced `feed` is Atom. Anything else is unsupported.
    pub fn detect(namespace: Option<&str>, local: &str) -> Option<Self> {
        if namespace == Some(RDF_NAMESPACE) && local == "RDF" {
            Some(Dialect::Rss1)
        } else if local == "rss" {
            Some(Dialect::Rss2)
        } else if namespace == Some(ATOM_NAMESPACE) && local == "feed" {
            Some(Dialect::Atom)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::Rss1 => "RSS1",
            Dialect::Rss2 => "RSS2",
            Dialect::Atom => "Atom",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized feed produced by a single fetch.
///
/// Identity is the caller-supplied source URL. A `Feed` is never mutated
/// after [`unmarshal`](crate::feed::unmarshal) returns it; the next fetch
/// produces a new value that supersedes it.
#[derive(Debug, Clone, Serialize)]
pub struct Feed {
    /// Source URL the document was fetched from (never parsed from content).
    pub url: String,
    pub title: String,
    pub description: String,
    /// Feed-level update timestamp, when the document declares one.
    pub updated: Option<DateTime<Utc>>,
    /// URL of the website the feed belongs to.
    pub www_url: String,
    pub dialect: Dialect,
    /// When the document was parsed (UTC).
    pub retrieved: DateTime<Utc>,
    /// Declared update interval in hours; `0.0` when the feed does not say.
    pub hourly_update_frequency: f64,
    /// Entries in source document order.
    pub entries: Vec<Entry>,
    /// PubSubHubbub hub advertised by the feed.
    pub hub_url: Option<String>,
    /// The feed's own `rel="self"` URL, used as the hub topic.
    pub topic: Option<String>,
}

impl Feed {
    /// Builds an unstamped feed for `dialect`. The orchestrator fills in
    /// `url` and `retrieved` once marshaling is done.
    pub(crate) fn new(dialect: Dialect) -> Self {
        Self {
            url: String::new(),
            title: String::new(),
            description: String::new(),
            updated: None,
            www_url: String::new(),
            dialect,
            retrieved: DateTime::<Utc>::default(),
            hourly_update_frequency: 0.0,
            entries: Vec::new(),
            hub_url: None,
            topic: None,
        }
    }

    /// Most recent modification time over all entries.
    pub fn latest_entry_modification(&self) -> Option<DateTime<Utc>> {
        self.entries
            .iter()
            .filter_map(Entry::latest_modification)
            .max()
    }

    /// Update interval hint for the fetch scheduler.
    ///
    /// Uses the declared hourly frequency when present; otherwise the mean gap
    /// between entry modification times. `None` when neither is available.
    /// The scheduler owns any clamping of this value.
    pub fn observed_update_interval(&self) -> Option<Duration> {
        if self.hourly_update_frequency > 0.0 {
            let millis = self.hourly_update_frequency * 3_600_000.0;
            return Some(Duration::milliseconds(millis as i64));
        }

        let mut times: Vec<_> = self
            .entries
            .iter()
            .filter_map(Entry::latest_modification)
            .collect();
        if times.len() < 2 {
            return None;
        }
        times.sort_unstable();

        let total: i64 = times
            .windows(2)
            .map(|pair| (pair[1] - pair[0]).num_seconds())
            .sum();
        Some(Duration::seconds(total / (times.len() as i64 - 1)))
    }
}

/// A single item of a feed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Entry {
    /// Dialect-supplied identifier; may be empty.
    pub guid: String,
    pub author: String,
    pub title: String,
    /// Raw content body as published (HTML for most feeds).
    pub content: String,
    /// Display-safe plain text derived from `content`.
    pub summary: String,
    pub published: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
    pub www_url: String,
    pub media: Vec<Media>,
    /// Same instant as the owning feed's `retrieved`.
    pub retrieved: DateTime<Utc>,
}

impl Entry {
    /// Later of `updated` and `published`.
    pub fn latest_modification(&self) -> Option<DateTime<Utc>> {
        match (self.published, self.updated) {
            (Some(published), Some(updated)) => Some(published.max(updated)),
            (published, updated) => updated.or(published),
        }
    }

    /// Sanitized content as plain text, trimmed and cut to `max_chars` characters.
    pub fn plain_text_summary(&self, max_chars: usize) -> String {
        let text = strip_unsafe(&self.content);
        truncate_chars(text.trim(), max_chars).into_owned()
    }

    /// `updated` never precedes `published`; a stale `updated` is raised to match.
    pub(crate) fn order_timestamps(&mut self) {
        if let (Some(published), Some(updated)) = (self.published, self.updated) {
            if updated < published {
                self.updated = Some(published);
            }
        }
    }
}

/// An enclosure attached to an entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Media {
    pub url: String,
    pub mime_type: String,
    pub title: String,
}
