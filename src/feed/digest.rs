//! Change-detection fingerprints and stable entry identity.
//!
//! A [`Digest`] is the first 128 bits of a SHA-256 over length-prefixed
//! fields, so `("ab", "c")` and `("a", "bc")` never collide by construction.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};
use sha2::{Digest as _, Sha256};
use std::fmt;

use super::model::{Entry, Feed};

/// 128-bit content fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Digest([u8; 16]);

impl Digest {
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

struct DigestBuilder(Sha256);

impl DigestBuilder {
    fn new(kind: &[u8]) -> Self {
        let mut builder = DigestBuilder(Sha256::new());
        builder.field(kind);
        builder
    }

    fn field(&mut self, bytes: &[u8]) -> &mut Self {
        self.0.update((bytes.len() as u64).to_le_bytes());
        self.0.update(bytes);
        self
    }

    fn text(&mut self, text: &str) -> &mut Self {
        self.field(text.as_bytes())
    }

    fn optional(&mut self, text: Option<&str>) -> &mut Self {
        match text {
            Some(text) => self.field(b"some").text(text),
            None => self.field(b"none"),
        }
    }

    fn time(&mut self, time: DateTime<Utc>) -> &mut Self {
        self.0.update(time.timestamp().to_le_bytes());
        self.0.update(time.timestamp_subsec_nanos().to_le_bytes());
        self
    }

    fn finish(self) -> Digest {
        let hash = self.0.finalize();
        let mut truncated = [0u8; 16];
        truncated.copy_from_slice(&hash[..16]);
        Digest(truncated)
    }
}

impl Feed {
    /// Fingerprint of the feed metadata. Entries, `url` and `retrieved` do
    /// not contribute.
    pub fn digest(&self) -> Digest {
        let mut builder = DigestBuilder::new(b"feed");
        builder
            .text(&self.title)
            .text(&self.description)
            .text(&self.www_url)
            .text(self.dialect.as_str())
            .optional(self.hub_url.as_deref())
            .optional(self.topic.as_deref());
        builder.finish()
    }
}

impl Entry {
    /// Fingerprint used to decide whether a stored entry changed.
    ///
    /// A timestamp, when the entry has one, stands for the whole entry:
    /// `updated` first, then `published`. Only entries without either are
    /// hashed by content, so a body edited without a timestamp bump is
    /// reported as unchanged.
    pub fn digest(&self) -> Digest {
        if let Some(updated) = self.updated {
            let mut builder = DigestBuilder::new(b"entry:updated");
            builder.time(updated);
            return builder.finish();
        }
        if let Some(published) = self.published {
            let mut builder = DigestBuilder::new(b"entry:published");
            builder.time(published);
            return builder.finish();
        }

        let mut builder = DigestBuilder::new(b"entry:content");
        builder
            .text(&self.author)
            .text(&self.title)
            .text(&self.www_url)
            .text(&self.content);
        for media in &self.media {
            builder.text(&media.url);
        }
        builder.finish()
    }

    /// Storage key: the GUID when there is one, else `www_url@timestamp`,
    /// else the bare `www_url`.
    pub fn unique_id(&self) -> String {
        if !self.guid.is_empty() {
            return self.guid.clone();
        }
        match self.latest_modification() {
            Some(modified) => format!(
                "{}@{}",
                self.www_url,
                modified.to_rfc3339_opts(SecondsFormat::Secs, true)
            ),
            None => self.www_url.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::model::{Dialect, Media};
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn entry() -> Entry {
        Entry {
            author: "Ann".to_string(),
            title: "Hello".to_string(),
            www_url: "https://example.com/hello".to_string(),
            content: "<p>body</p>".to_string(),
            ..Entry::default()
        }
    }

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, day, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_hex_rendering() {
        let digest = Digest([0xab; 16]);
        assert_eq!(digest.to_hex(), "ab".repeat(16));
        assert_eq!(digest.as_bytes().len(), 16);
        assert_eq!(serde_json::to_string(&digest).unwrap(), format!("\"{}\"", "ab".repeat(16)));
    }

    #[test]
    fn test_feed_digest_fields() {
        let mut feed = Feed::new(Dialect::Rss2);
        feed.title = "Title".to_string();
        let base = feed.digest();

        let mut stamped = feed.clone();
        stamped.url = "https://example.com/feed".to_string();
        stamped.retrieved = at(3);
        stamped.entries.push(entry());
        assert_eq!(stamped.digest(), base);

        let mut retitled = feed.clone();
        retitled.title = "Other".to_string();
        assert_ne!(retitled.digest(), base);

        let mut hubbed = feed.clone();
        hubbed.hub_url = Some(String::new());
        assert_ne!(hubbed.digest(), base);

        let mut atom = feed.clone();
        atom.dialect = Dialect::Atom;
        assert_ne!(atom.digest(), base);
    }

    #[test]
    fn test_field_boundaries_are_unambiguous() {
        let mut a = Feed::new(Dialect::Atom);
        a.title = "ab".to_string();
        a.description = "c".to_string();
        let mut b = Feed::new(Dialect::Atom);
        b.title = "a".to_string();
        b.description = "bc".to_string();
        assert_ne!(a.digest(), b.digest());
    }

    #[test]
    fn test_entry_timestamp_masks_content() {
        let mut first = entry();
        first.updated = Some(at(2));
        let mut edited = first.clone();
        edited.content = "<p>rewritten</p>".to_string();
        assert_eq!(first.digest(), edited.digest());

        let mut bumped = first.clone();
        bumped.updated = Some(at(3));
        assert_ne!(first.digest(), bumped.digest());
    }

    #[test]
    fn test_entry_published_used_when_no_updated() {
        let mut first = entry();
        first.published = Some(at(1));
        let mut edited = first.clone();
        edited.title = "Changed".to_string();
        assert_eq!(first.digest(), edited.digest());

        // Same instant, different field: not the same digest
        let mut as_updated = entry();
        as_updated.updated = Some(at(1));
        assert_ne!(first.digest(), as_updated.digest());
    }

    #[test]
    fn test_entry_content_hash_without_timestamps() {
        let base = entry();
        let mut edited = base.clone();
        edited.content = "<p>rewritten</p>".to_string();
        assert_ne!(base.digest(), edited.digest());

        let mut with_media = base.clone();
        with_media.media.push(Media {
            url: "https://example.com/a.mp3".to_string(),
            mime_type: "audio/mpeg".to_string(),
            title: String::new(),
        });
        assert_ne!(base.digest(), with_media.digest());
        assert_eq!(base.digest(), base.clone().digest());
    }

    #[test]
    fn test_unique_id_precedence() {
        let mut e = entry();
        assert_eq!(e.unique_id(), "https://example.com/hello");

        e.published = Some(at(1));
        e.updated = Some(at(2));
        assert_eq!(e.unique_id(), "https://example.com/hello@2024-05-02T12:00:00Z");

        e.guid = "tag:example.com,2024:1".to_string();
        assert_eq!(e.unique_id(), "tag:example.com,2024:1");
    }

    #[test]
    fn test_unique_id_ignores_retrieval() {
        let mut a = entry();
        a.published = Some(at(1));
        let mut b = a.clone();
        a.retrieved = at(5);
        b.retrieved = at(6);
        assert_eq!(a.unique_id(), b.unique_id());
        assert_eq!(a.digest(), b.digest());
    }
}
