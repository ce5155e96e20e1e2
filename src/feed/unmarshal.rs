//! Feed unmarshaling: dialect detection, decoding with one entity-repair
//! retry, marshaling and retrieval stamping.

use chrono::Utc;
use std::borrow::Cow;
use std::io::Read;
use thiserror::Error;
use tracing::{debug, warn};

use super::charset;
use super::dialect::{FieldError, FieldLocation, NativeFeed};
use super::model::{Dialect, Feed};
use super::repair::repair;
use super::xml::{self, DecodeError};

/// Default cap on document size.
pub const DEFAULT_MAX_DOCUMENT_BYTES: usize = 10 * 1024 * 1024; // 10MB
/// Default element nesting limit.
pub const DEFAULT_MAX_DEPTH: usize = 256;
/// Default length of `Entry::summary`, in characters.
pub const DEFAULT_SUMMARY_CHARS: usize = 512;

/// Errors that abort an unmarshal. Field-level problems never do; they are
/// reported through [`Unmarshaled::errors`].
#[derive(Debug, Error)]
pub enum ParseError {
    /// Root element is not one of the supported dialects
    #[error("Unsupported type of feed ({namespace}:{local})")]
    UnsupportedFeedType { namespace: String, local: String },
    /// XML could not be decoded, even after entity repair
    #[error("Malformed document: {0}")]
    MalformedDocument(String),
    /// Document exceeded the configured size limit
    #[error("Document too large (exceeds {0} bytes)")]
    TooLarge(usize),
    /// Reading the document failed
    #[error("Failed to read document: {0}")]
    Io(#[from] std::io::Error),
}

/// Limits and behavior of a [`FeedParser`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOptions {
    pub max_document_bytes: usize,
    pub max_depth: usize,
    pub summary_chars: usize,
    /// Retry a failed decode once after escaping bare ampersands.
    pub repair_entities: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            max_document_bytes: DEFAULT_MAX_DOCUMENT_BYTES,
            max_depth: DEFAULT_MAX_DEPTH,
            summary_chars: DEFAULT_SUMMARY_CHARS,
            repair_entities: true,
        }
    }
}

/// A successfully unmarshaled feed plus every field that had to be left
/// unset, in document order.
#[derive(Debug)]
pub struct Unmarshaled {
    pub feed: Feed,
    pub errors: Vec<FieldError>,
}

impl Unmarshaled {
    /// First degraded field belonging to an entry, if any.
    pub fn first_entry_error(&self) -> Option<&FieldError> {
        self.errors
            .iter()
            .find(|e| matches!(e.location, FieldLocation::Entry(_)))
    }

    /// Feed-level degraded fields take precedence over entry-level ones.
    pub fn first_error(&self) -> Option<&FieldError> {
        self.errors
            .iter()
            .find(|e| e.location == FieldLocation::Feed)
            .or_else(|| self.first_entry_error())
    }

    pub fn into_feed(self) -> Feed {
        self.feed
    }
}

/// Turns raw feed documents into [`Feed`]s.
///
/// Holds no state besides its options; one parser can serve any number of
/// documents, from any number of threads.
#[derive(Debug, Clone, Default)]
pub struct FeedParser {
    options: ParseOptions,
}

impl FeedParser {
    pub fn new(options: ParseOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ParseOptions {
        &self.options
    }

    /// Unmarshals a document fetched from `source_url`.
    ///
    /// The root element picks the dialect; the document is then decoded in
    /// full. A decode failure in either pass triggers one entity-repair
    /// rewrite of the document and one retry of that pass. The repair is
    /// never applied twice.
    pub fn unmarshal(&self, source_url: &str, bytes: &[u8]) -> Result<Unmarshaled, ParseError> {
        if bytes.len() > self.options.max_document_bytes {
            return Err(ParseError::TooLarge(self.options.max_document_bytes));
        }

        let mut source = charset::to_utf8(bytes);
        let mut repaired = false;

        let root_name = loop {
            match xml::sniff_root(&source) {
                Ok(name) => break name,
                Err(err) => source = self.repair_for_retry(source_url, source, &mut repaired, err)?,
            }
        };

        let dialect = Dialect::detect(root_name.namespace.as_deref(), &root_name.local).ok_or_else(|| {
            ParseError::UnsupportedFeedType {
                namespace: root_name.namespace.clone().unwrap_or_default(),
                local: root_name.local.clone(),
            }
        })?;
        debug!(url = source_url, %dialect, "Detected feed dialect");

        let root = loop {
            match xml::decode(&source, self.options.max_depth) {
                Ok(root) => break root,
                Err(err) => source = self.repair_for_retry(source_url, source, &mut repaired, err)?,
            }
        };

        let marshaled = NativeFeed::decode(dialect, &root, &source).marshal();
        let mut feed = marshaled.feed;
        self.stamp(source_url, &mut feed);

        if !marshaled.errors.is_empty() {
            warn!(
                url = source_url,
                count = marshaled.errors.len(),
                "Feed unmarshaled with unreadable fields"
            );
        }
        debug!(url = source_url, entries = feed.entries.len(), "Unmarshaled feed");

        Ok(Unmarshaled {
            feed,
            errors: marshaled.errors,
        })
    }

    /// Buffers `reader` (up to the size limit) and unmarshals it.
    pub fn unmarshal_reader<R: Read>(&self, source_url: &str, reader: R) -> Result<Unmarshaled, ParseError> {
        let limit = self.options.max_document_bytes;
        let mut bytes = Vec::new();
        reader.take(limit as u64 + 1).read_to_end(&mut bytes)?;
        if bytes.len() > limit {
            return Err(ParseError::TooLarge(limit));
        }
        self.unmarshal(source_url, &bytes)
    }

    /// Decides whether a failed pass gets another try. Returns the repaired
    /// document when it does.
    fn repair_for_retry<'a>(
        &self,
        source_url: &str,
        source: Cow<'a, [u8]>,
        repaired: &mut bool,
        err: DecodeError,
    ) -> Result<Cow<'a, [u8]>, ParseError> {
        if *repaired || !self.options.repair_entities {
            return Err(ParseError::MalformedDocument(err.to_string()));
        }
        *repaired = true;

        match repair(&source) {
            Cow::Owned(fixed) => {
                debug!(url = source_url, error = %err, "Retrying decode after entity repair");
                Ok(Cow::Owned(fixed))
            }
            // Nothing to repair; retrying would fail the same way
            Cow::Borrowed(_) => Err(ParseError::MalformedDocument(err.to_string())),
        }
    }

    fn stamp(&self, source_url: &str, feed: &mut Feed) {
        let retrieved = Utc::now();
        feed.url = source_url.to_owned();
        feed.retrieved = retrieved;
        for entry in &mut feed.entries {
            entry.retrieved = retrieved;
            entry.summary = entry.plain_text_summary(self.options.summary_chars);
        }
    }
}

/// Unmarshals with default [`ParseOptions`].
pub fn unmarshal(source_url: &str, bytes: &[u8]) -> Result<Unmarshaled, ParseError> {
    FeedParser::default().unmarshal(source_url, bytes)
}
