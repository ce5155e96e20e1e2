//! Per-dialect decoding and marshaling into the common [`Feed`] model.
//!
//! Each dialect decodes the generic element tree into its own native shape,
//! then `marshal` maps that shape onto `Feed`/`Entry`. Field-level failures
//! (timestamps nobody can read) are collected rather than raised.

mod atom;
mod rss1;
mod rss2;

use chrono::{DateTime, Utc};
use std::fmt;
use thiserror::Error;

use super::model::{Dialect, Feed};
use super::time::{parse_time, TimeError, TimeFormat};
use super::xml::Element;
use crate::util::strip_control_chars;

pub(crate) use atom::AtomFeed;
pub(crate) use rss1::Rss1Feed;
pub(crate) use rss2::Rss2Feed;

/// Where in a feed a field-level error happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldLocation {
    Feed,
    /// Zero-based index into `Feed::entries`.
    Entry(usize),
}

impl fmt::Display for FieldLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldLocation::Feed => f.write_str("feed"),
            FieldLocation::Entry(index) => write!(f, "entry #{index}"),
        }
    }
}

/// A field that could not be mapped. The field is left unset; the rest of
/// the feed or entry is unaffected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{location} <{field}>: {source}")]
pub struct FieldError {
    pub location: FieldLocation,
    pub field: &'static str,
    #[source]
    pub source: TimeError,
}

/// Output of a dialect marshal: the feed plus every degraded field, in
/// document order.
#[derive(Debug)]
pub(crate) struct Marshaled {
    pub feed: Feed,
    pub errors: Vec<FieldError>,
}

/// Collects field errors while a dialect builds its feed.
#[derive(Debug, Default)]
pub(crate) struct Diagnostics {
    errors: Vec<FieldError>,
}

impl Diagnostics {
    /// Parses a timestamp field, recording (not propagating) a failure.
    pub fn time(
        &mut self,
        location: FieldLocation,
        field: &'static str,
        formats: &[TimeFormat],
        spec: &str,
    ) -> Option<DateTime<Utc>> {
        self.record(location, field, parse_time(formats, spec))
    }

    pub fn record(
        &mut self,
        location: FieldLocation,
        field: &'static str,
        result: Result<Option<DateTime<Utc>>, TimeError>,
    ) -> Option<DateTime<Utc>> {
        match result {
            Ok(time) => time,
            Err(source) => {
                tracing::warn!(%location, field, error = %source, "Leaving unparseable timestamp unset");
                self.errors.push(FieldError {
                    location,
                    field,
                    source,
                });
                None
            }
        }
    }

    pub fn finish(self, feed: Feed) -> Marshaled {
        Marshaled {
            feed,
            errors: self.errors,
        }
    }
}

/// A `<link>` element as the RSS dialects see it: character data plus the
/// attributes Atom-style links carry.
#[derive(Debug, Clone, Default)]
pub(crate) struct Link {
    pub namespace: Option<String>,
    pub text: String,
    pub rel: String,
    pub href: String,
    pub mime_type: String,
    pub title: String,
}

impl Link {
    pub fn from_element(element: &Element) -> Self {
        Self {
            namespace: element.namespace.clone(),
            text: element.trimmed_text(),
            rel: element.attr("rel").unwrap_or_default().to_owned(),
            href: element.attr("href").unwrap_or_default().trim().to_owned(),
            mime_type: element.attr("type").unwrap_or_default().to_owned(),
            title: element.attr("title").unwrap_or_default().to_owned(),
        }
    }

    /// Space-separated `rel` tokens.
    pub fn rels(&self) -> impl Iterator<Item = &str> {
        self.rel.split_ascii_whitespace()
    }
}

/// Hub discovery shared by RSS2 and Atom: the first `self` or `hub` token of
/// each link decides what that link is.
pub(crate) fn hub_link_role(link: &Link) -> Option<&'static str> {
    link.rels().find_map(|rel| match rel {
        "self" => Some("self"),
        "hub" => Some("hub"),
        _ => None,
    })
}

/// Display text for titles, authors and descriptions.
pub(crate) fn clean(text: &str) -> String {
    strip_control_chars(text.trim()).into_owned()
}

/// A decoded document in its dialect's own shape.
#[derive(Debug)]
pub(crate) enum NativeFeed {
    Rss1(Rss1Feed),
    Rss2(Rss2Feed),
    Atom(AtomFeed),
}

impl NativeFeed {
    /// Decodes the element tree against the selected dialect's schema.
    ///
    /// `source` is the document the tree was built from; Atom reads inline
    /// XHTML content straight out of it.
    pub fn decode(dialect: Dialect, root: &Element, source: &[u8]) -> Self {
        match dialect {
            Dialect::Rss1 => NativeFeed::Rss1(Rss1Feed::decode(root)),
            Dialect::Rss2 => NativeFeed::Rss2(Rss2Feed::decode(root)),
            Dialect::Atom => NativeFeed::Atom(AtomFeed::decode(root, source)),
        }
    }

    pub fn marshal(self) -> Marshaled {
        match self {
            NativeFeed::Rss1(native) => native.marshal(),
            NativeFeed::Rss2(native) => native.marshal(),
            NativeFeed::Atom(native) => native.marshal(),
        }
    }
}
