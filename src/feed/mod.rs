//! Feed ingestion: raw RSS/Atom bytes in, one normalized [`Feed`] out.
//!
//! - [`unmarshal`] / [`FeedParser`] - size check, charset pre-decoding,
//!   dialect selection, tree decode with a single entity-repair retry
//! - dialect marshalers for RSS 1.0, RSS 2.0 and Atom 1.0
//! - [`Feed::digest`], [`Entry::digest`] and [`Entry::unique_id`] for
//!   change detection and identity
//! - [`opml`] subscription lists and [`extract_feed_link`] autodiscovery
//!
//! # Example
//!
//! ```
//! use feedstock::feed::{unmarshal, Dialect};
//!
//! let xml = br#"<rss version="2.0"><channel><title>Hi</title>
//!     <item><guid>1</guid><title>One</title></item></channel></rss>"#;
//! let feed = unmarshal("https://example.com/rss", xml)?.into_feed();
//! assert_eq!(feed.dialect, Dialect::Rss2);
//! assert_eq!(feed.entries[0].unique_id(), "1");
//! # Ok::<(), feedstock::feed::ParseError>(())
//! ```

mod charset;
mod dialect;
mod digest;
mod discovery;
mod model;
pub mod opml;
mod repair;
mod time;
mod unmarshal;
mod xml;

pub use charset::to_utf8;
pub use dialect::{FieldError, FieldLocation};
pub use digest::Digest;
pub use discovery::{extract_feed_link, DiscoveryError};
pub use model::{Dialect, Entry, Feed, Media};
pub use opml::{Opml, OpmlError, Outline};
pub use repair::repair;
pub use time::{parse_time, TimeError, TimeFormat};
pub use unmarshal::{
    unmarshal, FeedParser, ParseError, ParseOptions, Unmarshaled, DEFAULT_MAX_DEPTH,
    DEFAULT_MAX_DOCUMENT_BYTES, DEFAULT_SUMMARY_CHARS,
};
