//! Feed ingestion core.
//!
//! Turns raw RSS 1.0, RSS 2.0 and Atom 1.0 documents into one normalized
//! [`Feed`] model, computes change digests and stable entry identities, and
//! sanitizes untrusted HTML down to displayable text.

pub mod config;
pub mod feed;
pub mod sanitize;
pub mod util;

pub use config::{Config, ConfigError, ParserConfig};
pub use feed::{
    unmarshal, Dialect, Digest, Entry, Feed, FeedParser, FieldError, FieldLocation, Media,
    ParseError, ParseOptions, Unmarshaled,
};
pub use sanitize::strip_unsafe;
