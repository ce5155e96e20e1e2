//! Escaping of bare `&` characters in otherwise well-formed XML.
//!
//! Feeds routinely contain `Salt & Pepper` in titles. The orchestrator only
//! runs [`repair`] after a decode has already failed; documents that parse do
//! not pay for the scan.

use regex::bytes::{Captures, Regex};
use std::borrow::Cow;
use std::sync::LazyLock;

/// Matches either a CDATA section (left untouched) or an ampersand with an
/// optional well-formed reference after it. A match of just `&` is bare.
static AMPERSAND: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?s)<!\[CDATA\[.*?\]\]>|&(?:[A-Za-z_][A-Za-z0-9._-]*;|#[0-9]+;|#[xX][0-9A-Fa-f]+;)?",
    )
    .expect("ampersand pattern is a valid regex")
});

/// Rewrites every `&` that does not start an entity reference to `&amp;`.
///
/// Returns `Cow::Borrowed` when nothing needed fixing, so the caller can tell
/// whether a retry is worthwhile. Well-formed references (`&name;`, `&#123;`,
/// `&#xFF;`) and the contents of CDATA sections are never altered.
pub fn repair(input: &[u8]) -> Cow<'_, [u8]> {
    let has_bare = AMPERSAND
        .find_iter(input)
        .any(|m| m.as_bytes() == b"&");
    if !has_bare {
        return Cow::Borrowed(input);
    }

    let repaired = AMPERSAND.replace_all(input, |caps: &Captures<'_>| {
        let matched = &caps[0];
        if matched == b"&" {
            b"&amp;".to_vec()
        } else {
            matched.to_vec()
        }
    });
    Cow::Owned(repaired.into_owned())
}
