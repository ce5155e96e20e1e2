//! Transcoding of non-UTF-8 feed documents before XML decoding.
//!
//! The XML decoder only understands UTF-8. Documents that announce another
//! charset (by byte-order mark or by the `encoding` pseudo-attribute of the
//! XML declaration) are converted with `encoding_rs` first. Labels that
//! `encoding_rs` does not know are passed through unchanged.

use encoding_rs::{Encoding, UTF_8};
use std::borrow::Cow;

/// The XML declaration, when present, sits within the first few hundred bytes.
const DECLARATION_SCAN_LIMIT: usize = 512;

/// Returns `bytes` as UTF-8, transcoding when the document declares another charset.
pub fn to_utf8(bytes: &[u8]) -> Cow<'_, [u8]> {
    if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
        let body = &bytes[bom_len..];
        if encoding == UTF_8 {
            return Cow::Borrowed(body);
        }
        tracing::debug!(charset = encoding.name(), "Transcoding feed from byte-order mark");
        return transcode(encoding, body);
    }

    match declared_encoding(bytes) {
        Some(encoding) if encoding != UTF_8 => {
            tracing::debug!(charset = encoding.name(), "Transcoding feed from XML declaration");
            transcode(encoding, bytes)
        }
        _ => Cow::Borrowed(bytes),
    }
}

fn transcode<'a>(encoding: &'static Encoding, bytes: &'a [u8]) -> Cow<'a, [u8]> {
    let (text, had_errors) = encoding.decode_without_bom_handling(bytes);
    if had_errors {
        tracing::warn!(
            charset = encoding.name(),
            "Feed contains bytes invalid for its declared charset; replaced"
        );
    }
    Cow::Owned(text.into_owned().into_bytes())
}

/// Reads the `encoding="..."` value out of a leading `<?xml ...?>` declaration.
fn declared_encoding(bytes: &[u8]) -> Option<&'static Encoding> {
    let head = &bytes[..bytes.len().min(DECLARATION_SCAN_LIMIT)];
    let start = head.iter().position(|b| !b.is_ascii_whitespace())?;
    let head = &head[start..];
    if !head.starts_with(b"<?xml") {
        return None;
    }
    let end = head.windows(2).position(|w| w == b"?>")?;
    let declaration = &head[..end];

    let key = declaration
        .windows(8)
        .position(|w| w.eq_ignore_ascii_case(b"encoding"))?;
    let rest = &declaration[key + 8..];
    let rest = &rest[rest.iter().position(|b| !b.is_ascii_whitespace())?..];
    let rest = rest.strip_prefix(b"=")?;
    let rest = &rest[rest.iter().position(|b| !b.is_ascii_whitespace())?..];

    let quote = *rest.first()?;
    if quote != b'"' && quote != b'\'' {
        return None;
    }
    let value = &rest[1..];
    let label = &value[..value.iter().position(|&b| b == quote)?];
    Encoding::for_label(label)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf8_passthrough_borrows() {
        let doc = br#"<?xml version="1.0" encoding="UTF-8"?><rss/>"#;
        assert!(matches!(to_utf8(doc), Cow::Borrowed(b) if b == doc));
    }

    #[test]
    fn test_no_declaration_passthrough() {
        assert!(matches!(to_utf8(b"<rss/>"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_utf8_bom_is_stripped() {
        let doc = b"\xEF\xBB\xBF<rss/>";
        assert_eq!(to_utf8(doc).as_ref(), b"<rss/>");
    }

    #[test]
    fn test_latin1_declaration_is_transcoded() {
        let doc = b"<?xml version='1.0' encoding='ISO-8859-1'?><title>caf\xE9</title>";
        let converted = to_utf8(doc);
        let text = std::str::from_utf8(&converted).unwrap();
        assert!(text.ends_with("<title>caf\u{e9}</title>"));
    }

    #[test]
    fn test_unknown_label_passthrough() {
        let doc = br#"<?xml version="1.0" encoding="x-made-up"?><rss/>"#;
        assert!(matches!(to_utf8(doc), Cow::Borrowed(_)));
    }

    #[test]
    fn test_utf16_bom_is_transcoded() {
        let mut doc = vec![0xFF, 0xFE];
        for unit in "<rss/>".encode_utf16() {
            doc.extend_from_slice(&unit.to_le_bytes());
        }
        assert_eq!(to_utf8(&doc).as_ref(), b"<rss/>");
    }
}
