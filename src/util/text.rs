use std::borrow::Cow;

const ESC: char = '\u{1b}';
const BEL: char = '\u{07}';

/// Control characters that are never kept. Tab, LF and CR are text.
fn is_stripped_control(c: char) -> bool {
    match c {
        '\t' | '\n' | '\r' => false,
        // C0, DEL and C1 (U+0080..=U+009F; U+009B is an 8-bit CSI)
        _ => c.is_control(),
    }
}

#[derive(Clone, Copy)]
enum Escape {
    /// Plain text.
    None,
    /// Just saw ESC.
    Start,
    /// Inside `ESC [ ...`, ended by a byte in `@`..=`~`.
    Csi,
    /// Inside `ESC ] ...`, ended by BEL or `ESC \`.
    Osc,
    /// Saw ESC inside an OSC string.
    OscEsc,
}

/// Removes terminal control characters and ANSI escape sequences (CSI and
/// OSC) from feed text.
///
/// SEC-016: titles, authors and descriptions come from untrusted feeds and
/// end up printed to terminals.
///
/// Returns `Cow::Borrowed` when there is nothing to strip.
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    if !s.chars().any(is_stripped_control) {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut state = Escape::None;
    for c in s.chars() {
        state = match (state, c) {
            (Escape::None, ESC) => Escape::Start,
            (Escape::None, c) => {
                if !is_stripped_control(c) {
                    out.push(c);
                }
                Escape::None
            }
            (Escape::Start, '[') => Escape::Csi,
            (Escape::Start, ']') => Escape::Osc,
            (Escape::Start, ESC) => Escape::Start,
            // Bare ESC: drop it and treat `c` as text
            (Escape::Start, c) => {
                if !is_stripped_control(c) {
                    out.push(c);
                }
                Escape::None
            }
            (Escape::Csi, '\u{40}'..='\u{7e}') => Escape::None,
            (Escape::Csi, _) => Escape::Csi,
            (Escape::Osc, BEL) => Escape::None,
            (Escape::Osc, ESC) => Escape::OscEsc,
            (Escape::Osc, _) => Escape::Osc,
            (Escape::OscEsc, '\\') => Escape::None,
            (Escape::OscEsc, _) => Escape::Osc,
        };
    }
    Cow::Owned(out)
}

/// Cuts `s` to at most `max_chars` characters. No ellipsis is added.
pub fn truncate_chars(s: &str, max_chars: usize) -> Cow<'_, str> {
    match s.char_indices().nth(max_chars) {
        Some((end, _)) => Cow::Owned(s[..end].to_owned()),
        None => Cow::Borrowed(s),
    }
}
