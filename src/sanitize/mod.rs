//! Streaming HTML-to-text sanitizer.
//!
//! [`strip_unsafe`] is a single left-to-right scan driven by a stack of
//! context frames. It is not an HTML parser: it only knows enough about
//! tags, attributes, comments and script bodies to decide which bytes are
//! character data of an allow-listed element. Those bytes are copied to the
//! output; everything else, including the tags themselves, is dropped.
//!
//! Element classification:
//!
//! - allow-listed inline and structural elements (`p`, `b`, `a`, `li`, ...)
//!   have their text kept
//! - `script` bodies are skipped with a small JavaScript-aware scanner, so a
//!   `</script>` inside a string or comment does not end the element
//! - every other element has its text dropped until it is closed
//!
//! Malformed input never fails; an unterminated tag, comment or script simply
//! swallows the rest of the document.

mod stack;

use stack::{ContentClass, Context, ContextStack};

/// Longest allow-listed tag name (`blockquote`).
const LONGEST_TAG: usize = 10;

/// Classifies an element by name, case-insensitively. Unknown elements are
/// unsafe.
fn content_for_tag(tag: &str) -> ContentClass {
    let mut lower = [0u8; LONGEST_TAG];
    let Some(name) = lower.get_mut(..tag.len()) else {
        return ContentClass::UnsafeText;
    };
    name.copy_from_slice(tag.as_bytes());
    name.make_ascii_lowercase();

    match &*name {
        b"a" | b"address" | b"em" | b"strong" | b"b" | b"i" | b"big" | b"small" | b"sub"
        | b"sup" | b"cite" | b"code" | b"ol" | b"ul" | b"li" | b"dl" | b"lh" | b"dt" | b"dd"
        | b"p" | b"th" | b"td" | b"pre" | b"blockquote" | b"h1" | b"h2" | b"h3" | b"h4"
        | b"h5" | b"h6" | b"div" | b"span" | b"ins" | b"del" => ContentClass::SafeText,
        b"script" => ContentClass::Script,
        _ => ContentClass::UnsafeText,
    }
}

/// Strips all markup from `html`, keeping only the text of allow-listed
/// elements.
///
/// The result never contains a script body, the text of a non-allow-listed
/// element, or anything that would be read as a tag or comment opener.
/// Running it over its own output returns that output unchanged.
pub fn strip_unsafe(html: &str) -> String {
    Scanner::new(html).run()
}

struct Scanner<'a> {
    html: &'a str,
    bytes: &'a [u8],
    pos: usize,
    stack: ContextStack<'a>,
    out: SafeText,
}

impl<'a> Scanner<'a> {
    fn new(html: &'a str) -> Self {
        Self {
            html,
            bytes: html.as_bytes(),
            pos: 0,
            stack: ContextStack::new(),
            out: SafeText::with_capacity(html.len()),
        }
    }

    fn run(mut self) -> String {
        while self.pos < self.bytes.len() {
            let context = self.stack.peek();
            match context.content {
                ContentClass::SafeText | ContentClass::UnsafeText => self.text(context),
                ContentClass::Tag => self.tag(context),
                ContentClass::Comment => self.comment(),
                ContentClass::Script => self.script(context),
            }
        }
        self.out.into_string()
    }

    fn find(&self, from: usize, needle: &[u8]) -> Option<usize> {
        self.bytes
            .get(from..)?
            .windows(needle.len())
            .position(|window| window == needle)
            .map(|offset| from + offset)
    }

    fn find_byte(&self, from: usize, matches: impl Fn(u8) -> bool) -> Option<usize> {
        self.bytes
            .get(from..)?
            .iter()
            .position(|&b| matches(b))
            .map(|offset| from + offset)
    }

    fn is_letter_at(&self, at: usize) -> bool {
        self.bytes.get(at).is_some_and(u8::is_ascii_alphabetic)
    }

    /// End of a tag name that starts at `start` (a letter).
    fn name_end(&self, start: usize) -> usize {
        self.find_byte(start, |b| !b.is_ascii_alphanumeric())
            .unwrap_or(self.bytes.len())
    }

    /// Reads `</name ...>` at `pos`, returning the name and the position
    /// after `>`.
    fn closing_tag(&self, at: usize) -> (&'a str, usize) {
        let html: &'a str = self.html;
        let start = at + 2;
        let end = self.name_end(start);
        let name = &html[start..end];
        let after = self
            .find_byte(end, |b| b == b'>')
            .map_or(self.bytes.len(), |gt| gt + 1);
        (name, after)
    }

    fn text(&mut self, context: Context<'a>) {
        let html: &'a str = self.html;
        let start = self.pos;
        let lt = self
            .find_byte(start, |b| b == b'<')
            .unwrap_or(self.bytes.len());

        if context.content == ContentClass::SafeText {
            self.out.push(&html[start..lt]);
        }
        self.pos = lt;
        if lt == self.bytes.len() {
            return;
        }

        if self.bytes[lt..].starts_with(b"<!--") {
            self.stack.push(Context::new(ContentClass::Comment, ""));
            self.pos = lt + 4;
        } else if self.is_letter_at(lt + 1) {
            let end = self.name_end(lt + 1);
            self.stack
                .push(Context::new(ContentClass::Tag, &html[lt + 1..end]));
            self.pos = end;
        } else if self.bytes.get(lt + 1) == Some(&b'/') && self.is_letter_at(lt + 2) {
            let (name, after) = self.closing_tag(lt);
            // Closing something that is not open is ignored
            self.stack.close(name);
            self.pos = after;
        } else {
            // A lone `<` is text
            if context.content == ContentClass::SafeText {
                self.out.push("<");
            }
            self.pos = lt + 1;
        }
    }

    fn tag(&mut self, context: Context<'a>) {
        let Some(at) = self.find_byte(self.pos, |b| matches!(b, b'"' | b'\'' | b'>')) else {
            self.pos = self.bytes.len();
            return;
        };

        let b = self.bytes[at];
        if b == b'>' {
            self.stack.pop();
            let self_closing = self.bytes[at - 1] == b'/';
            if !self_closing {
                self.stack
                    .push(Context::new(content_for_tag(context.tag), context.tag));
            }
            self.pos = at + 1;
        } else {
            // Attribute values are skipped whole, `>` included
            self.pos = self
                .find_byte(at + 1, |q| q == b)
                .map_or(self.bytes.len(), |close| close + 1);
        }
    }

    fn comment(&mut self) {
        match self.find(self.pos, b"-->") {
            Some(at) => {
                self.stack.pop();
                self.pos = at + 3;
            }
            None => self.pos = self.bytes.len(),
        }
    }

    /// Skips one JavaScript construct, or one byte.
    fn script(&mut self, context: Context<'a>) {
        let at = self.pos;
        let b = self.bytes[at];
        let next = self.bytes.get(at + 1).copied();

        self.pos = match (b, next) {
            (b'/', Some(b'/')) => self
                .find_byte(at + 2, |c| c == b'\n')
                .unwrap_or(self.bytes.len()),
            (b'/', Some(b'*')) => self
                .find(at + 2, b"*/")
                .map_or(self.bytes.len(), |end| end + 2),
            (b'"' | b'\'', _) => self.literal_end(at, |c| c == b),
            // Regular expression (or a division): never spans lines
            (b'/', _) => self.literal_end(at, |c| c == b'/' || c == b'\n'),
            (b'<', Some(b'/')) if self.is_letter_at(at + 2) => {
                let (name, after) = self.closing_tag(at);
                if context.is_tag(name) {
                    self.stack.pop();
                }
                after
            }
            _ => at + 1,
        };
    }

    /// Position after a quoted literal opened at `open`, honoring backslash
    /// escapes.
    fn literal_end(&self, open: usize, closes: impl Fn(u8) -> bool) -> usize {
        let mut i = open + 1;
        while i < self.bytes.len() {
            match self.bytes[i] {
                b'\\' => i += 2,
                c if closes(c) => return i + 1,
                _ => i += 1,
            }
        }
        self.bytes.len()
    }
}

/// Sanitizer output, assembled from safe-text spans.
///
/// Two spans that were apart in the input can meet in the output as `<` +
/// `b>`. Such a join would be read as markup by the next pass, so the `<` is
/// written as `&lt;` instead.
struct SafeText {
    text: String,
}

impl SafeText {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            text: String::with_capacity(capacity),
        }
    }

    fn push(&mut self, span: &str) {
        if span.is_empty() {
            return;
        }
        if let Some(lt) = self.trailing_lt() {
            let mut joined = [0u8; 8];
            let tail = &self.text.as_bytes()[lt..];
            let head = &span.as_bytes()[..span.len().min(4)];
            joined[..tail.len()].copy_from_slice(tail);
            joined[tail.len()..tail.len() + head.len()].copy_from_slice(head);
            if opens_markup(&joined[..tail.len() + head.len()]) {
                self.text.replace_range(lt..lt + 1, "&lt;");
            }
        }
        self.text.push_str(span);
    }

    /// Position of a `<` among the last three output bytes: the only place a
    /// join can complete an opener.
    fn trailing_lt(&self) -> Option<usize> {
        let from = self.text.len().saturating_sub(3);
        self.text.as_bytes()[from..]
            .iter()
            .rposition(|&b| b == b'<')
            .map(|offset| from + offset)
    }

    fn into_string(self) -> String {
        self.text
    }
}

/// `<letter`, `</letter` or `<!--` at the start of `bytes`.
fn opens_markup(bytes: &[u8]) -> bool {
    match bytes {
        [b'<', c, ..] if c.is_ascii_alphabetic() => true,
        [b'<', b'/', c, ..] if c.is_ascii_alphabetic() => true,
        _ => bytes.starts_with(b"<!--"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn test_script_body_removed() {
        assert_eq!(
            strip_unsafe("<p>hello <script>alert(1)</script> world</p>"),
            "hello  world"
        );
    }

    #[test]
    fn test_nested_safe_tags() {
        assert_eq!(strip_unsafe("<b>bold <i>and italic</i></b>"), "bold and italic");
    }

    #[test]
    fn test_plain_text_untouched() {
        assert_eq!(strip_unsafe("just text, 3 < 4 & 5 > 2"), "just text, 3 < 4 & 5 > 2");
        assert_eq!(strip_unsafe(""), "");
    }

    #[test]
    fn test_unlisted_element_text_dropped() {
        assert_eq!(strip_unsafe("a<style>p { color: red }</style>b"), "ab");
        assert_eq!(strip_unsafe("<p>x<font>hidden</font>y</p>"), "xy");
    }

    #[test]
    fn test_safe_element_inside_unsafe_element() {
        assert_eq!(
            strip_unsafe("<html><body><p>kept</p>dropped</body></html>tail"),
            "kepttail"
        );
    }

    #[test]
    fn test_headings_and_case() {
        assert_eq!(strip_unsafe("<H2>Title</H2><DIV>Body</div>"), "TitleBody");
    }

    #[test]
    fn test_attributes_skipped() {
        assert_eq!(
            strip_unsafe(r#"<a href="x>y" title='a"b'>link</a> done"#),
            "link done"
        );
    }

    #[test]
    fn test_self_closing_unknown_tag_keeps_context() {
        assert_eq!(strip_unsafe("<p>one<br/>two</p>"), "onetwo");
        // Not self-closed: the rest of the paragraph belongs to `br`
        assert_eq!(strip_unsafe("<p>one<br>two</p>three"), "onethree");
    }

    #[test]
    fn test_mismatched_close_ignored() {
        assert_eq!(strip_unsafe("<b>a</i>b</b>c"), "abc");
    }

    #[test]
    fn test_close_pops_through_unclosed_children() {
        assert_eq!(strip_unsafe("<div><span>a<em>b</div>c"), "abc");
        assert_eq!(strip_unsafe("<div><object>x</div>y"), "y");
    }

    #[test]
    fn test_comments_removed() {
        assert_eq!(strip_unsafe("a<!-- <b>not</b> > -->b"), "ab");
        assert_eq!(strip_unsafe("a<!-- never closed <p>x</p>"), "a");
    }

    #[test]
    fn test_script_strings_and_comments() {
        let html = r#"x<script>
            var s = "</script>"; // </script>
            /* </script> */ var t = '<\/script>';
            var r = /<\/script>/;
        </script>y"#;
        assert_eq!(strip_unsafe(html), "xy");
    }

    #[test]
    fn test_script_only_closed_by_script() {
        assert_eq!(strip_unsafe("<script>a</b>c</SCRIPT>d"), "d");
    }

    #[test]
    fn test_unterminated_markup_swallows_rest() {
        assert_eq!(strip_unsafe("text <b class=\"open"), "text ");
        assert_eq!(strip_unsafe("text <script>var x = 1;"), "text ");
        assert_eq!(strip_unsafe("text <p"), "text ");
    }

    #[test]
    fn test_lone_lt_is_text() {
        assert_eq!(strip_unsafe("a <- b"), "a <- b");
        assert_eq!(strip_unsafe("x<"), "x<");
        assert_eq!(strip_unsafe("<1>"), "<1>");
    }

    #[test]
    fn test_joined_spans_do_not_form_markup() {
        assert_eq!(strip_unsafe("<<b>script>alert(1)"), "&lt;script>alert(1)");
        assert_eq!(strip_unsafe("<</i>/b>"), "&lt;/b>");
        assert_eq!(strip_unsafe("<!<i>--x"), "&lt;!--x");
        assert_eq!(strip_unsafe("a<<i></i>!-<i></i>-x"), "a&lt;!--x");
    }

    #[test]
    fn test_multibyte_text_preserved() {
        assert_eq!(strip_unsafe("<p>caf\u{e9} \u{1f600}</p><\u{e9}"), "caf\u{e9} \u{1f600}<\u{e9}");
    }

    #[test]
    fn test_content_for_tag() {
        assert_eq!(content_for_tag("BLOCKQUOTE"), ContentClass::SafeText);
        assert_eq!(content_for_tag("h6"), ContentClass::SafeText);
        assert_eq!(content_for_tag("Script"), ContentClass::Script);
        assert_eq!(content_for_tag("iframe"), ContentClass::UnsafeText);
        assert_eq!(content_for_tag("blockquotes"), ContentClass::UnsafeText);
    }

    fn html_fragment() -> impl Strategy<Value = String> {
        let piece = prop_oneof![
            Just("<".to_string()),
            Just(">".to_string()),
            Just("/".to_string()),
            Just("!".to_string()),
            Just("-".to_string()),
            Just("\"".to_string()),
            Just("'".to_string()),
            Just("<p>".to_string()),
            Just("</p>".to_string()),
            Just("<b>".to_string()),
            Just("</b>".to_string()),
            Just("<script>".to_string()),
            Just("</script>".to_string()),
            Just("<!--".to_string()),
            Just("-->".to_string()),
            Just("<br/>".to_string()),
            "[a-z ]{0,4}",
            "\\PC{0,3}",
        ];
        prop::collection::vec(piece, 0..24).prop_map(|pieces| pieces.concat())
    }

    proptest! {
        #[test]
        fn prop_idempotent(html in html_fragment()) {
            let once = strip_unsafe(&html);
            prop_assert_eq!(strip_unsafe(&once), once);
        }

        #[test]
        fn prop_idempotent_arbitrary(html in "\\PC{0,64}") {
            let once = strip_unsafe(&html);
            prop_assert_eq!(strip_unsafe(&once), once);
        }

        #[test]
        fn prop_no_script_body(prefix in "[a-z ]{0,8}", body in "[a-z0-9();=]{1,16}", suffix in "[a-z ]{0,8}") {
            let html = format!("<p>{prefix}<script>SECRET{body}</script>{suffix}</p>");
            let out = strip_unsafe(&html);
            prop_assert!(!out.contains("SECRET"));
            prop_assert!(!out.to_ascii_lowercase().contains("<script"));
            prop_assert_eq!(out, format!("{prefix}{suffix}"));
        }

        #[test]
        fn prop_output_has_no_openers(html in html_fragment()) {
            let out = strip_unsafe(&html);
            let bytes = out.as_bytes();
            for i in 0..bytes.len() {
                prop_assert!(!opens_markup(&bytes[i..]), "opener at {} in {:?}", i, out);
            }
        }
    }
}
