use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use serde::Serialize;
use std::io::Cursor;
use thiserror::Error;
use url::Url;

/// SEC-003: Maximum allowed nesting depth for OPML outline elements.
/// Prevents stack overflow attacks from maliciously crafted deeply nested OPMLs.
const MAX_OPML_DEPTH: usize = 50;

/// Errors that can occur while reading or writing OPML.
#[derive(Debug, Error)]
pub enum OpmlError {
    /// SEC-003: OPML nesting depth exceeds safety limit.
    #[error("OPML nesting depth exceeds maximum of {0} levels")]
    MaxDepthExceeded(usize),

    /// XML parsing failed.
    #[error("XML parse error: {0}")]
    XmlParse(String),

    /// XML serialization failed.
    #[error("Failed to write OPML: {0}")]
    Write(String),

    /// File I/O error.
    #[error("Failed to read OPML file: {0}")]
    Io(#[from] std::io::Error),
}

/// An OPML subscription list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Opml {
    pub version: String,
    pub title: String,
    /// Top-level outlines of `<body>`.
    pub outlines: Vec<Outline>,
}

/// One `<outline>`: a folder when it has no `xmlUrl`, a subscription otherwise.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Outline {
    pub text: String,
    pub title: String,
    /// The `type` attribute (`rss` for subscriptions written by us).
    pub kind: String,
    pub xml_url: String,
    pub html_url: String,
    pub outlines: Vec<Outline>,
}

impl Default for Opml {
    fn default() -> Self {
        Self::new()
    }
}

impl Opml {
    pub fn new() -> Self {
        Self {
            version: "1.0".to_string(),
            title: String::new(),
            outlines: Vec::new(),
        }
    }

    pub fn add(&mut self, outline: Outline) {
        self.outlines.push(outline);
    }

    /// Every subscription in the tree, depth first, in document order.
    pub fn subscriptions(&self) -> Vec<&Outline> {
        let mut found = Vec::new();
        for outline in &self.outlines {
            outline.collect_subscriptions(&mut found);
        }
        found
    }
}

impl Outline {
    pub fn folder(title: &str) -> Self {
        Self {
            text: title.to_string(),
            title: title.to_string(),
            ..Self::default()
        }
    }

    pub fn subscription(title: &str, xml_url: &str, html_url: &str) -> Self {
        Self {
            text: title.to_string(),
            title: title.to_string(),
            kind: "rss".to_string(),
            xml_url: xml_url.to_string(),
            html_url: html_url.to_string(),
            outlines: Vec::new(),
        }
    }

    pub fn is_folder(&self) -> bool {
        self.xml_url.is_empty()
    }

    pub fn is_subscription(&self) -> bool {
        !self.xml_url.is_empty()
    }

    pub fn add(&mut self, child: Outline) {
        self.outlines.push(child);
    }

    /// Display name: `title`, falling back to `text`, then to the feed URL.
    pub fn display_title(&self) -> &str {
        [&self.title, &self.text, &self.xml_url]
            .into_iter()
            .find(|s| !s.is_empty())
            .map(String::as_str)
            .unwrap_or_default()
    }

    fn collect_subscriptions<'a>(&'a self, found: &mut Vec<&'a Outline>) {
        if self.is_subscription() {
            found.push(self);
        }
        for child in &self.outlines {
            child.collect_subscriptions(found);
        }
    }
}

/// Reads and parses an OPML file.
///
/// # Security
///
/// - XXE (XML External Entity) attacks are mitigated because `quick-xml` (0.37) does not
///   parse `<!ENTITY>` declarations. Custom entities cause `EscapeError::UnrecognizedEntity`.
pub async fn parse_file(path: &str) -> Result<Opml, OpmlError> {
    let content = tokio::fs::read_to_string(path).await?;
    parse(&content)
}

/// Parses an OPML document into its outline tree.
///
/// Outlines whose `xmlUrl` is not an absolute http(s) URL are dropped with a
/// warning; their children are dropped with them.
pub fn parse(content: &str) -> Result<Opml, OpmlError> {
    // SEC-002: quick-xml (0.37) never parses <!ENTITY> declarations from DOCTYPE.
    // Only the 5 XML builtins resolve; custom entities like &xxe; fail in
    // `decode_and_unescape_value()` / `unescape()`.
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut opml = Opml::new();
    // Open outlines; `None` marks a skipped outline whose subtree is discarded
    let mut stack: Vec<Option<Outline>> = Vec::new();
    let mut in_head = false;
    let mut in_title = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"outline" => {
                    // SEC-003: Reject excessively nested OPMLs
                    if stack.len() >= MAX_OPML_DEPTH {
                        return Err(OpmlError::MaxDepthExceeded(MAX_OPML_DEPTH));
                    }
                    stack.push(read_outline(&e, &reader)?);
                }
                b"opml" => opml.version = attribute(&e, &reader, b"version")?.unwrap_or_default(),
                b"head" => in_head = true,
                b"title" if in_head => in_title = true,
                _ => {}
            },
            Ok(Event::Empty(e)) if e.name().as_ref() == b"outline" => {
                let outline = read_outline(&e, &reader)?;
                attach(&mut opml, &mut stack, outline);
            }
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"outline" => {
                    if let Some(outline) = stack.pop() {
                        attach(&mut opml, &mut stack, outline);
                    }
                }
                b"head" => in_head = false,
                b"title" => in_title = false,
                _ => {}
            },
            Ok(Event::Text(e)) if in_title => {
                let text = e.unescape().map_err(|e| OpmlError::XmlParse(e.to_string()))?;
                opml.title.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(OpmlError::XmlParse(e.to_string())),
            _ => {}
        }
    }

    Ok(opml)
}

fn attach(opml: &mut Opml, stack: &mut [Option<Outline>], outline: Option<Outline>) {
    let Some(outline) = outline else {
        return;
    };
    match stack.last_mut() {
        Some(Some(parent)) => parent.add(outline),
        // Parent was skipped
        Some(None) => {}
        None => opml.add(outline),
    }
}

fn attribute(
    e: &BytesStart<'_>,
    reader: &Reader<&[u8]>,
    name: &[u8],
) -> Result<Option<String>, OpmlError> {
    for attr in e.attributes().flatten() {
        if attr.key.as_ref() == name {
            let value = attr
                .decode_and_unescape_value(reader.decoder())
                .map_err(|e| OpmlError::XmlParse(e.to_string()))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

/// Reads an outline's attributes. `None` when its feed URL is unusable.
fn read_outline(e: &BytesStart<'_>, reader: &Reader<&[u8]>) -> Result<Option<Outline>, OpmlError> {
    let mut outline = Outline::default();

    for attr_result in e.attributes() {
        let attr = match attr_result {
            Ok(attr) => attr,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed OPML attribute");
                continue;
            }
        };
        let slot = match attr.key.as_ref() {
            b"text" => &mut outline.text,
            b"title" => &mut outline.title,
            b"type" => &mut outline.kind,
            b"xmlUrl" => &mut outline.xml_url,
            b"htmlUrl" => &mut outline.html_url,
            _ => continue,
        };
        *slot = attr
            .decode_and_unescape_value(reader.decoder())
            .map_err(|e| OpmlError::XmlParse(e.to_string()))?
            .trim()
            .to_string();
    }

    if outline.is_subscription() && !is_feed_url(&outline.xml_url) {
        tracing::warn!(url = %outline.xml_url, "Skipping OPML outline with invalid feed URL");
        return Ok(None);
    }
    if !outline.html_url.is_empty() && !is_feed_url(&outline.html_url) {
        tracing::warn!(url = %outline.html_url, "Ignoring invalid htmlUrl in OPML");
        outline.html_url.clear();
    }

    Ok(Some(outline))
}

fn is_feed_url(candidate: &str) -> bool {
    Url::parse(candidate)
        .map(|url| matches!(url.scheme(), "http" | "https") && url.has_host())
        .unwrap_or(false)
}

fn write(writer: &mut Writer<Cursor<Vec<u8>>>, event: Event<'_>) -> Result<(), OpmlError> {
    writer
        .write_event(event)
        .map_err(|e| OpmlError::Write(e.to_string()))
}

/// Serializes the tree as an OPML document.
pub fn export(opml: &Opml) -> Result<String, OpmlError> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

    write(&mut writer, Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut root = BytesStart::new("opml");
    root.push_attribute(("version", opml.version.as_str()));
    write(&mut writer, Event::Start(root))?;

    write(&mut writer, Event::Start(BytesStart::new("head")))?;
    write(&mut writer, Event::Start(BytesStart::new("title")))?;
    write(&mut writer, Event::Text(BytesText::new(&opml.title)))?;
    write(&mut writer, Event::End(BytesEnd::new("title")))?;
    write(&mut writer, Event::End(BytesEnd::new("head")))?;

    write(&mut writer, Event::Start(BytesStart::new("body")))?;
    for outline in &opml.outlines {
        write_outline(&mut writer, outline)?;
    }
    write(&mut writer, Event::End(BytesEnd::new("body")))?;
    write(&mut writer, Event::End(BytesEnd::new("opml")))?;

    String::from_utf8(writer.into_inner().into_inner())
        .map_err(|e| OpmlError::Write(e.to_string()))
}

fn write_outline(writer: &mut Writer<Cursor<Vec<u8>>>, outline: &Outline) -> Result<(), OpmlError> {
    let mut element = BytesStart::new("outline");
    element.push_attribute(("text", outline.text.as_str()));
    element.push_attribute(("title", outline.title.as_str()));
    for (key, value) in [
        ("type", &outline.kind),
        ("xmlUrl", &outline.xml_url),
        ("htmlUrl", &outline.html_url),
    ] {
        if !value.is_empty() {
            element.push_attribute((key, value.as_str()));
        }
    }

    if outline.outlines.is_empty() {
        return write(writer, Event::Empty(element));
    }
    write(writer, Event::Start(element))?;
    for child in &outline.outlines {
        write_outline(writer, child)?;
    }
    write(writer, Event::End(BytesEnd::new("outline")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_tree() {
        let content = r#"<?xml version="1.0" encoding="UTF-8"?>
<opml version="2.0">
  <head><title>Test Feeds</title></head>
  <body>
    <outline text="Blogs" title="Blogs">
      <outline type="rss" text="Example Blog" title="Example Blog" xmlUrl="https://example.com/feed.xml" htmlUrl="https://example.com"/>
      <outline type="rss" text="No HTML" xmlUrl="https://nohtml.com/rss"/>
    </outline>
    <outline type="rss" text="Top" xmlUrl="https://top.example/atom"/>
  </body>
</opml>"#;

        let opml = parse(content).unwrap();
        assert_eq!(opml.version, "2.0");
        assert_eq!(opml.title, "Test Feeds");
        assert_eq!(opml.outlines.len(), 2);

        let folder = &opml.outlines[0];
        assert!(folder.is_folder());
        assert_eq!(folder.outlines.len(), 2);
        assert_eq!(folder.outlines[0].html_url, "https://example.com");
        assert_eq!(folder.outlines[1].display_title(), "No HTML");

        let urls: Vec<_> = opml.subscriptions().iter().map(|o| o.xml_url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://example.com/feed.xml",
                "https://nohtml.com/rss",
                "https://top.example/atom"
            ]
        );
    }

    #[test]
    fn test_display_title_fallback() {
        let outline = Outline {
            xml_url: "https://notitle.com/feed".to_string(),
            ..Outline::default()
        };
        assert_eq!(outline.display_title(), "https://notitle.com/feed");
    }

    #[test]
    fn test_skip_invalid_scheme_feeds() {
        let content = r#"<?xml version="1.0"?>
    <opml version="2.0"><body>
        <outline xmlUrl="https://valid.com/feed"/>
        <outline xmlUrl="file:///etc/passwd"/>
        <outline xmlUrl="not a url"/>
        <outline xmlUrl="ftp://internal.server/feed"><outline xmlUrl="https://child.example/"/></outline>
    </body></opml>"#;

        let opml = parse(content).unwrap();
        let subscriptions = opml.subscriptions();
        assert_eq!(subscriptions.len(), 1);
        assert_eq!(subscriptions[0].xml_url, "https://valid.com/feed");
    }

    #[test]
    fn test_invalid_html_url_cleared() {
        let content = r#"<opml><body><outline xmlUrl="https://a.example/" htmlUrl="javascript:alert(1)"/></body></opml>"#;
        let opml = parse(content).unwrap();
        assert_eq!(opml.outlines[0].html_url, "");
    }

    #[test]
    fn test_malformed_xml_error() {
        assert!(parse("<opml><body></opml>").is_err());
    }

    #[test]
    fn test_xxe_entity_not_expanded() {
        let malicious_opml = r#"<?xml version="1.0"?>
<!DOCTYPE opml [<!ENTITY xxe SYSTEM "file:///etc/passwd">]>
<opml version="2.0">
    <body>
        <outline text="&xxe;" xmlUrl="https://example.com/feed.xml"/>
    </body>
</opml>"#;

        match parse(malicious_opml) {
            Ok(opml) => {
                for outline in opml.subscriptions() {
                    assert!(!outline.text.contains("root:"), "XXE expansion detected");
                }
            }
            Err(_) => {
                // Rejection (UnrecognizedEntity) is the expected behavior
            }
        }
    }

    #[test]
    fn test_xxe_internal_entity_not_expanded() {
        let content = r#"<?xml version="1.0"?>
<!DOCTYPE opml [<!ENTITY internal "EXPANDED_VALUE">]>
<opml version="2.0">
    <body>
        <outline text="&internal;" xmlUrl="https://example.com/feed.xml"/>
    </body>
</opml>"#;

        if let Ok(opml) = parse(content) {
            for outline in opml.subscriptions() {
                assert!(!outline.text.contains("EXPANDED_VALUE"));
            }
        }
    }

    #[test]
    fn test_deeply_nested_opml_rejected() {
        let mut opml = String::from(r#"<?xml version="1.0"?><opml version="2.0"><body>"#);
        opml.push_str(&r#"<outline text="level">"#.repeat(100));
        opml.push_str(&"</outline>".repeat(100));
        opml.push_str("</body></opml>");

        let err = parse(&opml).unwrap_err();
        assert!(matches!(err, OpmlError::MaxDepthExceeded(50)), "{err}");
    }

    #[test]
    fn test_nesting_at_depth_limit_allowed() {
        let mut opml = String::from(r#"<?xml version="1.0"?><opml version="2.0"><body>"#);
        opml.push_str(&r#"<outline text="level">"#.repeat(50));
        opml.push_str(r#"<outline text="Deep Feed" xmlUrl="https://deep.example.com/feed"/>"#);
        opml.push_str(&"</outline>".repeat(50));
        opml.push_str("</body></opml>");

        let parsed = parse(&opml).unwrap();
        let subscriptions = parsed.subscriptions();
        assert_eq!(subscriptions.len(), 1);
        assert_eq!(subscriptions[0].display_title(), "Deep Feed");
    }

    #[test]
    fn test_export_and_reparse() {
        let mut opml = Opml::new();
        opml.title = "Reading <list> & more".to_string();
        let mut folder = Outline::folder("News");
        folder.add(Outline::subscription(
            "Feed with <special> & \"chars\"",
            "https://example.com/feed?a=1&b=2",
            "https://example.com",
        ));
        opml.add(folder);
        opml.add(Outline::subscription("Solo", "https://solo.example/rss", ""));

        let exported = export(&opml).unwrap();
        assert!(exported.starts_with("<?xml"));
        let parsed = parse(&exported).unwrap();
        assert_eq!(parsed, opml);
    }

    #[test]
    fn test_export_empty() {
        let exported = export(&Opml::new()).unwrap();
        assert!(exported.contains("<body"));
        assert!(parse(&exported).unwrap().outlines.is_empty());
    }

    #[tokio::test]
    async fn test_parse_file() {
        let path = std::env::temp_dir().join(format!("feedstock-opml-{}.opml", std::process::id()));
        std::fs::write(
            &path,
            r#"<opml version="1.0"><body><outline text="A" xmlUrl="https://a.example/feed"/></body></opml>"#,
        )
        .unwrap();

        let opml = parse_file(path.to_str().unwrap()).await.unwrap();
        assert_eq!(opml.subscriptions().len(), 1);

        let _ = std::fs::remove_file(&path);
        assert!(matches!(
            parse_file(path.to_str().unwrap()).await,
            Err(OpmlError::Io(_))
        ));
    }
}
