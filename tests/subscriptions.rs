//! OPML import/export and feed autodiscovery through the public API.

use pretty_assertions::assert_eq;

use feedstock::feed::opml::{self, Opml, Outline};
use feedstock::feed::{extract_feed_link, OpmlError};

const SUBSCRIPTIONS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<opml version="2.0">
  <head><title>My feeds</title></head>
  <body>
    <outline text="News">
      <outline text="Example" type="rss" xmlUrl="https://example.com/feed.xml" htmlUrl="https://example.com/"/>
      <outline text="Local file" type="rss" xmlUrl="file:///etc/passwd"/>
    </outline>
    <outline title="Top level" type="rss" xmlUrl="http://top.example.org/rss"/>
  </body>
</opml>"#;

#[test]
fn test_opml_subscriptions_in_document_order() {
    let parsed = opml::parse(SUBSCRIPTIONS).unwrap();
    assert_eq!(parsed.title, "My feeds");

    let urls: Vec<_> = parsed.subscriptions().iter().map(|o| o.xml_url.as_str()).collect();
    assert_eq!(urls, ["https://example.com/feed.xml", "http://top.example.org/rss"]);

    assert!(parsed.outlines[0].is_folder());
    assert_eq!(parsed.outlines[1].display_title(), "Top level");
}

#[test]
fn test_opml_export_round_trip() {
    let mut news = Outline::folder("News");
    news.add(Outline::subscription(
        "Rust & Friends",
        "https://example.com/feed?a=1&b=2",
        "https://example.com/",
    ));
    let mut list = Opml::new();
    list.title = "Exported".to_string();
    list.add(news);

    let xml = opml::export(&list).unwrap();
    assert_eq!(opml::parse(&xml).unwrap(), list);
}

#[test]
fn test_opml_rejects_entity_declarations() {
    let xxe = r#"<?xml version="1.0"?>
<!DOCTYPE opml [<!ENTITY xxe SYSTEM "file:///etc/passwd">]>
<opml version="2.0"><head><title>&xxe;</title></head><body/></opml>"#;
    assert!(matches!(opml::parse(xxe), Err(OpmlError::XmlParse(_))));
}

#[tokio::test]
async fn test_opml_parse_file_missing() {
    let result = opml::parse_file("/tmp/feedstock_missing_subscriptions.opml").await;
    assert!(matches!(result, Err(OpmlError::Io(_))));
}

#[test]
fn test_discovery_resolves_relative_link() {
    let html = r#"<!doctype html><html><head>
        <link rel="alternate" type="application/atom+xml" href="/atom.xml">
    </head><body></body></html>"#;
    assert_eq!(
        extract_feed_link("https://blog.example.com/2024/01/post.html", html).unwrap(),
        Some("https://blog.example.com/atom.xml".to_string())
    );
}

#[test]
fn test_discovery_without_feed() {
    assert_eq!(
        extract_feed_link("https://example.com/", "<html><head></head></html>").unwrap(),
        None
    );
}
