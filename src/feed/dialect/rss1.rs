use super::{clean, Diagnostics, FieldLocation, Link, Marshaled};
use crate::feed::model::{Dialect, Entry, Feed};
use crate::feed::time::TimeFormat;
use crate::feed::xml::Element;

const RSS1_NAMESPACE: &str = "http://purl.org/rss/1.0/";
const DC_NAMESPACE: &str = "http://purl.org/dc/elements/1.1/";
const CONTENT_NAMESPACE: &str = "http://purl.org/rss/1.0/modules/content/";

const RSS1_TIME_FORMATS: &[TimeFormat] = &[
    TimeFormat::Zoned("%Y-%m-%dT%H:%M%:z"),
    TimeFormat::Zoned("%Y-%m-%dT%H:%M:%S%.f%:z"),
    TimeFormat::Date("%Y-%m-%d"),
    // W3CDTF allows a literal `Z` for UTC
    TimeFormat::Naive("%Y-%m-%dT%H:%MZ"),
    TimeFormat::Naive("%Y-%m-%dT%H:%M:%S%.fZ"),
];

/// `rdf:RDF` document: one `channel`, with items as siblings of the channel.
#[derive(Debug, Default)]
pub(crate) struct Rss1Feed {
    title: String,
    description: String,
    updated: String,
    links: Vec<Link>,
    items: Vec<Rss1Item>,
}

#[derive(Debug, Default)]
struct Rss1Item {
    guid: String,
    published: String,
    title: String,
    link: String,
    author: String,
    encoded_content: String,
    description: String,
}

impl Rss1Feed {
    pub fn decode(root: &Element) -> Self {
        let mut native = Rss1Feed::default();

        if let Some(channel) = root.child("channel") {
            native.title = channel.child_text("title");
            native.description = channel.child_text("description");
            native.updated = channel.child_text("date");
            native.links = channel.children_named("link").map(Link::from_element).collect();
        }

        native.items = root
            .children_named("item")
            .map(|item| Rss1Item {
                guid: item.child_text("guid"),
                published: item.child_text_ns(DC_NAMESPACE, "date"),
                title: item.child_text("title"),
                link: item.child_text("link"),
                author: item.child_text_ns(DC_NAMESPACE, "creator"),
                encoded_content: item.child_text_ns(CONTENT_NAMESPACE, "encoded"),
                description: item.child_text("description"),
            })
            .collect();

        native
    }

    pub fn marshal(self) -> Marshaled {
        let mut diagnostics = Diagnostics::default();
        let mut feed = Feed::new(Dialect::Rss1);

        feed.title = clean(&self.title);
        feed.description = clean(&self.description);
        feed.updated = diagnostics.time(FieldLocation::Feed, "date", RSS1_TIME_FORMATS, &self.updated);

        // Only the core-namespace link is the website; last one wins
        if let Some(link) = self
            .links
            .iter()
            .rev()
            .find(|l| l.namespace.as_deref() == Some(RSS1_NAMESPACE))
        {
            feed.www_url = link.text.clone();
        }

        feed.entries = self
            .items
            .into_iter()
            .enumerate()
            .map(|(index, item)| item.marshal(FieldLocation::Entry(index), &mut diagnostics))
            .collect();

        diagnostics.finish(feed)
    }
}

impl Rss1Item {
    fn marshal(self, location: FieldLocation, diagnostics: &mut Diagnostics) -> Entry {
        let content = if self.encoded_content.is_empty() {
            self.description
        } else {
            self.encoded_content
        };

        // RSS1 has no per-item "updated"
        Entry {
            guid: self.guid,
            author: clean(&self.author),
            title: clean(&self.title),
            content,
            published: diagnostics.time(location, "dc:date", RSS1_TIME_FORMATS, &self.published),
            updated: None,
            www_url: self.link,
            ..Entry::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::xml::decode;
    use chrono::{TimeZone, Utc};

    const SAMPLE: &str = r#"<?xml version="1.0"?>
<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"
         xmlns="http://purl.org/rss/1.0/"
         xmlns:dc="http://purl.org/dc/elements/1.1/"
         xmlns:content="http://purl.org/rss/1.0/modules/content/"
         xmlns:foo="http://example.com/foo">
  <channel rdf:about="http://example.org/">
    <title>RDF Site</title>
    <link>http://example.org/</link>
    <foo:link>http://example.org/not-this</foo:link>
    <description>About things</description>
    <dc:date>2004-05-06T07:08+02:00</dc:date>
  </channel>
  <item rdf:about="http://example.org/1">
    <title>First</title>
    <link>http://example.org/1</link>
    <description>plain</description>
    <content:encoded><![CDATA[<p>rich</p>]]></content:encoded>
    <dc:creator>Ann</dc:creator>
    <dc:date>2004-05-06</dc:date>
  </item>
  <item rdf:about="http://example.org/2">
    <title>Second</title>
    <link>http://example.org/2</link>
    <description>only plain</description>
    <dc:date>sometime</dc:date>
  </item>
</rdf:RDF>"#;

    fn marshal_sample() -> Marshaled {
        let root = decode(SAMPLE.as_bytes(), 64).unwrap();
        Rss1Feed::decode(&root).marshal()
    }

    #[test]
    fn test_feed_fields() {
        let feed = marshal_sample().feed;
        assert_eq!(feed.title, "RDF Site");
        assert_eq!(feed.description, "About things");
        assert_eq!(feed.www_url, "http://example.org/");
        assert_eq!(feed.dialect, Dialect::Rss1);
        assert_eq!(
            feed.updated,
            Some(Utc.with_ymd_and_hms(2004, 5, 6, 5, 8, 0).unwrap())
        );
    }

    #[test]
    fn test_entries_prefer_encoded_content() {
        let feed = marshal_sample().feed;
        assert_eq!(feed.entries.len(), 2);
        assert_eq!(feed.entries[0].content, "<p>rich</p>");
        assert_eq!(feed.entries[0].author, "Ann");
        assert_eq!(feed.entries[1].content, "only plain");
    }

    #[test]
    fn test_entries_have_no_updated() {
        let feed = marshal_sample().feed;
        assert_eq!(
            feed.entries[0].published,
            Some(Utc.with_ymd_and_hms(2004, 5, 6, 0, 0, 0).unwrap())
        );
        assert_eq!(feed.entries[0].updated, None);
    }

    #[test]
    fn test_bad_entry_date_is_recorded_not_fatal() {
        let marshaled = marshal_sample();
        assert_eq!(marshaled.feed.entries[1].published, None);
        assert_eq!(marshaled.errors.len(), 1);
        assert_eq!(marshaled.errors[0].location, FieldLocation::Entry(1));
    }

    #[test]
    fn test_link_outside_core_namespace_ignored() {
        let doc = r#"<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#">
            <channel><title>T</title><link>http://no-namespace.example/</link></channel>
        </rdf:RDF>"#;
        let root = decode(doc.as_bytes(), 64).unwrap();
        let feed = Rss1Feed::decode(&root).marshal().feed;
        assert_eq!(feed.www_url, "");
    }
}
