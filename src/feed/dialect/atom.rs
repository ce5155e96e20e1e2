use super::{clean, Diagnostics, FieldLocation, Link, Marshaled};
use crate::feed::model::{Dialect, Entry, Feed, Media};
use crate::feed::time::TimeFormat;
use crate::feed::xml::Element;

const ATOM_TIME_FORMATS: &[TimeFormat] = &[TimeFormat::Rfc3339, TimeFormat::Date("%B %d, %Y")];

#[derive(Debug, Default)]
pub(crate) struct AtomFeed {
    title: String,
    subtitle: String,
    updated: String,
    links: Vec<Link>,
    entries: Vec<AtomEntry>,
}

#[derive(Debug, Default)]
struct AtomEntry {
    id: String,
    published: String,
    updated: String,
    title: String,
    content: String,
    summary: String,
    author: String,
    links: Vec<Link>,
}

/// Text construct (`title`, `content`, `summary`). XHTML keeps its markup;
/// `text` and `html` carry it escaped, so the unescaped character data is
/// already the value.
fn text_construct(element: Option<&Element>, source: &[u8]) -> String {
    let Some(element) = element else {
        return String::new();
    };
    match element.attr("type") {
        Some("xhtml") => element.inner_markup(source).trim().to_owned(),
        _ => element.trimmed_text(),
    }
}

/// A missing `rel` means `alternate` (RFC 4287 §4.2.7.2).
fn rel_tokens(link: &Link) -> impl Iterator<Item = &str> {
    let implicit = link.rel.trim().is_empty().then_some("alternate");
    implicit.into_iter().chain(link.rels())
}

impl AtomFeed {
    pub fn decode(root: &Element, source: &[u8]) -> Self {
        AtomFeed {
            title: text_construct(root.child("title"), source),
            subtitle: text_construct(root.child("subtitle"), source),
            updated: root.child_text("updated"),
            links: root.children_named("link").map(Link::from_element).collect(),
            entries: root
                .children_named("entry")
                .map(|entry| AtomEntry::decode(entry, source))
                .collect(),
        }
    }

    pub fn marshal(self) -> Marshaled {
        let mut diagnostics = Diagnostics::default();
        let mut feed = Feed::new(Dialect::Atom);

        feed.title = clean(&self.title);
        feed.description = clean(&self.subtitle);
        feed.updated = diagnostics.time(FieldLocation::Feed, "updated", ATOM_TIME_FORMATS, &self.updated);

        // The first recognized rel token decides what a link is
        for link in &self.links {
            let role = rel_tokens(link).find(|rel| matches!(*rel, "alternate" | "self" | "hub"));
            match role {
                Some("alternate") => feed.www_url = link.href.clone(),
                Some("self") => feed.topic = Some(link.href.clone()),
                Some("hub") => feed.hub_url = Some(link.href.clone()),
                _ => {}
            }
        }

        feed.entries = self
            .entries
            .into_iter()
            .enumerate()
            .map(|(index, entry)| entry.marshal(FieldLocation::Entry(index), &mut diagnostics))
            .collect();

        diagnostics.finish(feed)
    }
}

impl AtomEntry {
    fn decode(entry: &Element, source: &[u8]) -> Self {
        AtomEntry {
            id: entry.child_text("id"),
            published: entry.child_text("published"),
            updated: entry.child_text("updated"),
            title: text_construct(entry.child("title"), source),
            content: text_construct(entry.child("content"), source),
            summary: text_construct(entry.child("summary"), source),
            author: entry
                .child("author")
                .map(|author| author.child_text("name"))
                .unwrap_or_default(),
            links: entry.children_named("link").map(Link::from_element).collect(),
        }
    }

    fn marshal(self, location: FieldLocation, diagnostics: &mut Diagnostics) -> Entry {
        let mut www_url = String::new();
        let mut media = Vec::new();
        for link in self.links {
            if link.rels().any(|rel| rel == "enclosure") {
                if !link.href.is_empty() {
                    media.push(Media {
                        url: link.href,
                        mime_type: link.mime_type,
                        title: link.title,
                    });
                }
                continue;
            }
            // First link unless an explicit alternate comes along
            if www_url.is_empty() || link.rel == "alternate" {
                www_url = link.href;
            }
        }

        let content = if self.content.is_empty() {
            self.summary
        } else {
            self.content
        };

        let mut published = diagnostics.time(location, "published", ATOM_TIME_FORMATS, &self.published);
        let mut updated = published;
        if !self.updated.trim().is_empty() {
            updated = diagnostics.time(location, "updated", ATOM_TIME_FORMATS, &self.updated);
            // Some feeds (web comics mostly) only ever fill in <updated>
            if published.is_none() {
                published = updated;
            }
        }

        let mut entry = Entry {
            guid: self.id,
            author: clean(&self.author),
            title: clean(&self.title),
            content,
            published,
            updated,
            www_url,
            media,
            ..Entry::default()
        };
        entry.order_timestamps();
        entry
    }
}
