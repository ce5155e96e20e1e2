use chrono::{DateTime, Utc};

use super::{clean, hub_link_role, Diagnostics, FieldLocation, Link, Marshaled};
use crate::feed::model::{Dialect, Entry, Feed, Media, ATOM_NAMESPACE};
use crate::feed::time::{parse_time, TimeError, TimeFormat};
use crate::feed::xml::Element;

const CONTENT_NAMESPACE: &str = "http://purl.org/rss/1.0/modules/content/";

const RSS2_TIME_FORMATS: &[TimeFormat] = &[
    TimeFormat::Zoned("%a, %d %b %Y %H:%M:%S %z"),
    TimeFormat::Zoned("%Y-%m-%dT%H:%M:%S%.f%:z"),
    TimeFormat::Naive("%a, %d %b %Y %H:%M:%S Z"),
    TimeFormat::Naive("%a, %d %b %Y %H:%M:%S"),
    TimeFormat::Zoned("%d %b %Y %H:%M:%S %z"),
    TimeFormat::Zoned("%a, %d %b %Y %H:%M %z"),
];

/// Layout tried once a trailing ` GMT` / ` UTC` has been cut off.
const RSS2_UTC_SUFFIX_FORMAT: TimeFormat = TimeFormat::Naive("%a, %d %b %Y %H:%M:%S");

/// North American zone abbreviations (plus CHST and CET) and their fixed
/// offsets. Matched by substring in this order, first hit only; other
/// regions' abbreviations are not recognized.
const TIMEZONE_OFFSETS: &[(&str, &str)] = &[
    ("AST", "-0400"),
    ("EST", "-0500"),
    ("EDT", "-0400"),
    ("CST", "-0600"),
    ("CDT", "-0500"),
    ("MST", "-0700"),
    ("MDT", "-0600"),
    ("PST", "-0800"),
    ("PDT", "-0700"),
    ("AKST", "-0900"),
    ("AKDT", "-0800"),
    ("HAST", "-1000"),
    ("HADT", "-0900"),
    ("SST", "-1100"),
    ("SDT", "-1000"),
    ("CHST", "+1000"),
    ("CET", "+0100"),
];

/// Hours per `sy:updatePeriod` unit.
fn period_hours(period: &str) -> f64 {
    match period.to_ascii_lowercase().as_str() {
        "hourly" => 1.0,
        "weekly" => 24.0 * 7.0,
        "monthly" => 24.0 * 30.42,
        "yearly" => 24.0 * 365.25,
        // "daily" and anything unrecognized
        _ => 24.0,
    }
}

/// Parses an RSS2 date, falling back to zone-name heuristics.
pub(crate) fn parse_rss2_time(spec: &str) -> Result<Option<DateTime<Utc>>, TimeError> {
    let spec = spec.trim();
    if let Ok(parsed) = parse_time(RSS2_TIME_FORMATS, spec) {
        return Ok(parsed);
    }

    if let Some(bare) = spec
        .strip_suffix(" GMT")
        .or_else(|| spec.strip_suffix(" UTC"))
    {
        if let Some(parsed) = RSS2_UTC_SUFFIX_FORMAT.parse(bare.trim_end()) {
            return Ok(Some(parsed));
        }
    }

    if let Some((code, offset)) = TIMEZONE_OFFSETS
        .iter()
        .find(|(code, _)| spec.contains(code))
    {
        let substituted = spec.replacen(code, offset, 1);
        if let Ok(parsed) = parse_time(RSS2_TIME_FORMATS, &substituted) {
            return Ok(parsed);
        }
    }

    Err(TimeError::UnrecognizedTimeFormat(spec.to_owned()))
}

#[derive(Debug, Default)]
pub(crate) struct Rss2Feed {
    title: String,
    description: String,
    updated: String,
    links: Vec<Link>,
    items: Vec<Rss2Item>,
    update_period: String,
    update_frequency: String,
}

#[derive(Debug, Default)]
struct Rss2Item {
    guid: String,
    published: String,
    title: String,
    link: String,
    creator: String,
    author: String,
    encoded_content: String,
    description: String,
    enclosures: Vec<Media>,
}

impl Rss2Feed {
    pub fn decode(root: &Element) -> Self {
        let Some(channel) = root.child("channel") else {
            return Rss2Feed::default();
        };

        Rss2Feed {
            title: channel.child_text("title"),
            description: channel.child_text("description"),
            updated: channel.child_text("lastBuildDate"),
            links: channel.children_named("link").map(Link::from_element).collect(),
            items: channel.children_named("item").map(Rss2Item::decode).collect(),
            update_period: channel.child_text("updatePeriod"),
            update_frequency: channel.child_text("updateFrequency"),
        }
    }

    pub fn marshal(self) -> Marshaled {
        let mut diagnostics = Diagnostics::default();
        let mut feed = Feed::new(Dialect::Rss2);

        feed.title = clean(&self.title);
        feed.description = clean(&self.description);
        feed.updated = diagnostics.record(
            FieldLocation::Feed,
            "lastBuildDate",
            parse_rss2_time(&self.updated),
        );

        for link in &self.links {
            match link.namespace.as_deref() {
                None => feed.www_url = link.text.clone(),
                Some(ATOM_NAMESPACE) => match hub_link_role(link) {
                    Some("self") => feed.topic = Some(link.href.clone()),
                    Some("hub") => feed.hub_url = Some(link.href.clone()),
                    _ => {}
                },
                Some(_) => {}
            }
        }

        feed.hourly_update_frequency = self.hourly_update_frequency();

        feed.entries = self
            .items
            .into_iter()
            .enumerate()
            .map(|(index, item)| item.marshal(FieldLocation::Entry(index), &mut diagnostics))
            .collect();

        diagnostics.finish(feed)
    }

    /// Hours between updates declared by the syndication module, `0.0` when
    /// either `updatePeriod` or a non-zero `updateFrequency` is missing.
    fn hourly_update_frequency(&self) -> f64 {
        if self.update_period.is_empty() {
            return 0.0;
        }
        let frequency = match self.update_frequency.parse::<i64>() {
            Ok(frequency) => frequency,
            Err(_) => {
                if !self.update_frequency.is_empty() {
                    tracing::warn!(
                        value = %self.update_frequency,
                        "Ignoring non-numeric updateFrequency"
                    );
                }
                return 0.0;
            }
        };
        if frequency == 0 {
            return 0.0;
        }
        period_hours(&self.update_period) / frequency as f64
    }
}

impl Rss2Item {
    fn decode(item: &Element) -> Self {
        // Plain <link>, not an atom:link that happens to sit in the item
        let link = item
            .children_named("link")
            .find(|l| l.namespace.is_none())
            .or_else(|| item.child("link"))
            .map(Element::trimmed_text)
            .unwrap_or_default();

        let enclosures = item
            .children_named("enclosure")
            .filter_map(|enclosure| {
                let url = enclosure.attr("url")?.trim();
                (!url.is_empty()).then(|| Media {
                    url: url.to_owned(),
                    mime_type: enclosure.attr("type").unwrap_or_default().to_owned(),
                    title: String::new(),
                })
            })
            .collect();

        Rss2Item {
            guid: item.child_text("guid"),
            published: item.child_text("pubDate"),
            title: item.child_text("title"),
            link,
            creator: item.child_text("creator"),
            author: item.child_text("author"),
            encoded_content: item.child_text_ns(CONTENT_NAMESPACE, "encoded"),
            description: item.child_text("description"),
            enclosures,
        }
    }

    fn marshal(self, location: FieldLocation, diagnostics: &mut Diagnostics) -> Entry {
        let content = if self.encoded_content.is_empty() {
            self.description
        } else {
            self.encoded_content
        };
        let author = if self.creator.is_empty() {
            self.author
        } else {
            self.creator
        };

        // RSS2 has no separate "updated"; it mirrors the publication date
        let published = diagnostics.record(location, "pubDate", parse_rss2_time(&self.published));

        Entry {
            guid: self.guid,
            author: clean(&author),
            title: clean(&self.title),
            content,
            published,
            updated: published,
            www_url: self.link,
            media: self.enclosures,
            ..Entry::default()
        }
    }
}
