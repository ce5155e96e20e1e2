//! Namespace-aware element tree built from `quick-xml` events.
//!
//! Dialect decoders read from this tree instead of from the event stream so
//! each one can be a plain structural mapping.

use quick_xml::events::{BytesStart, Event};
use quick_xml::name::ResolveResult;
use quick_xml::NsReader;
use std::ops::Range;
use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum DecodeError {
    #[error("XML parse error at byte {position}: {message}")]
    Xml { position: u64, message: String },

    /// SEC-003: document nesting exceeds the configured limit.
    #[error("nesting depth exceeds maximum of {0} levels")]
    TooDeep(usize),

    #[error("element <{0}> is never closed")]
    Unclosed(String),

    #[error("document has no root element")]
    NoRoot,
}

/// Qualified name of the document's root element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RootName {
    pub namespace: Option<String>,
    pub local: String,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Element {
    pub namespace: Option<String>,
    pub name: String,
    pub attributes: Vec<Attribute>,
    /// Direct character data (text and CDATA), unescaped, untrimmed.
    pub text: String,
    pub children: Vec<Element>,
    /// Byte span of everything between the start and end tags.
    pub inner: Range<usize>,
}

#[derive(Debug, Clone)]
pub(crate) struct Attribute {
    pub namespace: Option<String>,
    pub name: String,
    pub value: String,
}

impl Element {
    pub fn is(&self, namespace: &str, name: &str) -> bool {
        self.name == name && self.namespace.as_deref() == Some(namespace)
    }

    /// First child with this local name, in any namespace.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    /// First child with this namespace and local name.
    pub fn child_ns(&self, namespace: &str, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.is(namespace, name))
    }

    /// All children with this local name, in any namespace.
    pub fn children_named<'s>(&'s self, name: &'s str) -> impl Iterator<Item = &'s Element> + 's {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Trimmed text of the first child named `name`, or `""`.
    pub fn child_text(&self, name: &str) -> String {
        self.child(name).map(Element::trimmed_text).unwrap_or_default()
    }

    pub fn child_text_ns(&self, namespace: &str, name: &str) -> String {
        self.child_ns(namespace, name)
            .map(Element::trimmed_text)
            .unwrap_or_default()
    }

    pub fn trimmed_text(&self) -> String {
        self.text.trim().to_owned()
    }

    /// Value of an unprefixed attribute.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.namespace.is_none() && a.name == name)
            .map(|a| a.value.as_str())
    }

    /// Raw markup between this element's tags, taken from `source`.
    pub fn inner_markup<'s>(&self, source: &'s [u8]) -> std::borrow::Cow<'s, str> {
        let span = source.get(self.inner.clone()).unwrap_or_default();
        String::from_utf8_lossy(span)
    }
}

fn xml_error(reader: &NsReader<&[u8]>, err: impl std::fmt::Display) -> DecodeError {
    DecodeError::Xml {
        position: reader.error_position(),
        message: err.to_string(),
    }
}

fn namespace_uri(resolved: &ResolveResult<'_>) -> Option<String> {
    match resolved {
        ResolveResult::Bound(ns) => Some(String::from_utf8_lossy(ns.as_ref()).into_owned()),
        _ => None,
    }
}

/// Reads only as far as the root element and returns its qualified name.
pub(crate) fn sniff_root(bytes: &[u8]) -> Result<RootName, DecodeError> {
    let mut reader = NsReader::from_reader(bytes);

    loop {
        let (resolved, event) = match reader.read_resolved_event() {
            Ok(pair) => pair,
            Err(e) => return Err(xml_error(&reader, e)),
        };
        let namespace = namespace_uri(&resolved);
        match event {
            Event::Start(e) | Event::Empty(e) => {
                return Ok(RootName {
                    namespace,
                    local: String::from_utf8_lossy(e.local_name().as_ref()).into_owned(),
                });
            }
            Event::Eof => return Err(DecodeError::NoRoot),
            _ => {}
        }
    }
}

/// Decodes the root element and everything inside it.
///
/// Content after the root element is never read.
pub(crate) fn decode(bytes: &[u8], max_depth: usize) -> Result<Element, DecodeError> {
    let mut reader = NsReader::from_reader(bytes);
    let mut stack: Vec<Element> = Vec::new();

    loop {
        let before = reader.buffer_position() as usize;
        let (resolved, event) = match reader.read_resolved_event() {
            Ok(pair) => pair,
            Err(e) => return Err(xml_error(&reader, e)),
        };
        let namespace = namespace_uri(&resolved);

        let finished = match event {
            Event::Start(e) => {
                // SEC-003: Reject excessively nested documents
                if stack.len() >= max_depth {
                    return Err(DecodeError::TooDeep(max_depth));
                }
                let mut element = open_element(&reader, namespace, &e)?;
                let start = reader.buffer_position() as usize;
                element.inner = start..start;
                stack.push(element);
                None
            }
            Event::Empty(e) => {
                let element = open_element(&reader, namespace, &e)?;
                attach(&mut stack, element)
            }
            Event::End(_) => match stack.pop() {
                Some(mut element) => {
                    element.inner.end = before;
                    attach(&mut stack, element)
                }
                None => return Err(xml_error(&reader, "unexpected closing tag")),
            },
            Event::Text(e) => {
                if let Some(top) = stack.last_mut() {
                    let text = e.unescape().map_err(|err| xml_error(&reader, err))?;
                    top.text.push_str(&text);
                }
                None
            }
            Event::CData(e) => {
                if let Some(top) = stack.last_mut() {
                    let text = std::str::from_utf8(&e).map_err(|err| xml_error(&reader, err))?;
                    top.text.push_str(text);
                }
                None
            }
            Event::Eof => {
                return Err(match stack.pop() {
                    Some(open) => DecodeError::Unclosed(open.name),
                    None => DecodeError::NoRoot,
                });
            }
            _ => None,
        };

        if let Some(root) = finished {
            return Ok(root);
        }
    }
}

fn open_element(
    reader: &NsReader<&[u8]>,
    namespace: Option<String>,
    start: &BytesStart<'_>,
) -> Result<Element, DecodeError> {
    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| xml_error(reader, e))?;
        if attr.key.as_namespace_binding().is_some() {
            continue;
        }
        let (resolved, local) = reader.resolve_attribute(attr.key);
        let value = attr
            .decode_and_unescape_value(reader.decoder())
            .map_err(|e| xml_error(reader, e))?;
        attributes.push(Attribute {
            namespace: namespace_uri(&resolved),
            name: String::from_utf8_lossy(local.as_ref()).into_owned(),
            value: value.into_owned(),
        });
    }

    Ok(Element {
        namespace,
        name: String::from_utf8_lossy(start.local_name().as_ref()).into_owned(),
        attributes,
        ..Element::default()
    })
}

/// Appends a finished element to its parent. Returns it when it was the root.
fn attach(stack: &mut [Element], element: Element) -> Option<Element> {
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(element);
            None
        }
        None => Some(element),
    }
}
