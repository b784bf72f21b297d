//! XML parsing into events.
//!
//! Uses quick-xml, which is safe against XXE by default (doesn't expand
//! entities). Raw bytes become the [`Event`] sequence the SOAP model is
//! built from.

use crate::config::ReaderConfig;
use crate::error::{xml_error, StroapError};
use crate::event::{Attribute, EndElement, Event, Namespace, OtherEvent, QName, StartElement};
use crate::reader::EventReader;
use quick_xml::events::{BytesStart, Event as XmlEvent};
use quick_xml::name::ResolveResult;
use quick_xml::NsReader;
use std::io::BufRead;
use std::mem;

/// Pull reader over an XML byte stream.
///
/// Yields StartDocument first and EndDocument at end of input; empty
/// elements are expanded into a start and an end event.
pub struct XmlEventReader<R: BufRead> {
    reader: NsReader<R>,
    buf: Vec<u8>,
    lookahead: Lookahead,
    open: Vec<EndElement>,
    started: bool,
    finished: bool,
    skip_whitespace: bool,
}

enum Lookahead {
    Empty,
    Event(Event),
    Error(StroapError),
    Exhausted,
}

impl<'a> XmlEventReader<&'a [u8]> {
    /// Reader over an in-memory document.
    pub fn from_bytes(bytes: &'a [u8]) -> Self {
        Self::new(bytes)
    }
}

impl<R: BufRead> XmlEventReader<R> {
    pub fn new(input: R) -> Self {
        Self::with_config(input, &ReaderConfig::default())
    }

    pub fn with_config(input: R, config: &ReaderConfig) -> Self {
        let mut reader = NsReader::from_reader(input);
        reader.config_mut().expand_empty_elements = true;
        Self {
            reader,
            buf: Vec::new(),
            lookahead: Lookahead::Empty,
            open: Vec::new(),
            started: false,
            finished: false,
            skip_whitespace: config.skip_whitespace,
        }
    }

    fn fill(&mut self) {
        if matches!(self.lookahead, Lookahead::Empty) {
            self.lookahead = match self.produce() {
                Ok(Some(event)) => Lookahead::Event(event),
                Ok(None) => Lookahead::Exhausted,
                Err(e) => {
                    self.finished = true;
                    Lookahead::Error(e)
                }
            };
        }
    }

    fn produce(&mut self) -> Result<Option<Event>, StroapError> {
        if !self.started {
            self.started = true;
            return Ok(Some(Event::StartDocument));
        }
        if self.finished {
            return Ok(None);
        }

        loop {
            self.buf.clear();
            let event = match self.reader.read_event_into(&mut self.buf)? {
                XmlEvent::Start(ref e) => {
                    let start = convert_start(&self.reader, e)?;
                    self.open.push(start.end_element());
                    Event::StartElement(start)
                }
                XmlEvent::End(_) => match self.open.pop() {
                    Some(end) => Event::EndElement(end),
                    None => return Err(StroapError::XmlParse("unmatched end tag".to_string())),
                },
                XmlEvent::Text(ref e) => {
                    let text = e.unescape().map_err(xml_error)?.into_owned();
                    let event = Event::Characters(text);
                    if self.skip_whitespace && event.is_whitespace() {
                        continue;
                    }
                    event
                }
                XmlEvent::CData(ref e) => Event::Other(OtherEvent::CData(lossy(e))),
                XmlEvent::Comment(ref e) => Event::Other(OtherEvent::Comment(lossy(e))),
                XmlEvent::PI(ref e) => Event::Other(OtherEvent::ProcessingInstruction {
                    target: lossy(e.target()),
                    data: lossy(e.content()).trim().to_string(),
                }),
                XmlEvent::DocType(ref e) => Event::Other(OtherEvent::DocType(lossy(e))),
                XmlEvent::Eof => {
                    if let Some(open) = self.open.last() {
                        return Err(StroapError::XmlParse(format!(
                            "unexpected end of document inside element {}",
                            open.name
                        )));
                    }
                    self.finished = true;
                    Event::EndDocument
                }
                _ => continue,
            };
            return Ok(Some(event));
        }
    }
}

impl<R: BufRead> EventReader for XmlEventReader<R> {
    fn has_next(&mut self) -> bool {
        self.fill();
        !matches!(self.lookahead, Lookahead::Exhausted)
    }

    fn next_event(&mut self) -> Result<Event, StroapError> {
        self.fill();
        match mem::replace(&mut self.lookahead, Lookahead::Empty) {
            Lookahead::Event(event) => Ok(event),
            Lookahead::Error(e) => {
                self.lookahead = Lookahead::Exhausted;
                Err(e)
            }
            Lookahead::Exhausted | Lookahead::Empty => {
                panic!("no more events: XML reader is exhausted")
            }
        }
    }

    fn peek(&mut self) -> Result<Option<Event>, StroapError> {
        self.fill();
        match &self.lookahead {
            Lookahead::Event(event) => Ok(Some(event.clone())),
            Lookahead::Error(_) => match mem::replace(&mut self.lookahead, Lookahead::Exhausted) {
                Lookahead::Error(e) => Err(e),
                _ => Ok(None),
            },
            Lookahead::Exhausted | Lookahead::Empty => Ok(None),
        }
    }
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn namespace_of(result: ResolveResult) -> Result<String, StroapError> {
    match result {
        ResolveResult::Bound(ns) => Ok(lossy(ns.as_ref())),
        ResolveResult::Unbound => Ok(String::new()),
        ResolveResult::Unknown(prefix) => Err(StroapError::XmlParse(format!(
            "unbound namespace prefix '{}'",
            lossy(&prefix)
        ))),
    }
}

fn split_qualified(raw: &[u8]) -> Result<(String, String), StroapError> {
    let raw = std::str::from_utf8(raw).map_err(xml_error)?;
    Ok(match raw.split_once(':') {
        Some((prefix, local)) => (prefix.to_string(), local.to_string()),
        None => (String::new(), raw.to_string()),
    })
}

/// Convert a quick-xml start tag, resolving namespaces against the
/// reader's current scope.
fn convert_start<R>(reader: &NsReader<R>, e: &BytesStart) -> Result<StartElement, StroapError> {
    let (prefix, local) = split_qualified(e.name().as_ref())?;
    let (resolved, _) = reader.resolve_element(e.name());
    let mut start = StartElement::new(QName::with_prefix(namespace_of(resolved)?, local, prefix));

    for attr in e.attributes() {
        let attr = attr.map_err(xml_error)?;
        let key = attr.key.as_ref();
        let value = attr.unescape_value().map_err(xml_error)?.into_owned();

        if key == b"xmlns" {
            start.namespaces.push(Namespace::default_namespace(value));
        } else if let Some(declared) = key.strip_prefix(b"xmlns:") {
            start.namespaces.push(Namespace::new(lossy(declared), value));
        } else {
            let (prefix, local) = split_qualified(key)?;
            let (resolved, _) = reader.resolve_attribute(attr.key);
            let name = QName::with_prefix(namespace_of(resolved)?, local, prefix);
            start.attributes.push(Attribute::new(name, value));
        }
    }

    Ok(start)
}

/// Extract SOAPAction from HTTP header value (removes quotes).
pub fn parse_soap_action(header_value: &str) -> String {
    header_value.trim().trim_matches('"').to_string()
}

/// Quote a SOAPAction value for transport; `None` or empty yields `""`.
pub fn escape_action(action: Option<&str>) -> String {
    let action = action.unwrap_or("");
    let mut escaped = String::with_capacity(action.len() + 2);
    if !action.starts_with('"') {
        escaped.push('"');
    }
    escaped.push_str(action);
    if !action.ends_with('"') || action.len() == 1 {
        escaped.push('"');
    }
    escaped
}
