//! Event sinks and XML serialization.

use crate::config::WriterConfig;
use crate::error::StroapError;
use crate::event::{Event, Namespace, OtherEvent, StartElement, XML_NS};
use crate::reader::EventReader;
use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesPI, BytesStart, BytesText};
use quick_xml::events::Event as XmlEvent;
use quick_xml::Writer;
use std::io::Write;

/// Push target for XML events.
pub trait EventSink {
    fn add(&mut self, event: Event) -> Result<(), StroapError>;
}

impl<S: EventSink + ?Sized> EventSink for &mut S {
    fn add(&mut self, event: Event) -> Result<(), StroapError> {
        (**self).add(event)
    }
}

impl EventSink for Vec<Event> {
    fn add(&mut self, event: Event) -> Result<(), StroapError> {
        self.push(event);
        Ok(())
    }
}

/// Drain `reader` into `sink`.
pub fn transfer<R, S>(reader: &mut R, sink: &mut S) -> Result<(), StroapError>
where
    R: EventReader + ?Sized,
    S: EventSink + ?Sized,
{
    while reader.has_next() {
        sink.add(reader.next_event()?)?;
    }
    Ok(())
}

/// Appends fragment events to a borrowed buffer, dropping document events.
pub struct EventBuffer<'a> {
    events: &'a mut Vec<Event>,
}

impl<'a> EventBuffer<'a> {
    pub fn new(events: &'a mut Vec<Event>) -> Self {
        Self { events }
    }
}

impl EventSink for EventBuffer<'_> {
    fn add(&mut self, event: Event) -> Result<(), StroapError> {
        if !event.is_document_event() {
            self.events.push(event);
        }
        Ok(())
    }
}

/// Forwards everything but StartDocument and EndDocument.
pub struct NoDocumentEvents<'a, S: EventSink + ?Sized> {
    delegate: &'a mut S,
}

impl<'a, S: EventSink + ?Sized> NoDocumentEvents<'a, S> {
    pub fn new(delegate: &'a mut S) -> Self {
        Self { delegate }
    }
}

impl<S: EventSink + ?Sized> EventSink for NoDocumentEvents<'_, S> {
    fn add(&mut self, event: Event) -> Result<(), StroapError> {
        if event.is_document_event() {
            return Ok(());
        }
        self.delegate.add(event)
    }
}

struct Scope {
    qualified: String,
    bindings: Vec<Namespace>,
}

/// Serializes events as XML bytes.
///
/// Namespaces are repaired: a prefix used by an element or attribute that
/// is not bound in scope gets declared on that element. A start tag
/// directly followed by its end tag is written as an empty element.
pub struct XmlEventWriter<W: Write> {
    writer: Writer<W>,
    scopes: Vec<Scope>,
    pending: Option<BytesStart<'static>>,
    write_declaration: bool,
    generated_prefixes: usize,
}

impl<W: Write> XmlEventWriter<W> {
    pub fn new(output: W) -> Self {
        Self::with_config(output, &WriterConfig::default())
    }

    pub fn with_config(output: W, config: &WriterConfig) -> Self {
        let writer = match &config.indent {
            Some(indent) => Writer::new_with_indent(output, indent.indent_char as u8, indent.size),
            None => Writer::new(output),
        };
        Self {
            writer,
            scopes: Vec::new(),
            pending: None,
            write_declaration: config.write_declaration,
            generated_prefixes: 0,
        }
    }

    /// Flush buffered output and return the underlying writer.
    pub fn finish(mut self) -> Result<W, StroapError> {
        self.flush_pending()?;
        let mut output = self.writer.into_inner();
        output.flush()?;
        Ok(output)
    }

    fn write(&mut self, event: XmlEvent<'_>) -> Result<(), StroapError> {
        self.writer
            .write_event(event)
            .map_err(|e| StroapError::XmlWrite(e.to_string()))
    }

    fn flush_pending(&mut self) -> Result<(), StroapError> {
        match self.pending.take() {
            Some(start) => self.write(XmlEvent::Start(start)),
            None => Ok(()),
        }
    }

    fn lookup(&self, prefix: &str, local: &[Namespace]) -> Option<String> {
        if prefix == "xml" {
            return Some(XML_NS.to_string());
        }
        local
            .iter()
            .rev()
            .chain(self.scopes.iter().rev().flat_map(|s| s.bindings.iter().rev()))
            .find(|ns| ns.prefix == prefix)
            .map(|ns| ns.uri.clone())
    }

    fn prefix_for(&self, uri: &str, local: &[Namespace]) -> Option<String> {
        local
            .iter()
            .rev()
            .chain(self.scopes.iter().rev().flat_map(|s| s.bindings.iter().rev()))
            .filter(|ns| !ns.is_default() && ns.uri == uri)
            .map(|ns| ns.prefix.clone())
            .find(|prefix| self.lookup(prefix, local).as_deref() == Some(uri))
    }

    fn start_element(&mut self, start: StartElement) -> Result<(), StroapError> {
        self.flush_pending()?;

        let mut bindings = start.namespaces.clone();
        let name = &start.name;
        let qualified = if name.namespace_uri().is_empty() {
            let default = self.lookup("", &bindings).unwrap_or_default();
            if !default.is_empty() {
                bindings.push(Namespace::default_namespace(""));
            }
            name.local_part().to_string()
        } else {
            if self.lookup(name.prefix(), &bindings).as_deref() != Some(name.namespace_uri()) {
                bindings.push(Namespace::new(name.prefix(), name.namespace_uri()));
            }
            name.qualified()
        };

        let mut attributes = Vec::with_capacity(start.attributes.len());
        for attribute in &start.attributes {
            let attr_name = &attribute.name;
            let key = if attr_name.namespace_uri().is_empty() {
                attr_name.local_part().to_string()
            } else if attr_name.namespace_uri() == XML_NS {
                format!("xml:{}", attr_name.local_part())
            } else {
                let uri = attr_name.namespace_uri();
                let wanted = attr_name.prefix();
                let bound = self.lookup(wanted, &bindings);
                let prefix = if !wanted.is_empty() && bound.as_deref() == Some(uri) {
                    wanted.to_string()
                } else if let Some(existing) = self.prefix_for(uri, &bindings) {
                    existing
                } else if !wanted.is_empty() && bound.is_none() {
                    bindings.push(Namespace::new(wanted, uri));
                    wanted.to_string()
                } else {
                    self.generated_prefixes += 1;
                    let generated = format!("ns{}", self.generated_prefixes);
                    bindings.push(Namespace::new(generated.clone(), uri));
                    generated
                };
                format!("{}:{}", prefix, attr_name.local_part())
            };
            attributes.push((key, attribute.value.clone()));
        }

        let mut bytes_start = BytesStart::new(qualified.clone());
        for ns in &bindings {
            let key = if ns.is_default() {
                "xmlns".to_string()
            } else {
                format!("xmlns:{}", ns.prefix)
            };
            bytes_start.push_attribute((key.as_str(), ns.uri.as_str()));
        }
        for (key, value) in &attributes {
            bytes_start.push_attribute((key.as_str(), value.as_str()));
        }

        self.scopes.push(Scope {
            qualified,
            bindings,
        });
        self.pending = Some(bytes_start);
        Ok(())
    }

    fn end_element(&mut self) -> Result<(), StroapError> {
        let scope = self
            .scopes
            .pop()
            .ok_or_else(|| StroapError::XmlWrite("end element without start element".to_string()))?;
        match self.pending.take() {
            Some(start) => self.write(XmlEvent::Empty(start)),
            None => self.write(XmlEvent::End(BytesEnd::new(scope.qualified))),
        }
    }
}

impl<W: Write> EventSink for XmlEventWriter<W> {
    fn add(&mut self, event: Event) -> Result<(), StroapError> {
        match event {
            Event::StartDocument => {
                self.flush_pending()?;
                if self.write_declaration {
                    self.write(XmlEvent::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
                }
                Ok(())
            }
            Event::EndDocument => {
                self.flush_pending()?;
                self.writer.get_mut().flush()?;
                Ok(())
            }
            Event::StartElement(start) => self.start_element(start),
            Event::EndElement(_) => self.end_element(),
            Event::Characters(text) => {
                self.flush_pending()?;
                self.write(XmlEvent::Text(BytesText::new(&text)))
            }
            Event::Other(other) => {
                self.flush_pending()?;
                match other {
                    OtherEvent::Comment(text) => {
                        self.write(XmlEvent::Comment(BytesText::from_escaped(text)))
                    }
                    OtherEvent::CData(text) => self.write(XmlEvent::CData(BytesCData::new(text))),
                    OtherEvent::ProcessingInstruction { target, data } => {
                        let content = if data.is_empty() {
                            target
                        } else {
                            format!("{target} {data}")
                        };
                        self.write(XmlEvent::PI(BytesPI::new(content)))
                    }
                    OtherEvent::DocType(text) => {
                        self.write(XmlEvent::DocType(BytesText::from_escaped(text)))
                    }
                }
            }
        }
    }
}

/// Serialize a whole event sequence to a string.
pub fn events_to_string<R: EventReader + ?Sized>(
    reader: &mut R,
    config: &WriterConfig,
) -> Result<String, StroapError> {
    let mut writer = XmlEventWriter::with_config(Vec::new(), config);
    transfer(reader, &mut writer)?;
    let bytes = writer.finish()?;
    String::from_utf8(bytes).map_err(|e| StroapError::XmlWrite(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Attribute, QName};
    use crate::parser::XmlEventReader;
    use crate::reader::{drain, BufferedEventReader};

    fn fragment() -> WriterConfig {
        WriterConfig {
            write_declaration: false,
            indent: None,
        }
    }

    fn write(events: Vec<Event>) -> String {
        events_to_string(&mut BufferedEventReader::new(events), &fragment()).unwrap()
    }

    #[test]
    fn test_declares_unbound_prefix() {
        let name = QName::with_prefix("urn:x", "a", "x");
        let xml = write(vec![Event::start(name.clone()), Event::end(name)]);
        assert_eq!(xml, r#"<x:a xmlns:x="urn:x"/>"#);
    }

    #[test]
    fn test_does_not_redeclare_bound_prefix() {
        let outer = QName::with_prefix("urn:x", "a", "x");
        let inner = QName::with_prefix("urn:x", "b", "x");
        let xml = write(vec![
            Event::start(outer.clone()),
            Event::start(inner.clone()),
            Event::characters("1 < 2"),
            Event::end(inner),
            Event::end(outer),
        ]);
        assert_eq!(xml, r#"<x:a xmlns:x="urn:x"><x:b>1 &lt; 2</x:b></x:a>"#);
    }

    #[test]
    fn test_default_namespace_element() {
        let name = QName::new("urn:d", "a");
        let xml = write(vec![Event::start(name.clone()), Event::end(name)]);
        assert_eq!(xml, r#"<a xmlns="urn:d"/>"#);
    }

    #[test]
    fn test_undeclares_default_namespace_for_unqualified_child() {
        let outer = QName::new("urn:d", "a");
        let inner = QName::local("b");
        let xml = write(vec![
            Event::start(outer.clone()),
            Event::start(inner.clone()),
            Event::end(inner),
            Event::end(outer),
        ]);
        assert_eq!(xml, r#"<a xmlns="urn:d"><b xmlns=""/></a>"#);
    }

    #[test]
    fn test_attribute_prefixes() {
        let mut start = StartElement::new(QName::local("e"));
        start.attributes.push(Attribute::new(QName::with_prefix("urn:s", "mustUnderstand", "s"), "1"));
        start.attributes.push(Attribute::new(QName::new(XML_NS, "lang"), "en"));
        start.attributes.push(Attribute::new(QName::new("urn:t", "flag"), "y"));
        let xml = write(vec![Event::StartElement(start), Event::end(QName::local("e"))]);
        assert_eq!(
            xml,
            r#"<e xmlns:s="urn:s" xmlns:ns1="urn:t" s:mustUnderstand="1" xml:lang="en" ns1:flag="y"/>"#
        );
    }

    #[test]
    fn test_declaration_written_for_start_document() {
        let xml = events_to_string(
            &mut BufferedEventReader::new(vec![
                Event::StartDocument,
                Event::start(QName::local("a")),
                Event::end(QName::local("a")),
                Event::EndDocument,
            ]),
            &WriterConfig::default(),
        )
        .unwrap();
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.ends_with("<a/>"));
    }

    #[test]
    fn test_parse_write_parse_keeps_events() {
        let source = r#"<s:Envelope xmlns:s="urn:s"><s:Body><p:op xmlns:p="urn:p" a="1">text<p:c/></p:op></s:Body></s:Envelope>"#;
        let first = drain(&mut XmlEventReader::from_bytes(source.as_bytes())).unwrap();
        let written = events_to_string(&mut BufferedEventReader::new(&first[..]), &fragment()).unwrap();
        assert_eq!(written, source);
        let second = drain(&mut XmlEventReader::from_bytes(written.as_bytes())).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_event_buffer_drops_document_events() {
        let mut events = Vec::new();
        let mut buffer = EventBuffer::new(&mut events);
        buffer.add(Event::StartDocument).unwrap();
        buffer.add(Event::characters("x")).unwrap();
        buffer.add(Event::EndDocument).unwrap();
        assert_eq!(events, vec![Event::characters("x")]);
    }

    #[test]
    fn test_no_document_events_filter() {
        let mut events: Vec<Event> = Vec::new();
        let mut filter = NoDocumentEvents::new(&mut events);
        filter.add(Event::StartDocument).unwrap();
        filter.add(Event::start(QName::local("a"))).unwrap();
        filter.add(Event::EndDocument).unwrap();
        assert_eq!(events, vec![Event::start(QName::local("a"))]);
    }
}
