//! SOAP Envelope: the root of the element tree and its parse entry point.

use crate::body::Body;
use crate::config::SoapVersion;
use crate::element::{ElementNode, SoapElement};
use crate::error::StroapError;
use crate::event::Event;
use crate::header::Header;
use crate::reader::{ChainedEventReader, EventReader};
use tracing::debug;

/// SOAP Envelope, owning an optional Header and a Body.
#[derive(Debug)]
pub struct Envelope {
    node: ElementNode,
    version: SoapVersion,
    header: Option<Header>,
    body: Body,
}

impl Envelope {
    /// Envelope with no Header and an empty Body.
    pub fn new(version: SoapVersion) -> Self {
        Self {
            node: ElementNode::new(version.envelope_name()),
            version,
            header: None,
            body: Body::new(version),
        }
    }

    /// Build an Envelope from `reader`, positioned before the root element.
    ///
    /// Events after the Body are left unread.
    pub fn build(reader: &mut dyn EventReader, version: SoapVersion) -> Result<Self, StroapError> {
        let start = loop {
            if !reader.has_next() {
                return Err(StroapError::MissingEnvelope);
            }
            if let Event::StartElement(start) = reader.next_event()? {
                break start;
            }
        };
        let expected = version.envelope_name();
        if start.name != expected {
            return Err(StroapError::StructuralMismatch {
                expected,
                found: start.name,
            });
        }

        let header_name = version.header_name();
        let body_name = version.body_name();
        let mut header = None;
        let body = loop {
            let next = match reader.peek()? {
                Some(event) => event,
                None => return Err(StroapError::MissingBody),
            };
            match next {
                Event::StartElement(child) if child.name == header_name => {
                    header = Some(Header::build(reader, version)?);
                }
                Event::StartElement(child) if child.name == body_name => {
                    break Body::build(reader, version, &start.namespaces)?;
                }
                Event::StartElement(child) => {
                    return Err(StroapError::UnexpectedElement(child.name));
                }
                // Envelope closed before any Body
                Event::EndElement(_) => return Err(StroapError::MissingBody),
                _ => {
                    reader.next_event()?;
                }
            }
        };

        debug!(
            version = %version,
            has_header = header.is_some(),
            payload = ?body.payload_name(),
            "Parsed SOAP Envelope"
        );
        Ok(Self {
            node: ElementNode::from_start(start),
            version,
            header,
            body,
        })
    }

    pub fn version(&self) -> SoapVersion {
        self.version
    }

    /// The Header, created empty on first access.
    pub fn header(&mut self) -> &mut Header {
        let version = self.version;
        self.header.get_or_insert_with(|| Header::new(version))
    }

    /// The Header if one was parsed or created.
    pub fn header_if_present(&self) -> Option<&Header> {
        self.header.as_ref()
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn body_mut(&mut self) -> &mut Body {
        &mut self.body
    }
}

impl SoapElement for Envelope {
    fn node(&self) -> &ElementNode {
        &self.node
    }

    fn node_mut(&mut self) -> &mut ElementNode {
        &mut self.node
    }

    fn child_event_reader(&self) -> Result<Box<dyn EventReader + '_>, StroapError> {
        let mut readers: Vec<Box<dyn EventReader + '_>> = Vec::with_capacity(2);
        if let Some(header) = &self.header {
            readers.push(Box::new(header.event_reader(false)?));
        }
        readers.push(Box::new(self.body.event_reader(false)?));
        Ok(Box::new(ChainedEventReader::new(readers)))
    }
}
