//! SOAP Header, header elements and the collector that groups a flat
//! event stream into header elements.

use crate::config::{SoapVersion, DEFAULT_PREFIX};
use crate::element::{ElementNode, SoapElement};
use crate::error::StroapError;
use crate::event::{Event, QName, StartElement};
use crate::fault::text_of;
use crate::reader::{BufferedEventReader, ChainedEventReader, EventReader};
use crate::writer::{EventBuffer, EventSink};
use tracing::{debug, warn};

/// SOAP Header element.
#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    node: ElementNode,
    version: SoapVersion,
    elements: Vec<HeaderElement>,
}

impl Header {
    pub fn new(version: SoapVersion) -> Self {
        Self::with_node(ElementNode::new(version.header_name()), version)
    }

    fn with_node(node: ElementNode, version: SoapVersion) -> Self {
        Self {
            node,
            version,
            elements: Vec::new(),
        }
    }

    /// Build a Header from `reader`, positioned on the Header start tag.
    /// Consumes exactly the Header subtree.
    pub fn build(reader: &mut dyn EventReader, version: SoapVersion) -> Result<Self, StroapError> {
        let start = expect_start(reader, version.header_name())?;
        let mut header = Self::with_node(ElementNode::from_start(start), version);

        {
            let mut collector = header.result();
            let mut depth = 0usize;
            loop {
                if !reader.has_next() {
                    return Err(StroapError::InvalidEnvelope(
                        "document ends inside Header".to_string(),
                    ));
                }
                let event = reader.next_event()?;
                match &event {
                    Event::StartElement(_) => depth += 1,
                    Event::EndElement(_) if depth == 0 => break,
                    Event::EndElement(_) => depth -= 1,
                    _ => {}
                }
                collector.add(event)?;
            }
        }

        debug!(
            version = %version,
            elements = header.elements.len(),
            "Parsed SOAP Header"
        );
        Ok(header)
    }

    pub fn version(&self) -> SoapVersion {
        self.version
    }

    /// Append a new, empty header element.
    pub fn add_header_element(&mut self, name: QName) -> &mut HeaderElement {
        let index = self.elements.len();
        self.elements.push(HeaderElement::new(name, self.version));
        &mut self.elements[index]
    }

    /// Remove every header element named `name`.
    pub fn remove_header_element(&mut self, name: &QName) {
        self.elements.retain(|element| element.name() != name);
    }

    pub fn header_elements(&self) -> &[HeaderElement] {
        &self.elements
    }

    /// All header elements in document order.
    pub fn examine_all_header_elements(&self) -> impl Iterator<Item = &HeaderElement> {
        self.elements.iter()
    }

    pub fn header_elements_mut(&mut self) -> &mut [HeaderElement] {
        &mut self.elements
    }

    /// Header elements flagged mustUnderstand and targeted at
    /// `actor_or_role`, at no one in particular, or at the next node.
    pub fn examine_must_understand_header_elements(
        &self,
        actor_or_role: &str,
    ) -> Vec<&HeaderElement> {
        let next = self.version.next_actor_or_role_uri();
        self.elements
            .iter()
            .filter(|element| element.must_understand())
            .filter(|element| match element.actor_or_role() {
                None | Some("") => true,
                Some(target) => target == actor_or_role || target == next,
            })
            .collect()
    }

    /// Header elements this node has to process when acting in
    /// `actors_or_roles`.
    pub fn examine_header_elements_to_process(
        &self,
        actors_or_roles: &[&str],
        is_ultimate_receiver: bool,
    ) -> Vec<&HeaderElement> {
        self.elements
            .iter()
            .filter(|element| self.should_process(element, actors_or_roles, is_ultimate_receiver))
            .collect()
    }

    fn should_process(
        &self,
        element: &HeaderElement,
        actors_or_roles: &[&str],
        is_ultimate_receiver: bool,
    ) -> bool {
        let target = element.actor_or_role().unwrap_or("");
        let next = self.version.next_actor_or_role_uri();
        match self.version {
            SoapVersion::Soap11 => {
                target.is_empty() || target == next || actors_or_roles.contains(&target)
            }
            SoapVersion::Soap12 => {
                if target == self.version.none_actor_or_role_uri() {
                    false
                } else if target.is_empty() || target == self.version.ultimate_receiver_role_uri()
                {
                    is_ultimate_receiver
                } else {
                    target == next || actors_or_roles.contains(&target)
                }
            }
        }
    }

    /// Sink replacing all header elements with those pushed into it.
    pub fn result(&mut self) -> HeaderElementCollector<'_> {
        self.elements.clear();
        HeaderElementCollector::new(&mut self.elements, self.version)
    }
}

impl SoapElement for Header {
    fn node(&self) -> &ElementNode {
        &self.node
    }

    fn node_mut(&mut self) -> &mut ElementNode {
        &mut self.node
    }

    fn child_event_reader(&self) -> Result<Box<dyn EventReader + '_>, StroapError> {
        let readers = self
            .elements
            .iter()
            .map(|element| {
                element
                    .event_reader(false)
                    .map(|reader| Box::new(reader) as Box<dyn EventReader + '_>)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Box::new(ChainedEventReader::new(readers)))
    }
}

/// Child element of the SOAP Header.
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderElement {
    node: ElementNode,
    version: SoapVersion,
    content: Vec<Event>,
}

impl HeaderElement {
    /// An empty prefix in `name` is kept, so the element lands in the
    /// default namespace when written.
    pub fn new(name: QName, version: SoapVersion) -> Self {
        Self {
            node: ElementNode::unprefixed(name),
            version,
            content: Vec::new(),
        }
    }

    /// Header element from a complete event group, start and end tag
    /// included.
    pub fn from_events(mut events: Vec<Event>, version: SoapVersion) -> Option<Self> {
        if !matches!(events.last(), Some(Event::EndElement(_))) {
            return None;
        }
        events.pop();
        if events.is_empty() {
            return None;
        }
        let start = match events.remove(0) {
            Event::StartElement(start) => start,
            _ => return None,
        };
        Some(Self {
            node: ElementNode::from_start(start),
            version,
            content: events,
        })
    }

    pub fn must_understand(&self) -> bool {
        matches!(
            self.node
                .attribute_value(&self.version.must_understand_attribute_name()),
            Some("1") | Some("true")
        )
    }

    pub fn set_must_understand(&mut self, must_understand: bool) {
        let name = self.version.must_understand_attribute_name();
        let value = match (self.version, must_understand) {
            (SoapVersion::Soap11, true) => "1",
            (SoapVersion::Soap11, false) => "0",
            (SoapVersion::Soap12, true) => "true",
            (SoapVersion::Soap12, false) => "false",
        };
        self.node.set_attribute(self.soap_prefixed(name), value);
    }

    /// `actor` in SOAP 1.1, `role` in SOAP 1.2.
    pub fn actor_or_role(&self) -> Option<&str> {
        self.node
            .attribute_value(&self.version.actor_or_role_name())
    }

    pub fn set_actor_or_role(&mut self, actor_or_role: &str) {
        let name = self.version.actor_or_role_name();
        self.node.set_attribute(self.soap_prefixed(name), actor_or_role);
    }

    fn soap_prefixed(&self, name: QName) -> QName {
        name.prefixed(DEFAULT_PREFIX)
    }

    /// Concatenated character data of the content.
    pub fn text(&self) -> String {
        text_of(&self.content)
    }

    /// Replace the content with a single text node.
    pub fn set_text(&mut self, text: &str) {
        self.content.clear();
        if !text.is_empty() {
            self.content.push(Event::characters(text));
        }
    }

    pub fn content(&self) -> &[Event] {
        &self.content
    }

    /// Sink replacing the content with the events pushed into it.
    pub fn result(&mut self) -> EventBuffer<'_> {
        self.content.clear();
        EventBuffer::new(&mut self.content)
    }
}

impl SoapElement for HeaderElement {
    fn node(&self) -> &ElementNode {
        &self.node
    }

    fn node_mut(&mut self) -> &mut ElementNode {
        &mut self.node
    }

    fn child_event_reader(&self) -> Result<Box<dyn EventReader + '_>, StroapError> {
        Ok(Box::new(BufferedEventReader::new(&self.content[..])))
    }
}

/// Sink grouping a flat stream of header content into header elements.
///
/// Each top-level element pushed, with everything nested in it, becomes
/// one [`HeaderElement`] appended to the owning Header as soon as its end
/// tag arrives. Document events are dropped. Well-formedness is the
/// caller's responsibility.
pub struct HeaderElementCollector<'a> {
    elements: &'a mut Vec<HeaderElement>,
    version: SoapVersion,
    depth: i64,
    seen_start: bool,
    buffer: Vec<Event>,
}

impl<'a> HeaderElementCollector<'a> {
    pub fn new(elements: &'a mut Vec<HeaderElement>, version: SoapVersion) -> Self {
        Self {
            elements,
            version,
            depth: 0,
            seen_start: false,
            buffer: Vec::new(),
        }
    }

    /// Whether a header element is partially collected.
    pub fn in_progress(&self) -> bool {
        !self.buffer.is_empty()
    }
}

impl EventSink for HeaderElementCollector<'_> {
    fn add(&mut self, event: Event) -> Result<(), StroapError> {
        match &event {
            Event::StartElement(_) => {
                self.seen_start = true;
                self.depth += 1;
            }
            Event::EndElement(_) => self.depth -= 1,
            Event::StartDocument | Event::EndDocument => return Ok(()),
            _ => {}
        }

        if self.depth < 0 {
            warn!(depth = self.depth, "Header content closes more elements than it opens");
        }

        let closes = event.is_end_element();
        if self.depth >= 0 && self.seen_start {
            self.buffer.push(event);
        }

        if self.depth == 0 && closes {
            let events = std::mem::take(&mut self.buffer);
            self.seen_start = false;
            match HeaderElement::from_events(events, self.version) {
                Some(element) => self.elements.push(element),
                None => warn!("Discarding malformed header element events"),
            }
        }
        Ok(())
    }
}

impl Drop for HeaderElementCollector<'_> {
    fn drop(&mut self) {
        if self.in_progress() {
            warn!(
                events = self.buffer.len(),
                "Header element collector dropped with an unfinished element"
            );
        }
    }
}

/// Pull the next event and require it to be a start tag named `expected`.
pub(crate) fn expect_start(
    reader: &mut dyn EventReader,
    expected: QName,
) -> Result<StartElement, StroapError> {
    if !reader.has_next() {
        return Err(StroapError::InvalidEnvelope(format!(
            "document ends before {expected}"
        )));
    }
    match reader.next_event()? {
        Event::StartElement(start) if start.name == expected => Ok(start),
        Event::StartElement(start) => Err(StroapError::StructuralMismatch {
            expected,
            found: start.name,
        }),
        other => Err(StroapError::InvalidEnvelope(format!(
            "expected {expected}, found {other:?}"
        ))),
    }
}
