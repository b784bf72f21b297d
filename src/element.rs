//! Base element of the SOAP tree and its lazy event reader.

use crate::config::DEFAULT_PREFIX;
use crate::error::StroapError;
use crate::event::{Attribute, EndElement, Event, Namespace, QName, StartElement};
use crate::reader::EventReader;
use crate::writer::{transfer, EventSink};
use tracing::trace;

/// Start and end tag of a SOAP structural element.
///
/// The end tag always has the same name as the start tag and carries the
/// same namespace declarations.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementNode {
    start: StartElement,
    end: EndElement,
}

impl ElementNode {
    /// Node for `name`; an empty prefix becomes `SOAP-ENV`.
    pub fn new(name: QName) -> Self {
        let name = if name.prefix().is_empty() {
            name.prefixed(DEFAULT_PREFIX)
        } else {
            name
        };
        Self::from_start(StartElement::new(name))
    }

    /// Node for `name` keeping its prefix, empty or not.
    pub fn unprefixed(name: QName) -> Self {
        Self::from_start(StartElement::new(name))
    }

    pub fn from_start(start: StartElement) -> Self {
        let end = start.end_element();
        Self { start, end }
    }

    pub fn name(&self) -> &QName {
        &self.start.name
    }

    pub fn start(&self) -> &StartElement {
        &self.start
    }

    pub fn end(&self) -> &EndElement {
        &self.end
    }

    pub fn attribute_names(&self) -> Vec<&QName> {
        self.start.attributes.iter().map(|a| &a.name).collect()
    }

    pub fn attribute_value(&self, name: &QName) -> Option<&str> {
        self.start.attribute(name).map(|a| a.value.as_str())
    }

    /// Add an attribute. The end tag is untouched.
    pub fn add_attribute(&mut self, name: QName, value: impl Into<String>) {
        let mut start = self.start.clone();
        start.attributes.push(Attribute::new(name, value));
        self.start = start;
    }

    /// Remove every attribute named `name`.
    pub fn remove_attribute(&mut self, name: &QName) {
        let mut start = self.start.clone();
        start.attributes.retain(|a| &a.name != name);
        self.start = start;
    }

    /// Replace the value of `name`, adding it when absent.
    pub fn set_attribute(&mut self, name: QName, value: impl Into<String>) {
        self.remove_attribute(&name);
        self.add_attribute(name, value);
    }

    /// Declare a namespace; an empty prefix declares the default namespace.
    pub fn add_namespace_declaration(&mut self, prefix: &str, namespace_uri: &str) {
        let mut start = self.start.clone();
        start.namespaces.push(Namespace::new(prefix, namespace_uri));
        self.start = start;
        self.end = self.start.end_element();
    }
}

/// Element of the SOAP tree: envelope, header, header element, body or
/// fault.
pub trait SoapElement {
    fn node(&self) -> &ElementNode;

    fn node_mut(&mut self) -> &mut ElementNode;

    /// Events of the element content, between its start and end tag.
    fn child_event_reader(&self) -> Result<Box<dyn EventReader + '_>, StroapError>;

    fn name(&self) -> &QName {
        self.node().name()
    }

    /// Lazy reader over this element and its descendants.
    fn event_reader(&self, document_events: bool) -> Result<ElementEventReader<'_>, StroapError> {
        Ok(ElementEventReader::new(
            self.node(),
            self.child_event_reader()?,
            document_events,
        ))
    }

    /// Push this element as a fragment, without document events.
    fn write_to(&self, sink: &mut dyn EventSink) -> Result<(), StroapError> {
        let mut reader = self.event_reader(false)?;
        transfer(&mut reader, sink)
    }

    fn attribute_names(&self) -> Vec<&QName> {
        self.node().attribute_names()
    }

    fn attribute_value(&self, name: &QName) -> Option<&str> {
        self.node().attribute_value(name)
    }

    fn add_attribute(&mut self, name: QName, value: &str) {
        self.node_mut().add_attribute(name, value);
    }

    fn remove_attribute(&mut self, name: &QName) {
        self.node_mut().remove_attribute(name);
    }

    fn add_namespace_declaration(&mut self, prefix: &str, namespace_uri: &str) {
        self.node_mut().add_namespace_declaration(prefix, namespace_uri);
    }
}

/// Position of an [`ElementEventReader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    StartDocument,
    StartElement,
    Children,
    EndElement,
    EndDocument,
    Done,
}

/// Lazy sequence `[StartDocument], start, children.., end, [EndDocument]`.
///
/// Not restartable: obtain a new reader from the element to read again.
///
/// `peek` in the [`ReaderState::Children`] state is not side-effect free:
/// when the child reader is exhausted it moves the reader to
/// [`ReaderState::EndElement`], the same transition `next_event` makes
/// without consuming anything.
pub struct ElementEventReader<'a> {
    node: &'a ElementNode,
    children: Box<dyn EventReader + 'a>,
    state: ReaderState,
    document_events: bool,
}

impl<'a> ElementEventReader<'a> {
    pub fn new(
        node: &'a ElementNode,
        children: Box<dyn EventReader + 'a>,
        document_events: bool,
    ) -> Self {
        let state = if document_events {
            ReaderState::StartDocument
        } else {
            ReaderState::StartElement
        };
        Self {
            node,
            children,
            state,
            document_events,
        }
    }

    pub fn state(&self) -> ReaderState {
        self.state
    }

    fn terminal_state(&self) -> ReaderState {
        if self.document_events {
            ReaderState::Done
        } else {
            ReaderState::EndDocument
        }
    }

    fn transition(&mut self, next: ReaderState) {
        trace!(element = %self.node.name(), from = ?self.state, to = ?next, "Element reader transition");
        self.state = next;
    }
}

impl EventReader for ElementEventReader<'_> {
    fn has_next(&mut self) -> bool {
        self.state != self.terminal_state()
    }

    fn next_event(&mut self) -> Result<Event, StroapError> {
        loop {
            match self.state {
                ReaderState::StartDocument => {
                    self.transition(ReaderState::StartElement);
                    return Ok(Event::StartDocument);
                }
                ReaderState::StartElement => {
                    self.transition(ReaderState::Children);
                    return Ok(Event::StartElement(self.node.start().clone()));
                }
                ReaderState::Children => {
                    if self.children.has_next() {
                        return self.children.next_event();
                    }
                    self.transition(ReaderState::EndElement);
                }
                ReaderState::EndElement => {
                    self.transition(ReaderState::EndDocument);
                    return Ok(Event::EndElement(self.node.end().clone()));
                }
                ReaderState::EndDocument => {
                    assert!(
                        self.document_events,
                        "no more events: element reader is exhausted"
                    );
                    self.transition(ReaderState::Done);
                    return Ok(Event::EndDocument);
                }
                ReaderState::Done => panic!("no more events: element reader is exhausted"),
            }
        }
    }

    fn peek(&mut self) -> Result<Option<Event>, StroapError> {
        Ok(match self.state {
            ReaderState::StartDocument => Some(Event::StartDocument),
            ReaderState::StartElement => Some(Event::StartElement(self.node.start().clone())),
            ReaderState::Children => match self.children.peek()? {
                Some(event) => Some(event),
                None => {
                    self.transition(ReaderState::EndElement);
                    Some(Event::EndElement(self.node.end().clone()))
                }
            },
            ReaderState::EndElement => Some(Event::EndElement(self.node.end().clone())),
            ReaderState::EndDocument if self.document_events => Some(Event::EndDocument),
            ReaderState::EndDocument | ReaderState::Done => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::{drain, BufferedEventReader};

    struct Leaf {
        node: ElementNode,
        content: Vec<Event>,
    }

    impl SoapElement for Leaf {
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

    fn leaf() -> Leaf {
        Leaf {
            node: ElementNode::new(QName::new("urn:x", "leaf")),
            content: vec![
                Event::start(QName::local("child")),
                Event::characters("text"),
                Event::end(QName::local("child")),
            ],
        }
    }

    #[test]
    fn test_default_prefix_assigned() {
        let node = ElementNode::new(QName::new("urn:x", "a"));
        assert_eq!(node.name().prefix(), DEFAULT_PREFIX);
        let node = ElementNode::new(QName::with_prefix("urn:x", "a", "x"));
        assert_eq!(node.name().prefix(), "x");
        let node = ElementNode::unprefixed(QName::local("detail"));
        assert_eq!(node.name().prefix(), "");
    }

    #[test]
    fn test_full_sequence_with_document_events() {
        let element = leaf();
        let mut reader = element.event_reader(true).unwrap();
        let events = drain(&mut reader).unwrap();

        assert_eq!(events.len(), 7);
        assert_eq!(events[0], Event::StartDocument);
        assert_eq!(events[1], Event::start(QName::new("urn:x", "leaf")));
        assert_eq!(events[2..5], element.content[..]);
        assert_eq!(events[5], Event::end(QName::new("urn:x", "leaf")));
        assert_eq!(events[6], Event::EndDocument);
        assert!(!reader.has_next());
        assert_eq!(reader.state(), ReaderState::Done);
    }

    #[test]
    fn test_fragment_sequence_without_document_events() {
        let element = leaf();
        let mut reader = element.event_reader(false).unwrap();
        assert_eq!(reader.state(), ReaderState::StartElement);
        let events = drain(&mut reader).unwrap();
        assert_eq!(events.len(), 5);
        assert!(!events.iter().any(Event::is_document_event));
        assert_eq!(reader.state(), ReaderState::EndDocument);
        assert_eq!(reader.peek().unwrap(), None);
    }

    #[test]
    #[should_panic(expected = "no more events")]
    fn test_next_after_done_panics() {
        let element = leaf();
        let mut reader = element.event_reader(true).unwrap();
        drain(&mut reader).unwrap();
        let _ = reader.next_event();
    }

    #[test]
    #[should_panic(expected = "no more events")]
    fn test_next_after_fragment_end_panics() {
        let element = leaf();
        let mut reader = element.event_reader(false).unwrap();
        drain(&mut reader).unwrap();
        let _ = reader.next_event();
    }

    #[test]
    fn test_peek_at_exhausted_children_moves_to_end_element() {
        let element = Leaf {
            node: ElementNode::new(QName::new("urn:x", "empty")),
            content: Vec::new(),
        };
        let mut reader = element.event_reader(false).unwrap();
        reader.next_event().unwrap();
        assert_eq!(reader.state(), ReaderState::Children);

        let peeked = reader.peek().unwrap();
        assert_eq!(peeked, Some(Event::end(QName::new("urn:x", "empty"))));
        assert_eq!(reader.state(), ReaderState::EndElement);

        assert_eq!(reader.next_event().unwrap(), peeked.unwrap());
        assert!(!reader.has_next());
    }

    #[test]
    fn test_peek_matches_next_at_every_step() {
        let element = leaf();
        let mut reader = element.event_reader(true).unwrap();
        while reader.has_next() {
            let peeked = reader.peek().unwrap();
            let next = reader.next_event().unwrap();
            assert_eq!(peeked, Some(next));
        }
        assert_eq!(reader.peek().unwrap(), None);
    }

    #[test]
    fn test_readers_restart_over_same_content() {
        let element = leaf();
        let first = drain(&mut element.event_reader(false).unwrap()).unwrap();
        let second = drain(&mut element.event_reader(false).unwrap()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_attribute_mutation_keeps_end() {
        let mut element = leaf();
        let end = element.node().end().clone();
        element.add_attribute(QName::local("id"), "7");
        assert_eq!(element.attribute_value(&QName::local("id")), Some("7"));
        assert_eq!(element.node().end(), &end);

        element.remove_attribute(&QName::local("id"));
        assert!(element.attribute_names().is_empty());
    }

    #[test]
    fn test_namespace_declaration_updates_end() {
        let mut element = leaf();
        element.add_namespace_declaration("p", "urn:p");
        element.add_namespace_declaration("", "urn:default");
        let node = element.node();
        assert_eq!(node.end().name, node.start().name);
        assert_eq!(node.end().namespaces, node.start().namespaces);
        assert!(node.start().namespaces.contains(&Namespace::default_namespace("urn:default")));
    }

    #[test]
    fn test_write_to_sink() {
        let element = leaf();
        let mut events: Vec<Event> = Vec::new();
        element.write_to(&mut events).unwrap();
        assert_eq!(events.len(), 5);
    }
}
