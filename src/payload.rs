//! Body payloads.
//!
//! A Body holds exactly one [`Payload`]. The variant decides how its
//! events are produced: replayed from a buffer, bridged from a push-style
//! writer, or generated from a [`Fault`].

use crate::config::WriterConfig;
use crate::element::SoapElement;
use crate::error::StroapError;
use crate::event::{Event, QName};
use crate::fault::Fault;
use crate::parser::XmlEventReader;
use crate::reader::{drain, BufferedEventReader, EventReader};
use crate::writer::{EventBuffer, EventSink, XmlEventWriter};
use std::cell::Cell;
use std::fmt;
use tracing::debug;

/// Push-style payload producer, written once when the payload is read.
pub trait StreamingPayload {
    /// Name of the payload root element.
    fn name(&self) -> QName;

    /// Push the payload events into `sink`.
    fn write_to(&self, sink: &mut dyn EventSink) -> Result<(), StroapError>;
}

/// Sink writing into a caching payload.
pub type PayloadSink<'a> = EventBuffer<'a>;

/// Content of a SOAP Body.
#[derive(Debug)]
pub enum Payload {
    Caching(CachingPayload),
    Streaming(StreamedPayload),
    Fault(Fault),
}

impl Payload {
    /// Fresh reader over the payload events.
    pub fn event_reader(&self) -> Result<Box<dyn EventReader + '_>, StroapError> {
        match self {
            Payload::Caching(caching) => Ok(Box::new(caching.event_reader())),
            Payload::Streaming(streamed) => Ok(Box::new(streamed.event_reader()?)),
            Payload::Fault(fault) => Ok(Box::new(fault.event_reader(false)?)),
        }
    }

    /// Name of the payload root element, if there is one.
    pub fn name(&self) -> Option<QName> {
        match self {
            Payload::Caching(caching) => caching.name(),
            Payload::Streaming(streamed) => Some(streamed.name().clone()),
            Payload::Fault(fault) => Some(fault.name().clone()),
        }
    }

    pub fn is_fault(&self) -> bool {
        matches!(self, Payload::Fault(_))
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Payload::Caching(_) => "caching",
            Payload::Streaming(_) => "streaming",
            Payload::Fault(_) => "fault",
        }
    }
}

impl Default for Payload {
    fn default() -> Self {
        Payload::Caching(CachingPayload::default())
    }
}

/// Fully buffered payload, replayable any number of times.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CachingPayload {
    events: Vec<Event>,
}

impl CachingPayload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_events(events: Vec<Event>) -> Self {
        Self { events }
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn event_reader(&self) -> BufferedEventReader<'_> {
        BufferedEventReader::new(&self.events[..])
    }

    pub fn name(&self) -> Option<QName> {
        self.events
            .iter()
            .find_map(Event::as_start_element)
            .map(|start| start.name.clone())
    }

    /// Clear the buffer and return a sink writing into it.
    pub fn result(&mut self) -> PayloadSink<'_> {
        self.events.clear();
        EventBuffer::new(&mut self.events)
    }
}

/// Streaming payload held by a Body.
///
/// The producer pushes its output through an XML byte buffer that is
/// parsed back into events. This happens once, on the first successful
/// read; the producer is released afterwards and further reads fail with
/// [`StroapError::PayloadConsumed`]. A producer that fails is kept, so the
/// next read retries it.
pub struct StreamedPayload {
    name: QName,
    source: Cell<Option<Box<dyn StreamingPayload>>>,
}

impl StreamedPayload {
    pub fn new(source: Box<dyn StreamingPayload>) -> Self {
        Self {
            name: source.name(),
            source: Cell::new(Some(source)),
        }
    }

    pub fn name(&self) -> &QName {
        &self.name
    }

    /// Whether the producer has already been written out.
    pub fn is_consumed(&self) -> bool {
        let source = self.source.take();
        let consumed = source.is_none();
        self.source.set(source);
        consumed
    }

    pub fn event_reader(&self) -> Result<BufferedEventReader<'static>, StroapError> {
        let source = self.source.take().ok_or(StroapError::PayloadConsumed)?;
        debug!(payload = %self.name, "Materializing streaming payload");

        let config = WriterConfig {
            write_declaration: false,
            indent: None,
        };
        let mut writer = XmlEventWriter::with_config(Vec::new(), &config);
        let bytes = match source.write_to(&mut writer).and_then(|()| writer.finish()) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.source.set(Some(source));
                return Err(e);
            }
        };

        let mut events = drain(&mut XmlEventReader::from_bytes(&bytes))?;
        events.retain(|event| !event.is_document_event());
        Ok(BufferedEventReader::new(events))
    }
}

impl fmt::Debug for StreamedPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamedPayload")
            .field("name", &self.name)
            .field("consumed", &self.is_consumed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct GreetingPayload;

    impl StreamingPayload for GreetingPayload {
        fn name(&self) -> QName {
            QName::with_prefix("urn:greet", "hello", "g")
        }

        fn write_to(&self, sink: &mut dyn EventSink) -> Result<(), StroapError> {
            sink.add(Event::StartDocument)?;
            sink.add(Event::start(self.name()))?;
            sink.add(Event::characters("world"))?;
            sink.add(Event::end(self.name()))?;
            sink.add(Event::EndDocument)
        }
    }

    #[test]
    fn test_caching_payload_replays() {
        let payload = Payload::Caching(CachingPayload::from_events(vec![
            Event::start(QName::local("p")),
            Event::end(QName::local("p")),
        ]));
        let first = drain(&mut payload.event_reader().unwrap()).unwrap();
        let second = drain(&mut payload.event_reader().unwrap()).unwrap();
        assert_eq!(first, second);
        assert_eq!(payload.name(), Some(QName::local("p")));
    }

    #[test]
    fn test_caching_result_clears_previous_content() {
        let mut caching = CachingPayload::from_events(vec![Event::characters("old")]);
        {
            let mut sink = caching.result();
            sink.add(Event::StartDocument).unwrap();
            sink.add(Event::characters("new")).unwrap();
            sink.add(Event::EndDocument).unwrap();
        }
        assert_eq!(caching.events(), &[Event::characters("new")]);
    }

    #[test]
    fn test_empty_caching_payload_has_no_name() {
        assert_eq!(CachingPayload::new().name(), None);
    }

    #[test]
    fn test_streaming_payload_materializes_once() {
        let streamed = StreamedPayload::new(Box::new(GreetingPayload));
        assert!(!streamed.is_consumed());
        assert_eq!(streamed.name().local_part(), "hello");

        let events = drain(&mut streamed.event_reader().unwrap()).unwrap();
        assert_eq!(events.len(), 3);
        let start = events[0].as_start_element().unwrap();
        assert_eq!(start.name, QName::new("urn:greet", "hello"));
        assert_eq!(start.name.prefix(), "g");
        assert_eq!(events[1], Event::characters("world"));
        assert!(events[2].is_end_element());
        assert!(streamed.is_consumed());
        assert!(matches!(
            streamed.event_reader(),
            Err(StroapError::PayloadConsumed)
        ));
    }

    struct FlakyPayload {
        failed: Cell<bool>,
    }

    impl StreamingPayload for FlakyPayload {
        fn name(&self) -> QName {
            QName::local("flaky")
        }

        fn write_to(&self, sink: &mut dyn EventSink) -> Result<(), StroapError> {
            if !self.failed.replace(true) {
                return Err(std::io::Error::other("source unavailable").into());
            }
            sink.add(Event::start(self.name()))?;
            sink.add(Event::end(self.name()))
        }
    }

    #[test]
    fn test_failed_streaming_payload_keeps_producer() {
        let streamed = StreamedPayload::new(Box::new(FlakyPayload {
            failed: Cell::new(false),
        }));
        let err = streamed.event_reader().unwrap_err();
        assert!(matches!(err, StroapError::Io(_)));
        assert!(!streamed.is_consumed());

        let events = drain(&mut streamed.event_reader().unwrap()).unwrap();
        assert_eq!(events.len(), 2);
        assert!(streamed.is_consumed());
    }

    #[test]
    fn test_streaming_payload_name_before_read() {
        let payload = Payload::Streaming(StreamedPayload::new(Box::new(GreetingPayload)));
        assert_eq!(payload.name(), Some(QName::new("urn:greet", "hello")));
        assert!(!payload.is_fault());
    }
}
