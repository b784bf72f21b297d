//! SOAP Body.

use crate::config::SoapVersion;
use crate::element::{ElementNode, SoapElement};
use crate::error::StroapError;
use crate::event::{Event, Namespace, QName};
use crate::fault::Fault;
use crate::header::expect_start;
use crate::payload::{CachingPayload, Payload, PayloadSink, StreamedPayload, StreamingPayload};
use crate::reader::EventReader;
use tracing::{debug, warn};

/// SOAP Body element, holding exactly one [`Payload`].
#[derive(Debug)]
pub struct Body {
    node: ElementNode,
    version: SoapVersion,
    payload: Payload,
}

impl Body {
    /// Empty Body with an empty caching payload.
    pub fn new(version: SoapVersion) -> Self {
        Self {
            node: ElementNode::new(version.body_name()),
            version,
            payload: Payload::default(),
        }
    }

    /// Build a Body from `reader`, positioned on the Body start tag.
    /// `scope` holds the declarations made by enclosing elements.
    pub fn build(
        reader: &mut dyn EventReader,
        version: SoapVersion,
        scope: &[Namespace],
    ) -> Result<Self, StroapError> {
        let start = expect_start(reader, version.body_name())?;

        let mut events = Vec::new();
        let mut depth = 0usize;
        loop {
            if !reader.has_next() {
                return Err(StroapError::InvalidEnvelope(
                    "document ends inside Body".to_string(),
                ));
            }
            let event = reader.next_event()?;
            match &event {
                Event::StartElement(_) => depth += 1,
                Event::EndElement(_) if depth == 0 => break,
                Event::EndElement(_) => depth -= 1,
                _ => {}
            }
            events.push(event);
        }

        let mut scope = scope.to_vec();
        scope.extend(start.namespaces.iter().cloned());

        let payload = match fault_range(&events, &version.fault_name()) {
            Some((from, to)) => match Fault::parse(&events[from..=to], version, &scope) {
                Ok(fault) => Payload::Fault(fault),
                Err(e) => {
                    warn!(error = %e, "Keeping unreadable Fault as a caching payload");
                    Payload::Caching(CachingPayload::from_events(events))
                }
            },
            None => Payload::Caching(CachingPayload::from_events(events)),
        };
        debug!(
            version = %version,
            payload = payload.kind(),
            "Parsed SOAP Body"
        );

        Ok(Self {
            node: ElementNode::from_start(start),
            version,
            payload,
        })
    }

    pub fn version(&self) -> SoapVersion {
        self.version
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn payload_name(&self) -> Option<QName> {
        self.payload.name()
    }

    /// Fresh reader over the payload, without the Body tags.
    pub fn payload_event_reader(&self) -> Result<Box<dyn EventReader + '_>, StroapError> {
        self.payload.event_reader()
    }

    /// Sink for new payload content.
    ///
    /// A caching payload is reused after clearing it; any other payload is
    /// discarded and replaced by an empty caching one.
    pub fn payload_result(&mut self) -> PayloadSink<'_> {
        if !matches!(self.payload, Payload::Caching(_)) {
            debug!(
                previous = self.payload.kind(),
                "Replacing Body payload with a caching payload"
            );
            self.payload = Payload::Caching(CachingPayload::new());
        }
        match &mut self.payload {
            Payload::Caching(caching) => caching.result(),
            _ => unreachable!("payload was just made a caching payload"),
        }
    }

    /// Replace the payload with one written by `source` on first read.
    pub fn set_streaming_payload(&mut self, source: Box<dyn StreamingPayload>) {
        self.payload = Payload::Streaming(StreamedPayload::new(source));
    }

    pub fn has_fault(&self) -> bool {
        self.payload.is_fault()
    }

    pub fn fault(&self) -> Option<&Fault> {
        match &self.payload {
            Payload::Fault(fault) => Some(fault),
            _ => None,
        }
    }

    pub fn fault_mut(&mut self) -> Option<&mut Fault> {
        match &mut self.payload {
            Payload::Fault(fault) => Some(fault),
            _ => None,
        }
    }

    /// Replace the payload with a Fault of the given code.
    pub fn add_fault(&mut self, code: QName, reason: &str, locale: Option<&str>) -> &mut Fault {
        debug!(code = %code, "Adding SOAP Fault to Body");
        self.payload = Payload::Fault(Fault::new(self.version, code, reason, locale));
        match &mut self.payload {
            Payload::Fault(fault) => fault,
            _ => unreachable!("payload was just made a fault"),
        }
    }

    pub fn add_must_understand_fault(&mut self, reason: &str, locale: Option<&str>) -> &mut Fault {
        self.add_fault(self.version.must_understand_fault_name(), reason, locale)
    }

    /// `Client` fault in SOAP 1.1, `Sender` in SOAP 1.2.
    pub fn add_client_or_sender_fault(&mut self, reason: &str, locale: Option<&str>) -> &mut Fault {
        self.add_fault(self.version.client_or_sender_fault_name(), reason, locale)
    }

    /// `Server` fault in SOAP 1.1, `Receiver` in SOAP 1.2.
    pub fn add_server_or_receiver_fault(
        &mut self,
        reason: &str,
        locale: Option<&str>,
    ) -> &mut Fault {
        self.add_fault(self.version.server_or_receiver_fault_name(), reason, locale)
    }

    pub fn add_version_mismatch_fault(&mut self, reason: &str, locale: Option<&str>) -> &mut Fault {
        self.add_fault(self.version.version_mismatch_fault_name(), reason, locale)
    }
}

impl SoapElement for Body {
    fn node(&self) -> &ElementNode {
        &self.node
    }

    fn node_mut(&mut self) -> &mut ElementNode {
        &mut self.node
    }

    fn child_event_reader(&self) -> Result<Box<dyn EventReader + '_>, StroapError> {
        self.payload.event_reader()
    }
}

/// Index range of the first top-level element, when it is a Fault.
fn fault_range(events: &[Event], fault_name: &QName) -> Option<(usize, usize)> {
    let from = events.iter().position(Event::is_start_element)?;
    match &events[from] {
        Event::StartElement(start) if &start.name == fault_name => {}
        _ => return None,
    }
    let mut depth = 0usize;
    for (i, event) in events.iter().enumerate().skip(from) {
        match event {
            Event::StartElement(_) => depth += 1,
            Event::EndElement(_) => {
                depth -= 1;
                if depth == 0 {
                    return Some((from, i));
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{WriterConfig, SOAP_11_NS};
    use crate::event::OtherEvent;
    use crate::parser::XmlEventReader;
    use crate::reader::drain;
    use crate::writer::{events_to_string, EventSink};

    struct Echo(&'static str);

    impl StreamingPayload for Echo {
        fn name(&self) -> QName {
            QName::new("urn:echo", "echo")
        }

        fn write_to(&self, sink: &mut dyn EventSink) -> Result<(), StroapError> {
            sink.add(Event::start(self.name()))?;
            sink.add(Event::characters(self.0))?;
            sink.add(Event::end(self.name()))
        }
    }

    fn render(body: &Body) -> String {
        let config = WriterConfig {
            write_declaration: false,
            indent: None,
        };
        events_to_string(&mut body.event_reader(false).unwrap(), &config).unwrap()
    }

    fn build(xml: &str) -> Result<Body, StroapError> {
        let mut reader = XmlEventReader::from_bytes(xml.as_bytes());
        reader.next_event().unwrap();
        Body::build(&mut reader, SoapVersion::Soap11, &[])
    }

    #[test]
    fn test_new_body_is_empty() {
        let body = Body::new(SoapVersion::Soap11);
        assert!(!body.has_fault());
        assert_eq!(body.payload_name(), None);
        assert_eq!(
            render(&body),
            format!(r#"<SOAP-ENV:Body xmlns:SOAP-ENV="{SOAP_11_NS}"/>"#)
        );
    }

    #[test]
    fn test_must_understand_fault() {
        let mut body = Body::new(SoapVersion::Soap11);
        body.add_must_understand_fault("SOAP Must Understand Error", None);
        assert!(body.has_fault());

        let xml = render(&body);
        assert!(xml.contains(
            "<faultcode>SOAP-ENV:MustUnderstand</faultcode><faultstring>SOAP Must Understand Error</faultstring>"
        ));
    }

    #[test]
    fn test_payload_result_twice_keeps_second_content() {
        let mut body = Body::new(SoapVersion::Soap11);
        {
            let mut sink = body.payload_result();
            sink.add(Event::start(QName::local("first"))).unwrap();
            sink.add(Event::end(QName::local("first"))).unwrap();
        }
        {
            let mut sink = body.payload_result();
            sink.add(Event::start(QName::local("second"))).unwrap();
            sink.add(Event::end(QName::local("second"))).unwrap();
        }
        let events = drain(&mut body.payload_event_reader().unwrap()).unwrap();
        assert_eq!(
            events,
            vec![Event::start(QName::local("second")), Event::end(QName::local("second"))]
        );
    }

    #[test]
    fn test_payload_result_discards_fault() {
        let mut body = Body::new(SoapVersion::Soap11);
        body.add_client_or_sender_fault("bad", None);
        assert!(body.has_fault());
        {
            let mut sink = body.payload_result();
            sink.add(Event::Other(OtherEvent::Comment("ok".to_string()))).unwrap();
        }
        assert!(!body.has_fault());
        assert!(body.fault().is_none());
        assert!(matches!(body.payload(), Payload::Caching(_)));
    }

    #[test]
    fn test_streaming_payload_replaces_fault() {
        let mut body = Body::new(SoapVersion::Soap11);
        body.add_server_or_receiver_fault("down", Some("en"));
        body.set_streaming_payload(Box::new(Echo("hi")));
        assert!(!body.has_fault());
        assert_eq!(body.payload_name(), Some(QName::new("urn:echo", "echo")));

        let xml = render(&body);
        assert!(xml.contains(r#"<echo xmlns="urn:echo">hi</echo>"#));
        assert!(matches!(
            body.payload_event_reader(),
            Err(StroapError::PayloadConsumed)
        ));
    }

    #[test]
    fn test_fault_codes_per_version() {
        let mut body = Body::new(SoapVersion::Soap12);
        let code = body.add_version_mismatch_fault("v", None).fault_code().clone();
        assert_eq!(code.local_part(), "VersionMismatch");
        let code = body.add_client_or_sender_fault("c", None).fault_code().clone();
        assert_eq!(code.local_part(), "Sender");
        let code = body.add_server_or_receiver_fault("s", None).fault_code().clone();
        assert_eq!(code.local_part(), "Receiver");
    }

    #[test]
    fn test_fault_mut_sets_actor() {
        let mut body = Body::new(SoapVersion::Soap11);
        body.add_client_or_sender_fault("bad", None);
        body.fault_mut().unwrap().set_fault_actor_or_role("urn:gateway");
        assert_eq!(
            body.fault().unwrap().fault_actor_or_role(),
            Some("urn:gateway")
        );
    }

    #[test]
    fn test_build_caching_payload() {
        let body = build(&format!(
            r#"<soap:Body xmlns:soap="{SOAP_11_NS}"><m:get xmlns:m="urn:m"><m:id>7</m:id></m:get></soap:Body>"#
        ))
        .unwrap();
        assert!(!body.has_fault());
        assert_eq!(body.payload_name(), Some(QName::new("urn:m", "get")));
        assert_eq!(drain(&mut body.payload_event_reader().unwrap()).unwrap().len(), 5);
    }

    #[test]
    fn test_build_fault_payload_with_envelope_prefix() {
        let scope = [Namespace::new("soap", SOAP_11_NS)];
        let xml = r#"<soap:Body><soap:Fault><faultcode>soap:Client</faultcode><faultstring>no</faultstring></soap:Fault></soap:Body>"#;
        let wrapped = format!(r#"<soap:Envelope xmlns:soap="{SOAP_11_NS}">{xml}</soap:Envelope>"#);
        let mut reader = XmlEventReader::from_bytes(wrapped.as_bytes());
        reader.next_event().unwrap();
        reader.next_event().unwrap();

        let body = Body::build(&mut reader, SoapVersion::Soap11, &scope).unwrap();
        let fault = body.fault().unwrap();
        assert_eq!(fault.fault_code(), &QName::new(SOAP_11_NS, "Client"));
        assert_eq!(fault.fault_string_or_reason(), "no");
    }

    #[test]
    fn test_build_unreadable_fault_as_caching_payload() {
        let xml = format!(
            r#"<soap:Body xmlns:soap="{SOAP_11_NS}"><soap:Fault><faultcode>zz:Client</faultcode></soap:Fault></soap:Body>"#
        );
        let body = build(&xml).unwrap();
        assert!(!body.has_fault());
        assert!(matches!(body.payload(), Payload::Caching(_)));
        assert_eq!(body.payload_name(), Some(SoapVersion::Soap11.fault_name()));
        assert_eq!(render(&body), xml);
    }

    #[test]
    fn test_build_truncated_body_fails() {
        let events = vec![
            Event::start(SoapVersion::Soap11.body_name()),
            Event::start(QName::local("p")),
        ];
        let mut reader = crate::reader::BufferedEventReader::new(events);
        let err = Body::build(&mut reader, SoapVersion::Soap11, &[]).unwrap_err();
        assert!(matches!(err, StroapError::InvalidEnvelope(_)));
    }
}
