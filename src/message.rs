//! SOAP message: transport MIME headers plus an Envelope.

use crate::config::{SoapVersion, StroapConfig};
use crate::element::SoapElement;
use crate::envelope::Envelope;
use crate::error::StroapError;
use crate::event::{Event, QName};
use crate::parser::{escape_action, XmlEventReader};
use crate::payload::StreamingPayload;
use crate::transport::{
    MimeHeaders, TransportInput, TransportOutput, EMPTY_SOAP_ACTION, HEADER_ACCEPT,
    HEADER_CONTENT_TYPE, HEADER_SOAP_ACTION,
};
use crate::writer::{EventSink, NoDocumentEvents, XmlEventWriter};
use std::fmt;
use std::io::{BufRead, Write};
use tracing::debug;

/// A SOAP message.
#[derive(Debug)]
pub struct Message {
    config: StroapConfig,
    mime_headers: MimeHeaders,
    envelope: Envelope,
}

impl Message {
    /// Empty message for the configured SOAP version.
    pub fn new(config: StroapConfig) -> Self {
        let envelope = Envelope::new(config.soap_version);
        Self::from_parts(MimeHeaders::new(), envelope, config)
    }

    fn from_parts(mut mime_headers: MimeHeaders, envelope: Envelope, config: StroapConfig) -> Self {
        let content_type = config.soap_version.content_type();
        if !mime_headers.contains(HEADER_CONTENT_TYPE) {
            mime_headers.set(HEADER_CONTENT_TYPE, content_type);
        }
        if !mime_headers.contains(HEADER_ACCEPT) {
            mime_headers.set(HEADER_ACCEPT, content_type);
        }
        Self {
            config,
            mime_headers,
            envelope,
        }
    }

    /// Parse a message from a plain byte stream, without MIME headers.
    pub fn build<R: BufRead>(input: R, config: &StroapConfig) -> Result<Self, StroapError> {
        Self::build_with_headers(input, MimeHeaders::new(), config)
    }

    /// Parse a message, taking MIME headers from the transport.
    pub fn build_from_transport<T: TransportInput>(
        input: T,
        config: &StroapConfig,
    ) -> Result<Self, StroapError> {
        let headers = extract_mime_headers(&input, config.reader.split_header_values);
        Self::build_with_headers(input, headers, config)
    }

    fn build_with_headers<R: BufRead>(
        input: R,
        mime_headers: MimeHeaders,
        config: &StroapConfig,
    ) -> Result<Self, StroapError> {
        let envelope = parse_envelope(input, config)?;
        debug!(
            version = %config.soap_version,
            mime_headers = mime_headers.len(),
            "Built SOAP message"
        );
        Ok(Self::from_parts(mime_headers, envelope, config.clone()))
    }

    pub fn version(&self) -> SoapVersion {
        self.config.soap_version
    }

    pub fn config(&self) -> &StroapConfig {
        &self.config
    }

    pub fn mime_headers(&self) -> &MimeHeaders {
        &self.mime_headers
    }

    pub fn mime_headers_mut(&mut self) -> &mut MimeHeaders {
        &mut self.mime_headers
    }

    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    pub fn envelope_mut(&mut self) -> &mut Envelope {
        &mut self.envelope
    }

    /// The SOAPAction header, or `""` when unset.
    pub fn soap_action(&self) -> &str {
        match self.mime_headers.first(HEADER_SOAP_ACTION) {
            Some(action) if !action.is_empty() => action,
            _ => EMPTY_SOAP_ACTION,
        }
    }

    /// Store `action` as the SOAPAction header, quoted.
    pub fn set_soap_action(&mut self, action: Option<&str>) {
        self.mime_headers
            .set(HEADER_SOAP_ACTION, escape_action(action));
    }

    pub fn payload_name(&self) -> Option<QName> {
        self.envelope.body().payload_name()
    }

    pub fn has_fault(&self) -> bool {
        self.envelope.body().has_fault()
    }

    pub fn set_streaming_payload(&mut self, source: Box<dyn StreamingPayload>) {
        self.envelope.body_mut().set_streaming_payload(source);
    }

    /// Replace the envelope with one parsed from `bytes`.
    pub fn load_envelope(&mut self, bytes: &[u8]) -> Result<(), StroapError> {
        self.envelope = parse_envelope(bytes, &self.config)?;
        Ok(())
    }

    /// Always false: attachments are not supported.
    pub fn is_xop_package(&self) -> bool {
        false
    }

    /// Write the envelope as one XML document.
    pub fn write_to<W: Write>(&self, output: &mut W) -> Result<(), StroapError> {
        let mut writer = XmlEventWriter::with_config(output, &self.config.writer);
        writer.add(Event::StartDocument)?;
        self.envelope
            .write_to(&mut NoDocumentEvents::new(&mut writer))?;
        writer.add(Event::EndDocument)?;
        writer.finish()?;
        Ok(())
    }

    /// Hand every MIME header to the transport, then write the envelope.
    pub fn write_to_transport<T: TransportOutput>(&self, output: &mut T) -> Result<(), StroapError> {
        for (name, value) in self.mime_headers.iter() {
            output.add_header(name, value)?;
        }
        self.write_to(output)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, StroapError> {
        let mut bytes = Vec::new();
        self.write_to(&mut bytes)?;
        Ok(bytes)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StroapMessage")?;
        if let Some(name) = self.payload_name() {
            write!(f, " {}", name)?;
        }
        Ok(())
    }
}

fn parse_envelope<R: BufRead>(input: R, config: &StroapConfig) -> Result<Envelope, StroapError> {
    let mut reader = XmlEventReader::with_config(input, &config.reader);
    Envelope::build(&mut reader, config.soap_version).map_err(StroapError::message_creation)
}

/// Collect transport headers, optionally splitting values on `,`.
fn extract_mime_headers<T: TransportInput + ?Sized>(input: &T, split: bool) -> MimeHeaders {
    let mut headers = MimeHeaders::new();
    for name in input.header_names() {
        for value in input.headers(&name) {
            if split {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|token| !token.is_empty())
                    .for_each(|token| headers.add(&name, token));
            } else {
                headers.add(&name, value);
            }
        }
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{WriterConfig, SOAP_11_NS};
    use crate::error::ErrorKind;
    use crate::transport::{HeaderedInput, HeaderedOutput};

    const SAMPLE: &str = r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/"><soap:Body><m:ping xmlns:m="urn:m"/></soap:Body></soap:Envelope>"#;

    fn config() -> StroapConfig {
        StroapConfig {
            writer: WriterConfig {
                write_declaration: false,
                indent: None,
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_new_message_defaults() {
        let message = Message::new(StroapConfig::default());
        assert_eq!(message.version(), SoapVersion::Soap11);
        assert_eq!(message.mime_headers().first(HEADER_CONTENT_TYPE), Some("text/xml"));
        assert_eq!(message.mime_headers().first(HEADER_ACCEPT), Some("text/xml"));
        assert_eq!(message.soap_action(), "\"\"");
        assert!(!message.is_xop_package());
        assert_eq!(message.to_string(), "StroapMessage");
    }

    #[test]
    fn test_soap12_content_type() {
        let message = Message::new(StroapConfig::for_version(SoapVersion::Soap12));
        assert_eq!(
            message.mime_headers().first(HEADER_CONTENT_TYPE),
            Some("application/soap+xml")
        );
    }

    #[test]
    fn test_set_soap_action_quotes() {
        let mut message = Message::new(StroapConfig::default());
        message.set_soap_action(Some("urn:ping"));
        assert_eq!(message.soap_action(), "\"urn:ping\"");
        message.set_soap_action(None);
        assert_eq!(message.soap_action(), "\"\"");
    }

    #[test]
    fn test_build_and_write_round_trip() {
        let message = Message::build(SAMPLE.as_bytes(), &config()).unwrap();
        assert_eq!(message.payload_name(), Some(QName::new("urn:m", "ping")));
        assert_eq!(message.to_string(), "StroapMessage {urn:m}ping");
        assert_eq!(String::from_utf8(message.to_bytes().unwrap()).unwrap(), SAMPLE);
    }

    #[test]
    fn test_write_declaration() {
        let message = Message::build(SAMPLE.as_bytes(), &StroapConfig::default()).unwrap();
        let xml = String::from_utf8(message.to_bytes().unwrap()).unwrap();
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert_eq!(xml.matches("<?xml").count(), 1);
    }

    #[test]
    fn test_build_errors_are_message_creation_errors() {
        let err = Message::build("<Envelope/>".as_bytes(), &config()).unwrap_err();
        assert!(matches!(err, StroapError::MessageCreation(_)));
        assert_eq!(err.kind(), ErrorKind::StructuralMismatch);

        let truncated = format!(r#"<soap:Envelope xmlns:soap="{SOAP_11_NS}"><soap:Body></soap:Envelope>"#);
        let err = Message::build(truncated.as_bytes(), &config()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidXml);
    }

    #[test]
    fn test_build_from_transport_splits_values() {
        let mut headers = MimeHeaders::new();
        headers.add("Accept", "text/xml, application/soap+xml");
        headers.add(HEADER_SOAP_ACTION, "\"urn:ping\"");
        let input = HeaderedInput::new(headers, SAMPLE.as_bytes());

        let message = Message::build_from_transport(input, &config()).unwrap();
        assert_eq!(
            message.mime_headers().get("accept"),
            &["text/xml", "application/soap+xml"]
        );
        assert_eq!(message.soap_action(), "\"urn:ping\"");
        assert_eq!(message.mime_headers().first(HEADER_CONTENT_TYPE), Some("text/xml"));
    }

    #[test]
    fn test_build_from_transport_without_splitting() {
        let mut headers = MimeHeaders::new();
        headers.add("X-List", "a, b");
        let mut config = config();
        config.reader.split_header_values = false;

        let input = HeaderedInput::new(headers, SAMPLE.as_bytes());
        let message = Message::build_from_transport(input, &config).unwrap();
        assert_eq!(message.mime_headers().get("X-List"), &["a, b"]);
    }

    #[test]
    fn test_write_to_transport() {
        let mut message = Message::new(config());
        message.set_soap_action(Some("urn:a"));
        let mut output = HeaderedOutput::new(Vec::new());
        message.write_to_transport(&mut output).unwrap();

        let (headers, bytes) = output.into_parts();
        assert_eq!(headers.first(HEADER_SOAP_ACTION), Some("\"urn:a\""));
        assert_eq!(headers.first(HEADER_CONTENT_TYPE), Some("text/xml"));
        let xml = String::from_utf8(bytes).unwrap();
        assert_eq!(
            xml,
            format!(r#"<SOAP-ENV:Envelope xmlns:SOAP-ENV="{SOAP_11_NS}"><SOAP-ENV:Body/></SOAP-ENV:Envelope>"#)
        );
    }

    #[test]
    fn test_load_envelope_replaces_content() {
        let mut message = Message::new(config());
        message.envelope_mut().body_mut().add_client_or_sender_fault("x", None);
        assert!(message.has_fault());

        message.load_envelope(SAMPLE.as_bytes()).unwrap();
        assert!(!message.has_fault());
        assert_eq!(message.payload_name(), Some(QName::new("urn:m", "ping")));
    }
}
