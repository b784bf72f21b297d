//! Error types for the streaming SOAP envelope model.

use crate::event::QName;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use thiserror::Error;

/// Errors raised while building, reading or writing SOAP messages.
#[derive(Error, Debug)]
pub enum StroapError {
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("XML parsing error: {0}")]
    XmlParse(String),

    #[error("XML writing error: {0}")]
    XmlWrite(String),

    #[error("No SOAP Envelope found: document contains no elements")]
    MissingEnvelope,

    #[error("Invalid SOAP message: expected element {expected}, found {found}")]
    StructuralMismatch { expected: QName, found: QName },

    #[error("Unexpected element {0} in SOAP Envelope")]
    UnexpectedElement(QName),

    #[error("SOAP Envelope does not contain a Body")]
    MissingBody,

    #[error("Invalid SOAP envelope: {0}")]
    InvalidEnvelope(String),

    #[error("Invalid SOAP Fault: {0}")]
    InvalidFault(String),

    #[error("Streaming payload has already been consumed")]
    PayloadConsumed,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Could not create message: {0}")]
    MessageCreation(#[source] Box<StroapError>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StroapError {
    /// Wraps an error raised below the message-building boundary.
    pub fn message_creation(error: StroapError) -> Self {
        match error {
            already @ StroapError::MessageCreation(_) => already,
            other => StroapError::MessageCreation(Box::new(other)),
        }
    }

    /// Stable classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Xml(_) | Self::XmlParse(_) => ErrorKind::InvalidXml,
            Self::XmlWrite(_) => ErrorKind::Io,
            Self::MissingEnvelope => ErrorKind::MissingEnvelope,
            Self::StructuralMismatch { .. } => ErrorKind::StructuralMismatch,
            Self::UnexpectedElement(_) => ErrorKind::UnexpectedElement,
            Self::MissingBody => ErrorKind::MissingBody,
            Self::InvalidEnvelope(_) => ErrorKind::InvalidEnvelope,
            Self::InvalidFault(_) => ErrorKind::InvalidFault,
            Self::PayloadConsumed => ErrorKind::PayloadConsumed,
            Self::Config(_) => ErrorKind::Config,
            Self::MessageCreation(inner) => inner.kind(),
            Self::Io(_) => ErrorKind::Io,
        }
    }
}

/// Maps an XML engine error of any shape into [`StroapError::XmlParse`].
pub(crate) fn xml_error<E: Display>(error: E) -> StroapError {
    StroapError::XmlParse(error.to_string())
}

/// Classification codes for [`StroapError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Malformed bytes or encoding errors from the XML engine
    InvalidXml,
    /// Document without any element
    MissingEnvelope,
    /// Root element is not the Envelope of the configured version
    StructuralMismatch,
    /// Element other than Header or Body inside the Envelope
    UnexpectedElement,
    /// Envelope without a Body
    MissingBody,
    /// Truncated Header or Body
    InvalidEnvelope,
    /// Fault without a fault code
    InvalidFault,
    /// Streaming payload read twice
    PayloadConsumed,
    /// Bad configuration
    Config,
    /// IO failure
    Io,
}

impl ErrorKind {
    /// Get the string code for this error kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidXml => "INVALID_XML",
            Self::MissingEnvelope => "MISSING_ENVELOPE",
            Self::StructuralMismatch => "STRUCTURAL_MISMATCH",
            Self::UnexpectedElement => "UNEXPECTED_ELEMENT",
            Self::MissingBody => "MISSING_BODY",
            Self::InvalidEnvelope => "INVALID_ENVELOPE",
            Self::InvalidFault => "INVALID_FAULT",
            Self::PayloadConsumed => "PAYLOAD_CONSUMED",
            Self::Config => "CONFIG",
            Self::Io => "IO",
        }
    }
}
