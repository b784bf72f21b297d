//! Streaming SOAP envelope model for Zentinel
//!
//! Represents SOAP messages as lazily produced XML event sequences instead
//! of a DOM tree. Messages are parsed top-down from a pull reader and
//! written bottom-up by composing per-element event readers.
//!
//! # Features
//!
//! - Envelope, Header and Body parsing for SOAP 1.1 and SOAP 1.2
//! - Header element grouping, mustUnderstand and actor/role filtering
//! - Caching, streaming and fault payloads
//! - Fault generation and parsing in either version's layout
//! - Namespace-repairing XML serialization backed by quick-xml
//!
//! # Example
//!
//! ```ignore
//! use zentinel_stroap::{Message, StroapConfig};
//!
//! let message = Message::build(xml.as_bytes(), &StroapConfig::default())?;
//! if let Some(header) = message.envelope().header_if_present() {
//!     for element in header.examine_must_understand_header_elements("urn:me") {
//!         println!("{}", element.name());
//!     }
//! }
//! let bytes = message.to_bytes()?;
//! ```

pub mod body;
pub mod config;
pub mod element;
pub mod envelope;
pub mod error;
pub mod event;
pub mod fault;
pub mod header;
pub mod message;
pub mod parser;
pub mod payload;
pub mod reader;
pub mod transport;
pub mod writer;

pub use body::Body;
pub use config::{SoapVersion, StroapConfig};
pub use element::{ElementEventReader, ElementNode, ReaderState, SoapElement};
pub use envelope::Envelope;
pub use error::{ErrorKind, StroapError};
pub use event::{Event, QName};
pub use fault::{Fault, FaultDetail};
pub use header::{Header, HeaderElement, HeaderElementCollector};
pub use message::Message;
pub use payload::{Payload, StreamingPayload};
pub use reader::EventReader;
pub use writer::EventSink;
