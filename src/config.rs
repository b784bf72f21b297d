//! Configuration types for the streaming SOAP model.

use crate::error::StroapError;
use crate::event::QName;
use serde::{Deserialize, Serialize};

/// Prefix given to SOAP structural elements created without one.
pub const DEFAULT_PREFIX: &str = "SOAP-ENV";

/// SOAP namespace URIs.
pub const SOAP_11_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
pub const SOAP_12_NS: &str = "http://www.w3.org/2003/05/soap-envelope";

/// Main configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StroapConfig {
    /// Config version
    pub version: String,

    /// SOAP profile fixing the structural element names
    pub soap_version: SoapVersion,

    /// Parsing options
    pub reader: ReaderConfig,

    /// Serialization options
    pub writer: WriterConfig,
}

impl Default for StroapConfig {
    fn default() -> Self {
        Self {
            version: "1".to_string(),
            soap_version: SoapVersion::Soap11,
            reader: ReaderConfig::default(),
            writer: WriterConfig::default(),
        }
    }
}

impl StroapConfig {
    /// Configuration for a SOAP version with default options.
    pub fn for_version(soap_version: SoapVersion) -> Self {
        Self {
            soap_version,
            ..Default::default()
        }
    }

    /// Parse a YAML configuration document.
    pub fn from_yaml(yaml: &str) -> Result<Self, StroapError> {
        serde_yaml::from_str(yaml).map_err(|e| StroapError::Config(e.to_string()))
    }
}

/// Parsing options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Drop whitespace-only text events
    pub skip_whitespace: bool,

    /// Split transport header values on commas
    pub split_header_values: bool,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            skip_whitespace: false,
            split_header_values: true,
        }
    }
}

/// Serialization options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    /// Write the XML declaration for StartDocument events
    pub write_declaration: bool,

    /// Pretty-print with this indentation
    pub indent: Option<IndentConfig>,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            write_declaration: true,
            indent: None,
        }
    }
}

/// Indentation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndentConfig {
    #[serde(rename = "char")]
    pub indent_char: char,
    pub size: usize,
}

/// SOAP versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SoapVersion {
    /// SOAP 1.1 (namespace: http://schemas.xmlsoap.org/soap/envelope/)
    #[serde(rename = "1.1")]
    Soap11,
    /// SOAP 1.2 (namespace: http://www.w3.org/2003/05/soap-envelope)
    #[serde(rename = "1.2")]
    Soap12,
}

impl SoapVersion {
    pub fn envelope_namespace_uri(&self) -> &'static str {
        match self {
            Self::Soap11 => SOAP_11_NS,
            Self::Soap12 => SOAP_12_NS,
        }
    }

    fn name(&self, local_part: &str) -> QName {
        QName::new(self.envelope_namespace_uri(), local_part)
    }

    pub fn envelope_name(&self) -> QName {
        self.name("Envelope")
    }

    pub fn header_name(&self) -> QName {
        self.name("Header")
    }

    pub fn body_name(&self) -> QName {
        self.name("Body")
    }

    pub fn fault_name(&self) -> QName {
        self.name("Fault")
    }

    pub fn must_understand_attribute_name(&self) -> QName {
        self.name("mustUnderstand")
    }

    /// `actor` in SOAP 1.1, `role` in SOAP 1.2.
    pub fn actor_or_role_name(&self) -> QName {
        match self {
            Self::Soap11 => self.name("actor"),
            Self::Soap12 => self.name("role"),
        }
    }

    pub fn client_or_sender_fault_name(&self) -> QName {
        match self {
            Self::Soap11 => self.name("Client"),
            Self::Soap12 => self.name("Sender"),
        }
    }

    pub fn server_or_receiver_fault_name(&self) -> QName {
        match self {
            Self::Soap11 => self.name("Server"),
            Self::Soap12 => self.name("Receiver"),
        }
    }

    pub fn must_understand_fault_name(&self) -> QName {
        self.name("MustUnderstand")
    }

    pub fn version_mismatch_fault_name(&self) -> QName {
        self.name("VersionMismatch")
    }

    pub fn next_actor_or_role_uri(&self) -> &'static str {
        match self {
            Self::Soap11 => "http://schemas.xmlsoap.org/soap/actor/next",
            Self::Soap12 => "http://www.w3.org/2003/05/soap-envelope/role/next",
        }
    }

    /// Empty for SOAP 1.1, which has no "none" actor.
    pub fn none_actor_or_role_uri(&self) -> &'static str {
        match self {
            Self::Soap11 => "",
            Self::Soap12 => "http://www.w3.org/2003/05/soap-envelope/role/none",
        }
    }

    /// Empty for SOAP 1.1, where the ultimate receiver is implied.
    pub fn ultimate_receiver_role_uri(&self) -> &'static str {
        match self {
            Self::Soap11 => "",
            Self::Soap12 => "http://www.w3.org/2003/05/soap-envelope/role/ultimateReceiver",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Soap11 => "text/xml",
            Self::Soap12 => "application/soap+xml",
        }
    }
}

impl std::fmt::Display for SoapVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Soap11 => write!(f, "SOAP 1.1"),
            Self::Soap12 => write!(f, "SOAP 1.2"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StroapConfig::default();
        assert_eq!(config.soap_version, SoapVersion::Soap11);
        assert!(config.reader.split_header_values);
        assert!(!config.reader.skip_whitespace);
        assert!(config.writer.write_declaration);
        assert!(config.writer.indent.is_none());
    }

    #[test]
    fn test_config_serialization() {
        let config = StroapConfig::for_version(SoapVersion::Soap12);
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: StroapConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.soap_version, SoapVersion::Soap12);
    }

    #[test]
    fn test_config_from_yaml() {
        let yaml = r#"
version: "1"
soap_version: "1.2"
reader:
  skip_whitespace: true
writer:
  write_declaration: false
  indent:
    char: " "
    size: 4
"#;
        let config = StroapConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.soap_version, SoapVersion::Soap12);
        assert!(config.reader.skip_whitespace);
        assert!(config.reader.split_header_values);
        assert!(!config.writer.write_declaration);
        let indent = config.writer.indent.unwrap();
        assert_eq!(indent.indent_char, ' ');
        assert_eq!(indent.size, 4);
    }

    #[test]
    fn test_config_from_invalid_yaml() {
        let result = StroapConfig::from_yaml("soap_version: \"9.9\"");
        assert!(matches!(result, Err(StroapError::Config(_))));
    }

    #[test]
    fn test_soap_11_names() {
        let v = SoapVersion::Soap11;
        assert_eq!(v.envelope_name(), QName::new(SOAP_11_NS, "Envelope"));
        assert_eq!(v.actor_or_role_name().local_part(), "actor");
        assert_eq!(v.client_or_sender_fault_name().local_part(), "Client");
        assert_eq!(v.content_type(), "text/xml");
    }

    #[test]
    fn test_soap_12_names() {
        let v = SoapVersion::Soap12;
        assert_eq!(v.body_name(), QName::new(SOAP_12_NS, "Body"));
        assert_eq!(v.actor_or_role_name().local_part(), "role");
        assert_eq!(v.server_or_receiver_fault_name().local_part(), "Receiver");
        assert_eq!(v.content_type(), "application/soap+xml");
        assert_eq!(v.to_string(), "SOAP 1.2");
    }
}
