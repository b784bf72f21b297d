//! XML event model.
//!
//! Events are the unit of exchange between the SOAP element tree and the
//! XML engine: parsing produces them, serialization consumes them. They
//! are immutable values; element mutation replaces whole events.

use std::fmt;
use std::hash::{Hash, Hasher};

/// Namespace URI bound to the reserved `xml` prefix.
pub const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

/// Qualified XML name.
///
/// The prefix is cosmetic: equality and hashing only consider the
/// namespace URI and the local part.
#[derive(Debug, Clone, Default, Eq)]
pub struct QName {
    namespace_uri: String,
    local_part: String,
    prefix: String,
}

impl QName {
    /// Create a name in a namespace, without a prefix.
    pub fn new(namespace_uri: impl Into<String>, local_part: impl Into<String>) -> Self {
        Self::with_prefix(namespace_uri, local_part, "")
    }

    /// Create a name in a namespace with the given prefix.
    pub fn with_prefix(
        namespace_uri: impl Into<String>,
        local_part: impl Into<String>,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            namespace_uri: namespace_uri.into(),
            local_part: local_part.into(),
            prefix: prefix.into(),
        }
    }

    /// Create a name in no namespace.
    pub fn local(local_part: impl Into<String>) -> Self {
        Self::new("", local_part)
    }

    pub fn namespace_uri(&self) -> &str {
        &self.namespace_uri
    }

    pub fn local_part(&self) -> &str {
        &self.local_part
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Same name with another prefix.
    pub fn prefixed(&self, prefix: impl Into<String>) -> Self {
        Self::with_prefix(self.namespace_uri.clone(), self.local_part.clone(), prefix)
    }

    /// Lexical form as written in a document, `prefix:local` or `local`.
    pub fn qualified(&self) -> String {
        if self.prefix.is_empty() {
            self.local_part.clone()
        } else {
            format!("{}:{}", self.prefix, self.local_part)
        }
    }
}

impl PartialEq for QName {
    fn eq(&self, other: &Self) -> bool {
        self.namespace_uri == other.namespace_uri && self.local_part == other.local_part
    }
}

impl Hash for QName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.namespace_uri.hash(state);
        self.local_part.hash(state);
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace_uri.is_empty() {
            write!(f, "{}", self.local_part)
        } else {
            write!(f, "{{{}}}{}", self.namespace_uri, self.local_part)
        }
    }
}

/// Attribute of a start element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: QName,
    pub value: String,
}

impl Attribute {
    pub fn new(name: QName, value: impl Into<String>) -> Self {
        Self {
            name,
            value: value.into(),
        }
    }
}

/// Namespace declaration. An empty prefix declares the default namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    pub prefix: String,
    pub uri: String,
}

impl Namespace {
    pub fn new(prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            uri: uri.into(),
        }
    }

    /// Declaration of the default namespace.
    pub fn default_namespace(uri: impl Into<String>) -> Self {
        Self::new("", uri)
    }

    pub fn is_default(&self) -> bool {
        self.prefix.is_empty()
    }
}

/// Start tag with its attributes and namespace declarations.
///
/// Attribute and declaration order is kept for serialization but ignored
/// by equality.
#[derive(Debug, Clone, Eq)]
pub struct StartElement {
    pub name: QName,
    pub attributes: Vec<Attribute>,
    pub namespaces: Vec<Namespace>,
}

impl StartElement {
    pub fn new(name: QName) -> Self {
        Self {
            name,
            attributes: Vec::new(),
            namespaces: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, name: QName, value: impl Into<String>) -> Self {
        self.attributes.push(Attribute::new(name, value));
        self
    }

    pub fn with_namespace(mut self, namespace: Namespace) -> Self {
        self.namespaces.push(namespace);
        self
    }

    pub fn attribute(&self, name: &QName) -> Option<&Attribute> {
        self.attributes.iter().find(|a| &a.name == name)
    }

    /// The end tag matching this start tag.
    pub fn end_element(&self) -> EndElement {
        EndElement {
            name: self.name.clone(),
            namespaces: self.namespaces.clone(),
        }
    }
}

impl PartialEq for StartElement {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && same_members(&self.attributes, &other.attributes)
            && same_members(&self.namespaces, &other.namespaces)
    }
}

fn same_members<T: PartialEq>(left: &[T], right: &[T]) -> bool {
    left.len() == right.len() && left.iter().all(|item| right.contains(item))
}

/// End tag. Carries the namespace declarations going out of scope.
#[derive(Debug, Clone, Eq)]
pub struct EndElement {
    pub name: QName,
    pub namespaces: Vec<Namespace>,
}

impl EndElement {
    pub fn new(name: QName) -> Self {
        Self {
            name,
            namespaces: Vec::new(),
        }
    }
}

impl PartialEq for EndElement {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && same_members(&self.namespaces, &other.namespaces)
    }
}

/// Events that carry no structure for the SOAP model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OtherEvent {
    Comment(String),
    CData(String),
    ProcessingInstruction { target: String, data: String },
    DocType(String),
}

/// A node of a pull-parsed XML stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    StartDocument,
    EndDocument,
    StartElement(StartElement),
    EndElement(EndElement),
    Characters(String),
    Other(OtherEvent),
}

impl Event {
    /// Start tag event without attributes or declarations.
    pub fn start(name: QName) -> Self {
        Event::StartElement(StartElement::new(name))
    }

    /// End tag event without declarations.
    pub fn end(name: QName) -> Self {
        Event::EndElement(EndElement::new(name))
    }

    pub fn characters(text: impl Into<String>) -> Self {
        Event::Characters(text.into())
    }

    pub fn is_start_element(&self) -> bool {
        matches!(self, Event::StartElement(_))
    }

    pub fn is_end_element(&self) -> bool {
        matches!(self, Event::EndElement(_))
    }

    pub fn is_document_event(&self) -> bool {
        matches!(self, Event::StartDocument | Event::EndDocument)
    }

    pub fn as_start_element(&self) -> Option<&StartElement> {
        match self {
            Event::StartElement(start) => Some(start),
            _ => None,
        }
    }

    /// Whitespace-only character data.
    pub fn is_whitespace(&self) -> bool {
        matches!(self, Event::Characters(text) if text.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_qname_prefix_ignored_for_equality() {
        let a = QName::with_prefix("urn:x", "a", "x");
        let b = QName::with_prefix("urn:x", "a", "y");
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn test_qname_display_and_qualified() {
        let name = QName::with_prefix("urn:x", "a", "x");
        assert_eq!(name.to_string(), "{urn:x}a");
        assert_eq!(name.qualified(), "x:a");
        assert_eq!(QName::local("b").to_string(), "b");
        assert_eq!(QName::local("b").qualified(), "b");
    }

    #[test]
    fn test_start_element_attribute_order_irrelevant() {
        let a = StartElement::new(QName::local("e"))
            .with_attribute(QName::local("x"), "1")
            .with_attribute(QName::local("y"), "2");
        let b = StartElement::new(QName::local("e"))
            .with_attribute(QName::local("y"), "2")
            .with_attribute(QName::local("x"), "1");
        assert_eq!(a, b);
        assert_eq!(b.attributes[0].name.local_part(), "y");
    }

    #[test]
    fn test_start_element_attribute_value_matters() {
        let a = StartElement::new(QName::local("e")).with_attribute(QName::local("x"), "1");
        let b = StartElement::new(QName::local("e")).with_attribute(QName::local("x"), "2");
        assert_ne!(a, b);
    }

    #[test]
    fn test_end_element_mirrors_start() {
        let start = StartElement::new(QName::new("urn:x", "e"))
            .with_namespace(Namespace::new("x", "urn:x"))
            .with_attribute(QName::local("a"), "v");
        let end = start.end_element();
        assert_eq!(end.name, start.name);
        assert_eq!(end.namespaces, start.namespaces);
    }

    #[test]
    fn test_whitespace_detection() {
        assert!(Event::characters(" \n\t").is_whitespace());
        assert!(!Event::characters(" a ").is_whitespace());
        assert!(!Event::StartDocument.is_whitespace());
    }
}
