//! SOAP Fault and Fault detail.
//!
//! A Fault is kept as typed fields and its events are generated on each
//! read, in the layout of the configured SOAP version. A parsed Fault
//! replays its original content until one of its fields is changed.

use crate::config::SoapVersion;
use crate::element::{ElementNode, SoapElement};
use crate::error::StroapError;
use crate::event::{Event, Namespace, QName, StartElement, XML_NS};
use crate::reader::{BufferedEventReader, ChainedEventReader, EventReader};
use crate::writer::EventBuffer;

/// Locale written on a SOAP 1.2 reason when none was given.
const DEFAULT_REASON_LOCALE: &str = "en";

/// Prefix bound to a fault code namespace that has none.
const FAULT_CODE_PREFIX: &str = "fc";

fn xml_lang() -> QName {
    QName::with_prefix(XML_NS, "lang", "xml")
}

/// SOAP Fault element.
#[derive(Debug, Clone, PartialEq)]
pub struct Fault {
    node: ElementNode,
    version: SoapVersion,
    code: QName,
    reason: String,
    reason_locale: Option<String>,
    actor_or_role: Option<String>,
    detail: Option<FaultDetail>,
    /// Content as parsed, between the Fault tags.
    parsed: Option<Vec<Event>>,
}

impl Fault {
    pub fn new(
        version: SoapVersion,
        code: QName,
        reason: impl Into<String>,
        locale: Option<&str>,
    ) -> Self {
        let mut node = ElementNode::new(version.fault_name());
        let element_prefix = node.name().prefix().to_string();

        let code = if !code.prefix().is_empty() || code.namespace_uri().is_empty() {
            code
        } else if code.namespace_uri() == version.envelope_namespace_uri() {
            code.prefixed(element_prefix.as_str())
        } else {
            code.prefixed(FAULT_CODE_PREFIX)
        };
        if !code.namespace_uri().is_empty() && code.prefix() != element_prefix {
            node.add_namespace_declaration(code.prefix(), code.namespace_uri());
        }

        Self {
            node,
            version,
            code,
            reason: reason.into(),
            reason_locale: locale.map(str::to_string),
            actor_or_role: None,
            detail: None,
            parsed: None,
        }
    }

    /// Rebuild a Fault from its element events, start and end tag
    /// included. `scope` holds the declarations in force around it.
    pub fn parse(
        events: &[Event],
        version: SoapVersion,
        scope: &[Namespace],
    ) -> Result<Self, StroapError> {
        let start = events
            .first()
            .and_then(Event::as_start_element)
            .ok_or_else(|| StroapError::InvalidFault("missing Fault start tag".to_string()))?;
        let content = match events.len() {
            0..=1 => &[][..],
            len => &events[1..len - 1],
        };

        let mut scope = scope.to_vec();
        scope.extend(start.namespaces.iter().cloned());

        let mut code = None;
        let mut reason = String::new();
        let mut reason_locale = None;
        let mut actor_or_role = None;
        let mut detail = None;

        for (child, inner) in child_elements(content) {
            match (version, child.name.local_part()) {
                (SoapVersion::Soap11, "faultcode") => {
                    code = Some(resolve_code(&text_of(inner), &scope, child)?);
                }
                (SoapVersion::Soap11, "faultstring") => {
                    reason = text_of(inner);
                    reason_locale = child.attribute(&xml_lang()).map(|a| a.value.clone());
                }
                (SoapVersion::Soap11, "faultactor") | (SoapVersion::Soap12, "Role") => {
                    actor_or_role = Some(text_of(inner));
                }
                (SoapVersion::Soap11, "detail") | (SoapVersion::Soap12, "Detail") => {
                    detail = Some(FaultDetail {
                        node: ElementNode::from_start(child.clone()),
                        entries: inner.to_vec(),
                    });
                }
                (SoapVersion::Soap12, "Code") => {
                    let mut code_scope = scope.clone();
                    code_scope.extend(child.namespaces.iter().cloned());
                    if let Some((value, text)) = child_elements(inner)
                        .into_iter()
                        .find(|(value, _)| value.name.local_part() == "Value")
                    {
                        code = Some(resolve_code(&text_of(text), &code_scope, value)?);
                    }
                }
                (SoapVersion::Soap12, "Reason") => {
                    if let Some((text, inner)) = child_elements(inner)
                        .into_iter()
                        .find(|(text, _)| text.name.local_part() == "Text")
                    {
                        reason = text_of(inner);
                        reason_locale = text.attribute(&xml_lang()).map(|a| a.value.clone());
                    }
                }
                _ => {}
            }
        }

        let code = code.ok_or_else(|| {
            StroapError::InvalidFault(format!("{} without fault code", start.name))
        })?;

        Ok(Self {
            node: ElementNode::from_start(start.clone()),
            version,
            code,
            reason,
            reason_locale,
            actor_or_role,
            detail,
            parsed: Some(content.to_vec()),
        })
    }

    /// Whether the Fault still replays its parsed content.
    pub fn is_parsed(&self) -> bool {
        self.parsed.is_some()
    }

    /// Drop the parsed content so reads are generated from the fields.
    /// Generated content names the code prefix, so it is declared on the
    /// Fault element when no declaration there covers it.
    fn regenerate(&mut self) {
        if self.parsed.take().is_none() {
            return;
        }
        let prefix = self.code.prefix();
        let declared = prefix == self.node.name().prefix()
            || self
                .node
                .start()
                .namespaces
                .iter()
                .any(|ns| ns.prefix == prefix);
        if !prefix.is_empty() && !declared {
            let (prefix, uri) = (prefix.to_string(), self.code.namespace_uri().to_string());
            self.node.add_namespace_declaration(&prefix, &uri);
        }
    }

    pub fn version(&self) -> SoapVersion {
        self.version
    }

    pub fn fault_code(&self) -> &QName {
        &self.code
    }

    /// `faultstring` in SOAP 1.1, the reason text in SOAP 1.2.
    pub fn fault_string_or_reason(&self) -> &str {
        &self.reason
    }

    pub fn fault_reason_locale(&self) -> Option<&str> {
        self.reason_locale.as_deref()
    }

    pub fn fault_actor_or_role(&self) -> Option<&str> {
        self.actor_or_role.as_deref()
    }

    pub fn set_fault_actor_or_role(&mut self, actor_or_role: impl Into<String>) {
        self.regenerate();
        self.actor_or_role = Some(actor_or_role.into());
    }

    /// The detail element, created on first use.
    pub fn add_fault_detail(&mut self) -> &mut FaultDetail {
        self.regenerate();
        let name = self.child_name("detail", "Detail");
        self.detail.get_or_insert_with(|| FaultDetail::new(name))
    }

    pub fn fault_detail(&self) -> Option<&FaultDetail> {
        self.detail.as_ref()
    }

    pub fn fault_detail_mut(&mut self) -> Option<&mut FaultDetail> {
        self.regenerate();
        self.detail.as_mut()
    }

    /// Unqualified child in SOAP 1.1, envelope-qualified in SOAP 1.2.
    fn child_name(&self, soap11: &str, soap12: &str) -> QName {
        match self.version {
            SoapVersion::Soap11 => QName::local(soap11),
            SoapVersion::Soap12 => {
                let name = self.node.name();
                QName::with_prefix(name.namespace_uri(), soap12, name.prefix())
            }
        }
    }

    fn code_text(&self) -> String {
        self.code.qualified()
    }

    fn text_element(events: &mut Vec<Event>, start: StartElement, text: &str) {
        let end = start.end_element();
        events.push(Event::StartElement(start));
        if !text.is_empty() {
            events.push(Event::characters(text));
        }
        events.push(Event::EndElement(end));
    }

    fn content_events(&self) -> Vec<Event> {
        let mut events = Vec::new();
        match self.version {
            SoapVersion::Soap11 => {
                Self::text_element(
                    &mut events,
                    StartElement::new(self.child_name("faultcode", "")),
                    &self.code_text(),
                );
                let mut string = StartElement::new(self.child_name("faultstring", ""));
                if let Some(locale) = &self.reason_locale {
                    string = string.with_attribute(xml_lang(), locale.as_str());
                }
                Self::text_element(&mut events, string, &self.reason);
                if let Some(actor) = &self.actor_or_role {
                    Self::text_element(
                        &mut events,
                        StartElement::new(self.child_name("faultactor", "")),
                        actor,
                    );
                }
            }
            SoapVersion::Soap12 => {
                let code = StartElement::new(self.child_name("", "Code"));
                let code_end = code.end_element();
                events.push(Event::StartElement(code));
                Self::text_element(
                    &mut events,
                    StartElement::new(self.child_name("", "Value")),
                    &self.code_text(),
                );
                events.push(Event::EndElement(code_end));

                let reason = StartElement::new(self.child_name("", "Reason"));
                let reason_end = reason.end_element();
                events.push(Event::StartElement(reason));
                let locale = self
                    .reason_locale
                    .as_deref()
                    .unwrap_or(DEFAULT_REASON_LOCALE);
                Self::text_element(
                    &mut events,
                    StartElement::new(self.child_name("", "Text")).with_attribute(xml_lang(), locale),
                    &self.reason,
                );
                events.push(Event::EndElement(reason_end));

                if let Some(role) = &self.actor_or_role {
                    Self::text_element(
                        &mut events,
                        StartElement::new(self.child_name("", "Role")),
                        role,
                    );
                }
            }
        }
        events
    }
}

impl SoapElement for Fault {
    fn node(&self) -> &ElementNode {
        &self.node
    }

    fn node_mut(&mut self) -> &mut ElementNode {
        &mut self.node
    }

    fn child_event_reader(&self) -> Result<Box<dyn EventReader + '_>, StroapError> {
        if let Some(parsed) = &self.parsed {
            return Ok(Box::new(BufferedEventReader::new(&parsed[..])));
        }
        let mut readers: Vec<Box<dyn EventReader + '_>> =
            vec![Box::new(BufferedEventReader::new(self.content_events()))];
        if let Some(detail) = &self.detail {
            readers.push(Box::new(detail.event_reader(false)?));
        }
        Ok(Box::new(ChainedEventReader::new(readers)))
    }
}

/// Detail element of a Fault, holding arbitrary entries.
#[derive(Debug, Clone, PartialEq)]
pub struct FaultDetail {
    node: ElementNode,
    entries: Vec<Event>,
}

impl FaultDetail {
    fn new(name: QName) -> Self {
        Self {
            node: ElementNode::unprefixed(name),
            entries: Vec::new(),
        }
    }

    /// Append a text-only entry.
    pub fn add_entry(&mut self, name: QName, text: &str) {
        let start = StartElement::new(name);
        let end = start.end_element();
        self.entries.push(Event::StartElement(start));
        if !text.is_empty() {
            self.entries.push(Event::characters(text));
        }
        self.entries.push(Event::EndElement(end));
    }

    /// Sink appending to the existing entries.
    pub fn result(&mut self) -> EventBuffer<'_> {
        EventBuffer::new(&mut self.entries)
    }

    pub fn entries(&self) -> &[Event] {
        &self.entries
    }
}

impl SoapElement for FaultDetail {
    fn node(&self) -> &ElementNode {
        &self.node
    }

    fn node_mut(&mut self) -> &mut ElementNode {
        &mut self.node
    }

    fn child_event_reader(&self) -> Result<Box<dyn EventReader + '_>, StroapError> {
        Ok(Box::new(BufferedEventReader::new(&self.entries[..])))
    }
}

/// Top-level elements of `content` with their inner events.
pub(crate) fn child_elements(content: &[Event]) -> Vec<(&StartElement, &[Event])> {
    let mut children = Vec::new();
    let mut depth = 0usize;
    let mut open: Option<(usize, &StartElement)> = None;
    for (i, event) in content.iter().enumerate() {
        match event {
            Event::StartElement(start) => {
                if depth == 0 {
                    open = Some((i, start));
                }
                depth += 1;
            }
            Event::EndElement(_) => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    if let Some((from, start)) = open.take() {
                        children.push((start, &content[from + 1..i]));
                    }
                }
            }
            _ => {}
        }
    }
    children
}

/// Concatenated character data of `content`.
pub(crate) fn text_of(content: &[Event]) -> String {
    content
        .iter()
        .filter_map(|event| match event {
            Event::Characters(text) => Some(text.as_str()),
            Event::Other(crate::event::OtherEvent::CData(text)) => Some(text.as_str()),
            _ => None,
        })
        .collect()
}

/// Resolve a `prefix:local` fault code against the declarations in scope.
fn resolve_code(
    text: &str,
    scope: &[Namespace],
    element: &StartElement,
) -> Result<QName, StroapError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(StroapError::InvalidFault("empty fault code".to_string()));
    }
    let (prefix, local) = text.split_once(':').unwrap_or(("", text));
    let uri = element
        .namespaces
        .iter()
        .rev()
        .chain(scope.iter().rev())
        .find(|ns| ns.prefix == prefix)
        .map(|ns| ns.uri.clone());
    match uri {
        Some(uri) => Ok(QName::with_prefix(uri, local, prefix)),
        None if prefix.is_empty() => Ok(QName::local(local)),
        None => Err(StroapError::InvalidFault(format!(
            "fault code prefix {prefix} is not declared"
        ))),
    }
}
