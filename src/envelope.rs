//! SOAP envelope engine.
//!
//! Parses loosely structured request XML into a queryable [`Document`],
//! carries per-request session context, accumulates response fields and
//! renders the response envelope. Uses quick-xml, which never expands
//! entities.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::{debug, warn};

use crate::error::{fault_codes, Result, SoapError};
use crate::payload::{Payload, Render, XmlOut};

pub const SOAP_ENV_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
pub const XSD_NS: &str = "http://www.w3.org/2001/XMLSchema";
pub const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// Response namespace for a service (`ecs`, `ias`, `cas`).
pub fn service_namespace(service: &str) -> String {
    format!("urn:{}.wsapi.broadon.com", service)
}

/// Current time in the protocol's encoding: whole seconds, rendered in
/// milliseconds.
pub fn protocol_timestamp(now: DateTime<Utc>) -> String {
    format!("{}000", now.timestamp())
}

/// One element of a parsed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    name: String,
    text: String,
    depth: u32,
}

impl Element {
    /// Local tag name, prefix stripped.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Concatenated text of this element and all of its descendants.
    pub fn inner_text(&self) -> &str {
        &self.text
    }
}

/// Flattened, document-ordered view of a request.
///
/// Lookups are by local tag name anywhere in the tree; the legacy client
/// does not nest its requests consistently.
#[derive(Debug, Clone, Default)]
pub struct Document {
    elements: Vec<Element>,
    operation: Option<String>,
}

impl Document {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let xml = std::str::from_utf8(data)
            .map_err(|e| SoapError::Parse(format!("invalid UTF-8: {}", e)))?;

        check_xxe_patterns(xml)?;

        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut elements: Vec<Element> = Vec::new();
        let mut open: Vec<usize> = Vec::new();
        let mut body_depth: Option<u32> = None;
        let mut operation: Option<String> = None;

        loop {
            match reader.read_event() {
                Ok(Event::Start(ref e)) => {
                    let index = push_element(&mut elements, e, open.len() as u32 + 1);
                    note_body(&elements[index], &mut body_depth, &mut operation);
                    open.push(index);
                }
                Ok(Event::Empty(ref e)) => {
                    let index = push_element(&mut elements, e, open.len() as u32 + 1);
                    note_body(&elements[index], &mut body_depth, &mut operation);
                }
                Ok(Event::End(_)) => {
                    open.pop();
                }
                Ok(Event::Text(ref e)) => {
                    let text = e
                        .unescape()
                        .map_err(|e| SoapError::Parse(format!("bad text content: {}", e)))?;
                    append_text(&mut elements, &open, &text);
                }
                Ok(Event::CData(e)) => {
                    let raw = e.into_inner();
                    let text = std::str::from_utf8(&raw)
                        .map_err(|e| SoapError::Parse(format!("invalid CDATA: {}", e)))?;
                    append_text(&mut elements, &open, text);
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(SoapError::Parse(format!(
                        "XML error at position {}: {}",
                        reader.error_position(),
                        e
                    )))
                }
                _ => {}
            }
        }

        if !open.is_empty() {
            return Err(SoapError::Parse("unexpected end of document".to_string()));
        }
        if elements.is_empty() {
            return Err(SoapError::Parse("empty document".to_string()));
        }

        Ok(Self {
            elements,
            operation,
        })
    }

    /// First element with the given local name, depth-agnostic.
    pub fn find(&self, name: &str) -> Option<&Element> {
        self.elements.iter().find(|e| e.name == name)
    }

    /// Every element with the given local name, in document order.
    pub fn find_all(&self, name: &str) -> Vec<&Element> {
        self.elements.iter().filter(|e| e.name == name).collect()
    }

    /// Local name of the first child of `Body`, if any.
    pub fn operation(&self) -> Option<&str> {
        self.operation.as_deref()
    }
}

fn push_element(elements: &mut Vec<Element>, e: &BytesStart, depth: u32) -> usize {
    let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
    elements.push(Element {
        name,
        text: String::new(),
        depth,
    });
    elements.len() - 1
}

fn note_body(element: &Element, body_depth: &mut Option<u32>, operation: &mut Option<String>) {
    match *body_depth {
        None if element.name == "Body" => *body_depth = Some(element.depth),
        Some(depth) if operation.is_none() && element.depth == depth + 1 => {
            *operation = Some(element.name.clone());
        }
        _ => {}
    }
}

fn append_text(elements: &mut [Element], open: &[usize], text: &str) {
    for &index in open {
        elements[index].text.push_str(text);
    }
}

/// Reject DTDs outright; the client never sends one.
fn check_xxe_patterns(xml: &str) -> Result<()> {
    if xml.contains("<!DOCTYPE") || xml.contains("<!doctype") {
        return Err(SoapError::Parse(
            "DOCTYPE declarations are not allowed".to_string(),
        ));
    }
    if xml.contains("<!ENTITY") || xml.contains("<!entity") {
        return Err(SoapError::Parse(
            "entity declarations are not allowed".to_string(),
        ));
    }
    Ok(())
}

/// Split a flat `Name=Value` filter text on its first `=`.
///
/// Text without `=` yields the whole text as name and an empty value.
pub fn parse_name_value(text: &str) -> (&str, &str) {
    text.split_once('=').unwrap_or((text, ""))
}

/// Collect `Name=Value` filter elements into a map. Later duplicates win.
pub fn name_value_filters<'a>(elements: &[&'a Element]) -> HashMap<&'a str, &'a str> {
    elements
        .iter()
        .map(|e| parse_name_value(e.inner_text()))
        .collect()
}

/// Device and locale context, populated once at parse time.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionContext {
    pub device_id: u64,
    pub region: String,
    pub country: String,
    pub language: String,
}

/// A single accumulated response entry.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseField {
    /// `<name>value</name>`
    KeyValue { name: String, value: String },
    Typed(Payload),
}

/// First recorded failure of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub code: i32,
    /// Server-side only; never rendered.
    pub message: String,
    pub cause: Option<String>,
}

/// Per-request container for parsed input and accumulated output.
#[derive(Debug)]
pub struct Envelope {
    document: Document,
    service: String,
    action: String,
    version: String,
    message_id: String,
    session: SessionContext,
    timestamp: String,
    fields: Vec<ResponseField>,
    fault: Option<Fault>,
}

impl Envelope {
    /// Parse a request body for `action` on `service`.
    ///
    /// `Version`, `DeviceId` and `MessageId` are mandatory; the locale keys
    /// are only sent on identity requests and default to empty.
    pub fn parse(service: &str, action: &str, body: &[u8]) -> Result<Self> {
        let document = Document::parse(body)?;

        let header = |name: &str| -> Result<String> {
            document
                .find(name)
                .map(|e| e.inner_text().to_string())
                .ok_or_else(|| SoapError::Parse(format!("missing header field {}", name)))
        };
        let optional = |name: &str| -> String {
            document
                .find(name)
                .map(|e| e.inner_text().to_string())
                .unwrap_or_default()
        };

        let version = header("Version")?;
        let message_id = header("MessageId")?;
        let device_id_text = header("DeviceId")?;
        let device_id = device_id_text
            .trim()
            .parse::<u64>()
            .map_err(|_| SoapError::Parse(format!("invalid DeviceId {:?}", device_id_text)))?;

        let session = SessionContext {
            device_id,
            region: optional("Region"),
            country: optional("Country"),
            language: optional("Language"),
        };

        Ok(Self {
            document,
            service: service.to_string(),
            action: action.to_string(),
            version,
            message_id,
            session,
            timestamp: protocol_timestamp(Utc::now()),
            fields: Vec::new(),
            fault: None,
        })
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub fn device_id(&self) -> u64 {
        self.session.device_id
    }

    pub fn region(&self) -> &str {
        &self.session.region
    }

    pub fn country(&self) -> &str {
        &self.session.country
    }

    pub fn language(&self) -> &str {
        &self.session.language
    }

    /// Current time in protocol encoding.
    ///
    /// Reads the clock on each call, so it can differ from the header
    /// `TimeStamp` written at serialization.
    pub fn timestamp(&self) -> String {
        protocol_timestamp(Utc::now())
    }

    /// Text of the first element named `key`.
    pub fn get_key(&self, key: &str) -> Result<&str> {
        self.document
            .find(key)
            .map(Element::inner_text)
            .ok_or_else(|| SoapError::MissingKey(key.to_string()))
    }

    /// All elements named `key`; at least one must exist.
    pub fn get_keys(&self, key: &str) -> Result<Vec<&Element>> {
        let found = self.document.find_all(key);
        if found.is_empty() {
            return Err(SoapError::MissingKey(key.to_string()));
        }
        Ok(found)
    }

    /// `Name=Value` filters carried by every element named `key`.
    pub fn filters(&self, key: &str) -> Result<HashMap<&str, &str>> {
        self.get_keys(key).map(|elements| name_value_filters(&elements))
    }

    pub fn account_id(&self) -> Result<i64> {
        let raw = self.get_key("AccountId")?;
        raw.trim()
            .parse()
            .map_err(|_| SoapError::invalid("AccountId", raw))
    }

    pub fn add_kv(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.push(ResponseField::KeyValue {
            name: name.into(),
            value: value.into(),
        });
    }

    pub fn add_typed(&mut self, payload: impl Into<Payload>) {
        self.fields.push(ResponseField::Typed(payload.into()));
    }

    /// Record a fault. Only the first call per request takes effect; later
    /// calls are logged and otherwise ignored, since handlers may keep
    /// running after signalling.
    pub fn error(
        &mut self,
        code: i32,
        message: impl Into<String>,
        cause: Option<&dyn std::error::Error>,
    ) {
        let message = message.into();
        let cause = cause.map(|c| c.to_string());

        if let Some(ref first) = self.fault {
            debug!(
                action = %self.action,
                first_code = first.code,
                code,
                message = %message,
                cause = ?cause,
                "Ignoring repeated fault"
            );
            return;
        }

        warn!(
            action = %self.action,
            device_id = self.session.device_id,
            code,
            message = %message,
            cause = ?cause,
            "Request faulted"
        );
        self.fault = Some(Fault {
            code,
            message,
            cause,
        });
    }

    pub fn fault(&self) -> Option<&Fault> {
        self.fault.as_ref()
    }

    pub fn is_faulted(&self) -> bool {
        self.fault.is_some()
    }

    pub fn fields(&self) -> &[ResponseField] {
        &self.fields
    }

    pub fn error_code(&self) -> i32 {
        self.fault.as_ref().map_or(fault_codes::OK, |f| f.code)
    }

    /// Render the response envelope.
    ///
    /// Header fields are always present. Accumulated fields follow in
    /// insertion order only when no fault was recorded.
    pub fn serialize(&self) -> Result<String> {
        let mut out = XmlOut::new();
        out.declaration()?;
        out.open(
            "soapenv:Envelope",
            &[
                ("xmlns:soapenv", SOAP_ENV_NS),
                ("xmlns:xsd", XSD_NS),
                ("xmlns:xsi", XSI_NS),
            ],
        )?;
        out.open("soapenv:Body", &[])?;

        let response_tag = format!("{}Response", self.action);
        let namespace = service_namespace(&self.service);
        out.open(&response_tag, &[("xmlns", namespace.as_str())])?;

        out.field("Version", &self.version)?;
        out.field_display("DeviceId", self.session.device_id)?;
        out.field("MessageId", &self.message_id)?;
        out.field("TimeStamp", &self.timestamp)?;
        out.field_display("ErrorCode", self.error_code())?;
        out.field("ServiceStandbyMode", "false")?;

        if self.fault.is_none() {
            for field in &self.fields {
                match field {
                    ResponseField::KeyValue { name, value } => out.field(name, value)?,
                    ResponseField::Typed(payload) => payload.render(&mut out)?,
                }
            }
        }

        out.close(&response_tag)?;
        out.close("soapenv:Body")?;
        out.close("soapenv:Envelope")?;
        out.into_string()
    }
}
