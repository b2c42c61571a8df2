//! SOAP response parsing and normalization.
//!
//! Responses are read into a lightweight local-name tree (namespace
//! prefixes stripped), checked for faults, then flattened per operation:
//! repeated sibling elements become an ordered list, an empty or
//! self-closing element becomes the absence value, and unexpected extra
//! elements are ignored rather than rejected.

use quick_xml::events::BytesStart;
use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::WsmanError;
use crate::types::{ManagedInstance, RawValue};

/// A parsed element: local name, non-namespace attributes, text, children.
#[derive(Debug, Clone, Default)]
pub(crate) struct Element {
    pub(crate) name: String,
    pub(crate) attrs: Vec<(String, String)>,
    pub(crate) text: Option<String>,
    pub(crate) children: Vec<Element>,
}

impl Element {
    fn find(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    fn find_path(&self, path: &[&str]) -> Option<&Element> {
        let mut current = self;
        for segment in path {
            current = current.find(segment)?;
        }
        Some(current)
    }

    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

fn malformed(message: impl Into<String>) -> WsmanError {
    WsmanError::MalformedResponse(message.into())
}

fn element_from(e: &BytesStart<'_>) -> Result<Element, WsmanError> {
    let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
    let mut attrs = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|err| malformed(err.to_string()))?;
        let full_key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
        if full_key == "xmlns" || full_key.starts_with("xmlns:") {
            continue;
        }
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).to_string();
        let value = attr
            .unescape_value()
            .map_err(|err| malformed(err.to_string()))?
            .to_string();
        attrs.push((key, value));
    }
    Ok(Element {
        name,
        attrs,
        text: None,
        children: Vec::new(),
    })
}

/// Parse a whole SOAP document into its root element.
pub(crate) fn parse_document(xml: &str) -> Result<Element, WsmanError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    // Synthetic root so the stack never empties while the document is open.
    let mut stack: Vec<Element> = vec![Element::default()];

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                stack.push(element_from(e)?);
            }
            Ok(Event::Empty(ref e)) => {
                let element = element_from(e)?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => return Err(malformed("unbalanced document")),
                }
            }
            Ok(Event::End(_)) => {
                if stack.len() < 2 {
                    return Err(malformed("unbalanced closing tag"));
                }
                if let Some(element) = stack.pop() {
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(element);
                    }
                }
            }
            Ok(Event::Text(ref t)) => {
                let text = t.unescape().map_err(|err| malformed(err.to_string()))?;
                if let Some(top) = stack.last_mut() {
                    match &mut top.text {
                        Some(existing) => existing.push_str(&text),
                        None => top.text = Some(text.to_string()),
                    }
                }
            }
            Ok(Event::CData(ref t)) => {
                let text = String::from_utf8_lossy(t).to_string();
                if let Some(top) = stack.last_mut() {
                    match &mut top.text {
                        Some(existing) => existing.push_str(&text),
                        None => top.text = Some(text),
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(err) => return Err(malformed(format!("XML parse error: {err}"))),
            Ok(_) => {}
        }
    }

    if stack.len() != 1 {
        return Err(malformed("document ended with unclosed elements"));
    }
    stack
        .swap_remove(0)
        .children
        .into_iter()
        .next()
        .ok_or_else(|| malformed("empty document"))
}

/// Surface a `Body/Fault` as an error, with code, subcode, and reason.
fn check_fault(root: &Element) -> Result<(), WsmanError> {
    let Some(fault) = root.find("Body").and_then(|b| b.find("Fault")) else {
        return Ok(());
    };
    let text_at = |path: &[&str]| fault.find_path(path).and_then(|e| e.text.clone());
    Err(WsmanError::Fault {
        code: text_at(&["Code", "Value"]),
        subcode: text_at(&["Code", "Subcode", "Value"]),
        reason: text_at(&["Reason", "Text"]),
    })
}

/// Recursively find the text of a `Selector` element with the given Name
/// attribute (used to collapse endpoint references to an instance id).
fn find_selector_text(el: &Element, selector_name: &str) -> Option<String> {
    if el.name == "Selector" && el.attr("Name") == Some(selector_name) {
        return el.text.clone();
    }
    el.children
        .iter()
        .find_map(|c| find_selector_text(c, selector_name))
}

/// Normalize one element into a value. Leaf elements yield text or the
/// absence marker. A nested endpoint reference (queued-job handles)
/// collapses to the referenced `InstanceID`. Other nested structures
/// flatten to an ordered list of their children's values.
fn leaf_value(el: &Element) -> RawValue {
    if el.children.is_empty() {
        return match &el.text {
            Some(t) if !t.is_empty() => RawValue::Text(t.clone()),
            _ => RawValue::Absent,
        };
    }
    if el.name == "EndpointReference" || el.find("EndpointReference").is_some() {
        return match find_selector_text(el, "InstanceID") {
            Some(id) => RawValue::Text(id),
            None => RawValue::Absent,
        };
    }
    RawValue::List(el.children.iter().map(leaf_value).collect())
}

/// Flatten sibling elements into ordered name/value pairs. Repeated names
/// accumulate into a list in response order.
fn flatten(children: &[Element]) -> Vec<(String, RawValue)> {
    let mut out: Vec<(String, RawValue)> = Vec::new();
    for child in children {
        let value = leaf_value(child);
        match out.iter_mut().find(|(name, _)| name == &child.name) {
            Some((_, existing)) => match existing {
                RawValue::List(items) => items.push(value),
                single => {
                    let first = std::mem::replace(single, RawValue::Absent);
                    *single = RawValue::List(vec![first, value]);
                }
            },
            None => out.push((child.name.clone(), value)),
        }
    }
    out
}

/// What an Identify response reports about the endpoint.
#[derive(Debug, Clone)]
pub struct IdentifyInfo {
    /// WS-Man protocol version URI.
    pub protocol_version: Option<String>,
    /// Product vendor text.
    pub product_vendor: Option<String>,
    /// Product version text.
    pub product_version: Option<String>,
    /// Management controller firmware version, used for schema selection.
    pub controller_version: Option<String>,
    /// Every field of the response, normalized.
    pub raw: Vec<(String, RawValue)>,
}

impl IdentifyInfo {
    /// Raw text of any identify field.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.raw
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, v)| v.as_text())
    }
}

/// Parse an Identify response. Anything that is not a well-formed
/// `IdentifyResponse` is a protocol error.
pub fn parse_identify(xml: &str) -> Result<IdentifyInfo, WsmanError> {
    let root = parse_document(xml)
        .map_err(|e| WsmanError::Protocol(format!("unparseable identify response: {e}")))?;
    check_fault(&root)?;
    let response = root
        .find("Body")
        .and_then(|b| b.find("IdentifyResponse"))
        .ok_or_else(|| {
            WsmanError::Protocol("identify reply carries no IdentifyResponse".to_string())
        })?;
    let raw = flatten(&response.children);
    let text = |name: &str| {
        raw.iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, v)| v.as_text())
            .map(str::to_string)
    };
    Ok(IdentifyInfo {
        protocol_version: text("ProtocolVersion"),
        product_vendor: text("ProductVendor"),
        product_version: text("ProductVersion"),
        controller_version: text("LifecycleControllerVersion"),
        raw,
    })
}

/// Parse a Get response into the addressed instance.
///
/// A fault addressed at a missing instance (`DestinationUnreachable` /
/// `InvalidSelectors`) maps to [`WsmanError::NotFound`]; any other fault
/// propagates unchanged.
pub fn parse_get(xml: &str, class_name: &str) -> Result<ManagedInstance, WsmanError> {
    let root = parse_document(xml)?;
    if let Err(fault) = check_fault(&root) {
        if let WsmanError::Fault { subcode, .. } = &fault {
            let missing = subcode.as_deref().is_some_and(|s| {
                s.ends_with("DestinationUnreachable") || s.ends_with("InvalidSelectors")
            });
            if missing {
                return Err(WsmanError::NotFound {
                    class_name: class_name.to_string(),
                });
            }
        }
        return Err(fault);
    }
    let instance = root
        .find("Body")
        .and_then(|b| b.find(class_name))
        .ok_or_else(|| malformed(format!("no {class_name} element in Get response")))?;
    Ok(ManagedInstance::new(class_name, flatten(&instance.children)))
}

/// Parse an Enumerate response into its enumeration context token.
pub fn parse_enumerate_context(xml: &str) -> Result<String, WsmanError> {
    let root = parse_document(xml)?;
    check_fault(&root)?;
    root.find("Body")
        .and_then(|b| b.find("EnumerateResponse"))
        .and_then(|r| r.find("EnumerationContext"))
        .and_then(|e| e.text.clone())
        .ok_or_else(|| malformed("no EnumerationContext in Enumerate response"))
}

/// One page of a pulled enumeration.
#[derive(Debug)]
pub struct PullPage {
    /// Instances on this page, response order.
    pub items: Vec<ManagedInstance>,
    /// Replacement context for the next pull, when the endpoint sent one.
    pub context: Option<String>,
    /// Whether the endpoint signalled the end of the sequence.
    pub end_of_sequence: bool,
}

/// Parse a Pull response page for the given class.
pub fn parse_pull(xml: &str, class_name: &str) -> Result<PullPage, WsmanError> {
    let root = parse_document(xml)?;
    check_fault(&root)?;
    let response = root
        .find("Body")
        .and_then(|b| b.find("PullResponse"))
        .ok_or_else(|| malformed("no PullResponse in Pull reply"))?;
    let items = response
        .find("Items")
        .map(|items| {
            items
                .children
                .iter()
                .filter(|c| c.name == class_name)
                .map(|c| ManagedInstance::new(class_name, flatten(&c.children)))
                .collect()
        })
        .unwrap_or_default();
    Ok(PullPage {
        items,
        context: response
            .find("EnumerationContext")
            .and_then(|e| e.text.clone()),
        end_of_sequence: response.find("EndOfSequence").is_some(),
    })
}

/// Parse an Invoke response into normalized `<method>_OUTPUT` pairs.
pub fn parse_invoke(xml: &str, method: &str) -> Result<Vec<(String, RawValue)>, WsmanError> {
    let root = parse_document(xml)?;
    check_fault(&root)?;
    let output_name = format!("{method}_OUTPUT");
    let output = root
        .find("Body")
        .and_then(|b| b.find(&output_name))
        .ok_or_else(|| malformed(format!("no {output_name} element in Invoke response")))?;
    Ok(flatten(&output.children))
}
