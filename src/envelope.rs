//! WS-Man request envelope builders.
//!
//! Every request is a SOAP 1.2 envelope with WS-Addressing and WS-Man
//! headers. Builders return the serialized document; nothing here touches
//! the network.

use std::time::Duration;
use uuid::Uuid;

/// SOAP 1.2 envelope namespace.
pub const SOAP_NS: &str = "http://www.w3.org/2003/05/soap-envelope";
/// WS-Addressing namespace.
pub const WSA_NS: &str = "http://schemas.xmlsoap.org/ws/2004/08/addressing";
/// WS-Management namespace.
pub const WSMAN_NS: &str = "http://schemas.dmtf.org/wbem/wsman/1/wsman.xsd";
/// WS-Management Identify namespace.
pub const WSMID_NS: &str = "http://schemas.dmtf.org/wbem/wsman/identity/1/wsmanidentity.xsd";
/// WS-Transfer namespace (Get action).
pub const WSTRANSFER_NS: &str = "http://schemas.xmlsoap.org/ws/2004/09/transfer";
/// WS-Enumeration namespace (Enumerate/Pull actions).
pub const WSEN_NS: &str = "http://schemas.xmlsoap.org/ws/2004/09/enumeration";
/// Vendor schema resource base (not a DMTF standard namespace).
pub const DCIM_NS: &str = "http://schemas.dell.com/wbem/wscim/1/cim-schema/2";
/// WS-Addressing anonymous role, used for ReplyTo and endpoint references.
pub const ANONYMOUS_ADDRESS: &str =
    "http://schemas.xmlsoap.org/ws/2004/08/addressing/role/anonymous";

/// Escape text content for embedding in an XML document.
pub fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// One `<method>_INPUT` property on the wire.
#[derive(Debug, Clone)]
pub enum ParamValue {
    /// Scalar text, escaped when serialized.
    Text(String),
    /// Array property: one sibling element per item, each escaped.
    List(Vec<String>),
    /// Prebuilt XML fragment (endpoint references), embedded verbatim.
    Fragment(String),
}

/// The Identify envelope. Deliberately bare: DSP0266 defines Identify as a
/// plain SOAP message with no addressing or WS-Man headers.
pub fn identify() -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<s:Envelope xmlns:s="{SOAP_NS}" xmlns:wsmid="{WSMID_NS}">
  <s:Header/>
  <s:Body>
    <wsmid:Identify/>
  </s:Body>
</s:Envelope>"#
    )
}

/// Shared addressed-envelope skeleton: action, destination, resource URI, a
/// fresh message id, anonymous reply-to, operation timeout, and an optional
/// selector set.
fn addressed(
    to: &str,
    action: &str,
    resource_uri: &str,
    timeout: Duration,
    selectors: &[(String, String)],
    body: &str,
) -> String {
    let message_id = Uuid::new_v4();
    let timeout_secs = timeout.as_secs().max(1);
    let selector_set = render_selector_set(selectors);
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<s:Envelope xmlns:s="{SOAP_NS}" xmlns:wsa="{WSA_NS}" xmlns:wsman="{WSMAN_NS}">
  <s:Header>
    <wsa:Action s:mustUnderstand="true">{action}</wsa:Action>
    <wsa:To s:mustUnderstand="true">{to}</wsa:To>
    <wsman:ResourceURI s:mustUnderstand="true">{resource_uri}</wsman:ResourceURI>
    <wsa:MessageID s:mustUnderstand="true">uuid:{message_id}</wsa:MessageID>
    <wsa:ReplyTo>
      <wsa:Address>{ANONYMOUS_ADDRESS}</wsa:Address>
    </wsa:ReplyTo>
    <wsman:OperationTimeout>PT{timeout_secs}S</wsman:OperationTimeout>{selector_set}
  </s:Header>
  <s:Body>{body}</s:Body>
</s:Envelope>"#,
        to = xml_escape(to),
        action = xml_escape(action),
        resource_uri = xml_escape(resource_uri),
    )
}

fn render_selector_set(selectors: &[(String, String)]) -> String {
    if selectors.is_empty() {
        return String::new();
    }
    let mut out = String::from("\n    <wsman:SelectorSet>");
    for (name, value) in selectors {
        out.push_str(&format!(
            "\n      <wsman:Selector wsman:Name=\"{}\">{}</wsman:Selector>",
            xml_escape(name),
            xml_escape(value)
        ));
    }
    out.push_str("\n    </wsman:SelectorSet>");
    out
}

/// Get envelope addressed by an explicit selector set.
pub fn get(
    to: &str,
    resource_uri: &str,
    selectors: &[(String, String)],
    timeout: Duration,
) -> String {
    let action = format!("{WSTRANSFER_NS}/Get");
    addressed(to, &action, resource_uri, timeout, selectors, "")
}

/// Enumerate envelope opening an enumeration context.
pub fn enumerate(to: &str, resource_uri: &str, timeout: Duration) -> String {
    let action = format!("{WSEN_NS}/Enumerate");
    let body = format!(
        r#"
    <wsen:Enumerate xmlns:wsen="{WSEN_NS}"/>
  "#
    );
    addressed(to, &action, resource_uri, timeout, &[], &body)
}

/// Pull envelope continuing an enumeration context. `max_elements > 1`
/// additionally requests optimized enumeration with that page size.
pub fn pull(
    to: &str,
    resource_uri: &str,
    context: &str,
    max_elements: u32,
    timeout: Duration,
) -> String {
    let action = format!("{WSEN_NS}/Pull");
    let optimize = if max_elements > 1 {
        format!(
            "\n      <wsman:OptimizeEnumeration/>\n      <wsman:MaxElements>{max_elements}</wsman:MaxElements>"
        )
    } else {
        String::new()
    };
    let body = format!(
        r#"
    <wsen:Pull xmlns:wsen="{WSEN_NS}">
      <wsen:EnumerationContext>{context}</wsen:EnumerationContext>{optimize}
    </wsen:Pull>
  "#,
        context = xml_escape(context),
    );
    addressed(to, &action, resource_uri, timeout, &[], &body)
}

/// Invoke envelope: the method's action URI, the addressed resource's
/// selector set, and a `<method>_INPUT` body carrying the input properties
/// in the class namespace.
pub fn invoke(
    to: &str,
    resource_uri: &str,
    method: &str,
    selectors: &[(String, String)],
    params: &[(String, ParamValue)],
    timeout: Duration,
) -> String {
    let action = format!("{resource_uri}/{method}");
    let mut properties = String::new();
    for (name, value) in params {
        let name = xml_escape(name);
        match value {
            ParamValue::Text(text) => {
                properties.push_str(&format!(
                    "\n      <p:{name}>{}</p:{name}>",
                    xml_escape(text)
                ));
            }
            ParamValue::List(items) => {
                for item in items {
                    properties.push_str(&format!(
                        "\n      <p:{name}>{}</p:{name}>",
                        xml_escape(item)
                    ));
                }
            }
            ParamValue::Fragment(fragment) => {
                properties.push_str(&format!("\n      <p:{name}>{fragment}</p:{name}>"));
            }
        }
    }
    let body = format!(
        r#"
    <p:{method}_INPUT xmlns:p="{resource_uri}">{properties}
    </p:{method}_INPUT>
  "#
    );
    addressed(to, &action, resource_uri, timeout, selectors, &body)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TO: &str = "https://drac:443/wsman";

    fn nic_uri() -> String {
        format!("{DCIM_NS}/DCIM_NICView")
    }

    #[test]
    fn test_identify_is_bare_soap() {
        let doc = identify();
        assert!(doc.contains("<wsmid:Identify/>"));
        assert!(!doc.contains("wsa:Action"));
        assert!(!doc.contains("wsman:ResourceURI"));
    }

    #[test]
    fn test_get_carries_selectors_and_action() {
        let selectors = vec![("InstanceID".to_string(), "NIC.Integrated.1-1-1".to_string())];
        let doc = get(TO, &nic_uri(), &selectors, Duration::from_secs(60));
        assert!(doc.contains("http://schemas.xmlsoap.org/ws/2004/09/transfer/Get"));
        assert!(doc.contains("wsman:Name=\"InstanceID\">NIC.Integrated.1-1-1</wsman:Selector>"));
        assert!(doc.contains("<wsman:OperationTimeout>PT60S</wsman:OperationTimeout>"));
    }

    #[test]
    fn test_selector_values_are_escaped() {
        let selectors = vec![("Name".to_string(), "a<b&c".to_string())];
        let doc = get(TO, &nic_uri(), &selectors, Duration::from_secs(5));
        assert!(doc.contains("a&lt;b&amp;c"));
        assert!(!doc.contains("a<b&c"));
    }

    #[test]
    fn test_each_envelope_gets_fresh_message_id() {
        let a = get(TO, &nic_uri(), &[], Duration::from_secs(5));
        let b = get(TO, &nic_uri(), &[], Duration::from_secs(5));
        let id = |doc: &str| {
            doc.split("uuid:")
                .nth(1)
                .and_then(|s| s.split('<').next())
                .map(str::to_string)
        };
        assert_ne!(id(&a), id(&b));
    }

    #[test]
    fn test_enumerate_body() {
        let doc = enumerate(TO, &nic_uri(), Duration::from_secs(5));
        assert!(doc.contains("http://schemas.xmlsoap.org/ws/2004/09/enumeration/Enumerate"));
        assert!(doc.contains("<wsen:Enumerate"));
    }

    #[test]
    fn test_pull_with_optimized_page_size() {
        let doc = pull(TO, &nic_uri(), "ctx-1", 50, Duration::from_secs(5));
        assert!(doc.contains("<wsen:EnumerationContext>ctx-1</wsen:EnumerationContext>"));
        assert!(doc.contains("<wsman:OptimizeEnumeration/>"));
        assert!(doc.contains("<wsman:MaxElements>50</wsman:MaxElements>"));
    }

    #[test]
    fn test_pull_single_element_skips_optimization() {
        let doc = pull(TO, &nic_uri(), "ctx-1", 1, Duration::from_secs(5));
        assert!(!doc.contains("OptimizeEnumeration"));
        assert!(!doc.contains("MaxElements"));
    }

    #[test]
    fn test_invoke_action_and_input_body() {
        let uri = format!("{DCIM_NS}/DCIM_BIOSService");
        let selectors = vec![("Name".to_string(), "DCIM:BIOSService".to_string())];
        let params = vec![(
            "Target".to_string(),
            ParamValue::Text("BIOS.Setup.1-1".to_string()),
        )];
        let doc = invoke(
            TO,
            &uri,
            "SetAttribute",
            &selectors,
            &params,
            Duration::from_secs(5),
        );
        assert!(doc.contains(&format!("{uri}/SetAttribute")));
        assert!(doc.contains("<p:SetAttribute_INPUT"));
        assert!(doc.contains("<p:Target>BIOS.Setup.1-1</p:Target>"));
    }

    #[test]
    fn test_invoke_list_param_repeats_elements() {
        let uri = format!("{DCIM_NS}/DCIM_BIOSService");
        let params = vec![(
            "AttributeName".to_string(),
            ParamValue::List(vec!["ProcVirtualization".to_string(), "MemTest".to_string()]),
        )];
        let doc = invoke(TO, &uri, "SetAttributes", &[], &params, Duration::from_secs(5));
        assert_eq!(doc.matches("<p:AttributeName>").count(), 2);
    }

    #[test]
    fn test_invoke_fragment_embedded_verbatim() {
        let uri = format!("{DCIM_NS}/DCIM_SoftwareInstallationService");
        let params = vec![(
            "Target".to_string(),
            ParamValue::Fragment("<wsa:Address>anon</wsa:Address>".to_string()),
        )];
        let doc = invoke(TO, &uri, "InstallFromURI", &[], &params, Duration::from_secs(5));
        assert!(doc.contains("<p:Target><wsa:Address>anon</wsa:Address></p:Target>"));
    }

    #[test]
    fn test_xml_escape() {
        assert_eq!(xml_escape("a&b<c>\"d'"), "a&amp;b&lt;c&gt;&quot;d&apos;");
    }
}
