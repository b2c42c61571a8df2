//! Qualified values, managed instances, invoke results, and the reference
//! types passed as method arguments.

use std::fmt;
use std::sync::Arc;

use crate::envelope::{self, ParamValue, ANONYMOUS_ADDRESS, DCIM_NS};
use crate::schema::{ClassDefinition, MethodDefinition, ValueMap};

/// Fixed resource URI of the software-identity class used by
/// firmware-installation invocations.
pub const SOFTWARE_IDENTITY_URI: &str =
    "http://schemas.dell.com/wbem/wscim/1/cimschema/2/DCIM_SoftwareIdentity";

/// A normalized response value.
///
/// Responses flatten to these three shapes: an empty or self-closing
/// element is `Absent` (never the literal text "None"), repeated sibling
/// elements become a `List` in response order, everything else is `Text`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawValue {
    /// Empty or self-closing element.
    Absent,
    /// Scalar element text.
    Text(String),
    /// Repeated sibling elements, response order.
    List(Vec<RawValue>),
}

impl RawValue {
    /// Scalar text, if this is a `Text` value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            RawValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// True for `Absent`.
    pub fn is_absent(&self) -> bool {
        matches!(self, RawValue::Absent)
    }

    /// All scalar texts in order: one for `Text`, each item's text for
    /// `List`, none for `Absent`.
    pub fn texts(&self) -> Vec<&str> {
        match self {
            RawValue::Absent => vec![],
            RawValue::Text(s) => vec![s.as_str()],
            RawValue::List(items) => items.iter().filter_map(RawValue::as_text).collect(),
        }
    }
}

/// A raw wire value qualified by its schema value map.
///
/// Invariants: `value()` is the mapped label when the raw code is in the
/// map and the raw code itself otherwise; `unmapped_value()` is always the
/// raw code.
#[derive(Clone, PartialEq, Eq)]
pub struct QualifiedValue {
    raw: Option<String>,
    mapped: Option<String>,
    description: Option<String>,
}

impl QualifiedValue {
    /// Qualify a raw value with an optional value map and description.
    pub fn new(
        raw: Option<String>,
        valuemap: Option<&ValueMap>,
        description: Option<String>,
    ) -> Self {
        let mapped = raw.as_ref().map(|code| {
            valuemap
                .and_then(|m| m.label_for(code))
                .unwrap_or(code)
                .to_string()
        });
        Self {
            raw,
            mapped,
            description,
        }
    }

    /// The mapped label, or the raw code when unmapped. `None` when the
    /// element was absent.
    pub fn value(&self) -> Option<&str> {
        self.mapped.as_deref()
    }

    /// The raw code exactly as the endpoint sent it.
    pub fn unmapped_value(&self) -> Option<&str> {
        self.raw.as_deref()
    }

    /// Whether the value map translated the raw code.
    pub fn is_mapped(&self) -> bool {
        self.raw != self.mapped
    }

    /// Schema description of the attribute or field, if any.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

impl fmt::Display for QualifiedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mapped.as_deref().unwrap_or(""))
    }
}

impl fmt::Debug for QualifiedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "QualifiedValue({} -> {})",
            self.raw.as_deref().unwrap_or("-"),
            self.mapped.as_deref().unwrap_or("-")
        )
    }
}

/// One managed instance returned by Get or Enumerate: the class name plus
/// the raw attribute pairs in response order.
///
/// Instances hold no reference back to the session. The binding layer
/// attaches the class definition so attribute accessors can qualify raw
/// values; instances straight off the transport qualify without a map.
#[derive(Debug, Clone)]
pub struct ManagedInstance {
    class_name: String,
    attributes: Vec<(String, RawValue)>,
    definition: Option<Arc<ClassDefinition>>,
}

impl ManagedInstance {
    /// Build an instance from normalized response pairs.
    pub fn new(class_name: impl Into<String>, attributes: Vec<(String, RawValue)>) -> Self {
        Self {
            class_name: class_name.into(),
            attributes,
            definition: None,
        }
    }

    /// Attach the schema class definition used by the qualified accessors.
    pub fn with_definition(mut self, definition: Arc<ClassDefinition>) -> Self {
        self.definition = Some(definition);
        self
    }

    /// Class this instance belongs to.
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Raw attribute pairs in response order. Attributes the endpoint sent
    /// beyond the schema's declarations are preserved here too.
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &RawValue)> {
        self.attributes.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Raw value of one attribute.
    pub fn raw(&self, name: &str) -> Option<&RawValue> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Whether the endpoint returned the attribute at all.
    pub fn contains(&self, name: &str) -> bool {
        self.attributes.iter().any(|(n, _)| n == name)
    }

    /// Qualified scalar value of one attribute. `None` when the endpoint
    /// did not return it; an absent element qualifies to a value-less
    /// `QualifiedValue`.
    pub fn attribute(&self, name: &str) -> Option<QualifiedValue> {
        let raw = self.raw(name)?;
        let text = match raw {
            RawValue::List(items) => items.first().and_then(RawValue::as_text),
            other => other.as_text(),
        };
        Some(self.qualify(name, text.map(str::to_string)))
    }

    /// Qualified values of an array attribute, one per repeated element. A
    /// scalar attribute yields a single-item vector.
    pub fn attribute_values(&self, name: &str) -> Option<Vec<QualifiedValue>> {
        let raw = self.raw(name)?;
        let values = match raw {
            RawValue::List(items) => items
                .iter()
                .map(|item| self.qualify(name, item.as_text().map(str::to_string)))
                .collect(),
            other => vec![self.qualify(name, other.as_text().map(str::to_string))],
        };
        Some(values)
    }

    fn qualify(&self, name: &str, text: Option<String>) -> QualifiedValue {
        let attr = self
            .definition
            .as_ref()
            .and_then(|def| def.attribute(name));
        let valuemap = attr.map(|a| &a.valuemap).filter(|m| !m.is_empty());
        let description = attr.and_then(|a| a.description.clone());
        QualifiedValue::new(text, valuemap, description)
    }
}

/// The result of one remote method invocation.
#[derive(Debug, Clone)]
pub struct InvokeResult {
    class_name: String,
    method_name: String,
    returns: Vec<(String, RawValue)>,
    definition: Option<Arc<MethodDefinition>>,
}

impl InvokeResult {
    /// Build a result from normalized `_OUTPUT` pairs.
    pub fn new(
        class_name: impl Into<String>,
        method_name: impl Into<String>,
        returns: Vec<(String, RawValue)>,
    ) -> Self {
        Self {
            class_name: class_name.into(),
            method_name: method_name.into(),
            returns,
            definition: None,
        }
    }

    /// Attach the schema method definition used by the qualified accessors.
    pub fn with_definition(mut self, definition: Arc<MethodDefinition>) -> Self {
        self.definition = Some(definition);
        self
    }

    /// Class the method belongs to.
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Invoked method name.
    pub fn method_name(&self) -> &str {
        &self.method_name
    }

    /// Raw return pairs in response order.
    pub fn returns(&self) -> impl Iterator<Item = (&str, &RawValue)> {
        self.returns.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Raw value of one return field.
    pub fn raw(&self, name: &str) -> Option<&RawValue> {
        self.returns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Qualified value of one return field, per the method's return
    /// definition.
    pub fn output(&self, name: &str) -> Option<QualifiedValue> {
        let raw = self.raw(name)?;
        let field = self
            .definition
            .as_ref()
            .and_then(|def| def.return_field(name));
        let valuemap = field.map(|f| &f.valuemap).filter(|m| !m.is_empty());
        let description = field.and_then(|f| f.description.clone());
        Some(QualifiedValue::new(
            raw.as_text().map(str::to_string),
            valuemap,
            description,
        ))
    }

    /// Raw text of the designated return-code field.
    pub fn return_code(&self) -> Option<&str> {
        let field = self
            .definition
            .as_ref()
            .map(|d| d.return_code_field.as_str())
            .unwrap_or("ReturnValue");
        self.raw(field).and_then(RawValue::as_text)
    }

    /// Whether the return code is one of the method's success codes. False
    /// when the designated field is missing.
    pub fn is_success(&self) -> bool {
        match (self.return_code(), &self.definition) {
            (Some(code), Some(def)) => def.is_success_code(code),
            (Some(code), None) => code == "0" || code == "4096",
            (None, _) => false,
        }
    }

    /// `MessageID` text, if the endpoint returned one.
    pub fn message_id(&self) -> Option<&str> {
        self.raw("MessageID").and_then(RawValue::as_text)
    }

    /// `Message` text, if the endpoint returned one.
    pub fn message(&self) -> Option<&str> {
        self.raw("Message").and_then(RawValue::as_text)
    }

    /// `MessageArguments` texts in response order.
    pub fn message_arguments(&self) -> Vec<String> {
        self.raw("MessageArguments")
            .map(|v| v.texts().into_iter().map(str::to_string).collect())
            .unwrap_or_default()
    }
}

/// A reference to one remote instance, used to target an Invoke or as a
/// method-argument value referencing another managed instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceReference {
    class_name: String,
    resource_uri: String,
    selectors: Vec<(String, String)>,
}

impl ResourceReference {
    /// Reference a class instance under the default vendor namespace.
    pub fn new(class_name: impl Into<String>, selectors: Vec<(String, String)>) -> Self {
        let class_name = class_name.into();
        let resource_uri = format!("{DCIM_NS}/{class_name}");
        Self {
            class_name,
            resource_uri,
            selectors,
        }
    }

    /// Reference with an explicit resource URI (non-default namespaces).
    pub fn with_resource_uri(
        class_name: impl Into<String>,
        resource_uri: impl Into<String>,
        selectors: Vec<(String, String)>,
    ) -> Self {
        Self {
            class_name: class_name.into(),
            resource_uri: resource_uri.into(),
            selectors,
        }
    }

    /// Reference a single instance by its `InstanceID`.
    pub fn by_instance_id(class_name: impl Into<String>, instance_id: impl Into<String>) -> Self {
        Self::new(
            class_name,
            vec![("InstanceID".to_string(), instance_id.into())],
        )
    }

    /// Referenced class name.
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Referenced resource URI.
    pub fn resource_uri(&self) -> &str {
        &self.resource_uri
    }

    /// Ordered selector pairs identifying the instance.
    pub fn selectors(&self) -> &[(String, String)] {
        &self.selectors
    }

    /// The addressed-endpoint XML fragment embedded in a method argument.
    pub fn to_xml(&self) -> String {
        let mut selector_set = String::new();
        for (name, value) in &self.selectors {
            selector_set.push_str(&format!(
                "<wsman:Selector Name=\"{}\">{}</wsman:Selector>",
                envelope::xml_escape(name),
                envelope::xml_escape(value)
            ));
        }
        format!(
            "<wsa:Address>{ANONYMOUS_ADDRESS}</wsa:Address>\
             <wsa:ReferenceParameters>\
             <wsman:ResourceURI>{}</wsman:ResourceURI>\
             <wsman:SelectorSet>{selector_set}</wsman:SelectorSet>\
             </wsa:ReferenceParameters>",
            envelope::xml_escape(&self.resource_uri)
        )
    }
}

/// Composite identity of one software inventory entry, required by
/// firmware-installation invocations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoftwareIdentityDescriptor {
    instance_id: String,
    version: Option<String>,
    component_id: Option<String>,
}

impl SoftwareIdentityDescriptor {
    /// Identity for a software inventory instance id.
    pub fn new(instance_id: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            version: None,
            component_id: None,
        }
    }

    /// Attach the version field.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Attach the component id field.
    pub fn with_component_id(mut self, component_id: impl Into<String>) -> Self {
        self.component_id = Some(component_id.into());
        self
    }

    /// The software inventory instance id.
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// The endpoint reference this identity resolves to.
    pub fn to_reference(&self) -> ResourceReference {
        let mut selectors = vec![("InstanceID".to_string(), self.instance_id.clone())];
        if let Some(version) = &self.version {
            selectors.push(("VersionString".to_string(), version.clone()));
        }
        if let Some(component) = &self.component_id {
            selectors.push(("ComponentID".to_string(), component.clone()));
        }
        ResourceReference::with_resource_uri("DCIM_SoftwareIdentity", SOFTWARE_IDENTITY_URI, selectors)
    }

    /// The nested XML fragment embedded in a firmware-installation
    /// invocation.
    pub fn to_xml(&self) -> String {
        self.to_reference().to_xml()
    }
}

/// One named argument of a [`crate::binding::Service`] method call.
#[derive(Debug, Clone)]
pub enum MethodArgument {
    /// Scalar text.
    Text(String),
    /// Array parameter, one wire element per item.
    List(Vec<String>),
    /// Endpoint reference to another managed instance.
    Reference(ResourceReference),
    /// Software identity for firmware-style invocations.
    Identity(SoftwareIdentityDescriptor),
}

impl MethodArgument {
    pub(crate) fn to_param_value(&self) -> ParamValue {
        match self {
            MethodArgument::Text(s) => ParamValue::Text(s.clone()),
            MethodArgument::List(items) => ParamValue::List(items.clone()),
            MethodArgument::Reference(r) => ParamValue::Fragment(r.to_xml()),
            MethodArgument::Identity(i) => ParamValue::Fragment(i.to_xml()),
        }
    }
}

impl From<&str> for MethodArgument {
    fn from(s: &str) -> Self {
        MethodArgument::Text(s.to_string())
    }
}

impl From<String> for MethodArgument {
    fn from(s: String) -> Self {
        MethodArgument::Text(s)
    }
}

impl From<Vec<String>> for MethodArgument {
    fn from(items: Vec<String>) -> Self {
        MethodArgument::List(items)
    }
}

impl From<ResourceReference> for MethodArgument {
    fn from(r: ResourceReference) -> Self {
        MethodArgument::Reference(r)
    }
}

impl From<SoftwareIdentityDescriptor> for MethodArgument {
    fn from(i: SoftwareIdentityDescriptor) -> Self {
        MethodArgument::Identity(i)
    }
}

impl From<&QualifiedValue> for MethodArgument {
    /// Feeding a qualified value back to the endpoint uses its raw code.
    fn from(v: &QualifiedValue) -> Self {
        MethodArgument::Text(v.unmapped_value().unwrap_or("").to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ValueMap;

    fn state_map() -> ValueMap {
        ValueMap::new([("1", "Enabled"), ("2", "Disabled")])
    }

    #[test]
    fn test_qualified_value_mapped() {
        let map = state_map();
        let v = QualifiedValue::new(Some("1".to_string()), Some(&map), None);
        assert_eq!(v.value(), Some("Enabled"));
        assert_eq!(v.unmapped_value(), Some("1"));
        assert!(v.is_mapped());
    }

    #[test]
    fn test_qualified_value_unmapped_code_passes_through() {
        let map = state_map();
        let v = QualifiedValue::new(Some("7".to_string()), Some(&map), None);
        assert_eq!(v.value(), Some("7"));
        assert_eq!(v.unmapped_value(), Some("7"));
        assert!(!v.is_mapped());
    }

    #[test]
    fn test_qualified_value_without_map() {
        let v = QualifiedValue::new(Some("x".to_string()), None, None);
        assert_eq!(v.value(), Some("x"));
        assert_eq!(v.unmapped_value(), Some("x"));
    }

    #[test]
    fn test_qualified_value_rendering() {
        let map = state_map();
        let v = QualifiedValue::new(Some("2".to_string()), Some(&map), None);
        assert_eq!(v.to_string(), "Disabled");
        assert_eq!(format!("{v:?}"), "QualifiedValue(2 -> Disabled)");
    }

    #[test]
    fn test_qualified_value_absent() {
        let v = QualifiedValue::new(None, None, None);
        assert_eq!(v.value(), None);
        assert_eq!(v.to_string(), "");
    }

    #[test]
    fn test_instance_raw_and_contains() {
        let instance = ManagedInstance::new(
            "DCIM_NICView",
            vec![
                ("FQDD".to_string(), RawValue::Text("NIC.1".to_string())),
                ("PermanentMACAddress".to_string(), RawValue::Absent),
            ],
        );
        assert_eq!(
            instance.raw("FQDD"),
            Some(&RawValue::Text("NIC.1".to_string()))
        );
        assert!(instance.contains("PermanentMACAddress"));
        assert!(instance.raw("PermanentMACAddress").unwrap().is_absent());
        assert!(!instance.contains("LinkSpeed"));
    }

    #[test]
    fn test_instance_qualifies_through_definition() {
        use crate::schema::{AttributeDefinition, AttributeType};

        let class = ClassDefinition {
            name: "DCIM_NICView".to_string(),
            supports_get: true,
            supports_enumerate: true,
            key_attribute: None,
            description: None,
            attributes: vec![AttributeDefinition {
                name: "LinkStatus".to_string(),
                attr_type: AttributeType::Integer,
                valuemap: ValueMap::new([("1", "Up"), ("2", "Down")]),
                description: Some("Physical link status".to_string()),
            }],
            methods: vec![],
        };
        let instance = ManagedInstance::new(
            "DCIM_NICView",
            vec![("LinkStatus".to_string(), RawValue::Text("1".to_string()))],
        )
        .with_definition(Arc::new(class));

        let v = instance.attribute("LinkStatus").unwrap();
        assert_eq!(v.value(), Some("Up"));
        assert_eq!(v.unmapped_value(), Some("1"));
        assert_eq!(v.description(), Some("Physical link status"));
    }

    #[test]
    fn test_instance_array_attribute() {
        let instance = ManagedInstance::new(
            "DCIM_SystemView",
            vec![(
                "Roles".to_string(),
                RawValue::List(vec![
                    RawValue::Text("Compute".to_string()),
                    RawValue::Text("Storage".to_string()),
                ]),
            )],
        );
        let values = instance.attribute_values("Roles").unwrap();
        assert_eq!(values.len(), 2);
        assert_eq!(values[0].value(), Some("Compute"));
        assert_eq!(values[1].value(), Some("Storage"));
    }

    #[test]
    fn test_invoke_result_success_without_definition() {
        let result = InvokeResult::new(
            "DCIM_JobService",
            "DeleteJobQueue",
            vec![("ReturnValue".to_string(), RawValue::Text("0".to_string()))],
        );
        assert_eq!(result.return_code(), Some("0"));
        assert!(result.is_success());
    }

    #[test]
    fn test_invoke_result_failure_fields() {
        let result = InvokeResult::new(
            "DCIM_BIOSService",
            "SetAttribute",
            vec![
                ("ReturnValue".to_string(), RawValue::Text("2".to_string())),
                (
                    "Message".to_string(),
                    RawValue::Text("Invalid AttributeName".to_string()),
                ),
                ("MessageID".to_string(), RawValue::Text("BIOS008".to_string())),
                (
                    "MessageArguments".to_string(),
                    RawValue::List(vec![
                        RawValue::Text("NotAnAttr".to_string()),
                        RawValue::Text("BIOS.Setup.1-1".to_string()),
                    ]),
                ),
            ],
        );
        assert!(!result.is_success());
        assert_eq!(result.message_id(), Some("BIOS008"));
        assert_eq!(result.message(), Some("Invalid AttributeName"));
        assert_eq!(
            result.message_arguments(),
            vec!["NotAnAttr".to_string(), "BIOS.Setup.1-1".to_string()]
        );
    }

    #[test]
    fn test_invoke_result_missing_return_code_is_failure() {
        let result = InvokeResult::new("DCIM_BIOSService", "SetAttribute", vec![]);
        assert_eq!(result.return_code(), None);
        assert!(!result.is_success());
    }

    #[test]
    fn test_resource_reference_fragment() {
        let reference = ResourceReference::by_instance_id("DCIM_LifecycleJob", "JID_1234");
        let xml = reference.to_xml();
        assert!(xml.contains(ANONYMOUS_ADDRESS));
        assert!(xml.contains("DCIM_LifecycleJob"));
        assert!(xml.contains("<wsman:Selector Name=\"InstanceID\">JID_1234</wsman:Selector>"));
    }

    #[test]
    fn test_software_identity_fragment() {
        let identity = SoftwareIdentityDescriptor::new("DCIM:INSTALLED#701__NIC.Integrated.1-1-1")
            .with_version("20.0.17");
        let xml = identity.to_xml();
        assert!(xml.contains(SOFTWARE_IDENTITY_URI));
        assert!(xml.contains("DCIM:INSTALLED#701__NIC.Integrated.1-1-1"));
        assert!(xml.contains("<wsman:Selector Name=\"VersionString\">20.0.17</wsman:Selector>"));
    }

    #[test]
    fn test_method_argument_from_qualified_value_unmaps() {
        let map = state_map();
        let v = QualifiedValue::new(Some("1".to_string()), Some(&map), None);
        match MethodArgument::from(&v) {
            MethodArgument::Text(s) => assert_eq!(s, "1"),
            other => panic!("unexpected argument: {other:?}"),
        }
    }
}
