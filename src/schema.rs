//! In-memory schema model and the per-version registry.
//!
//! A [`SchemaDocument`] is the compiled form of one vendor schema version:
//! classes with typed attributes, remotely invokable methods, and value
//! maps. Documents are loaded from JSON data at runtime, validated
//! wholesale, and immutable afterwards. The [`SchemaRegistry`] holds one
//! document per version and resolves the best match for a discovered
//! controller version.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use crate::error::WsmanError;

/// Scalar type tag of an attribute or method parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AttributeType {
    /// Free-form text.
    #[default]
    String,
    /// Integer rendered as decimal text on the wire.
    Integer,
    /// "true"/"false" or "0"/"1" on the wire.
    Boolean,
    /// CIM datetime text.
    Datetime,
}

/// One raw-code-to-label pair of a value map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueMapping {
    /// Raw code as sent on the wire.
    pub code: String,
    /// Human-readable label.
    pub label: String,
}

/// A schema-declared bijection between raw wire codes and labels.
///
/// Order is the schema's declaration order. Codes are unique; this is
/// enforced at document load time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValueMap {
    entries: Vec<ValueMapping>,
}

impl ValueMap {
    /// Build a map from `(code, label)` pairs.
    pub fn new<C, L, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (C, L)>,
        C: Into<String>,
        L: Into<String>,
    {
        Self {
            entries: pairs
                .into_iter()
                .map(|(code, label)| ValueMapping {
                    code: code.into(),
                    label: label.into(),
                })
                .collect(),
        }
    }

    /// True when the map declares no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Declared entries in schema order.
    pub fn entries(&self) -> &[ValueMapping] {
        &self.entries
    }

    /// Label for a raw code, if mapped.
    pub fn label_for(&self, code: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|m| m.code == code)
            .map(|m| m.label.as_str())
    }

    /// Normalize caller input to a raw code: an exact code match passes
    /// through, a label match (case-insensitive) resolves to its code,
    /// anything else is `None`.
    pub fn normalize(&self, input: &str) -> Option<&str> {
        if let Some(m) = self
            .entries
            .iter()
            .find(|m| m.label.eq_ignore_ascii_case(input))
        {
            return Some(m.code.as_str());
        }
        self.entries
            .iter()
            .find(|m| m.code == input)
            .map(|m| m.code.as_str())
    }

    fn validate(&self, context: &str) -> Result<(), WsmanError> {
        let mut seen = HashSet::new();
        for entry in &self.entries {
            if !seen.insert(entry.code.as_str()) {
                return Err(WsmanError::Schema(format!(
                    "{context}: duplicate value-map code '{}'",
                    entry.code
                )));
            }
        }
        Ok(())
    }
}

/// One attribute of a class.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeDefinition {
    /// Attribute name, as it appears on the wire.
    pub name: String,
    /// Scalar type tag.
    #[serde(rename = "type", default)]
    pub attr_type: AttributeType,
    /// Raw-code-to-label map, empty when the attribute is unmapped.
    #[serde(default)]
    pub valuemap: ValueMap,
    /// Schema description text.
    #[serde(default)]
    pub description: Option<String>,
}

/// One input parameter of a method.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterDefinition {
    /// Parameter name, as it appears in the `_INPUT` body.
    pub name: String,
    /// Scalar type tag.
    #[serde(rename = "type", default)]
    pub attr_type: AttributeType,
    /// Whether the caller must supply this parameter.
    #[serde(default)]
    pub required: bool,
    /// Raw-code-to-label map, empty when the parameter is unmapped.
    #[serde(default)]
    pub valuemap: ValueMap,
    /// Schema description text.
    #[serde(default)]
    pub description: Option<String>,
}

/// One named output field of a method.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnFieldDefinition {
    /// Field name, as it appears in the `_OUTPUT` body.
    pub name: String,
    /// Raw-code-to-label map, empty when the field is unmapped.
    #[serde(default)]
    pub valuemap: ValueMap,
    /// Schema description text.
    #[serde(default)]
    pub description: Option<String>,
}

fn default_return_code_field() -> String {
    "ReturnValue".to_string()
}

fn default_success_codes() -> Vec<String> {
    // 0 = completed, 4096 = job queued
    vec!["0".to_string(), "4096".to_string()]
}

/// One remotely invokable method of a class.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodDefinition {
    /// Method name.
    pub name: String,
    /// Schema description text.
    #[serde(default)]
    pub description: Option<String>,
    /// Input parameters in schema order.
    #[serde(default)]
    pub parameters: Vec<ParameterDefinition>,
    /// Named output fields in schema order.
    #[serde(default)]
    pub returns: Vec<ReturnFieldDefinition>,
    /// Output field that carries the method's return code.
    #[serde(default = "default_return_code_field")]
    pub return_code_field: String,
    /// Return codes that count as success.
    #[serde(default = "default_success_codes")]
    pub success_codes: Vec<String>,
}

impl MethodDefinition {
    /// Look up a parameter by name.
    pub fn parameter(&self, name: &str) -> Option<&ParameterDefinition> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Look up an output field by name.
    pub fn return_field(&self, name: &str) -> Option<&ReturnFieldDefinition> {
        self.returns.iter().find(|r| r.name == name)
    }

    /// Whether a raw return code counts as success for this method.
    pub fn is_success_code(&self, code: &str) -> bool {
        self.success_codes.iter().any(|c| c == code)
    }
}

/// One class of the vendor schema.
///
/// The three capabilities are non-exclusive: a class may be Gettable,
/// Enumerable, and carry methods all at once. `has_methods` is derived
/// from a non-empty method list so the flag and the list cannot disagree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassDefinition {
    /// Class name, unique within a document.
    pub name: String,
    /// Whether the class answers Get.
    #[serde(default)]
    pub supports_get: bool,
    /// Whether the class answers Enumerate.
    #[serde(default)]
    pub supports_enumerate: bool,
    /// Declared key attribute used to address single instances.
    #[serde(default)]
    pub key_attribute: Option<String>,
    /// Schema description text.
    #[serde(default)]
    pub description: Option<String>,
    /// Attributes in schema order.
    #[serde(default)]
    pub attributes: Vec<AttributeDefinition>,
    /// Methods in schema order.
    #[serde(default)]
    pub methods: Vec<MethodDefinition>,
}

impl ClassDefinition {
    /// Whether the class carries invokable methods.
    pub fn has_methods(&self) -> bool {
        !self.methods.is_empty()
    }

    /// Look up an attribute by name.
    pub fn attribute(&self, name: &str) -> Option<&AttributeDefinition> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Look up a method by name.
    pub fn method(&self, name: &str) -> Option<&MethodDefinition> {
        self.methods.iter().find(|m| m.name == name)
    }

    fn validate(&self) -> Result<(), WsmanError> {
        if let Some(key) = &self.key_attribute {
            if self.attribute(key).is_none() {
                return Err(WsmanError::Schema(format!(
                    "class {}: key attribute '{key}' is not among its attributes",
                    self.name
                )));
            }
        }
        let mut attr_names = HashSet::new();
        for attr in &self.attributes {
            if !attr_names.insert(attr.name.as_str()) {
                return Err(WsmanError::Schema(format!(
                    "class {}: duplicate attribute '{}'",
                    self.name, attr.name
                )));
            }
            attr.valuemap
                .validate(&format!("class {}, attribute {}", self.name, attr.name))?;
        }
        let mut method_names = HashSet::new();
        for method in &self.methods {
            if !method_names.insert(method.name.as_str()) {
                return Err(WsmanError::Schema(format!(
                    "class {}: duplicate method '{}'",
                    self.name, method.name
                )));
            }
            for param in &method.parameters {
                param.valuemap.validate(&format!(
                    "class {}, method {}, parameter {}",
                    self.name, method.name, param.name
                ))?;
            }
            for ret in &method.returns {
                ret.valuemap.validate(&format!(
                    "class {}, method {}, return field {}",
                    self.name, method.name, ret.name
                ))?;
            }
        }
        Ok(())
    }
}

/// One schema version: an ordered set of classes, unique by name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaDocument {
    /// Version string this document describes, e.g. "2.30.30.30".
    pub version: String,
    /// Classes in schema order.
    pub classes: Vec<ClassDefinition>,
}

impl SchemaDocument {
    /// Parse and validate a document from its JSON form.
    pub fn from_json(json: &str) -> Result<Self, WsmanError> {
        let document: SchemaDocument =
            serde_json::from_str(json).map_err(|e| WsmanError::Schema(e.to_string()))?;
        document.validate()?;
        Ok(document)
    }

    /// Validate the whole document; any violation rejects it wholesale.
    pub fn validate(&self) -> Result<(), WsmanError> {
        let mut names = HashSet::new();
        for class in &self.classes {
            if !names.insert(class.name.as_str()) {
                return Err(WsmanError::Schema(format!(
                    "duplicate class '{}' in schema {}",
                    class.name, self.version
                )));
            }
            class.validate()?;
        }
        Ok(())
    }

    /// Look up a class by name.
    pub fn class(&self, name: &str) -> Option<&ClassDefinition> {
        self.classes.iter().find(|c| c.name == name)
    }
}

/// Numeric-segment ordering key for version strings. Non-numeric segments
/// compare as zero.
fn version_key(version: &str) -> Vec<u64> {
    version
        .split('.')
        .map(|s| s.parse::<u64>().unwrap_or(0))
        .collect()
}

/// Registry of schema documents keyed by version.
///
/// Resolution picks the newest registered document whose version is not
/// newer than the discovered controller version, so a controller a few
/// firmware releases ahead still binds against the closest schema.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    documents: BTreeMap<Vec<u64>, Arc<SchemaDocument>>,
}

impl SchemaRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and register a document. A second document for the same
    /// version is a schema error.
    pub fn register(&mut self, document: SchemaDocument) -> Result<(), WsmanError> {
        document.validate()?;
        let key = version_key(&document.version);
        if self.documents.contains_key(&key) {
            return Err(WsmanError::Schema(format!(
                "schema version {} registered twice",
                document.version
            )));
        }
        self.documents.insert(key, Arc::new(document));
        Ok(())
    }

    /// Parse, validate, and register a document from JSON.
    pub fn register_json(&mut self, json: &str) -> Result<(), WsmanError> {
        self.register(SchemaDocument::from_json(json)?)
    }

    /// Number of registered documents.
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// True when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Resolve the best document for a discovered controller version.
    pub fn resolve(&self, discovered: &str) -> Result<Arc<SchemaDocument>, WsmanError> {
        let wanted = version_key(discovered);
        self.documents
            .range(..=wanted)
            .next_back()
            .map(|(_, doc)| Arc::clone(doc))
            .ok_or_else(|| WsmanError::UnsupportedVersion(discovered.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn power_map() -> ValueMap {
        ValueMap::new([("1", "Enabled"), ("2", "Disabled")])
    }

    fn minimal_class(name: &str) -> ClassDefinition {
        ClassDefinition {
            name: name.to_string(),
            supports_get: true,
            supports_enumerate: true,
            key_attribute: None,
            description: None,
            attributes: vec![AttributeDefinition {
                name: "InstanceID".to_string(),
                attr_type: AttributeType::String,
                valuemap: ValueMap::default(),
                description: None,
            }],
            methods: vec![],
        }
    }

    #[test]
    fn test_valuemap_normalize_accepts_code_and_label() {
        let map = power_map();
        assert_eq!(map.normalize("1"), Some("1"));
        assert_eq!(map.normalize("Enabled"), Some("1"));
        assert_eq!(map.normalize("enabled"), Some("1"));
        assert_eq!(map.normalize("3"), None);
        assert_eq!(map.normalize("Unknown"), None);
    }

    #[test]
    fn test_valuemap_label_lookup() {
        let map = power_map();
        assert_eq!(map.label_for("2"), Some("Disabled"));
        assert_eq!(map.label_for("9"), None);
    }

    #[test]
    fn test_duplicate_class_rejected() {
        let document = SchemaDocument {
            version: "1.0.0".to_string(),
            classes: vec![minimal_class("DCIM_NICView"), minimal_class("DCIM_NICView")],
        };
        assert!(matches!(document.validate(), Err(WsmanError::Schema(_))));
    }

    #[test]
    fn test_unknown_key_attribute_rejected() {
        let mut class = minimal_class("DCIM_NICView");
        class.key_attribute = Some("FQDD".to_string());
        let document = SchemaDocument {
            version: "1.0.0".to_string(),
            classes: vec![class],
        };
        let err = document.validate().unwrap_err();
        assert!(err.to_string().contains("FQDD"));
    }

    #[test]
    fn test_duplicate_valuemap_code_rejected() {
        let mut class = minimal_class("DCIM_BIOSEnumeration");
        class.attributes[0].valuemap = ValueMap::new([("1", "Enabled"), ("1", "Disabled")]);
        let document = SchemaDocument {
            version: "1.0.0".to_string(),
            classes: vec![class],
        };
        assert!(matches!(document.validate(), Err(WsmanError::Schema(_))));
    }

    #[test]
    fn test_document_from_json() {
        let json = r#"{
            "version": "2.30.30.30",
            "classes": [
                {
                    "name": "DCIM_NICView",
                    "supports_get": true,
                    "supports_enumerate": true,
                    "key_attribute": "FQDD",
                    "attributes": [
                        {"name": "FQDD"},
                        {
                            "name": "LinkSpeed",
                            "type": "integer",
                            "valuemap": [
                                {"code": "0", "label": "Unknown"},
                                {"code": "3", "label": "1000 Mbps"}
                            ]
                        }
                    ]
                }
            ]
        }"#;
        let document = SchemaDocument::from_json(json).unwrap();
        let class = document.class("DCIM_NICView").unwrap();
        assert!(class.supports_get);
        assert!(!class.has_methods());
        assert_eq!(
            class.attribute("LinkSpeed").unwrap().valuemap.label_for("3"),
            Some("1000 Mbps")
        );
    }

    #[test]
    fn test_method_defaults() {
        let json = r#"{
            "version": "1.0",
            "classes": [{
                "name": "DCIM_JobService",
                "methods": [{"name": "DeleteJobQueue"}]
            }]
        }"#;
        let document = SchemaDocument::from_json(json).unwrap();
        let method = document
            .class("DCIM_JobService")
            .unwrap()
            .method("DeleteJobQueue")
            .unwrap();
        assert_eq!(method.return_code_field, "ReturnValue");
        assert!(method.is_success_code("0"));
        assert!(method.is_success_code("4096"));
        assert!(!method.is_success_code("2"));
    }

    #[test]
    fn test_registry_resolves_best_match() {
        let mut registry = SchemaRegistry::new();
        for version in ["2.30.30.30", "2.40.40.40", "3.0.0.0"] {
            registry
                .register(SchemaDocument {
                    version: version.to_string(),
                    classes: vec![],
                })
                .unwrap();
        }
        assert_eq!(registry.resolve("2.30.30.30").unwrap().version, "2.30.30.30");
        assert_eq!(registry.resolve("2.41.0.0").unwrap().version, "2.40.40.40");
        assert_eq!(registry.resolve("9.9.9.9").unwrap().version, "3.0.0.0");
    }

    #[test]
    fn test_registry_rejects_too_old_version() {
        let mut registry = SchemaRegistry::new();
        registry
            .register(SchemaDocument {
                version: "2.30.30.30".to_string(),
                classes: vec![],
            })
            .unwrap();
        assert!(matches!(
            registry.resolve("2.10.10.10"),
            Err(WsmanError::UnsupportedVersion(_))
        ));
    }

    #[test]
    fn test_registry_rejects_duplicate_version() {
        let mut registry = SchemaRegistry::new();
        let document = SchemaDocument {
            version: "2.30.30.30".to_string(),
            classes: vec![],
        };
        registry.register(document.clone()).unwrap();
        assert!(matches!(
            registry.register(document),
            Err(WsmanError::Schema(_))
        ));
    }

    #[test]
    fn test_version_key_compares_numerically() {
        assert!(version_key("2.9.0") < version_key("2.10.0"));
        assert!(version_key("2.30.30.30") <= version_key("2.30.30.30"));
    }
}
