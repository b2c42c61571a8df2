//! Runtime binding layer: typed capability objects synthesized per class
//! from the schema at connect time.
//!
//! Binding is an explicit registry (class name to [`BoundClass`]) built
//! exactly once per session. A bound class composes up to two capability
//! surfaces: a [`Factory`] when the schema declares Get/Enumerate support
//! and a [`Service`] when it declares methods. Composition, not a type
//! hierarchy; a class with all three capability flags yields one object
//! exposing both surfaces.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::WsmanError;
use crate::schema::{
    AttributeType, ClassDefinition, MethodDefinition, ParameterDefinition, SchemaDocument,
};
use crate::transport::{CancelFlag, Transport};
use crate::types::{InvokeResult, ManagedInstance, MethodArgument, RawValue};

/// Get/Enumerate surface of one bound class.
pub struct Factory {
    transport: Arc<dyn Transport>,
    class: Arc<ClassDefinition>,
    timeout: Duration,
}

impl Factory {
    /// Class this factory produces instances of.
    pub fn class_name(&self) -> &str {
        &self.class.name
    }

    /// Fetch one instance addressed by an explicit selector set.
    pub async fn get(
        &self,
        selectors: &[(String, String)],
    ) -> Result<ManagedInstance, WsmanError> {
        let instance = self
            .transport
            .get(&self.class.name, selectors, self.timeout)
            .await?;
        Ok(instance.with_definition(Arc::clone(&self.class)))
    }

    /// Fetch one instance by its key value, addressing through the class's
    /// declared key attribute or `InstanceID` when none is declared.
    pub async fn get_by_key(&self, value: &str) -> Result<ManagedInstance, WsmanError> {
        let key = self.class.key_attribute.as_deref().unwrap_or("InstanceID");
        self.get(&[(key.to_string(), value.to_string())]).await
    }

    /// List every instance of the class, with the keyed view derived per
    /// the three-tier policy (declared key, then `FQDD`, then a generated
    /// name).
    pub async fn enumerate(&self) -> Result<Enumeration, WsmanError> {
        self.enumerate_inner(None).await
    }

    /// Like [`Factory::enumerate`], checking the flag between pull pages.
    pub async fn enumerate_with_cancel(
        &self,
        cancel: &CancelFlag,
    ) -> Result<Enumeration, WsmanError> {
        self.enumerate_inner(Some(cancel)).await
    }

    async fn enumerate_inner(
        &self,
        cancel: Option<&CancelFlag>,
    ) -> Result<Enumeration, WsmanError> {
        let raw = self
            .transport
            .enumerate(&self.class.name, self.timeout, cancel)
            .await?;
        let instances: Vec<ManagedInstance> = raw
            .into_iter()
            .map(|i| i.with_definition(Arc::clone(&self.class)))
            .collect();
        Enumeration::build(&self.class, instances)
    }
}

/// An enumeration result: the ordered instances plus a keyed view that
/// covers every instance exactly once.
pub struct Enumeration {
    instances: Vec<ManagedInstance>,
    keys: Vec<String>,
}

impl Enumeration {
    fn build(
        class: &ClassDefinition,
        instances: Vec<ManagedInstance>,
    ) -> Result<Self, WsmanError> {
        let mut keys = Vec::with_capacity(instances.len());
        let mut seen = HashSet::new();
        for (index, instance) in instances.iter().enumerate() {
            let key = derive_key(class, instance, index);
            if !seen.insert(key.clone()) {
                // A silent overwrite would drop an instance from the keyed
                // view; report the contract violation instead.
                return Err(WsmanError::DuplicateKey {
                    class_name: class.name.clone(),
                    key,
                });
            }
            keys.push(key);
        }
        Ok(Self { instances, keys })
    }

    /// Number of instances.
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    /// True when the endpoint returned no instances.
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Instances in response order.
    pub fn instances(&self) -> &[ManagedInstance] {
        &self.instances
    }

    /// Derived keys, parallel to [`Enumeration::instances`].
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Look up one instance by its derived key.
    pub fn get(&self, key: &str) -> Option<&ManagedInstance> {
        self.keys
            .iter()
            .position(|k| k == key)
            .map(|i| &self.instances[i])
    }

    /// Iterate `(key, instance)` pairs in response order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ManagedInstance)> {
        self.keys
            .iter()
            .map(String::as_str)
            .zip(self.instances.iter())
    }

    /// Consume into the ordered instance list.
    pub fn into_instances(self) -> Vec<ManagedInstance> {
        self.instances
    }
}

fn derive_key(class: &ClassDefinition, instance: &ManagedInstance, index: usize) -> String {
    if let Some(declared) = class.key_attribute.as_deref() {
        if let Some(value) = instance.raw(declared).and_then(RawValue::as_text) {
            return value.to_string();
        }
    } else if let Some(value) = instance.raw("FQDD").and_then(RawValue::as_text) {
        return value.to_string();
    }
    format!("{}.{}", class.name, index)
}

/// Invoke surface of one bound class.
pub struct Service {
    transport: Arc<dyn Transport>,
    class: Arc<ClassDefinition>,
    timeout: Duration,
}

impl Service {
    /// Class this service invokes methods on.
    pub fn class_name(&self) -> &str {
        &self.class.name
    }

    /// Declared methods in schema order.
    pub fn methods(&self) -> impl Iterator<Item = &MethodDefinition> {
        self.class.methods.iter()
    }

    /// Invoke a method, resolving the target instance by auto-discovery
    /// (the class must enumerate to exactly one instance).
    pub async fn invoke(
        &self,
        method: &str,
        arguments: Vec<(String, MethodArgument)>,
    ) -> Result<InvokeResult, WsmanError> {
        self.call(None, method, arguments).await
    }

    /// Invoke a method on the instance addressed by explicit selectors.
    pub async fn invoke_on(
        &self,
        selectors: &[(String, String)],
        method: &str,
        arguments: Vec<(String, MethodArgument)>,
    ) -> Result<InvokeResult, WsmanError> {
        self.call(Some(selectors), method, arguments).await
    }

    async fn call(
        &self,
        selectors: Option<&[(String, String)]>,
        method: &str,
        arguments: Vec<(String, MethodArgument)>,
    ) -> Result<InvokeResult, WsmanError> {
        let def = self.class.method(method).ok_or_else(|| {
            WsmanError::InvalidArgument(format!(
                "class {} has no method '{method}'",
                self.class.name
            ))
        })?;
        let normalized = normalize_arguments(&self.class.name, def, arguments)?;

        let result = self
            .transport
            .invoke(&self.class.name, method, selectors, &normalized, self.timeout)
            .await?
            .with_definition(Arc::new(def.clone()));

        let code = result.return_code().map(str::to_string).ok_or_else(|| {
            WsmanError::MalformedResponse(format!(
                "invoke response for {}.{method} carries no {}",
                self.class.name, def.return_code_field
            ))
        })?;
        if !def.is_success_code(&code) {
            warn!(
                class = %self.class.name,
                method,
                return_code = %code,
                message_id = result.message_id().unwrap_or(""),
                message = result.message().unwrap_or(""),
                "remote operation failed"
            );
            return Err(WsmanError::RemoteOperation {
                class_name: self.class.name.clone(),
                method: method.to_string(),
                return_code: code,
                message_id: result.message_id().map(str::to_string),
                message: result.message().map(str::to_string),
                message_arguments: result.message_arguments(),
            });
        }
        Ok(result)
    }
}

fn normalize_arguments(
    class_name: &str,
    def: &MethodDefinition,
    arguments: Vec<(String, MethodArgument)>,
) -> Result<Vec<(String, MethodArgument)>, WsmanError> {
    let mut supplied: Vec<(String, MethodArgument)> = Vec::with_capacity(arguments.len());
    for (name, value) in arguments {
        if def.parameter(&name).is_none() {
            return Err(WsmanError::InvalidArgument(format!(
                "{class_name}.{} has no parameter '{name}'",
                def.name
            )));
        }
        if supplied.iter().any(|(n, _)| n == &name) {
            return Err(WsmanError::InvalidArgument(format!(
                "parameter '{name}' supplied twice"
            )));
        }
        supplied.push((name, value));
    }
    for param in &def.parameters {
        if param.required && !supplied.iter().any(|(n, _)| n == &param.name) {
            return Err(WsmanError::InvalidArgument(format!(
                "{class_name}.{} requires parameter '{}'",
                def.name, param.name
            )));
        }
    }
    // Emit in declared parameter order so the wire shape is deterministic.
    let mut normalized = Vec::with_capacity(supplied.len());
    for param in &def.parameters {
        let Some(position) = supplied.iter().position(|(n, _)| n == &param.name) else {
            continue;
        };
        let (name, value) = supplied.swap_remove(position);
        normalized.push((name, normalize_value(param, value)?));
    }
    Ok(normalized)
}

/// Normalize a mapped parameter's input to its raw code: the raw code
/// passes through, a label (case-insensitive) resolves, anything else is
/// rejected before any network traffic.
fn normalize_value(
    param: &ParameterDefinition,
    value: MethodArgument,
) -> Result<MethodArgument, WsmanError> {
    if param.valuemap.is_empty() {
        return Ok(value);
    }
    let normalize_text = |input: &str| -> Result<String, WsmanError> {
        param
            .valuemap
            .normalize(input)
            .map(str::to_string)
            .ok_or_else(|| {
                let allowed: Vec<String> = param
                    .valuemap
                    .entries()
                    .iter()
                    .map(|m| format!("{} ({})", m.code, m.label))
                    .collect();
                WsmanError::InvalidArgument(format!(
                    "'{input}' is not a valid value for parameter '{}'; expected one of: {}",
                    param.name,
                    allowed.join(", ")
                ))
            })
    };
    match value {
        MethodArgument::Text(input) => Ok(MethodArgument::Text(normalize_text(&input)?)),
        MethodArgument::List(items) => {
            let normalized: Result<Vec<String>, WsmanError> =
                items.iter().map(|item| normalize_text(item)).collect();
            Ok(MethodArgument::List(normalized?))
        }
        // References carry no codes to map.
        other => Ok(other),
    }
}

/// One bound class: name, definition, and its capability surfaces.
pub struct BoundClass {
    class: Arc<ClassDefinition>,
    factory: Option<Factory>,
    service: Option<Service>,
}

impl BoundClass {
    /// Class name.
    pub fn name(&self) -> &str {
        &self.class.name
    }

    /// The schema definition this class was bound from.
    pub fn definition(&self) -> &ClassDefinition {
        &self.class
    }

    /// Get/Enumerate surface, when the schema declares it.
    pub fn factory(&self) -> Option<&Factory> {
        self.factory.as_ref()
    }

    /// Invoke surface, when the schema declares methods.
    pub fn service(&self) -> Option<&Service> {
        self.service.as_ref()
    }

    /// Plain introspection data: what the class can do and how its methods
    /// are shaped.
    pub fn describe(&self) -> ClassDescription {
        ClassDescription {
            name: self.class.name.clone(),
            description: self.class.description.clone(),
            supports_get: self.class.supports_get,
            supports_enumerate: self.class.supports_enumerate,
            key_attribute: self.class.key_attribute.clone(),
            methods: self
                .class
                .methods
                .iter()
                .map(|m| MethodDescription {
                    name: m.name.clone(),
                    description: m.description.clone(),
                    parameters: m
                        .parameters
                        .iter()
                        .map(|p| ParameterDescription {
                            name: p.name.clone(),
                            attr_type: p.attr_type,
                            required: p.required,
                            mapped_labels: p
                                .valuemap
                                .entries()
                                .iter()
                                .map(|e| e.label.clone())
                                .collect(),
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

/// Introspection view of a bound class.
#[derive(Debug, Clone)]
pub struct ClassDescription {
    /// Class name.
    pub name: String,
    /// Schema description text.
    pub description: Option<String>,
    /// Whether the class answers Get.
    pub supports_get: bool,
    /// Whether the class answers Enumerate.
    pub supports_enumerate: bool,
    /// Declared key attribute, if any.
    pub key_attribute: Option<String>,
    /// Declared methods.
    pub methods: Vec<MethodDescription>,
}

/// Introspection view of one method.
#[derive(Debug, Clone)]
pub struct MethodDescription {
    /// Method name.
    pub name: String,
    /// Schema description text.
    pub description: Option<String>,
    /// Declared parameters in schema order.
    pub parameters: Vec<ParameterDescription>,
}

/// Introspection view of one parameter.
#[derive(Debug, Clone)]
pub struct ParameterDescription {
    /// Parameter name.
    pub name: String,
    /// Scalar type tag.
    pub attr_type: AttributeType,
    /// Whether the caller must supply it.
    pub required: bool,
    /// Labels of the parameter's value map, empty when unmapped.
    pub mapped_labels: Vec<String>,
}

/// Build the class-name registry for one schema document. Classes with no
/// declared capability are skipped.
pub fn bind(
    schema: &SchemaDocument,
    transport: &Arc<dyn Transport>,
    timeout: Duration,
) -> HashMap<String, BoundClass> {
    let mut classes = HashMap::new();
    for class in &schema.classes {
        let gettable = class.supports_get || class.supports_enumerate;
        if !gettable && !class.has_methods() {
            debug!(class = %class.name, "skipping class with no declared capability");
            continue;
        }
        let class = Arc::new(class.clone());
        let factory = gettable.then(|| Factory {
            transport: Arc::clone(transport),
            class: Arc::clone(&class),
            timeout,
        });
        let service = class.has_methods().then(|| Service {
            transport: Arc::clone(transport),
            class: Arc::clone(&class),
            timeout,
        });
        classes.insert(
            class.name.clone(),
            BoundClass {
                class,
                factory,
                service,
            },
        );
    }
    classes
}
