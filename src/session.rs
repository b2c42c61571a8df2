//! Session: the composition root owning the transport, the resolved
//! schema, and the bound capability objects.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::binding::{self, BoundClass};
use crate::config::SessionConfig;
use crate::error::WsmanError;
use crate::response::IdentifyInfo;
use crate::schema::{SchemaDocument, SchemaRegistry};
use crate::transport::{HttpTransport, Transport};

/// One connected session against a management endpoint.
///
/// Construction performs Identify, resolves the schema for the reported
/// controller version, and binds every class exactly once. The binding
/// registry never changes afterwards, so a `Session` behind an `Arc` is
/// safe for concurrent read-only use. Any failure during construction
/// fails the whole session; a partially bound session never exists.
pub struct Session {
    config: SessionConfig,
    identity: IdentifyInfo,
    schema: Arc<SchemaDocument>,
    classes: HashMap<String, BoundClass>,
}

impl Session {
    /// Connect to the configured endpoint and bind the resolved schema.
    pub async fn connect(
        config: SessionConfig,
        registry: &SchemaRegistry,
    ) -> Result<Self, WsmanError> {
        let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(&config)?);
        Self::connect_with_transport(config, registry, transport).await
    }

    /// Connect through a caller-supplied transport. This is the seam for
    /// embedding a scripted or instrumented wire.
    pub async fn connect_with_transport(
        config: SessionConfig,
        registry: &SchemaRegistry,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, WsmanError> {
        let timeout = config.timeout();
        info!(host = %config.host, port = config.port, "connecting to management endpoint");

        let identity = transport.identify(timeout).await?;
        let version = identity.controller_version.clone().ok_or_else(|| {
            WsmanError::Protocol("identify response carries no controller version".to_string())
        })?;
        let schema = registry.resolve(&version)?;
        let classes = binding::bind(&schema, &transport, timeout);
        info!(
            controller_version = %version,
            schema_version = %schema.version,
            bound_classes = classes.len(),
            "session bound"
        );
        Ok(Self {
            config,
            identity,
            schema,
            classes,
        })
    }

    /// Look up one bound class by name.
    pub fn class(&self, name: &str) -> Option<&BoundClass> {
        self.classes.get(name)
    }

    /// Iterate every bound class.
    pub fn classes(&self) -> impl Iterator<Item = &BoundClass> {
        self.classes.values()
    }

    /// Bound class names, sorted.
    pub fn class_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.classes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// What the endpoint reported at Identify time.
    pub fn identity(&self) -> &IdentifyInfo {
        &self.identity
    }

    /// The schema document this session was bound against.
    pub fn schema(&self) -> &SchemaDocument {
        &self.schema
    }

    /// The connection parameters this session was built from.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }
}
