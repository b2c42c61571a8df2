//! HTTPS transport for the four WS-Man wire operations.
//!
//! [`HttpTransport`] turns Identify/Get/Enumerate/Invoke into SOAP posts
//! against the management endpoint, handles Enumerate/Pull continuation,
//! and performs invoke selector auto-discovery. The raw POST lives behind
//! the [`Poster`] seam so embedders and tests can script the wire. Nothing
//! here retries: retry policy belongs to the workflow layer.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::SessionConfig;
use crate::envelope;
use crate::error::WsmanError;
use crate::response::{self, IdentifyInfo};
use crate::types::{InvokeResult, ManagedInstance, MethodArgument, RawValue};

/// Selector keys projected from a discovered instance when targeting an
/// Invoke without explicit selectors.
pub const DEFAULT_SELECTOR_KEYS: &[&str] = &[
    "CreationClassName",
    "SystemCreationClassName",
    "SystemName",
    "Name",
    "InstanceID",
];

/// The CIM namespace selector every auto-discovered selector set carries.
pub const CIM_NAMESPACE_SELECTOR: (&str, &str) = ("__cimnamespace", "root/dcim");

/// Cooperative cancellation for multi-page enumerations. Checked between
/// pages; an in-flight page is never interrupted.
#[derive(Debug, Default)]
pub struct CancelFlag(AtomicBool);

impl CancelFlag {
    /// A fresh, uncancelled flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// The four wire primitives. Bound capability objects call through this
/// trait; implementations must be safe for concurrent calls.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send Identify and parse what the endpoint reports about itself.
    async fn identify(&self, timeout: Duration) -> Result<IdentifyInfo, WsmanError>;

    /// Fetch one instance addressed by an explicit selector set.
    async fn get(
        &self,
        class_name: &str,
        selectors: &[(String, String)],
        timeout: Duration,
    ) -> Result<ManagedInstance, WsmanError>;

    /// List all instances of a class, following Pull continuation until the
    /// endpoint signals the end of the sequence. A mid-sequence error
    /// aborts the whole call; a truncated result is never returned.
    async fn enumerate(
        &self,
        class_name: &str,
        timeout: Duration,
        cancel: Option<&CancelFlag>,
    ) -> Result<Vec<ManagedInstance>, WsmanError>;

    /// Invoke a method on the instance addressed by `selectors`, or by
    /// auto-discovery when `selectors` is `None`.
    async fn invoke(
        &self,
        class_name: &str,
        method: &str,
        selectors: Option<&[(String, String)]>,
        arguments: &[(String, MethodArgument)],
        timeout: Duration,
    ) -> Result<InvokeResult, WsmanError>;
}

/// The raw HTTP seam: post one SOAP payload, return the response body.
#[async_trait]
pub trait Poster: Send + Sync {
    /// POST the payload to the management endpoint.
    async fn post(&self, payload: String, timeout: Duration) -> Result<String, WsmanError>;
}

/// Production poster over a pooled reqwest client.
struct ReqwestPoster {
    client: reqwest::Client,
    url: String,
    username: String,
    password: String,
}

fn map_send_error(err: reqwest::Error, timeout: Duration) -> WsmanError {
    if err.is_timeout() {
        WsmanError::Timeout(timeout)
    } else if err.is_connect() {
        WsmanError::Connect(err.to_string())
    } else {
        WsmanError::Transport(err.to_string())
    }
}

#[async_trait]
impl Poster for ReqwestPoster {
    async fn post(&self, payload: String, timeout: Duration) -> Result<String, WsmanError> {
        debug!(url = %self.url, bytes = payload.len(), "posting WS-Man envelope");
        let response = self
            .client
            .post(&self.url)
            .basic_auth(&self.username, Some(&self.password))
            .header(CONTENT_TYPE, "application/soap+xml;charset=UTF-8")
            .timeout(timeout)
            .body(payload)
            .send()
            .await
            .map_err(|e| map_send_error(e, timeout))?;

        let status = response.status();
        if status.as_u16() == 401 {
            warn!(url = %self.url, "endpoint rejected credentials");
            return Err(WsmanError::Auth);
        }
        if !status.is_success() {
            return Err(WsmanError::Http {
                status: status.as_u16(),
                reason: status
                    .canonical_reason()
                    .unwrap_or("unknown status")
                    .to_string(),
            });
        }
        response
            .text()
            .await
            .map_err(|e| map_send_error(e, timeout))
    }
}

/// The reqwest-backed transport engine.
///
/// Immutable after construction and safe for concurrent calls; per-call
/// state never outlives its request/response pair.
pub struct HttpTransport {
    poster: Arc<dyn Poster>,
    url: String,
    resource_base: String,
    max_pull_elements: u32,
}

impl HttpTransport {
    /// Build a transport for the configured endpoint.
    pub fn new(config: &SessionConfig) -> Result<Self, WsmanError> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(config.danger_accept_invalid_certs)
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| WsmanError::Connect(e.to_string()))?;
        let poster = ReqwestPoster {
            client,
            url: config.endpoint_url(),
            username: config.username.clone(),
            password: config.password.clone(),
        };
        Ok(Self::with_poster(Arc::new(poster), config))
    }

    /// Build a transport over a caller-supplied poster. This is the seam
    /// for exercising the engine against a scripted wire.
    pub fn with_poster(poster: Arc<dyn Poster>, config: &SessionConfig) -> Self {
        Self {
            poster,
            url: config.endpoint_url(),
            resource_base: config.resource_base.clone(),
            max_pull_elements: config.max_pull_elements,
        }
    }

    fn resource_uri(&self, class_name: &str) -> String {
        format!("{}/{}", self.resource_base, class_name)
    }

    /// Enumerate the class and require exactly one instance, then project
    /// the well-known selector keys from it.
    async fn discover_selectors(
        &self,
        class_name: &str,
        timeout: Duration,
    ) -> Result<Vec<(String, String)>, WsmanError> {
        let instances = self.enumerate(class_name, timeout, None).await?;
        if instances.len() != 1 {
            return Err(WsmanError::AmbiguousTarget {
                class_name: class_name.to_string(),
                count: instances.len(),
            });
        }
        let (namespace_key, namespace_value) = CIM_NAMESPACE_SELECTOR;
        let mut selectors = vec![(namespace_key.to_string(), namespace_value.to_string())];
        for key in DEFAULT_SELECTOR_KEYS {
            if let Some(RawValue::Text(value)) = instances[0].raw(key) {
                selectors.push((key.to_string(), value.clone()));
            }
        }
        debug!(class = class_name, selectors = ?selectors, "discovered invoke selectors");
        Ok(selectors)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn identify(&self, timeout: Duration) -> Result<IdentifyInfo, WsmanError> {
        let reply = self.poster.post(envelope::identify(), timeout).await?;
        let info = response::parse_identify(&reply)?;
        debug!(
            vendor = info.product_vendor.as_deref().unwrap_or("?"),
            version = info.controller_version.as_deref().unwrap_or("?"),
            "identified endpoint"
        );
        Ok(info)
    }

    async fn get(
        &self,
        class_name: &str,
        selectors: &[(String, String)],
        timeout: Duration,
    ) -> Result<ManagedInstance, WsmanError> {
        let uri = self.resource_uri(class_name);
        let payload = envelope::get(&self.url, &uri, selectors, timeout);
        let reply = self.poster.post(payload, timeout).await?;
        response::parse_get(&reply, class_name)
    }

    async fn enumerate(
        &self,
        class_name: &str,
        timeout: Duration,
        cancel: Option<&CancelFlag>,
    ) -> Result<Vec<ManagedInstance>, WsmanError> {
        let uri = self.resource_uri(class_name);
        let payload = envelope::enumerate(&self.url, &uri, timeout);
        let reply = self.poster.post(payload, timeout).await?;
        let mut context = response::parse_enumerate_context(&reply)?;

        let mut items = Vec::new();
        loop {
            if cancel.is_some_and(CancelFlag::is_cancelled) {
                return Err(WsmanError::Cancelled);
            }
            let payload =
                envelope::pull(&self.url, &uri, &context, self.max_pull_elements, timeout);
            let reply = self.poster.post(payload, timeout).await?;
            let page = response::parse_pull(&reply, class_name)?;
            items.extend(page.items);
            if page.end_of_sequence {
                break;
            }
            if let Some(next) = page.context {
                context = next;
            }
        }
        debug!(class = class_name, count = items.len(), "enumeration complete");
        Ok(items)
    }

    async fn invoke(
        &self,
        class_name: &str,
        method: &str,
        selectors: Option<&[(String, String)]>,
        arguments: &[(String, MethodArgument)],
        timeout: Duration,
    ) -> Result<InvokeResult, WsmanError> {
        let resolved: Vec<(String, String)> = match selectors {
            Some(explicit) => explicit.to_vec(),
            None => self.discover_selectors(class_name, timeout).await?,
        };
        let params: Vec<(String, envelope::ParamValue)> = arguments
            .iter()
            .map(|(name, value)| (name.clone(), value.to_param_value()))
            .collect();
        let uri = self.resource_uri(class_name);
        let payload = envelope::invoke(&self.url, &uri, method, &resolved, &params, timeout);
        let reply = self.poster.post(payload, timeout).await?;
        let returns = response::parse_invoke(&reply, method)?;
        Ok(InvokeResult::new(class_name, method, returns))
    }
}
