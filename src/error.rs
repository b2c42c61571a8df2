//! Error types for the WS-Man client.

use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the protocol engine and the runtime binding layer.
///
/// Transport and protocol errors propagate unchanged through the binding
/// layer. Schema failures are fatal at load/connect time: a session is
/// either fully bound or not constructed at all. Remote method failures are
/// always raised as [`WsmanError::RemoteOperation`], never returned as a
/// plain result. No error is retried inside this crate.
#[derive(Error, Debug)]
pub enum WsmanError {
    /// The HTTPS connection could not be established.
    #[error("connection error: {0}")]
    Connect(String),

    /// The request failed below the SOAP layer (I/O, HTTP plumbing).
    #[error("transport error: {0}")]
    Transport(String),

    /// The call did not complete within the caller-supplied timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The endpoint rejected the supplied credentials.
    #[error("authentication rejected by the endpoint")]
    Auth,

    /// The endpoint answered with a non-success HTTP status.
    #[error("endpoint returned HTTP {status}: {reason}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Canonical reason phrase.
        reason: String,
    },

    /// An Identify response that could not be understood.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A SOAP body that could not be parsed into the expected shape.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// The endpoint reported a SOAP fault.
    #[error("WS-Man fault (code {code:?}, subcode {subcode:?}): {reason:?}")]
    Fault {
        /// `s:Code/s:Value` text, if present.
        code: Option<String>,
        /// `s:Code/s:Subcode/s:Value` text, if present.
        subcode: Option<String>,
        /// `s:Reason/s:Text` text, if present.
        reason: Option<String>,
    },

    /// A Get matched no instance.
    #[error("no instance of {class_name} matched the supplied selectors")]
    NotFound {
        /// Class the Get was addressed to.
        class_name: String,
    },

    /// Invoke selector auto-discovery matched zero or multiple instances.
    #[error("invoke targeting needs exactly one instance of {class_name}, found {count}")]
    AmbiguousTarget {
        /// Class the Invoke was addressed to.
        class_name: String,
        /// Number of instances the discovery enumeration returned.
        count: usize,
    },

    /// A method argument was missing, unknown, or failed value-map
    /// normalization. Raised before any network traffic.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The remote method ran and reported failure through its return code.
    #[error("{class_name}.{method} failed with return code {return_code}")]
    RemoteOperation {
        /// Class the method belongs to.
        class_name: String,
        /// Method name.
        method: String,
        /// The raw return code, verbatim.
        return_code: String,
        /// `MessageID` from the response, verbatim.
        message_id: Option<String>,
        /// `Message` from the response, verbatim.
        message: Option<String>,
        /// `MessageArguments` from the response, in response order.
        message_arguments: Vec<String>,
    },

    /// A schema document failed load-time validation.
    #[error("schema error: {0}")]
    Schema(String),

    /// No registered schema covers the discovered controller version.
    #[error("controller version '{0}' is not covered by any registered schema")]
    UnsupportedVersion(String),

    /// Enumeration key derivation produced a key twice for one class.
    #[error("duplicate enumeration key '{key}' derived for class {class_name}")]
    DuplicateKey {
        /// Class being enumerated.
        class_name: String,
        /// The colliding key.
        key: String,
    },

    /// A multi-page enumeration was cancelled between pages.
    #[error("operation cancelled")]
    Cancelled,

    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(String),
}
