//! WS-Man client for out-of-band server management controllers.
//!
//! Speaks the four WS-Man wire primitives (Identify, Get, Enumerate,
//! Invoke) over HTTPS and binds a compiled vendor schema into typed
//! capability objects at runtime.
//!
//! # Features
//!
//! - Identify-driven schema selection from a versioned registry
//! - Enumerate/Pull continuation with ordered, never-truncated results
//! - Invoke selector auto-discovery and value-map argument normalization
//! - Qualified values: raw wire codes paired with schema labels
//! - Strict error taxonomy; remote failures always raise, never leak as
//!   plain results
//!
//! # Example
//!
//! ```ignore
//! use oxidrac::{Session, SessionConfig, SchemaRegistry};
//!
//! let mut registry = SchemaRegistry::new();
//! registry.register_json(include_str!("../schemas/2.30.30.30.json"))?;
//!
//! let config = SessionConfig::new("drac-r640-01", "root", "calvin");
//! let session = Session::connect(config, &registry).await?;
//!
//! let nics = session.class("DCIM_NICView").unwrap();
//! let enumeration = nics.factory().unwrap().enumerate().await?;
//! for (fqdd, nic) in enumeration.iter() {
//!     println!("{fqdd}: {}", nic.attribute("LinkStatus").unwrap());
//! }
//! ```

pub mod binding;
pub mod config;
pub mod envelope;
pub mod error;
pub mod response;
pub mod schema;
pub mod session;
pub mod transport;
pub mod types;

pub use binding::{BoundClass, ClassDescription, Enumeration, Factory, Service};
pub use config::SessionConfig;
pub use error::WsmanError;
pub use response::IdentifyInfo;
pub use schema::{ClassDefinition, SchemaDocument, SchemaRegistry, ValueMap};
pub use session::Session;
pub use transport::{CancelFlag, HttpTransport, Poster, Transport};
pub use types::{
    InvokeResult, ManagedInstance, MethodArgument, QualifiedValue, RawValue, ResourceReference,
    SoftwareIdentityDescriptor,
};
