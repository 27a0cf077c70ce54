//! astarte-ds-core: Astarte AppEngine datasource for dashboard hosts.
//!
//! Provides:
//! - `settings`: datasource instance settings (API URL, realm, token)
//! - `error`: error types for configuration, API calls, queries and resources
//! - `client`: the AppEngine API capability and its HTTP implementation
//! - `value`: datastream sample values and numeric coercion
//! - `frame`: two-column time series frames returned to the host
//! - `query`: query model and the paginated query executor
//! - `resource`: introspection and interface lookups
//! - `datasource`: the datasource instance tying the above together
//!
//! With `mock` feature:
//! - `mock`: in-memory API capability for tests

pub mod client;
pub mod datasource;
pub mod error;
pub mod frame;
pub mod query;
pub mod resource;
pub mod settings;
pub mod value;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use datasource::{Datasource, HealthCheckResult, HealthStatus};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
