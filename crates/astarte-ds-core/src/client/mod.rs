//! AppEngine API capability.
//!
//! The datasource talks to Astarte only through [`AppEngineApi`]. The HTTP
//! implementation lives in [`http`]; tests use `crate::mock::MockAppEngine`.

pub mod http;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::error::ApiError;
use crate::value::DatastreamValue;

pub use http::AstarteClient;

/// Entries requested per datastream page.
pub const PAGE_SIZE: usize = 100;

/// Time window of an individually aggregated datastream, read in ascending order.
#[derive(Debug, Clone, PartialEq)]
pub struct DatastreamWindow {
    pub device_id: String,
    pub interface: String,
    pub path: String,
    pub since: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub page_size: usize,
}

/// Continuation state of a paginated read. Only the client that issued it
/// knows what it means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageToken(String);

impl PageToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DatastreamPage {
    pub values: PageValues,
    /// `Some` while more pages remain.
    pub next: Option<PageToken>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PageValues {
    Individual(Vec<DatastreamValue>),
    /// Anything else, e.g. an object aggregated payload.
    Unexpected { shape: String },
}

/// Interface version as declared in a device introspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct InterfaceVersion {
    pub major: i64,
    pub minor: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceDetails {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub introspection: HashMap<String, InterfaceVersion>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct DevicesStats {
    pub total_devices: u64,
    pub connected_devices: u64,
}

/// Read-only view of one realm of the Astarte API. Shared by all concurrently
/// running queries of a datasource instance.
#[async_trait]
pub trait AppEngineApi: Send + Sync {
    /// Fetches one page of `window`. `cursor` is `None` for the first page and
    /// the previous page's `next` afterwards.
    async fn datastream_page(
        &self,
        window: &DatastreamWindow,
        cursor: Option<&PageToken>,
    ) -> Result<DatastreamPage, ApiError>;

    async fn device_details(&self, device_id: &str) -> Result<DeviceDetails, ApiError>;

    /// Interface document, passed through untouched.
    async fn interface(&self, name: &str, major: i64) -> Result<Value, ApiError>;

    async fn devices_stats(&self) -> Result<DevicesStats, ApiError>;
}
