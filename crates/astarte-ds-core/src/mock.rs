//! In-memory [`AppEngineApi`] for tests.
//!
//! Datastreams are served in pages of `window.page_size`, filtered to the
//! window. Page tokens are offsets into the stored samples.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::client::{
    AppEngineApi, DatastreamPage, DatastreamWindow, DeviceDetails, DevicesStats,
    InterfaceVersion, PageToken, PageValues,
};
use crate::error::ApiError;
use crate::value::{DatastreamValue, SampleValue};

type StreamKey = (String, String, String);

enum Stream {
    Individual(Vec<DatastreamValue>),
    Aggregated,
}

#[derive(Default)]
pub struct MockAppEngine {
    streams: HashMap<StreamKey, Stream>,
    devices: HashMap<String, DeviceDetails>,
    interfaces: HashMap<(String, i64), Value>,
    stats: Option<DevicesStats>,
    failing_page: Option<(usize, ApiError)>,
    datastream_calls: AtomicUsize,
    requested_interfaces: Mutex<Vec<(String, i64)>>,
}

impl MockAppEngine {
    pub fn new() -> Self {
        Self {
            stats: Some(DevicesStats::default()),
            ..Default::default()
        }
    }

    /// Registers an individually aggregated datastream. Samples must be sorted by time.
    pub fn with_datastream(
        mut self,
        device: &str,
        interface: &str,
        path: &str,
        samples: Vec<(DateTime<Utc>, Value)>,
    ) -> Self {
        let values = samples
            .into_iter()
            .map(|(timestamp, value)| DatastreamValue {
                timestamp,
                value: SampleValue::from(value),
            })
            .collect();
        self.streams.insert(
            (device.to_string(), interface.to_string(), path.to_string()),
            Stream::Individual(values),
        );
        self
    }

    /// Registers a datastream whose pages come back object aggregated.
    pub fn with_aggregated_datastream(mut self, device: &str, interface: &str, path: &str) -> Self {
        self.streams.insert(
            (device.to_string(), interface.to_string(), path.to_string()),
            Stream::Aggregated,
        );
        self
    }

    pub fn with_device(mut self, device_id: &str, introspection: &[(&str, i64, i64)]) -> Self {
        let introspection = introspection
            .iter()
            .map(|(name, major, minor)| {
                (
                    name.to_string(),
                    InterfaceVersion {
                        major: *major,
                        minor: *minor,
                    },
                )
            })
            .collect();
        self.devices.insert(
            device_id.to_string(),
            DeviceDetails {
                id: device_id.to_string(),
                introspection,
            },
        );
        self
    }

    pub fn with_interface(mut self, name: &str, major: i64, doc: Value) -> Self {
        self.interfaces.insert((name.to_string(), major), doc);
        self
    }

    /// Makes the `n`-th datastream call (1-based) fail with `error`.
    pub fn fail_page(mut self, n: usize, error: ApiError) -> Self {
        self.failing_page = Some((n, error));
        self
    }

    /// Makes the stats read fail.
    pub fn unreachable(mut self) -> Self {
        self.stats = None;
        self
    }

    pub fn datastream_calls(&self) -> usize {
        self.datastream_calls.load(Ordering::SeqCst)
    }

    /// `(name, major)` pairs passed to [`AppEngineApi::interface`], in call order.
    pub fn requested_interfaces(&self) -> Vec<(String, i64)> {
        self.requested_interfaces
            .lock()
            .map(|v| v.clone())
            .unwrap_or_default()
    }
}

fn not_found(what: String) -> ApiError {
    ApiError::NotFound { message: what }
}

#[async_trait]
impl AppEngineApi for MockAppEngine {
    async fn datastream_page(
        &self,
        window: &DatastreamWindow,
        cursor: Option<&PageToken>,
    ) -> Result<DatastreamPage, ApiError> {
        let call = self.datastream_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((n, err)) = &self.failing_page
            && *n == call
        {
            return Err(err.clone());
        }

        let key = (
            window.device_id.clone(),
            window.interface.clone(),
            window.path.clone(),
        );
        let values = match self.streams.get(&key) {
            Some(Stream::Individual(values)) => values,
            Some(Stream::Aggregated) => {
                return Ok(DatastreamPage {
                    values: PageValues::Unexpected {
                        shape: "list of aggregated objects".to_string(),
                    },
                    next: None,
                });
            }
            None => return Err(not_found(format!("{key:?}"))),
        };

        let in_window: Vec<&DatastreamValue> = values
            .iter()
            .filter(|v| v.timestamp >= window.since && v.timestamp <= window.to)
            .collect();
        let offset = match cursor {
            Some(token) => token.as_str().parse::<usize>().map_err(|e| ApiError::Decode {
                message: e.to_string(),
            })?,
            None => 0,
        };
        let end = (offset + window.page_size).min(in_window.len());
        let page = in_window
            .get(offset..end)
            .unwrap_or_default()
            .iter()
            .map(|v| (*v).clone())
            .collect();
        let next = (end < in_window.len()).then(|| PageToken::new(end.to_string()));

        Ok(DatastreamPage {
            values: PageValues::Individual(page),
            next,
        })
    }

    async fn device_details(&self, device_id: &str) -> Result<DeviceDetails, ApiError> {
        self.devices
            .get(device_id)
            .cloned()
            .ok_or_else(|| not_found(format!("device {device_id}")))
    }

    async fn interface(&self, name: &str, major: i64) -> Result<Value, ApiError> {
        if let Ok(mut requested) = self.requested_interfaces.lock() {
            requested.push((name.to_string(), major));
        }
        self.interfaces
            .get(&(name.to_string(), major))
            .cloned()
            .ok_or_else(|| not_found(format!("interface {name} v{major}")))
    }

    async fn devices_stats(&self) -> Result<DevicesStats, ApiError> {
        self.stats.ok_or_else(|| ApiError::Network {
            message: "connection refused".to_string(),
        })
    }
}
