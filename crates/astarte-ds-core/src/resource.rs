//! Resource calls: device introspection and interface documents.
//!
//! Requests are dispatched on their query parameters:
//! - `device_id`: the device's introspection, as a list of [`IntrospectionEntry`]
//! - `name` + `major`: the interface document from Realm Management
//!
//! Anything else is answered with 400 `unexpected request`.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, error, info};

use crate::client::AppEngineApi;
use crate::error::ResourceError;

pub const STATUS_OK: u16 = 200;
pub const STATUS_BAD_REQUEST: u16 = 400;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "api", derive(utoipa::ToSchema))]
pub struct IntrospectionEntry {
    pub name: String,
    pub major: i64,
    pub minor: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceRequest {
    Introspection { device_id: String },
    Interface { name: String, major: i64 },
}

impl ResourceRequest {
    /// Picks the lookup from decoded query parameters. `device_id` wins when both
    /// forms are present.
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, ResourceError> {
        if let Some(device_id) = params.get("device_id") {
            return Ok(ResourceRequest::Introspection {
                device_id: device_id.clone(),
            });
        }
        match (params.get("name"), params.get("major")) {
            (Some(name), Some(major)) => Ok(ResourceRequest::Interface {
                name: name.clone(),
                major: parse_major(major),
            }),
            _ => Err(ResourceError::UnexpectedRequest),
        }
    }

    /// Short name of the lookup, used in access logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ResourceRequest::Introspection { .. } => "introspection",
            ResourceRequest::Interface { .. } => "interface",
        }
    }

    /// Same as [`Self::from_params`] for a raw `a=b&c=d` query string.
    /// The first occurrence of a repeated key is used.
    pub fn from_query(query: &str) -> Result<Self, ResourceError> {
        let mut params = HashMap::new();
        for (k, v) in url::form_urlencoded::parse(query.trim_start_matches('?').as_bytes()) {
            params.entry(k.into_owned()).or_insert_with(|| v.into_owned());
        }
        Self::from_params(&params)
    }
}

// Malformed majors fall back to 0, the interface lookup then reports the miss.
fn parse_major(raw: &str) -> i64 {
    raw.parse().unwrap_or_else(|_| {
        debug!(major = raw, "interface major is not an integer, using 0");
        0
    })
}

/// Status and body handed back to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl ResourceResponse {
    pub fn ok(body: Vec<u8>) -> Self {
        Self {
            status: STATUS_OK,
            body,
        }
    }

    pub fn bad_request(err: &ResourceError) -> Self {
        Self {
            status: STATUS_BAD_REQUEST,
            body: err.to_string().into_bytes(),
        }
    }
}

/// Device introspection flattened to a list, sorted by interface name.
pub async fn device_introspection(
    api: &dyn AppEngineApi,
    device_id: &str,
) -> Result<Vec<IntrospectionEntry>, ResourceError> {
    let details = api.device_details(device_id).await.inspect_err(|e| {
        error!(device_id, error = %e, "can't retrieve device introspection");
    })?;
    info!(device_id, "received introspection for device");

    let mut entries: Vec<IntrospectionEntry> = details
        .introspection
        .into_iter()
        .map(|(name, version)| IntrospectionEntry {
            name,
            major: version.major,
            minor: version.minor,
        })
        .collect();
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

pub async fn interface_document(
    api: &dyn AppEngineApi,
    name: &str,
    major: i64,
) -> Result<serde_json::Value, ResourceError> {
    let doc = api.interface(name, major).await.inspect_err(|e| {
        error!(interface = name, major, error = %e, "can't retrieve interface");
    })?;
    debug!(interface = name, major, "received interface document");
    Ok(doc)
}

/// Runs one resource call. Lookup failures stop here with a 400 carrying the
/// error text; no body is marshaled after an error.
pub async fn call_resource(api: &dyn AppEngineApi, request: &ResourceRequest) -> ResourceResponse {
    let body = match request {
        ResourceRequest::Introspection { device_id } => device_introspection(api, device_id)
            .await
            .and_then(|entries| to_json(&entries)),
        ResourceRequest::Interface { name, major } => interface_document(api, name, *major)
            .await
            .and_then(|doc| to_json(&doc)),
    };
    match body {
        Ok(body) => ResourceResponse::ok(body),
        Err(err) => ResourceResponse::bad_request(&err),
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<Vec<u8>, ResourceError> {
    serde_json::to_vec(value).map_err(|e| ResourceError::Encode {
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockAppEngine;
    use serde_json::json;

    #[test]
    fn test_from_query_device_id() {
        assert_eq!(
            ResourceRequest::from_query("device_id=dev1").unwrap(),
            ResourceRequest::Introspection {
                device_id: "dev1".to_string()
            }
        );
    }

    #[test]
    fn test_from_query_interface() {
        assert_eq!(
            ResourceRequest::from_query("?name=com.example.Temp&major=2").unwrap(),
            ResourceRequest::Interface {
                name: "com.example.Temp".to_string(),
                major: 2
            }
        );
    }

    #[test]
    fn test_from_query_malformed_major_is_zero() {
        assert_eq!(
            ResourceRequest::from_query("name=com.example.Temp&major=two").unwrap(),
            ResourceRequest::Interface {
                name: "com.example.Temp".to_string(),
                major: 0
            }
        );
    }

    #[test]
    fn test_from_query_unexpected() {
        assert!(matches!(
            ResourceRequest::from_query(""),
            Err(ResourceError::UnexpectedRequest)
        ));
        assert!(matches!(
            ResourceRequest::from_query("name=com.example.Temp"),
            Err(ResourceError::UnexpectedRequest)
        ));
    }

    #[tokio::test]
    async fn test_introspection_single_entry() {
        let api = MockAppEngine::new().with_device("dev1", &[("com.example.Temp", 1, 2)]);
        let request = ResourceRequest::from_query("device_id=dev1").unwrap();
        let response = call_resource(&api, &request).await;

        assert_eq!(response.status, STATUS_OK);
        let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(
            body,
            json!([{"name": "com.example.Temp", "major": 1, "minor": 2}])
        );
    }

    #[tokio::test]
    async fn test_introspection_sorted_by_name() {
        let api = MockAppEngine::new().with_device(
            "dev1",
            &[
                ("org.example.Zeta", 0, 1),
                ("com.example.Alpha", 2, 0),
                ("com.example.Beta", 1, 3),
            ],
        );
        let entries = device_introspection(&api, "dev1").await.unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["com.example.Alpha", "com.example.Beta", "org.example.Zeta"]
        );
    }

    #[tokio::test]
    async fn test_lookup_failure_is_single_bad_request() {
        let api = MockAppEngine::new();
        let request = ResourceRequest::Introspection {
            device_id: "missing".to_string(),
        };
        let response = call_resource(&api, &request).await;
        assert_eq!(response.status, STATUS_BAD_REQUEST);
        let text = String::from_utf8(response.body).unwrap();
        assert!(text.contains("missing"));
    }

    #[tokio::test]
    async fn test_interface_passthrough() {
        let doc = json!({
            "interface_name": "com.example.Temp",
            "version_major": 1,
            "version_minor": 0,
            "type": "datastream",
            "mappings": [{"endpoint": "/value", "type": "double"}]
        });
        let api = MockAppEngine::new().with_interface("com.example.Temp", 1, doc.clone());
        let request = ResourceRequest::from_query("name=com.example.Temp&major=1").unwrap();
        let response = call_resource(&api, &request).await;

        assert_eq!(response.status, STATUS_OK);
        let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(body, doc);
    }

    #[tokio::test]
    async fn test_malformed_major_queries_major_zero() {
        let api = MockAppEngine::new();
        let request = ResourceRequest::from_query("name=com.example.Temp&major=x").unwrap();
        let response = call_resource(&api, &request).await;
        assert_eq!(response.status, STATUS_BAD_REQUEST);
        assert_eq!(
            api.requested_interfaces(),
            vec![("com.example.Temp".to_string(), 0)]
        );
    }
}
