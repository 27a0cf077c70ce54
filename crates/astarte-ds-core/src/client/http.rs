//! HTTP implementation of [`AppEngineApi`] on top of reqwest.
//!
//! All endpoints answer with a `{"data": ...}` envelope and authenticate with a
//! bearer JWT scoped to the realm.
//!
//! Datastream pagination: the first page is requested with `since`, later
//! pages with `since_after` set to the last timestamp of the previous page. A
//! page shorter than the requested `limit` is the last one.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error};
use url::Url;

use super::{
    AppEngineApi, DatastreamPage, DatastreamWindow, DeviceDetails, DevicesStats, PageToken,
    PageValues,
};
use crate::error::{ApiError, ConfigError};
use crate::settings::DatasourceSettings;
use crate::value::DatastreamValue;

#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

/// Client for one realm of an Astarte installation.
pub struct AstarteClient {
    http: Client,
    appengine: String,
    realm_management: String,
    realm: String,
    token: String,
}

impl AstarteClient {
    pub fn new(settings: &DatasourceSettings) -> Result<Self, ConfigError> {
        let http = Client::builder()
            .user_agent(format!("astarte-ds/{}", crate::VERSION))
            .build()
            .map_err(|e| ConfigError::Client {
                message: e.to_string(),
            })?;

        Ok(Self {
            http,
            appengine: settings.appengine_base(),
            realm_management: settings.realm_management_base(),
            realm: settings.realm.clone(),
            token: settings.token.clone(),
        })
    }

    pub fn realm(&self) -> &str {
        &self.realm
    }

    /// Equivalent curl command line, bearer token redacted.
    pub fn to_curl(&self, url: &Url) -> String {
        format!("curl -X GET -H 'Authorization: Bearer <redacted>' '{url}'")
    }

    async fn get_data<T: DeserializeOwned>(
        &self,
        mut url: Url,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        debug!(curl = %self.to_curl(&url), "querying Astarte");

        let path = url.path().to_owned();
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| ApiError::Network {
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = match status.as_u16() {
                401 | 403 => ApiError::Authentication {
                    status: status.as_u16(),
                    message: body,
                },
                404 => ApiError::NotFound { message: body },
                code => ApiError::Server {
                    status: code,
                    message: body,
                },
            };
            error!(path = %path, error = %err, "Astarte request failed");
            return Err(err);
        }

        let envelope: Envelope<T> = response.json().await.map_err(|e| ApiError::Decode {
            message: e.to_string(),
        })?;
        Ok(envelope.data)
    }
}

#[async_trait]
impl AppEngineApi for AstarteClient {
    async fn datastream_page(
        &self,
        window: &DatastreamWindow,
        cursor: Option<&PageToken>,
    ) -> Result<DatastreamPage, ApiError> {
        let mut segments = vec![
            "v1",
            self.realm.as_str(),
            "devices",
            window.device_id.as_str(),
            "interfaces",
            window.interface.as_str(),
        ];
        segments.extend(path_segments(&window.path));
        let url = endpoint(&self.appengine, &segments)?;
        let mut query = vec![
            ("limit", window.page_size.to_string()),
            ("to", format_timestamp(window.to)),
        ];
        match cursor {
            None => query.push(("since", format_timestamp(window.since))),
            Some(token) => query.push(("since_after", token.as_str().to_string())),
        }

        let data: Value = self.get_data(url, &query).await?;
        let values = classify_page(data)?;
        let next = match &values {
            PageValues::Individual(entries) if entries.len() >= window.page_size => entries
                .last()
                .filter(|last| last.timestamp < window.to)
                .map(|last| PageToken::new(format_timestamp(last.timestamp))),
            _ => None,
        };

        Ok(DatastreamPage { values, next })
    }

    async fn device_details(&self, device_id: &str) -> Result<DeviceDetails, ApiError> {
        let url = endpoint(&self.appengine, &["v1", self.realm.as_str(), "devices", device_id])?;
        self.get_data(url, &[]).await
    }

    async fn interface(&self, name: &str, major: i64) -> Result<Value, ApiError> {
        let major = major.to_string();
        let url = endpoint(
            &self.realm_management,
            &["v1", self.realm.as_str(), "interfaces", name, major.as_str()],
        )?;
        self.get_data(url, &[]).await
    }

    async fn devices_stats(&self) -> Result<DevicesStats, ApiError> {
        let url = endpoint(&self.appengine, &["v1", self.realm.as_str(), "stats", "devices"])?;
        self.get_data(url, &[]).await
    }
}

/// Appends `segments` to `base`, each one percent-encoded as a single path
/// segment. Dot segments are refused since the URL parser would drop them.
fn endpoint(base: &str, segments: &[&str]) -> Result<Url, ApiError> {
    let invalid = |message: String| ApiError::InvalidRequest { message };
    if let Some(dots) = segments.iter().copied().find(|s| matches!(*s, "." | "..")) {
        return Err(invalid(format!("path segment {dots:?} is not allowed")));
    }
    let mut url = Url::parse(base).map_err(|e| invalid(format!("base URL {base}: {e}")))?;
    url.path_segments_mut()
        .map_err(|()| invalid(format!("base URL {base} cannot carry a path")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Datastream path split on `/`, without empty segments.
fn path_segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Individual datastreams come back as a list of `{timestamp, value}` objects.
/// Object aggregates and path-prefix trees do not.
fn classify_page(data: Value) -> Result<PageValues, ApiError> {
    let shape = match data {
        Value::Array(items) if items.iter().all(|item| item.get("value").is_some()) => {
            let values: Vec<DatastreamValue> = serde_json::from_value(Value::Array(items))
                .map_err(|e| ApiError::Decode {
                    message: e.to_string(),
                })?;
            return Ok(PageValues::Individual(values));
        }
        Value::Array(_) => "list of aggregated objects",
        Value::Object(_) => "object",
        Value::String(_) => "string",
        Value::Number(_) => "number",
        Value::Bool(_) => "boolean",
        Value::Null => "null",
    };
    Ok(PageValues::Unexpected {
        shape: shape.to_string(),
    })
}
