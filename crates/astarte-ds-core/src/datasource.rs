//! Datasource instance: one realm, one API client, shared by every request.

use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, error, info};

use crate::client::{AppEngineApi, AstarteClient};
use crate::error::{ConfigError, QueryError};
use crate::frame::Frame;
use crate::query::{self, DataQuery, DataResponse, QueryDataRequest, QueryDataResponse};
use crate::resource::{self, ResourceRequest, ResourceResponse};
use crate::settings::DatasourceSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "api", derive(utoipa::ToSchema))]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthStatus {
    Ok,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "api", derive(utoipa::ToSchema))]
pub struct HealthCheckResult {
    pub status: HealthStatus,
    pub message: String,
}

/// Immutable after construction; safe to share across concurrent requests.
pub struct Datasource {
    api: Arc<dyn AppEngineApi>,
    realm: String,
}

impl Datasource {
    /// Validates `settings` and sets up the HTTP client.
    pub fn new(settings: &DatasourceSettings) -> Result<Self, ConfigError> {
        settings.validate().inspect_err(|e| {
            error!(error = %e, "cannot read settings");
        })?;
        let client = AstarteClient::new(settings).inspect_err(|e| {
            error!(error = %e, "cannot set up API client");
        })?;
        info!(
            realm = %settings.realm,
            appengine = %settings.appengine_base(),
            realm_management = %settings.realm_management_base(),
            "datasource created"
        );
        Ok(Self::with_api(Arc::new(client), settings.realm.clone()))
    }

    pub fn with_api(api: Arc<dyn AppEngineApi>, realm: impl Into<String>) -> Self {
        Self {
            api,
            realm: realm.into(),
        }
    }

    pub fn realm(&self) -> &str {
        &self.realm
    }

    /// Runs every query of the batch concurrently. A failing query only sets
    /// the `error` of its own response.
    pub async fn query_data(&self, request: &QueryDataRequest) -> QueryDataResponse {
        debug!(queries = request.queries.len(), "query data called");
        let results = join_all(request.queries.iter().enumerate().map(|(i, raw)| async move {
            let key = DataQuery::response_key(raw, i);
            let response = DataResponse::from(self.query(&key, raw).await);
            (key, response)
        }))
        .await;

        QueryDataResponse {
            results: results.into_iter().collect(),
        }
    }

    async fn query(&self, key: &str, raw: &serde_json::Value) -> Result<Frame, QueryError> {
        let query = DataQuery::from_json(raw)
            .and_then(|q| q.model().map(|model| (q, model)))
            .inspect_err(|e| {
                error!(ref_id = key, error = %e, "error in query model unmarshal");
            });
        let (query, model) = query?;
        query::execute_query(self.api.as_ref(), &model, query.time_range).await
    }

    /// Checks reachability and the token with a device stats read.
    pub async fn check_health(&self) -> HealthCheckResult {
        match self.api.devices_stats().await {
            Ok(stats) => {
                debug!(
                    realm = %self.realm,
                    total_devices = stats.total_devices,
                    connected_devices = stats.connected_devices,
                    "health check ok"
                );
                HealthCheckResult {
                    status: HealthStatus::Ok,
                    message: "Data source is working".to_string(),
                }
            }
            Err(e) => {
                error!(realm = %self.realm, error = %e, "health check failed");
                HealthCheckResult {
                    status: HealthStatus::Error,
                    message: e.to_string(),
                }
            }
        }
    }

    /// Handles a resource call given its raw query string.
    pub async fn call_resource(&self, query: &str) -> ResourceResponse {
        debug!(query, "call resource called");
        match ResourceRequest::from_query(query) {
            Ok(request) => resource::call_resource(self.api.as_ref(), &request).await,
            Err(e) => ResourceResponse::bad_request(&e),
        }
    }
}

impl Drop for Datasource {
    fn drop(&mut self) {
        info!(realm = %self.realm, "disposing datasource");
    }
}
