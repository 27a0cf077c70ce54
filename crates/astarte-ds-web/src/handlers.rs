//! HTTP request handlers: queries, resource calls and health checks.

use axum::extract::{RawQuery, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use tracing::debug;

use astarte_ds_core::query::{QueryDataRequest, QueryDataResponse};
use astarte_ds_core::resource::STATUS_OK;
use astarte_ds_core::{HealthCheckResult, HealthStatus};

use crate::state::AppState;

// ============================================================
// Health
// ============================================================

/// Checks the Astarte API with the configured realm and token.
#[utoipa::path(
    get,
    path = "/api/v1/health",
    responses(
        (status = 200, description = "Data source is working", body = HealthCheckResult),
        (status = 503, description = "Astarte API unreachable or token rejected", body = HealthCheckResult)
    )
)]
pub(crate) async fn handle_health(State(ds): AppState) -> (StatusCode, Json<HealthCheckResult>) {
    let result = ds.check_health().await;
    let status = match result.status {
        HealthStatus::Ok => StatusCode::OK,
        HealthStatus::Error => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status, Json(result))
}

// ============================================================
// Query
// ============================================================

/// Runs a batch of datastream queries. Failed queries carry an `error`
/// instead of frames; the batch itself always succeeds.
#[utoipa::path(
    post,
    path = "/api/v1/query",
    responses(
        (status = 200, description = "Frames or error text per refId"),
        (status = 400, description = "Body is not JSON"),
        (status = 422, description = "Body has no `queries` list")
    )
)]
pub(crate) async fn handle_query(
    State(ds): AppState,
    Json(request): Json<QueryDataRequest>,
) -> Json<QueryDataResponse> {
    let response = ds.query_data(&request).await;
    debug!(
        results = response.results.len(),
        failed = response.results.values().filter(|r| r.error.is_some()).count(),
        "query data response"
    );
    Json(response)
}

// ============================================================
// Resources
// ============================================================

/// Introspection (`?device_id=`) or interface document (`?name=&major=`).
#[utoipa::path(
    get,
    path = "/api/v1/resources",
    responses(
        (status = 200, description = "Introspection entries or interface document", body = [astarte_ds_core::resource::IntrospectionEntry]),
        (status = 400, description = "Unexpected request or lookup failure", body = String)
    )
)]
pub(crate) async fn handle_resources(State(ds): AppState, RawQuery(query): RawQuery) -> Response {
    let resource = ds.call_resource(query.as_deref().unwrap_or_default()).await;
    let content_type = if resource.status == STATUS_OK {
        "application/json"
    } else {
        "text/plain; charset=utf-8"
    };
    let status = StatusCode::from_u16(resource.status).unwrap_or(StatusCode::BAD_REQUEST);
    (status, [(header::CONTENT_TYPE, content_type)], resource.body).into_response()
}
