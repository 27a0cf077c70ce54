//! OpenAPI documentation definition.

use astarte_ds_core::resource::IntrospectionEntry;
use astarte_ds_core::{HealthCheckResult, HealthStatus};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::handle_health,
        crate::handlers::handle_query,
        crate::handlers::handle_resources,
    ),
    components(schemas(HealthCheckResult, HealthStatus, IntrospectionEntry)),
    info(
        title = "astarte-ds API",
        version = "1.0",
        description = "Astarte AppEngine datasource: datastream queries, introspection and interface lookups"
    )
)]
pub(crate) struct ApiDoc;
