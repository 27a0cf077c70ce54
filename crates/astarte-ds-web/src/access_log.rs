//! Access log middleware: one line per request, resource calls tagged with
//! the lookup they resolve to.

use std::net::SocketAddr;
use std::time::Instant;

use astarte_ds_core::resource::ResourceRequest;
use axum::extract::{ConnectInfo, Request};
use axum::middleware::Next;
use axum::response::Response;
use tracing::info;

const RESOURCES_PATH: &str = "/api/v1/resources";

pub(crate) async fn log_request(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    let lookup = (path == RESOURCES_PATH).then(|| resource_lookup(req.uri().query()));
    let client = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
        .unwrap_or_else(|| "-".to_owned());
    let t0 = Instant::now();

    let response = next.run(req).await;

    if !path.starts_with("/swagger-ui") {
        let latency_ms = t0.elapsed().as_millis() as u64;
        let status = response.status().as_u16();
        match lookup {
            Some(lookup) => info!(client, status, latency_ms, lookup, "{method} {path}"),
            None => info!(client, status, latency_ms, "{method} {path}"),
        }
    }
    response
}

fn resource_lookup(query: Option<&str>) -> &'static str {
    ResourceRequest::from_query(query.unwrap_or_default())
        .map(|r| r.kind())
        .unwrap_or("unexpected")
}
