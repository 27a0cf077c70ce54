mod access_log;
mod handlers;
mod openapi;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use clap::Parser;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tracing::{error, info};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use astarte_ds_core::Datasource;
use astarte_ds_core::settings::DatasourceSettings;

use openapi::ApiDoc;
use state::SharedDatasource;

// ============================================================
// CLI
// ============================================================

#[derive(Parser)]
#[command(name = "astarte-ds-web", about = "Astarte AppEngine datasource API server", version = astarte_ds_core::VERSION)]
struct Args {
    /// Listen address.
    #[arg(long, default_value = "0.0.0.0:8080", env = "ASTARTE_DS_LISTEN")]
    listen: String,

    /// Datasource settings as JSON (`apiUrl`, `realm`, `token`, ...).
    /// Flags below override values read from the file.
    #[arg(long, env = "ASTARTE_DS_SETTINGS")]
    settings: Option<PathBuf>,

    /// Astarte API base URL.
    #[arg(long, env = "ASTARTE_DS_API_URL")]
    api_url: Option<String>,

    /// Astarte realm.
    #[arg(long, env = "ASTARTE_DS_REALM")]
    realm: Option<String>,

    /// JWT with AppEngine and Realm Management read claims.
    #[arg(long, env = "ASTARTE_DS_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// AppEngine URL, when not reachable at `<api-url>/appengine`.
    #[arg(long, env = "ASTARTE_DS_APPENGINE_URL")]
    appengine_url: Option<String>,

    /// Realm Management URL, when not reachable at `<api-url>/realmmanagement`.
    #[arg(long, env = "ASTARTE_DS_REALM_MANAGEMENT_URL")]
    realm_management_url: Option<String>,
}

impl Args {
    fn datasource_settings(&self) -> Result<DatasourceSettings, String> {
        let mut settings = match &self.settings {
            Some(path) => {
                let raw = std::fs::read(path)
                    .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
                DatasourceSettings::from_json(&raw).map_err(|e| e.to_string())?
            }
            None => DatasourceSettings::new(
                self.api_url.clone().ok_or("--api-url is required")?,
                self.realm.clone().ok_or("--realm is required")?,
                self.token.clone().unwrap_or_default(),
            ),
        };
        if let Some(v) = &self.api_url {
            settings.api_url = v.clone();
        }
        if let Some(v) = &self.realm {
            settings.realm = v.clone();
        }
        if let Some(v) = &self.token {
            settings.token = v.clone();
        }
        if self.appengine_url.is_some() {
            settings.appengine_url = self.appengine_url.clone();
        }
        if self.realm_management_url.is_some() {
            settings.realm_management_url = self.realm_management_url.clone();
        }
        Ok(settings)
    }
}

// ============================================================
// Main
// ============================================================

fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "astarte_ds_web=info,astarte_ds_core=info".parse().unwrap()),
        )
        .init();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
        .block_on(async_main(args));
}

async fn async_main(args: Args) {
    let settings = match args.datasource_settings() {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            process::exit(1);
        }
    };
    info!(version = astarte_ds_core::VERSION, ?settings, "starting");

    let datasource = match Datasource::new(&settings) {
        Ok(ds) => Arc::new(ds),
        Err(e) => {
            error!(error = %e, "failed to create datasource");
            process::exit(1);
        }
    };

    let app = build_router(datasource)
        .layer(CorsLayer::permissive())
        .layer(CompressionLayer::new())
        .into_make_service_with_connect_info::<SocketAddr>();

    let addr: SocketAddr = match args.listen.parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!(listen = %args.listen, error = %e, "invalid listen address");
            process::exit(1);
        }
    };
    info!(%addr, "listening");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(%addr, error = %e, "failed to bind");
            process::exit(1);
        }
    };

    // The router (and the datasource with it) is dropped once serving stops.
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(error = %e, "server error");
        process::exit(1);
    }
    info!("server stopped");
}

pub(crate) fn build_router(datasource: SharedDatasource) -> Router {
    Router::new()
        .route("/api/v1/health", get(handlers::handle_health))
        .route("/api/v1/query", post(handlers::handle_query))
        .route("/api/v1/resources", get(handlers::handle_resources))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .with_state(datasource)
        .layer(axum::middleware::from_fn(access_log::log_request))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "cannot listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
