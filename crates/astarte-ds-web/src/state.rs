//! Shared application state.

use std::sync::Arc;

use axum::extract::State;

use astarte_ds_core::Datasource;

/// The datasource is read-only after construction, so no lock is needed.
pub(crate) type SharedDatasource = Arc<Datasource>;

pub(crate) type AppState = State<SharedDatasource>;
