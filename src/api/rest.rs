use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::client::InventoryClient;
use crate::config::TargetConfig;
use crate::domain::engine::Engine;
use crate::domain::types::Report;
use crate::registry::restconf::RestconfRegistry;

/// Shared application state for all API handlers.
#[derive(Clone)]
pub struct AppState {
    pub client: Arc<InventoryClient>,
    pub registry: Arc<RestconfRegistry>,
    pub target: Arc<TargetConfig>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/status", get(status))
        .route("/api/v1/verify", get(verify))
        .route("/api/v1/build", post(build))
        .route("/api/v1/connect", post(connect))
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn status(State(state): State<AppState>) -> Json<Report> {
    let engine = Engine::new(&*state.client, &*state.registry, &state.target);
    Json(engine.verify_status().await)
}

async fn verify(State(state): State<AppState>) -> Json<Report> {
    let engine = Engine::new(&*state.client, &*state.registry, &state.target);
    Json(engine.verify().await)
}

#[derive(Deserialize)]
struct BuildParams {
    #[serde(default)]
    commit: bool,
}

async fn build(
    State(state): State<AppState>,
    Query(params): Query<BuildParams>,
) -> Json<Report> {
    let engine = Engine::new(&*state.client, &*state.registry, &state.target);
    Json(engine.build(params.commit).await)
}

#[derive(Deserialize)]
struct ConnectParams {
    #[serde(default)]
    sync_from: bool,
}

async fn connect(
    State(state): State<AppState>,
    Query(params): Query<ConnectParams>,
) -> Json<Report> {
    let engine = Engine::new(&*state.client, &*state.registry, &state.target);
    Json(engine.connect(params.sync_from).await)
}
