use crate::AppState;
use axum::{Json, extract::State, response::IntoResponse};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub database: String,
    pub storage: String,
    pub version: String,
}

fn connectivity(ok: bool) -> String {
    let status = if ok { "connected" } else { "disconnected" };
    status.to_string()
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "System health status", body = HealthResponse)
    ),
    tag = "system"
)]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let database = state.store.ping().await;
    let storage = state.storage.health_check().await;

    Json(HealthResponse {
        status: if database { "ok" } else { "degraded" }.to_string(),
        database: connectivity(database),
        storage: connectivity(storage),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
