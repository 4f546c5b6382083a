//! Prism Web API
//!
//! 启动: cargo run --bin prism-web --features web
//! POST /api/analyze {"file_path": "...", "query": "..."} -> 会话报告 JSON
//! 薄适配层：不含任何规划逻辑。

#![cfg(feature = "web")]

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use prism::agent::{analyze_file, build_components, AgentComponents};
use prism::config::load_config;
use prism::plan::SessionReport;

struct AppState {
    components: AgentComponents,
}

#[derive(Debug, Deserialize)]
struct AnalyzeRequest {
    file_path: String,
    query: String,
}

async fn handle_analyze(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AnalyzeRequest>,
) -> Result<Json<SessionReport>, (StatusCode, String)> {
    let report = analyze_file(
        &state.components,
        &PathBuf::from(&req.file_path),
        &req.query,
        None,
        CancellationToken::new(),
    )
    .await
    .map_err(|e| match e {
        prism::core::AgentError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
        other => (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
    })?;
    Ok(Json(report))
}

async fn handle_capabilities(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, [(axum::http::HeaderName, &'static str); 1], String) {
    (
        StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        state.components.registry.catalog_json(),
    )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    prism::observability::init();

    let cfg = load_config(None).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        Default::default()
    });
    let components = build_components(cfg)?;
    let state = Arc::new(AppState { components });

    let app = Router::new()
        .route("/api/analyze", post(handle_analyze))
        .route("/api/capabilities", get(handle_capabilities))
        .with_state(state);

    let addr = std::env::var("PRISM_WEB_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
    tracing::info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
