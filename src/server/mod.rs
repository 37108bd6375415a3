//! HTTP surface for the prediction pipeline

mod handlers;

use anyhow::Result;
use axum::{extract::DefaultBodyLimit, routing::post, Router};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::orchestrator::PredictionOrchestrator;
use crate::results::ResultStore;

/// Largest accepted multipart body
pub const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

/// Shared API state
#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<PredictionOrchestrator>,
    pub store: ResultStore,
}

impl ApiState {
    pub fn new(orchestrator: Arc<PredictionOrchestrator>) -> Self {
        let store = orchestrator.store().clone();
        Self {
            orchestrator,
            store,
        }
    }
}

/// API server exposing prediction and result-validity endpoints
pub struct ApiServer {
    state: ApiState,
    bind_addr: String,
}

impl ApiServer {
    pub fn new(state: ApiState, bind_addr: impl Into<String>) -> Self {
        Self {
            state,
            bind_addr: bind_addr.into(),
        }
    }

    /// Bind and serve until the process is stopped
    pub async fn start(self) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(&self.bind_addr).await?;
        info!("Starting prediction API server on {}", listener.local_addr()?);
        axum::serve(listener, build_router(self.state)).await?;
        Ok(())
    }
}

/// Build API router
pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/api/predict", post(handlers::predict))
        .route("/api/validate-id", post(handlers::validate_id))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
