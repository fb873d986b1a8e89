// HTTP command surface
//
// Handlers only translate between HTTP and the pipeline.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::resolver::{DeliveredMedia, DeliveryError, MediaPipeline, PipelineError};

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<MediaPipeline>,
}

#[derive(Debug, Deserialize)]
pub struct MediaQuery {
    pub url: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("missing query parameter `{0}`")]
    MissingParameter(&'static str),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

impl ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingParameter(_) => StatusCode::BAD_REQUEST,
            Self::Pipeline(e) => e.status_code(),
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::MissingParameter(_) => "BAD_REQUEST",
            Self::Pipeline(e) => e.error_code(),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let details = match &self {
            Self::Pipeline(e) => e.details(),
            Self::MissingParameter(_) => None,
        };
        let body = Json(json!({
            "error": {
                "code": self.error_code(),
                "message": self.to_string(),
                "details": details,
            }
        }));

        let mut response = (status, body).into_response();
        if let Self::Pipeline(PipelineError::Delivery(DeliveryError::RangeNotSatisfiable {
            size,
        })) = &self
        {
            if let Ok(value) = HeaderValue::from_str(&format!("bytes */{}", size)) {
                response.headers_mut().insert(header::CONTENT_RANGE, value);
            }
        }
        response
    }
}

impl IntoResponse for DeliveredMedia {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from_stream(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

fn required_url(query: MediaQuery) -> Result<String, ServerError> {
    query
        .url
        .filter(|url| !url.trim().is_empty())
        .ok_or(ServerError::MissingParameter("url"))
}

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Resolve without streaming
async fn resolve(
    State(state): State<AppState>,
    Query(query): Query<MediaQuery>,
) -> Result<Response, ServerError> {
    let url = required_url(query)?;
    let result = state
        .pipeline
        .resolve_only(&url)
        .await
        .map_err(PipelineError::from)?;
    Ok(Json(result).into_response())
}

/// Resolve and relay the media bytes, honoring `Range`
async fn stream(
    State(state): State<AppState>,
    Query(query): Query<MediaQuery>,
    headers: HeaderMap,
) -> Result<DeliveredMedia, ServerError> {
    let url = required_url(query)?;
    let range = headers.get(header::RANGE).and_then(|v| v.to_str().ok());
    Ok(state.pipeline.resolve_and_deliver(&url, range).await?)
}

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": { "code": "NOT_FOUND", "message": "no such route", "details": null }
        })),
    )
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/resolve", get(resolve))
        .route("/api/stream", get(stream))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until Ctrl+C or SIGTERM
pub async fn serve(config: &ServerConfig, state: AppState) -> anyhow::Result<()> {
    let addr = config.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "media resolver listening");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
