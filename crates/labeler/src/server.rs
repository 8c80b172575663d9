//! HTTP front door.
//!
//! Provides endpoints for:
//! - Health checks
//! - The scheduling trigger (`/schedule`), run by cron
//! - Push deliveries of creation events (`/label_one`) and reconciliation
//!   requests (`/do_label`)

use std::sync::Arc;

use anyhow::Result;
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::dispatcher::Dispatcher;
use crate::error::LabelerError;
use crate::events::{EventNotification, PushEnvelope, ReconciliationRequest};

/// Header the cron service attaches to scheduled requests.
pub const CRON_HEADER: &str = "x-appengine-cron";

/// Server state shared across handlers.
pub struct AppState {
    /// Dispatcher holding the plugin registry.
    pub dispatcher: Dispatcher,
    /// Shared secret expected in the `token` query parameter of push
    /// deliveries.
    pub verification_token: Option<String>,
}

impl AppState {
    /// Create handler state. An empty token counts as not configured.
    pub fn new(dispatcher: Dispatcher, verification_token: Option<String>) -> Self {
        Self {
            dispatcher,
            verification_token: verification_token.filter(|t| !t.is_empty()),
        }
    }

    fn token_matches(&self, candidate: Option<&str>) -> bool {
        match (&self.verification_token, candidate) {
            (Some(expected), Some(candidate)) => {
                expected.as_bytes().ct_eq(candidate.as_bytes()).into()
            }
            _ => false,
        }
    }

    fn verify_push(&self, query: &TokenQuery) -> Result<(), ApiError> {
        if self.verification_token.is_none() {
            return Err(ApiError::new(
                StatusCode::BAD_REQUEST,
                "push verification token is not configured",
            ));
        }
        if self.token_matches(query.token.as_deref()) {
            Ok(())
        } else {
            warn!("Rejected push delivery with an invalid token");
            Err(ApiError::new(StatusCode::FORBIDDEN, "Access denied: invalid token"))
        }
    }

    fn verify_cron(&self, headers: &HeaderMap, query: &TokenQuery) -> Result<(), ApiError> {
        let from_cron = headers
            .get(CRON_HEADER)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.eq_ignore_ascii_case("true"));

        if from_cron || self.token_matches(query.token.as_deref()) {
            Ok(())
        } else {
            warn!("Rejected schedule request without cron header or token");
            Err(ApiError::new(
                StatusCode::FORBIDDEN,
                "Access denied: no token or cron header",
            ))
        }
    }
}

/// Build the HTTP router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route("/schedule", get(schedule_handler))
        .route("/label_one", post(label_one_handler))
        .route("/do_label", post(do_label_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server and serve until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the server fails to start or bind to the address.
pub async fn run_server(state: Arc<AppState>, addr: &str) -> Result<()> {
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Labeler listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

// ============================================================================
// Request/Response types
// ============================================================================

/// `?token=` query parameter.
#[derive(Debug, Default, Deserialize)]
pub struct TokenQuery {
    pub token: Option<String>,
}

/// Health check response.
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Successful unit of work, with its report inlined.
#[derive(Debug, Serialize)]
struct WorkResponse<T> {
    status: &'static str,
    #[serde(flatten)]
    report: T,
}

impl<T> WorkResponse<T> {
    fn ok(report: T) -> Json<Self> {
        Json(Self { status: "ok", report })
    }
}

/// Error response body.
#[derive(Debug, Serialize)]
struct ErrorBody {
    status: &'static str,
    message: String,
}

/// Handler error carrying its HTTP status.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<LabelerError> for ApiError {
    fn from(err: LabelerError) -> Self {
        let status = match &err {
            LabelerError::PluginNotFound(_) => StatusCode::NOT_FOUND,
            LabelerError::InvalidPayload(_)
            | LabelerError::Configuration(_)
            | LabelerError::Yaml(_) => StatusCode::BAD_REQUEST,
            LabelerError::DuplicatePlugin(_)
            | LabelerError::InvalidPlugin { .. }
            | LabelerError::Provider(_)
            | LabelerError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = %self.status, "{}", self.message);
        }
        let body = ErrorBody {
            status: "error",
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

// ============================================================================
// Handlers
// ============================================================================

async fn index_handler() -> &'static str {
    "Resource labeler. Nothing to see here."
}

async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Fan out one reconciliation request per project and plugin.
async fn schedule_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<TokenQuery>,
) -> Result<impl IntoResponse, ApiError> {
    state.verify_cron(&headers, &query)?;
    let report = state.dispatcher.schedule().await?;
    Ok(WorkResponse::ok(report))
}

/// Label the resource a creation event refers to.
async fn label_one_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TokenQuery>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    state.verify_push(&query)?;
    let data = PushEnvelope::from_slice(&body)?.decode_data()?;
    let event = EventNotification::from_json(&data)?;

    let report = state.dispatcher.label_one(&event).await;
    Ok(WorkResponse::ok(report))
}

/// Sweep one plugin in one project.
async fn do_label_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TokenQuery>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    state.verify_push(&query)?;
    let data = PushEnvelope::from_slice(&body)?.decode_data()?;
    let request = ReconciliationRequest::from_json(&data)?;

    let report = state.dispatcher.do_label(&request).await?;
    Ok(WorkResponse::ok(report))
}
