use crate::engine::{EngineError, EngineHandle, EngineStatus};
use crate::enrollment::{EnrollError, EnrollmentStore};
use crate::gate::{self, GateState, TokenSigner};
use crate::match_loop::{LoopClient, SessionSnapshot};
use crate::page;
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::header::SET_COOKIE;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use chrono::{DateTime, Utc};
use facegate_core::EnrollmentRecord;
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Largest accepted reference upload.
pub const MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

pub struct AppState {
    pub engine: EngineHandle,
    pub store: Arc<EnrollmentStore>,
    pub session: LoopClient,
    pub signer: Arc<TokenSigner>,
    pub cookie_secure: bool,
}

pub fn router(state: Arc<AppState>) -> Router {
    let gate_state = GateState {
        signer: state.signer.clone(),
        session: state.session.clone(),
    };

    Router::new()
        .route("/", get(index))
        .route("/success", get(success))
        .route(
            "/api/enroll",
            post(enroll).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/api/status", get(status))
        .route("/api/session/reset", post(reset))
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(gate_state, gate::guard))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// JSON error body: `{"error": "..."}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "error": self.message }));
        (self.status, body).into_response()
    }
}

impl From<EnrollError> for ApiError {
    fn from(e: EnrollError) -> Self {
        let status = match &e {
            EnrollError::InvalidImage(_) => StatusCode::BAD_REQUEST,
            EnrollError::NoFaceDetected => StatusCode::UNPROCESSABLE_ENTITY,
            EnrollError::Engine(EngineError::ProviderUnavailable(_) | EngineError::ChannelClosed) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            EnrollError::Engine(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EnrollmentSummary {
    pub label: String,
    pub enrolled_at: DateTime<Utc>,
    pub dimensions: usize,
    pub model_version: Option<String>,
}

impl From<&EnrollmentRecord> for EnrollmentSummary {
    fn from(record: &EnrollmentRecord) -> Self {
        Self {
            label: record.label.clone(),
            enrolled_at: record.enrolled_at,
            dimensions: record.descriptor.len(),
            model_version: record.descriptor.model_version().map(str::to_string),
        }
    }
}

#[derive(Debug, Serialize)]
struct StatusBody {
    #[serde(flatten)]
    engine: EngineStatus,
    enrollment: Option<EnrollmentSummary>,
    #[serde(flatten)]
    session: SessionSnapshot,
    display_percentage: Option<i32>,
    verified: bool,
}

async fn index() -> Html<&'static str> {
    Html(page::INDEX)
}

async fn success() -> Html<&'static str> {
    Html(page::SUCCESS)
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Html(page::NOT_FOUND))
}

async fn enroll(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<EnrollmentSummary>, ApiError> {
    match state.store.enroll(&state.engine, &body).await {
        Ok(record) => Ok(Json(EnrollmentSummary::from(record.as_ref()))),
        Err(e) => {
            tracing::warn!(error = %e, bytes = body.len(), "enrollment rejected");
            Err(e.into())
        }
    }
}

async fn status(State(state): State<Arc<AppState>>) -> Response {
    let session = state.session.snapshot();
    let token = session.token.clone();
    let body = StatusBody {
        engine: state.engine.status(),
        enrollment: state.store.current().map(|r| EnrollmentSummary::from(r.as_ref())),
        display_percentage: session.last_result.as_ref().map(|r| r.display_percentage()),
        verified: session.is_verified(),
        session,
    };

    let mut response = Json(body).into_response();
    if let Some(token) = token {
        if let Ok(value) = HeaderValue::from_str(&gate::set_cookie_header(&token, state.cookie_secure)) {
            response.headers_mut().insert(SET_COOKIE, value);
        }
    }
    response
}

async fn reset(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let had_enrollment = state.store.clear();
    state.session.reset().await;
    tracing::info!(had_enrollment, "session reset requested");

    (
        [(SET_COOKIE, gate::clear_cookie_header())],
        Json(serde_json::json!({ "reset": true, "had_enrollment": had_enrollment })),
    )
}
