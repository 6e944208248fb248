//! Tigerlink HTTP API
//!
//! HTTP API endpoints for:
//! - Event ingress (check-in)
//! - Health and Prometheus metrics
//! - A demo PMS callback receiver

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tl_common::{
    MessageHeaders, HEADER_ATTEMPT, HEADER_CORRELATION_ID, HEADER_EVENT_ID, HEADER_EVENT_TYPE,
    HEADER_HOTEL_ID, HEADER_WS_USER_KEY,
};
use tl_queue::EventPublisher;
use tracing::{debug, info};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use uuid::Uuid;

use crate::event_log::{EventLogEntry, EventLogSink};
use crate::handler::CHECKIN_EVENT_TYPE;
use crate::pms::PmsCallbackRequest;

pub mod model;

use model::{CallbackAck, EventEnvelope, HealthResponse, QueuedResponse};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub publisher: Arc<dyn EventPublisher>,
    pub event_log: Arc<dyn EventLogSink>,
    /// Stamped into `x-wsuserkey` on every ingested event when set
    pub ws_user_key: Option<String>,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(publisher: Arc<dyn EventPublisher>, event_log: Arc<dyn EventLogSink>) -> Self {
        Self {
            publisher,
            event_log,
            ws_user_key: None,
            metrics: None,
        }
    }

    /// Blank keys are treated as not configured.
    pub fn with_ws_user_key(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.ws_user_key = if key.trim().is_empty() { None } else { Some(key) };
        self
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Tigerlink API",
        version = "0.1.0",
        description = "Event ingress for the PMS to Tiger integration"
    ),
    paths(check_in, health_handler, pms_callback, metrics_handler),
    components(schemas(EventEnvelope, QueuedResponse, CallbackAck, HealthResponse, PmsCallbackRequest)),
    tags(
        (name = "events", description = "Event ingress"),
        (name = "health", description = "Health check endpoints"),
        (name = "monitoring", description = "Metrics endpoints"),
        (name = "pms", description = "Demo PMS endpoints"),
    )
)]
pub struct ApiDoc;

/// Create the router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .route("/events/checkin", post(check_in))
        .route("/health", get(health_handler))
        .route("/pms/callback", post(pms_callback))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Queue a guest check-in
#[utoipa::path(
    post,
    path = "/events/checkin",
    tag = "events",
    request_body = EventEnvelope,
    responses(
        (status = 200, description = "Event queued", body = QueuedResponse),
        (status = 400, description = "hotelId or eventId missing", body = String),
        (status = 503, description = "Event could not be queued")
    )
)]
async fn check_in(State(state): State<AppState>, Json(envelope): Json<EventEnvelope>) -> Response {
    if envelope.hotel_id.trim().is_empty() {
        return (StatusCode::BAD_REQUEST, Json("hotelId is required")).into_response();
    }
    if envelope.event_id.trim().is_empty() {
        return (StatusCode::BAD_REQUEST, Json("eventId is required")).into_response();
    }

    let correlation_id = Uuid::new_v4().simple().to_string();

    let mut entry = EventLogEntry::new(state.event_log.clone());
    entry
        .hotel_id(&envelope.hotel_id)
        .event_id(&envelope.event_id)
        .correlation_id(&correlation_id)
        .event_type(CHECKIN_EVENT_TYPE)
        .action("CHECKIN_RECEIVED");
    entry.info("Check-in received").await;

    let body = match serde_json::to_vec(&envelope.payload) {
        Ok(body) => body,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "error": format!("Invalid payload: {}", e) })),
            )
                .into_response();
        }
    };

    let mut headers = MessageHeaders::new();
    headers.set(HEADER_HOTEL_ID, envelope.hotel_id.as_str());
    headers.set(HEADER_EVENT_ID, envelope.event_id.as_str());
    headers.set(HEADER_EVENT_TYPE, CHECKIN_EVENT_TYPE);
    headers.set(HEADER_CORRELATION_ID, correlation_id.as_str());
    headers.set(HEADER_ATTEMPT, 0i64);
    if let Some(key) = &state.ws_user_key {
        headers.set(HEADER_WS_USER_KEY, key.as_str());
    }

    debug!(
        hotel_id = %envelope.hotel_id,
        event_id = %envelope.event_id,
        occurred_at = ?envelope.occurred_at,
        body_len = body.len(),
        "Publishing check-in"
    );

    match state.publisher.publish(&body, &headers).await {
        Ok(()) => {
            entry.action("CHECKIN_QUEUED");
            entry.info("Check-in queued").await;
            (
                StatusCode::OK,
                Json(QueuedResponse {
                    status: "QUEUED".to_string(),
                    event_id: envelope.event_id,
                    hotel_id: envelope.hotel_id,
                    correlation_id,
                }),
            )
                .into_response()
        }
        Err(e) => {
            entry.action("CHECKIN_QUEUE_FAILED");
            entry.error("Failed to queue check-in", Some(&e)).await;
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({ "error": "Failed to queue event" })),
            )
                .into_response()
        }
    }
}

/// Basic health check
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Service is running", body = HealthResponse)
    )
)]
async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse { ok: true })
}

/// Demo PMS endpoint that acknowledges callbacks
#[utoipa::path(
    post,
    path = "/pms/callback",
    tag = "pms",
    request_body = PmsCallbackRequest,
    responses(
        (status = 200, description = "Callback received", body = CallbackAck)
    )
)]
async fn pms_callback(Json(request): Json<PmsCallbackRequest>) -> Json<CallbackAck> {
    info!(
        hotel_id = %request.hotel_id,
        event_id = %request.event_id,
        tiger_status = %request.tiger_status,
        "PMS callback received"
    );
    Json(CallbackAck {
        ok: true,
        event_id: request.event_id,
        tiger_status: request.tiger_status,
    })
}

/// Prometheus metrics
#[utoipa::path(
    get,
    path = "/metrics",
    tag = "monitoring",
    responses(
        (status = 200, description = "Prometheus metrics", content_type = "text/plain"),
        (status = 503, description = "No metrics recorder installed")
    )
)]
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics recorder not installed").into_response(),
    }
}
