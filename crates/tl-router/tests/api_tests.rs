//! HTTP API Tests
//!
//! Tests for:
//! - Check-in ingress validation, headers and responses
//! - 503 when the event cannot be queued
//! - Event log actions emitted by the ingress
//! - Health, demo PMS callback and metrics endpoints

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tower::ServiceExt;

use tl_common::{
    MessageHeaders, RetryRoute, HEADER_ATTEMPT, HEADER_CORRELATION_ID, HEADER_EVENT_ID,
    HEADER_EVENT_TYPE, HEADER_HOTEL_ID, HEADER_WS_USER_KEY,
};
use tl_queue::{EventPublisher, QueueError};
use tl_router::api::{create_router, AppState};
use tl_router::{EventLogRecord, EventLogSink};

#[derive(Default)]
struct MockPublisher {
    published: Mutex<Vec<(Vec<u8>, MessageHeaders)>>,
    reject: AtomicBool,
}

#[async_trait]
impl EventPublisher for MockPublisher {
    async fn publish(&self, body: &[u8], headers: &MessageHeaders) -> tl_queue::Result<()> {
        if self.reject.load(Ordering::SeqCst) {
            return Err(QueueError::Nacked {
                routing_key: "events".to_string(),
            });
        }
        self.published.lock().push((body.to_vec(), headers.clone()));
        Ok(())
    }

    async fn publish_to_retry(
        &self,
        _body: &[u8],
        _headers: &MessageHeaders,
        _routing_key: &str,
    ) -> tl_queue::Result<()> {
        unreachable!("ingress only publishes to the events exchange")
    }

    fn routing_key_for(&self, route: RetryRoute) -> String {
        route.as_str().to_string()
    }
}

#[derive(Default)]
struct CapturingLog {
    records: Mutex<Vec<EventLogRecord>>,
}

#[async_trait]
impl EventLogSink for CapturingLog {
    async fn post(&self, record: &EventLogRecord) {
        self.records.lock().push(record.clone());
    }

    fn is_enabled(&self) -> bool {
        true
    }
}

struct TestApp {
    publisher: Arc<MockPublisher>,
    log: Arc<CapturingLog>,
    router: axum::Router,
}

fn app(ws_user_key: &str) -> TestApp {
    let publisher = Arc::new(MockPublisher::default());
    let log = Arc::new(CapturingLog::default());
    let state = AppState::new(publisher.clone(), log.clone()).with_ws_user_key(ws_user_key);
    TestApp {
        publisher,
        log,
        router: create_router(state),
    }
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn envelope() -> serde_json::Value {
    serde_json::json!({
        "eventId": "E1",
        "hotelId": "H1",
        "eventType": "SOMETHING_ELSE",
        "occurredAt": "2026-01-05T10:00:00Z",
        "payload": { "reservationNumber": "R1", "site": "S1", "room": "101" }
    })
}

#[tokio::test]
async fn test_checkin_is_queued() {
    let app = app("key-1");

    let response = app
        .router
        .oneshot(post_json("/events/checkin", envelope()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "QUEUED");
    assert_eq!(body["eventId"], "E1");
    assert_eq!(body["hotelId"], "H1");

    let correlation_id = body["correlationId"].as_str().unwrap().to_string();
    assert_eq!(correlation_id.len(), 32);
    assert!(correlation_id.chars().all(|c| c.is_ascii_hexdigit()));

    let published = app.publisher.published.lock().clone();
    assert_eq!(published.len(), 1);
    let (payload, headers) = &published[0];

    let payload: serde_json::Value = serde_json::from_slice(payload).unwrap();
    assert_eq!(payload, envelope()["payload"]);

    assert_eq!(headers.get_string(HEADER_HOTEL_ID, ""), "H1");
    assert_eq!(headers.get_string(HEADER_EVENT_ID, ""), "E1");
    assert_eq!(headers.get_string(HEADER_EVENT_TYPE, ""), "CHECKIN");
    assert_eq!(headers.get_string(HEADER_CORRELATION_ID, ""), correlation_id);
    assert_eq!(headers.get_int(HEADER_ATTEMPT, -1), 0);
    assert_eq!(headers.get_string(HEADER_WS_USER_KEY, ""), "key-1");

    let actions: Vec<String> = app
        .log
        .records
        .lock()
        .iter()
        .filter_map(|r| r.action.clone())
        .collect();
    assert_eq!(actions, vec!["CHECKIN_RECEIVED", "CHECKIN_QUEUED"]);
}

#[tokio::test]
async fn test_checkin_without_ws_user_key_omits_header() {
    let app = app("");

    let response = app
        .router
        .oneshot(post_json("/events/checkin", envelope()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let published = app.publisher.published.lock().clone();
    assert!(!published[0].1.contains(HEADER_WS_USER_KEY));
}

#[tokio::test]
async fn test_checkin_requires_hotel_and_event_ids() {
    let cases = [
        (serde_json::json!({ "eventId": "E1", "payload": {} }), "hotelId is required"),
        (serde_json::json!({ "eventId": "E1", "hotelId": " ", "payload": {} }), "hotelId is required"),
        (serde_json::json!({ "hotelId": "H1", "payload": {} }), "eventId is required"),
        (serde_json::json!({ "hotelId": "H1", "eventId": "", "payload": {} }), "eventId is required"),
    ];

    for (request, message) in cases {
        let app = app("key-1");
        let response = app
            .router
            .oneshot(post_json("/events/checkin", request))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await, serde_json::json!(message));
        assert!(app.publisher.published.lock().is_empty());
    }
}

#[tokio::test]
async fn test_checkin_publish_failure_is_503() {
    let app = app("key-1");
    app.publisher.reject.store(true, Ordering::SeqCst);

    let response = app
        .router
        .oneshot(post_json("/events/checkin", envelope()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let records = app.log.records.lock().clone();
    let last = records.last().unwrap();
    assert_eq!(last.action.as_deref(), Some("CHECKIN_QUEUE_FAILED"));
    assert_eq!(last.level.as_deref(), Some("ERROR"));
    assert_eq!(last.exception_type.as_deref(), Some("Nacked"));
}

#[tokio::test]
async fn test_health() {
    let app = app("");

    let response = app
        .router
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, serde_json::json!({ "ok": true }));
}

#[tokio::test]
async fn test_pms_callback_echo() {
    let app = app("");

    let response = app
        .router
        .oneshot(post_json(
            "/pms/callback",
            serde_json::json!({
                "hotelId": "H1",
                "eventId": "E1",
                "eventType": "CHECKIN",
                "tigerStatus": "SUCCESS",
                "tigerReason": null,
                "correlationId": "c1"
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response).await,
        serde_json::json!({ "ok": true, "eventId": "E1", "tigerStatus": "SUCCESS" })
    );
}

#[tokio::test]
async fn test_metrics_without_recorder_is_unavailable() {
    let app = app("");

    let response = app
        .router
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_openapi_document_lists_routes() {
    let app = app("");

    let response = app
        .router
        .oneshot(
            Request::builder()
                .uri("/api-doc/openapi.json")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let doc = json_body(response).await;
    assert!(doc["paths"]["/events/checkin"]["post"].is_object());
    assert!(doc["paths"]["/health"]["get"].is_object());
}
