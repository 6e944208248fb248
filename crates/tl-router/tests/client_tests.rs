//! Tiger, PMS and event log HTTP client tests
//!
//! Tests for:
//! - Tiger SOAP request shape (content type, SOAPAction, envelope)
//! - Tiger success detection and failure reasons
//! - Tiger transport errors as retryable failures
//! - PMS callback JSON contract and status handling
//! - Elasticsearch event log indexing

use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{
    body_json, body_string_contains, header, header_exists, method, path, path_regex,
};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tl_config::{ElasticConfig, PmsCallbackConfig, TigerConfig};
use tl_router::{
    create_event_log_sink, EventLogEntry, HttpPmsCallbackClient, HttpTigerClient,
    PmsCallbackClient, PmsCallbackRequest, TigerClient,
};

fn tiger_config(server: &MockServer) -> TigerConfig {
    TigerConfig {
        enabled: true,
        endpoint: format!("{}/TigerGenericInterface.asmx", server.uri()),
        timeout_seconds: 5,
        ws_user_key: "key".to_string(),
        soap_action: Some("http://tigergenericinterface.org/checkIn".to_string()),
    }
}

fn callback_request() -> PmsCallbackRequest {
    PmsCallbackRequest {
        hotel_id: "H1".to_string(),
        event_id: "E1".to_string(),
        event_type: "CHECKIN".to_string(),
        tiger_status: "SUCCESS".to_string(),
        tiger_reason: None,
        correlation_id: "corr-1".to_string(),
    }
}

// ============================================================================
// Tiger
// ============================================================================

#[tokio::test]
async fn test_tiger_posts_soap_envelope() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/TigerGenericInterface.asmx"))
        .and(header("Content-Type", "text/xml; charset=utf-8"))
        .and(header("SOAPAction", "http://tigergenericinterface.org/checkIn"))
        .and(body_string_contains("<soap:Envelope"))
        .and(body_string_contains("<XMLString>&lt;checkinresults resno=&quot;R1&quot;&gt;"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<checkInResult>SUCCESS</checkInResult>"))
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpTigerClient::new(tiger_config(&server)).unwrap();
    let result = client
        .send_check_in(r#"<checkinresults resno="R1"><site>S1</site></checkinresults>"#)
        .await;

    assert!(result.success);
    assert!(result.reason.is_none());
    assert_eq!(result.raw, "<checkInResult>SUCCESS</checkInResult>");
}

#[tokio::test]
async fn test_tiger_omits_blank_soap_action() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(header_exists("SOAPAction"))
        .respond_with(ResponseTemplate::new(200).set_body_string("FAULT"))
        .expect(0)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("success"))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = tiger_config(&server);
    config.soap_action = Some("  ".to_string());
    let client = HttpTigerClient::new(config).unwrap();
    let result = client.send_check_in("<checkinresults/>").await;
    assert!(result.success);
}

#[tokio::test]
async fn test_tiger_failure_body_becomes_reason() {
    let server = MockServer::start().await;
    let body = format!("<fault>{}</fault>", "x".repeat(400));

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body.clone()))
        .mount(&server)
        .await;

    let client = HttpTigerClient::new(tiger_config(&server)).unwrap();
    let result = client.send_check_in("<checkinresults/>").await;

    assert!(!result.success);
    assert_eq!(result.raw, body);
    let reason = result.reason.unwrap();
    assert_eq!(reason.len(), 300);
    assert!(body.starts_with(&reason));
}

#[tokio::test]
async fn test_tiger_server_error_without_success_text_fails() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
        .mount(&server)
        .await;

    let client = HttpTigerClient::new(tiger_config(&server)).unwrap();
    let result = client.send_check_in("<checkinresults/>").await;

    assert!(!result.success);
    assert_eq!(result.reason.as_deref(), Some("Internal Server Error"));
}

#[tokio::test]
async fn test_tiger_transport_error_is_failed_result() {
    let config = TigerConfig {
        enabled: true,
        endpoint: "http://127.0.0.1:1/TigerGenericInterface.asmx".to_string(),
        ..Default::default()
    };
    let client = HttpTigerClient::new(config).unwrap();

    let result = client.send_check_in("<checkinresults/>").await;

    assert!(!result.success);
    assert!(result.reason.unwrap().starts_with("Tiger transport error:"));
}

#[tokio::test]
async fn test_tiger_timeout_is_failed_result() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("SUCCESS")
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    // configured timeouts below the floor are raised to three seconds
    let mut config = tiger_config(&server);
    config.timeout_seconds = 0;
    let client = HttpTigerClient::new(config).unwrap();

    let started = std::time::Instant::now();
    let result = client.send_check_in("<checkinresults/>").await;

    assert!(!result.success);
    assert!(result.reason.unwrap().starts_with("Tiger transport error:"));
    assert!(started.elapsed() >= Duration::from_secs(3));
}

#[tokio::test]
async fn test_tiger_disabled_makes_no_call() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut config = tiger_config(&server);
    config.enabled = false;
    let client = HttpTigerClient::new(config).unwrap();

    let result = client.send_check_in("<checkinresults/>").await;
    assert!(result.success);
}

// ============================================================================
// PMS callback
// ============================================================================

#[tokio::test]
async fn test_pms_callback_posts_json() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/pms/callback"))
        .and(body_json(serde_json::json!({
            "hotelId": "H1",
            "eventId": "E1",
            "eventType": "CHECKIN",
            "tigerStatus": "SUCCESS",
            "tigerReason": null,
            "correlationId": "corr-1"
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpPmsCallbackClient::new(PmsCallbackConfig {
        enabled: true,
        base_url: server.uri(),
        timeout_seconds: 5,
    })
    .unwrap();

    assert!(client.notify(&callback_request()).await);
}

#[tokio::test]
async fn test_pms_callback_non_success_status_is_false() {
    for status in [400, 404, 500, 503] {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/pms/callback"))
            .respond_with(ResponseTemplate::new(status))
            .mount(&server)
            .await;

        let client = HttpPmsCallbackClient::new(PmsCallbackConfig {
            enabled: true,
            base_url: server.uri(),
            timeout_seconds: 5,
        })
        .unwrap();

        assert!(!client.notify(&callback_request()).await, "status {}", status);
    }
}

#[tokio::test]
async fn test_pms_callback_unreachable_is_false() {
    let client = HttpPmsCallbackClient::new(PmsCallbackConfig {
        enabled: true,
        base_url: "http://127.0.0.1:1".to_string(),
        timeout_seconds: 3,
    })
    .unwrap();

    assert!(!client.notify(&callback_request()).await);
}

// ============================================================================
// Event log
// ============================================================================

#[tokio::test]
async fn test_elastic_sink_indexes_into_daily_index() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path_regex(r"^/tigerlink-events-\d{4}\.\d{2}\.\d{2}/_doc/$"))
        .and(body_string_contains(r#""hotelId":"H1""#))
        .and(body_string_contains(r#""action":"CHECKIN_RECEIVED""#))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let sink = create_event_log_sink(&ElasticConfig {
        enabled: true,
        uri: format!("{}/", server.uri()),
        index_prefix: "tigerlink-events".to_string(),
        timeout_seconds: 5,
    })
    .unwrap();
    assert!(sink.is_enabled());

    let mut entry = EventLogEntry::new(Arc::clone(&sink));
    entry.hotel_id("H1").event_id("E1").action("CHECKIN_RECEIVED");
    entry.info("Check-in received").await;
}

#[tokio::test]
async fn test_elastic_failure_is_swallowed() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let sink = create_event_log_sink(&ElasticConfig {
        enabled: true,
        uri: server.uri(),
        ..Default::default()
    })
    .unwrap();

    let mut entry = EventLogEntry::new(sink);
    entry.warn("still fine").await;
}

#[test]
fn test_disabled_elastic_uses_noop_sink() {
    let sink = create_event_log_sink(&ElasticConfig::default()).unwrap();
    assert!(!sink.is_enabled());
}
