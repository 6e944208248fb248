use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Event posted by the PMS
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    #[serde(default)]
    pub event_id: String,
    #[serde(default)]
    pub hotel_id: String,
    /// Ignored; the endpoint decides the event type
    #[serde(default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub occurred_at: Option<DateTime<Utc>>,
    /// Business payload, queued as-is
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Response after an event was durably queued
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QueuedResponse {
    /// Status: QUEUED
    pub status: String,
    pub event_id: String,
    pub hotel_id: String,
    pub correlation_id: String,
}

/// Echo returned by the demo PMS callback endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CallbackAck {
    pub ok: bool,
    pub event_id: String,
    pub tiger_status: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub ok: bool,
}
