use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod logging;

// ============================================================================
// Header Names
// ============================================================================

/// Hotel identifier, set by the ingress endpoint.
pub const HEADER_HOTEL_ID: &str = "x-hotel-id";
/// Event identifier, unique per hotel.
pub const HEADER_EVENT_ID: &str = "x-event-id";
/// Event type used to select a handler (e.g. `CHECKIN`).
pub const HEADER_EVENT_TYPE: &str = "x-event-type";
/// Optional correlation id, propagated when present.
pub const HEADER_CORRELATION_ID: &str = "x-correlation-id";
/// Number of failed processing attempts so far. Only the retry path increments it.
pub const HEADER_ATTEMPT: &str = "x-attempt";
/// Failure reason stamped by the retry path.
pub const HEADER_LAST_ERROR: &str = "x-last-error";
/// Per-hotel Tiger credential.
pub const HEADER_WS_USER_KEY: &str = "x-wsuserkey";

// ============================================================================
// Message Headers
// ============================================================================

/// A scalar header value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderValue {
    Str(String),
    Int(i64),
}

impl HeaderValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            HeaderValue::Str(s) => Some(s),
            HeaderValue::Int(_) => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            HeaderValue::Int(i) => Some(*i),
            HeaderValue::Str(s) => s.trim().parse().ok(),
        }
    }
}

impl fmt::Display for HeaderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderValue::Str(s) => f.write_str(s),
            HeaderValue::Int(i) => write!(f, "{}", i),
        }
    }
}

impl From<String> for HeaderValue {
    fn from(value: String) -> Self {
        HeaderValue::Str(value)
    }
}

impl From<&str> for HeaderValue {
    fn from(value: &str) -> Self {
        HeaderValue::Str(value.to_string())
    }
}

impl From<i64> for HeaderValue {
    fn from(value: i64) -> Self {
        HeaderValue::Int(value)
    }
}

impl From<i32> for HeaderValue {
    fn from(value: i32) -> Self {
        HeaderValue::Int(value as i64)
    }
}

/// Ordered key/value headers carried by every message.
///
/// Lookups ignore ASCII case. The key casing of the first `set` is kept for the wire,
/// and later writes to the same key replace the value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageHeaders {
    // lowercased key -> (original key, value)
    entries: IndexMap<String, (String, HeaderValue)>,
}

impl MessageHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<HeaderValue>) {
        let key = key.into();
        let value = value.into();
        match self.entries.get_mut(&key.to_ascii_lowercase()) {
            Some(entry) => entry.1 = value,
            None => {
                self.entries.insert(key.to_ascii_lowercase(), (key, value));
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&HeaderValue> {
        self.entries
            .get(&key.to_ascii_lowercase())
            .map(|(_, value)| value)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(&key.to_ascii_lowercase())
    }

    pub fn remove(&mut self, key: &str) -> Option<HeaderValue> {
        self.entries
            .shift_remove(&key.to_ascii_lowercase())
            .map(|(_, value)| value)
    }

    /// String rendering of a header, or `default` when it is absent.
    pub fn get_string(&self, key: &str, default: &str) -> String {
        self.get(key)
            .map(|v| v.to_string())
            .unwrap_or_else(|| default.to_string())
    }

    /// Integer value of a header. Strings are parsed; unparseable or absent gives `default`.
    pub fn get_int(&self, key: &str, default: i64) -> i64 {
        self.get(key).and_then(HeaderValue::as_int).unwrap_or(default)
    }

    /// Non-blank string value, if any.
    pub fn get_non_blank(&self, key: &str) -> Option<String> {
        self.get(key)
            .map(|v| v.to_string())
            .filter(|s| !s.trim().is_empty())
    }

    /// Iterate `(key, value)` pairs in insertion order with their original key casing.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &HeaderValue)> {
        self.entries.values().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// Retry Routing
// ============================================================================

/// Retry tier a failed delivery is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RetryRoute {
    Retry10s,
    Retry1m,
    Retry5m,
    Retry30m,
    Dead,
}

impl RetryRoute {
    /// Delay tiers in escalation order. `Dead` is not a tier.
    pub const TIERS: [RetryRoute; 4] = [
        RetryRoute::Retry10s,
        RetryRoute::Retry1m,
        RetryRoute::Retry5m,
        RetryRoute::Retry30m,
    ];

    /// Broker-side delay in seconds for this tier, `None` for `Dead`.
    pub fn delay_seconds(&self) -> Option<u64> {
        match self {
            RetryRoute::Retry10s => Some(10),
            RetryRoute::Retry1m => Some(60),
            RetryRoute::Retry5m => Some(300),
            RetryRoute::Retry30m => Some(1800),
            RetryRoute::Dead => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RetryRoute::Retry10s => "retry_10s",
            RetryRoute::Retry1m => "retry_1m",
            RetryRoute::Retry5m => "retry_5m",
            RetryRoute::Retry30m => "retry_30m",
            RetryRoute::Dead => "dead",
        }
    }
}

impl fmt::Display for RetryRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
