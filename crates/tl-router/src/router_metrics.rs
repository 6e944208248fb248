//! Metrics for the delivery pipeline
//!
//! Provides Prometheus-compatible metrics for:
//! - Terminal delivery outcomes
//! - Republishes per retry tier
//! - Calls to Tiger and the PMS

use metrics::{counter, histogram};
use std::time::Duration;
use tl_common::RetryRoute;

/// Record how a delivery ended (`processed`, `duplicate`, `republished`, `dropped`, ...)
pub fn record_delivery(outcome: &str) {
    counter!(
        "tl_deliveries_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record a message republished to a retry tier or the dead queue
pub fn record_republish(route: RetryRoute) {
    counter!(
        "tl_republish_total",
        "route" => route.as_str()
    )
    .increment(1);
}

/// Record one call to an external system
pub fn record_external_call(target: &str, success: bool, duration: Duration) {
    counter!(
        "tl_external_call_total",
        "target" => target.to_string(),
        "success" => success.to_string()
    )
    .increment(1);

    histogram!(
        "tl_external_call_duration_seconds",
        "target" => target.to_string()
    )
    .record(duration.as_secs_f64());
}
