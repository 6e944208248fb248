//! Check-in business payload.

use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::soap::bool_text;

#[derive(Error, Debug)]
pub enum PayloadError {
    #[error("{0}")]
    Malformed(#[from] serde_json::Error),

    #[error("{0} is required")]
    MissingField(&'static str),
}

/// Guest check-in data carried in the message body.
///
/// Field names match case-insensitively: `reservationNumber`, `ReservationNumber`
/// and `RESERVATIONNUMBER` all bind to the same field.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CheckInPayload {
    #[serde(rename = "reservationnumber")]
    pub reservation_number: String,
    pub site: String,
    pub room: String,
    pub title: Option<String>,
    pub last: Option<String>,
    pub first: Option<String>,
    #[serde(rename = "guestid")]
    pub guest_id: Option<i64>,
    pub lang: Option<String>,
    pub group: Option<String>,
    pub vip: Option<String>,
    pub email: Option<String>,
    pub mobile: Option<String>,
    pub arrival: Option<String>,
    pub departure: Option<String>,
    pub tv: Option<String>,
    pub minibar: Option<String>,
    pub viewbill: Option<bool>,
    pub expressco: Option<bool>,
}

impl CheckInPayload {
    pub fn from_slice(body: &[u8]) -> Result<Self, PayloadError> {
        let value: Value = serde_json::from_slice(body)?;
        let payload: CheckInPayload = serde_json::from_value(lowercase_keys(value))?;
        payload.validate()?;
        Ok(payload)
    }

    fn validate(&self) -> Result<(), PayloadError> {
        if self.reservation_number.trim().is_empty() {
            return Err(PayloadError::MissingField("reservationNumber"));
        }
        if self.site.trim().is_empty() {
            return Err(PayloadError::MissingField("site"));
        }
        if self.room.trim().is_empty() {
            return Err(PayloadError::MissingField("room"));
        }
        Ok(())
    }

    /// Optional Tiger nodes in wire order. Absent values stay `None`.
    pub fn optional_nodes(&self) -> Vec<(&'static str, Option<String>)> {
        vec![
            ("title", self.title.clone()),
            ("last", self.last.clone()),
            ("first", self.first.clone()),
            ("guestid", self.guest_id.map(|id| id.to_string())),
            ("lang", self.lang.clone()),
            ("group", self.group.clone()),
            ("vip", self.vip.clone()),
            ("email", self.email.clone()),
            ("mobile", self.mobile.clone()),
            ("arrival", self.arrival.clone()),
            ("departure", self.departure.clone()),
            ("tv", self.tv.clone()),
            ("minibar", self.minibar.clone()),
            ("viewbill", self.viewbill.map(|b| bool_text(b).to_string())),
            ("expressco", self.expressco.map(|b| bool_text(b).to_string())),
        ]
    }
}

/// Lowercase the top-level keys of a JSON object. Later duplicates win.
fn lowercase_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k.to_lowercase(), v))
                .collect::<Map<String, Value>>(),
        ),
        other => other,
    }
}
