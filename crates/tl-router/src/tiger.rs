//! Tiger SOAP client

use async_trait::async_trait;
use reqwest::Client;
use std::time::{Duration, Instant};
use tl_config::TigerConfig;
use tracing::{debug, info, warn};

use crate::router_metrics;
use crate::soap::build_check_in_envelope;
use crate::{Result, RouterError};

const REASON_LIMIT: usize = 300;
const MOCK_DELAY: Duration = Duration::from_millis(80);
const MIN_TIMEOUT_SECS: u64 = 3;

/// Answer from one `checkIn` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TigerResult {
    pub success: bool,
    /// Raw response body, or the transport error text
    pub raw: String,
    pub reason: Option<String>,
}

impl TigerResult {
    pub fn success(raw: impl Into<String>) -> Self {
        Self { success: true, raw: raw.into(), reason: None }
    }

    pub fn failure(raw: impl Into<String>, reason: impl Into<String>) -> Self {
        Self { success: false, raw: raw.into(), reason: Some(reason.into()) }
    }

    /// Classify a response body: any case-insensitive `SUCCESS` is success.
    pub fn from_body(raw: String) -> Self {
        if raw.to_ascii_uppercase().contains("SUCCESS") {
            Self::success(raw)
        } else {
            let reason: String = raw.chars().take(REASON_LIMIT).collect();
            Self::failure(raw, reason)
        }
    }
}

/// Sends check-in documents to Tiger.
#[async_trait]
pub trait TigerClient: Send + Sync {
    /// Send the unescaped `<checkinresults>` document.
    async fn send_check_in(&self, inner_xml: &str) -> TigerResult;
}

pub struct HttpTigerClient {
    client: Client,
    config: TigerConfig,
}

impl HttpTigerClient {
    pub fn new(config: TigerConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_seconds.max(MIN_TIMEOUT_SECS));
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(RouterError::Http)?;

        info!(
            enabled = config.enabled,
            endpoint = %config.endpoint,
            timeout_secs = timeout.as_secs(),
            "HttpTigerClient initialized"
        );

        Ok(Self { client, config })
    }

    async fn post(&self, envelope: String) -> TigerResult {
        let mut request = self
            .client
            .post(&self.config.endpoint)
            .header("Content-Type", "text/xml; charset=utf-8")
            .body(envelope);

        if let Some(action) = self.config.soap_action.as_deref().filter(|a| !a.trim().is_empty()) {
            request = request.header("SOAPAction", action);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, endpoint = %self.config.endpoint, "Tiger request failed");
                return transport_failure(&e);
            }
        };

        let status = response.status();
        match response.text().await {
            Ok(raw) => {
                debug!(status = status.as_u16(), body_len = raw.len(), "Tiger responded");
                TigerResult::from_body(raw)
            }
            Err(e) => {
                warn!(error = %e, status = status.as_u16(), "Reading Tiger response failed");
                transport_failure(&e)
            }
        }
    }
}

fn transport_failure(e: &reqwest::Error) -> TigerResult {
    let text = e.to_string();
    TigerResult::failure(text.clone(), format!("Tiger transport error: {}", text))
}

#[async_trait]
impl TigerClient for HttpTigerClient {
    async fn send_check_in(&self, inner_xml: &str) -> TigerResult {
        if !self.config.enabled {
            info!("Tiger disabled - answering with mock SUCCESS");
            tokio::time::sleep(MOCK_DELAY).await;
            return TigerResult::success("SUCCESS");
        }

        let start = Instant::now();
        let result = self.post(build_check_in_envelope(inner_xml)).await;
        router_metrics::record_external_call("tiger", result.success, start.elapsed());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_is_case_insensitive() {
        assert!(TigerResult::from_body("<r>Success</r>".into()).success);
        assert!(TigerResult::from_body("status=SUCCESS".into()).success);
        assert!(TigerResult::from_body("unsuccessful".into()).success);
        assert!(!TigerResult::from_body("ERROR: room occupied".into()).success);
    }

    #[test]
    fn test_failure_reason_is_truncated() {
        let body = "E".repeat(1000);
        let result = TigerResult::from_body(body.clone());
        assert!(!result.success);
        assert_eq!(result.reason.as_ref().map(|r| r.len()), Some(300));
        assert_eq!(result.raw, body);
    }

    #[test]
    fn test_short_failure_keeps_whole_body() {
        let result = TigerResult::from_body("FAILED".into());
        assert_eq!(result.reason.as_deref(), Some("FAILED"));
    }

    #[tokio::test]
    async fn test_disabled_client_mocks_success() {
        let client = HttpTigerClient::new(TigerConfig::default()).unwrap();
        let result = client.send_check_in("<checkinresults/>").await;
        assert!(result.success);
        assert_eq!(result.raw, "SUCCESS");
    }
}
