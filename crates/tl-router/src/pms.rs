//! PMS callback client

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tl_config::PmsCallbackConfig;
use tracing::{info, warn};

use crate::router_metrics;
use crate::{Result, RouterError};

const MIN_TIMEOUT_SECS: u64 = 3;

/// Outcome notification sent back to the PMS.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PmsCallbackRequest {
    pub hotel_id: String,
    pub event_id: String,
    pub event_type: String,
    pub tiger_status: String,
    pub tiger_reason: Option<String>,
    pub correlation_id: String,
}

#[async_trait]
pub trait PmsCallbackClient: Send + Sync {
    /// `true` when the PMS accepted the callback.
    async fn notify(&self, request: &PmsCallbackRequest) -> bool;
}

pub struct HttpPmsCallbackClient {
    client: Client,
    config: PmsCallbackConfig,
    url: String,
}

impl HttpPmsCallbackClient {
    pub fn new(config: PmsCallbackConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_seconds.max(MIN_TIMEOUT_SECS));
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(RouterError::Http)?;
        let url = format!("{}/pms/callback", config.base_url.trim_end_matches('/'));

        info!(enabled = config.enabled, url = %url, "HttpPmsCallbackClient initialized");

        Ok(Self { client, config, url })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl PmsCallbackClient for HttpPmsCallbackClient {
    async fn notify(&self, request: &PmsCallbackRequest) -> bool {
        if !self.config.enabled {
            info!(event_id = %request.event_id, "PMS callback disabled - treating as delivered");
            return true;
        }

        let start = Instant::now();
        let ok = match self.client.post(&self.url).json(request).send().await {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                warn!(status = resp.status().as_u16(), event_id = %request.event_id, "PMS callback rejected");
                false
            }
            Err(e) => {
                warn!(error = %e, event_id = %request.event_id, "PMS callback failed");
                false
            }
        };
        router_metrics::record_external_call("pms", ok, start.elapsed());
        ok
    }
}
