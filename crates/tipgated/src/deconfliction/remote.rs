//! HTTP client for the inter-agency deconfliction service.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tipgate_common::{DeconflictionResult, OverlapType};
use tracing::debug;

use super::{DeconflictionError, DeconflictionProvider, DeconflictionQuery};

const CHECK_PATH: &str = "/v1/deconfliction/check";

pub struct RemoteProvider {
    check_url: String,
    api_key: String,
    timeout: Duration,
    http: reqwest::Client,
}

/// Wire format of the service response
#[derive(Debug, Deserialize)]
struct CheckResponse {
    match_found: bool,
    #[serde(default)]
    overlap_type: Option<OverlapType>,
    #[serde(default)]
    active_investigation: bool,
    #[serde(default)]
    coordination_recommended: bool,
    #[serde(default)]
    notes: Option<String>,
}

impl From<CheckResponse> for DeconflictionResult {
    fn from(r: CheckResponse) -> Self {
        DeconflictionResult {
            match_found: r.match_found,
            overlap_type: r.overlap_type,
            active_investigation: r.active_investigation,
            coordination_recommended: r.coordination_recommended,
            notes: r.notes.unwrap_or_default(),
        }
    }
}

impl RemoteProvider {
    pub fn new(
        endpoint: &str,
        api_key: &str,
        timeout: Duration,
    ) -> Result<Self, DeconflictionError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("tipgated/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DeconflictionError::Network(e.to_string()))?;

        Ok(Self {
            check_url: format!("{}{}", endpoint.trim_end_matches('/'), CHECK_PATH),
            api_key: api_key.to_string(),
            timeout,
            http,
        })
    }
}

#[async_trait]
impl DeconflictionProvider for RemoteProvider {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn check(
        &self,
        query: &DeconflictionQuery,
    ) -> Result<DeconflictionResult, DeconflictionError> {
        debug!("POST {}", self.check_url);
        let response = self
            .http
            .post(&self.check_url)
            .bearer_auth(&self.api_key)
            .json(query)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DeconflictionError::Timeout(self.timeout)
                } else {
                    DeconflictionError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeconflictionError::Http {
                status: status.as_u16(),
            });
        }

        let body: CheckResponse = response
            .json()
            .await
            .map_err(|e| DeconflictionError::Decode(e.to_string()))?;
        Ok(body.into())
    }
}
