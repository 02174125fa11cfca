//! Deconfliction gate.
//!
//! Asks a provider whether another agency is already working a subject before
//! any action is taken on a tip. Production uses `RemoteProvider`; development
//! and tests use `StubProvider`. The provider is picked once from config.
//!
//! A failed or timed-out check is `Indeterminate`. It is never reported as
//! "no match".

mod remote;
mod stub;

pub use remote::RemoteProvider;
pub use stub::{StubProvider, STUB_CLOSED_CASE, STUB_KNOWN_SUBJECT, STUB_KNOWN_VICTIM};

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tipgate_common::{DeconflictionOutcome, DeconflictionResult, IdentifierType, SubjectIdentifier};
use tracing::{debug, info, warn};

use crate::config::{ConfigError, DeconflictionConfig, ProviderKind};

/// Provider failures
#[derive(Debug, thiserror::Error)]
pub enum DeconflictionError {
    #[error("deconfliction check timed out after {0:?}")]
    Timeout(Duration),

    #[error("network error: {0}")]
    Network(String),

    #[error("provider returned HTTP {status}")]
    Http { status: u16 },

    #[error("could not decode provider response: {0}")]
    Decode(String),
}

/// One identifier to check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeconflictionQuery {
    pub identifier_type: IdentifierType,
    pub value: String,
    pub jurisdiction: Option<String>,
}

/// Trait abstraction over deconfliction backends
#[async_trait]
pub trait DeconflictionProvider: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    async fn check(
        &self,
        query: &DeconflictionQuery,
    ) -> Result<DeconflictionResult, DeconflictionError>;
}

/// Bounded-time front for a provider
#[derive(Clone)]
pub struct DeconflictionGate {
    provider: Arc<dyn DeconflictionProvider>,
    timeout: Duration,
}

impl DeconflictionGate {
    pub fn new(provider: Arc<dyn DeconflictionProvider>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    /// Build the configured provider. A remote provider without endpoint or
    /// credentials is a startup error, never a silent stub.
    pub fn from_config(config: &DeconflictionConfig) -> Result<Self, ConfigError> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let provider: Arc<dyn DeconflictionProvider> = match config.provider {
            ProviderKind::Stub => {
                warn!("Using stub deconfliction provider; results are fixtures");
                Arc::new(StubProvider::new())
            }
            ProviderKind::Remote => {
                let (endpoint, api_key) = config.remote_settings()?;
                Arc::new(
                    RemoteProvider::new(endpoint, api_key, timeout)
                        .map_err(|e| ConfigError::Invalid(e.to_string()))?,
                )
            }
        };
        info!("Deconfliction provider: {} (timeout {:?})", provider.name(), timeout);
        Ok(Self { provider, timeout })
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Check one identifier.
    pub async fn check(
        &self,
        identifier_type: IdentifierType,
        value: &str,
        jurisdiction: Option<&str>,
    ) -> DeconflictionOutcome {
        let query = DeconflictionQuery {
            identifier_type,
            value: value.to_string(),
            jurisdiction: jurisdiction.map(str::to_string),
        };

        let result = match tokio::time::timeout(self.timeout, self.provider.check(&query)).await {
            Ok(result) => result,
            Err(_) => Err(DeconflictionError::Timeout(self.timeout)),
        };

        match result {
            Ok(result) => {
                debug!(
                    identifier_type = identifier_type.as_str(),
                    match_found = result.match_found,
                    "deconfliction check complete"
                );
                DeconflictionOutcome::Checked(result)
            }
            Err(e) => {
                warn!(
                    provider = self.provider.name(),
                    identifier_type = identifier_type.as_str(),
                    "deconfliction check failed: {}",
                    e
                );
                DeconflictionOutcome::Indeterminate {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Check every identifier on a tip and combine the answers.
    ///
    /// Any active match wins, then any failure (indeterminate), then an
    /// inactive match, then a clear result.
    pub async fn check_all(
        &self,
        identifiers: &[SubjectIdentifier],
        jurisdiction: Option<&str>,
    ) -> DeconflictionOutcome {
        if identifiers.is_empty() {
            return DeconflictionOutcome::Skipped {
                reason: "no subject identifiers on tip".to_string(),
            };
        }

        let mut outcomes = Vec::with_capacity(identifiers.len());
        for id in identifiers {
            outcomes.push(self.check(id.identifier_type, &id.value, jurisdiction).await);
        }
        combine_outcomes(outcomes)
    }
}

fn combine_outcomes(outcomes: Vec<DeconflictionOutcome>) -> DeconflictionOutcome {
    if let Some(active) = outcomes.iter().find(|o| o.active_match().is_some()) {
        return active.clone();
    }
    let failures: Vec<&str> = outcomes
        .iter()
        .filter_map(|o| match o {
            DeconflictionOutcome::Indeterminate { reason } => Some(reason.as_str()),
            _ => None,
        })
        .collect();
    if !failures.is_empty() {
        return DeconflictionOutcome::Indeterminate {
            reason: format!(
                "{} of {} checks failed: {}",
                failures.len(),
                outcomes.len(),
                failures.join("; ")
            ),
        };
    }
    if let Some(matched) = outcomes
        .iter()
        .find(|o| matches!(o, DeconflictionOutcome::Checked(r) if r.match_found))
    {
        return matched.clone();
    }
    outcomes
        .into_iter()
        .next()
        .unwrap_or(DeconflictionOutcome::Skipped {
            reason: "no checks run".to_string(),
        })
}
