//! Fixture provider for development and tests.

use async_trait::async_trait;
use tipgate_common::{DeconflictionResult, OverlapType};

use super::{DeconflictionError, DeconflictionProvider, DeconflictionQuery};

/// Identifier values with canned answers
pub const STUB_KNOWN_SUBJECT: &str = "stub_known_subject";
pub const STUB_KNOWN_VICTIM: &str = "stub_known_victim";
pub const STUB_CLOSED_CASE: &str = "stub_closed_case";

#[derive(Debug, Default)]
pub struct StubProvider;

impl StubProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DeconflictionProvider for StubProvider {
    fn name(&self) -> &'static str {
        "stub"
    }

    async fn check(
        &self,
        query: &DeconflictionQuery,
    ) -> Result<DeconflictionResult, DeconflictionError> {
        let result = match query.value.trim() {
            STUB_KNOWN_SUBJECT => DeconflictionResult {
                match_found: true,
                overlap_type: Some(OverlapType::SameSubject),
                active_investigation: true,
                coordination_recommended: true,
                notes: "Stub: subject under active investigation by another agency.".to_string(),
            },
            STUB_KNOWN_VICTIM => DeconflictionResult {
                match_found: true,
                overlap_type: Some(OverlapType::SameVictim),
                active_investigation: true,
                coordination_recommended: true,
                notes: "Stub: victim identified in an open case.".to_string(),
            },
            STUB_CLOSED_CASE => DeconflictionResult {
                match_found: true,
                overlap_type: Some(OverlapType::SameSubject),
                active_investigation: false,
                coordination_recommended: false,
                notes: "Stub: subject appears in a closed case.".to_string(),
            },
            _ => DeconflictionResult::default(),
        };
        Ok(result)
    }
}
