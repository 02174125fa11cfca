//! Audit entries: one immutable record per stage decision.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Pipeline stage or human action that produced an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStage {
    InjectionGuard,
    LegalGate,
    Deconfliction,
    PriorityScoring,
    WarrantUpdate,
    ExigentOverride,
    Coordination,
}

impl AuditStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InjectionGuard => "injection_guard",
            Self::LegalGate => "legal_gate",
            Self::Deconfliction => "deconfliction",
            Self::PriorityScoring => "priority_scoring",
            Self::WarrantUpdate => "warrant_update",
            Self::ExigentOverride => "exigent_override",
            Self::Coordination => "coordination",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    Success,
    AgentError,
    HumanOverride,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub entry_id: Uuid,
    pub tip_id: String,
    pub stage: AuditStage,
    pub timestamp: DateTime<Utc>,
    pub status: AuditStatus,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_value: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_value: Option<serde_json::Value>,
    /// Needs supervisor attention
    #[serde(default)]
    pub supervisor_review: bool,
}

impl AuditEntry {
    pub fn new(
        tip_id: &str,
        stage: AuditStage,
        status: AuditStatus,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            entry_id: Uuid::new_v4(),
            tip_id: tip_id.to_string(),
            stage,
            timestamp: Utc::now(),
            status,
            summary: summary.into(),
            actor: None,
            previous_value: None,
            new_value: None,
            supervisor_review: false,
        }
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    /// Record before/after values, as overrides must
    pub fn with_change(mut self, previous: serde_json::Value, new: serde_json::Value) -> Self {
        self.previous_value = Some(previous);
        self.new_value = Some(new);
        self
    }

    pub fn for_supervisor(mut self) -> Self {
        self.supervisor_review = true;
        self
    }
}

/// Append-only sequence of entries for one tip
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditTrail {
    tip_id: String,
    entries: Vec<AuditEntry>,
}

impl AuditTrail {
    pub fn new(tip_id: impl Into<String>) -> Self {
        Self {
            tip_id: tip_id.into(),
            entries: Vec::new(),
        }
    }

    pub fn tip_id(&self) -> &str {
        &self.tip_id
    }

    /// Append an entry. Entries for another tip are refused.
    pub fn append(&mut self, entry: AuditEntry) -> bool {
        if entry.tip_id != self.tip_id {
            return false;
        }
        self.entries.push(entry);
        true
    }

    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last_for(&self, stage: AuditStage) -> Option<&AuditEntry> {
        self.entries.iter().rev().find(|e| e.stage == stage)
    }
}
