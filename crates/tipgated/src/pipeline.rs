//! Per-tip pipeline.
//!
//! injection guard → legal gate → deconfliction → priority scoring, each stage
//! appending one audit entry. Human actions (warrant status, exigent access,
//! coordination) go through here too so the legal status and score are
//! recomputed and audited in the same write.

use anyhow::Result;
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tipgate_common::{
    aggregate_legal_status, apply_legal_gate, apply_warrant_update, automatic_actions_permitted,
    detect_injection_attempts, legal, score_with_weights, AuditEntry, AuditStage, AuditStatus,
    AuditTrail, CoordinationRecord, DeconflictionOutcome, GateError, InjectionReport, ReviewFlag,
    ScoringWeights, StageOutput, Tip, Tier, WarrantTransition, WarrantUpdate,
};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{info, warn};

use crate::audit_log::{AuditLog, InMemoryAuditLog, JsonlAuditLog};
use crate::config::{Config, StorageBackend};
use crate::deconfliction::DeconflictionGate;
use crate::repository::{InMemoryTipRepository, JsonTipRepository, TipRepository};

/// Result of one processing pass
#[derive(Debug, Clone, Serialize)]
pub struct ProcessedTip {
    pub tip: Tip,
    pub injection: InjectionReport,
}

pub struct TipPipeline {
    repo: Arc<dyn TipRepository>,
    audit: Arc<dyn AuditLog>,
    gate: DeconflictionGate,
    weights: ScoringWeights,
    /// One lock per tip id; serializes read-modify-write of that tip's record
    tip_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl TipPipeline {
    pub fn new(
        repo: Arc<dyn TipRepository>,
        audit: Arc<dyn AuditLog>,
        gate: DeconflictionGate,
        weights: ScoringWeights,
    ) -> Self {
        Self {
            repo,
            audit,
            gate,
            weights,
            tip_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Wire storage and the deconfliction provider from config.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let gate = DeconflictionGate::from_config(&config.deconfliction)?;
        let (repo, audit): (Arc<dyn TipRepository>, Arc<dyn AuditLog>) =
            match config.storage.backend {
                StorageBackend::Memory => (
                    Arc::new(InMemoryTipRepository::new()),
                    Arc::new(InMemoryAuditLog::new()),
                ),
                StorageBackend::Json => (
                    Arc::new(JsonTipRepository::new(config.tips_dir()).await?),
                    Arc::new(JsonlAuditLog::new(config.audit_path()).await?),
                ),
            };
        Ok(Self::new(repo, audit, gate, config.scoring.clone()))
    }

    pub async fn get(&self, tip_id: &str) -> Result<Option<Tip>> {
        self.repo.get(tip_id).await
    }

    pub async fn audit_trail(&self, tip_id: &str) -> Result<AuditTrail> {
        self.audit.entries_for(tip_id).await
    }

    /// Triage queue: stored tips, most urgent first.
    ///
    /// PAUSED tips sort after every scored tier; unscored tips come last.
    pub async fn queue(&self) -> Result<Vec<Tip>> {
        let mut tips = self.repo.list().await?;
        tips.sort_by_key(|tip| {
            let rank = match tip.priority.computed() {
                Some(p) => match p.tier {
                    Tier::Immediate => 0,
                    Tier::Urgent => 1,
                    Tier::Standard => 2,
                    Tier::Monitor => 3,
                    Tier::Paused => 4,
                },
                None => 5,
            };
            let score = tip.priority.computed().map(|p| p.score).unwrap_or(0);
            (rank, std::cmp::Reverse(score))
        });
        Ok(tips)
    }

    /// Run every stage on a tip and store the result.
    ///
    /// Warrant statuses, exigent overrides and coordination in the incoming
    /// record are discarded; only the stored record (written by the audited
    /// human operations) supplies them. A redelivered tip therefore yields the
    /// same decisions.
    pub async fn process(&self, mut tip: Tip) -> Result<ProcessedTip> {
        let tip_id = tip.tip_id.clone();
        info!(tip_id = %tip_id, files = tip.files.len(), "Processing tip");

        // Network I/O stays outside the tip lock.
        let outcome = self
            .gate
            .check_all(&tip.subject_identifiers, tip.jurisdiction.as_deref())
            .await;

        let _guard = self.lock_tip(&tip_id).await;
        let stored = self.repo.get(&tip_id).await?;
        reset_human_state(&mut tip, stored.as_ref());
        tip.review_flags.clear();

        let injection = self.run_injection_guard(&mut tip).await?;
        self.run_legal_gate(&mut tip).await?;
        self.record_deconfliction(&mut tip, outcome).await?;
        self.run_scoring(&mut tip).await?;

        self.repo.save(&tip).await?;
        Ok(ProcessedTip { tip, injection })
    }

    /// Record a warrant status for one file.
    ///
    /// `Applied` is refused while automatic actions are suspended; court
    /// outcomes are always recorded.
    pub async fn update_warrant_status(
        &self,
        tip_id: &str,
        file_id: &str,
        update: WarrantUpdate,
        actor: &str,
    ) -> Result<WarrantTransition> {
        let _guard = self.lock_tip(tip_id).await;
        let mut tip = self.load(tip_id).await?;

        if update == WarrantUpdate::Applied && !automatic_actions_permitted(&tip) {
            return Err(GateError::ActionsSuspended {
                tip_id: tip_id.to_string(),
                reason: suspension_reason(&tip),
            }
            .into());
        }

        let file = tip.file_mut(file_id).ok_or_else(|| GateError::FileNotFound {
            tip_id: tip_id.to_string(),
            file_id: file_id.to_string(),
        })?;
        let transition = apply_warrant_update(file, update);

        info!(
            tip_id,
            file_id,
            status = transition.new_status.as_str(),
            "Warrant status recorded"
        );

        let mut entry = AuditEntry::new(
            tip_id,
            AuditStage::WarrantUpdate,
            AuditStatus::HumanOverride,
            format!(
                "file {} warrant {} -> {}; access {}",
                file_id,
                transition.previous_status.as_str(),
                transition.new_status.as_str(),
                if transition.now_blocked { "blocked" } else { "permitted" }
            ),
        )
        .with_actor(actor)
        .with_change(
            json!({
                "warrant_status": transition.previous_status,
                "file_access_blocked": transition.was_blocked,
            }),
            json!({
                "warrant_status": transition.new_status,
                "file_access_blocked": transition.now_blocked,
            }),
        );
        if transition.exigent_revoked {
            entry = entry.for_supervisor();
        }
        self.audit.append(&entry).await?;

        self.run_legal_gate(&mut tip).await?;
        self.run_scoring(&mut tip).await?;
        self.repo.save(&tip).await?;
        Ok(transition)
    }

    /// Emergency access to a blocked file before a warrant exists.
    pub async fn grant_exigent_access(
        &self,
        tip_id: &str,
        file_id: &str,
        authorized_by: &str,
        justification: &str,
    ) -> Result<Tip> {
        let _guard = self.lock_tip(tip_id).await;
        let mut tip = self.load(tip_id).await?;

        let file = tip.file_mut(file_id).ok_or_else(|| GateError::FileNotFound {
            tip_id: tip_id.to_string(),
            file_id: file_id.to_string(),
        })?;
        let record =
            legal::grant_exigent_access(file, authorized_by, justification, chrono::Utc::now())?;

        warn!(tip_id, file_id, authorized_by = %record.authorized_by, "Exigent access granted");

        let entry = AuditEntry::new(
            tip_id,
            AuditStage::ExigentOverride,
            AuditStatus::HumanOverride,
            format!("exigent access to file {}: {}", file_id, record.justification),
        )
        .with_actor(record.authorized_by.clone())
        .with_change(
            json!({ "file_id": file_id, "file_access_blocked": true }),
            json!({
                "file_id": file_id,
                "file_access_blocked": false,
                "authorized_at": record.authorized_at,
            }),
        )
        .for_supervisor();
        self.audit.append(&entry).await?;

        self.run_legal_gate(&mut tip).await?;
        self.run_scoring(&mut tip).await?;
        self.repo.save(&tip).await?;
        Ok(tip)
    }

    /// A supervisor confirms coordination with the agency holding the overlap.
    pub async fn record_coordination(
        &self,
        tip_id: &str,
        supervisor: &str,
        agency: &str,
        notes: &str,
    ) -> Result<Tip> {
        if supervisor.trim().is_empty() || agency.trim().is_empty() {
            return Err(GateError::InvalidOverride(
                "coordination needs a supervisor and an agency".to_string(),
            )
            .into());
        }

        let _guard = self.lock_tip(tip_id).await;
        let mut tip = self.load(tip_id).await?;
        let previous_tier = tip.priority.computed().map(|p| p.tier);

        tip.coordination = Some(CoordinationRecord {
            supervisor: supervisor.trim().to_string(),
            agency: agency.trim().to_string(),
            notes: notes.to_string(),
            recorded_at: chrono::Utc::now(),
        });
        tip.review_flags.retain(|f| {
            !matches!(
                f,
                ReviewFlag::CoordinationRequired { .. } | ReviewFlag::DeconflictionReview { .. }
            )
        });

        let score = score_with_weights(&tip, &self.weights);
        let new_tier = score.tier;

        info!(tip_id, agency, tier = new_tier.as_str(), "Coordination recorded");

        let entry = AuditEntry::new(
            tip_id,
            AuditStage::Coordination,
            AuditStatus::HumanOverride,
            format!("coordination with {} recorded", agency.trim()),
        )
        .with_actor(supervisor.trim())
        .with_change(json!({ "tier": previous_tier }), json!({ "tier": new_tier }));
        self.audit.append(&entry).await?;

        self.run_scoring(&mut tip).await?;
        self.repo.save(&tip).await?;
        Ok(tip)
    }

    async fn lock_tip(&self, tip_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.tip_locks.lock().await;
            locks.entry(tip_id.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }

    async fn load(&self, tip_id: &str) -> Result<Tip> {
        match self.repo.get(tip_id).await? {
            Some(tip) => Ok(tip),
            None => Err(GateError::TipNotFound(tip_id.to_string()).into()),
        }
    }

    async fn run_injection_guard(&self, tip: &mut Tip) -> Result<InjectionReport> {
        let report = detect_injection_attempts(&tip.description);

        let entry = if report.detected() {
            let tags = report.tags();
            warn!(tip_id = %tip.tip_id, tags = ?tags, "Manipulation patterns in report text");
            tip.review_flags.push(ReviewFlag::InjectionSuspected { tags: tags.clone() });
            AuditEntry::new(
                &tip.tip_id,
                AuditStage::InjectionGuard,
                AuditStatus::Success,
                format!("manipulation patterns detected (advisory): {}", tags.join(", ")),
            )
            .for_supervisor()
        } else {
            AuditEntry::new(
                &tip.tip_id,
                AuditStage::InjectionGuard,
                AuditStatus::Success,
                "no manipulation patterns detected",
            )
        };
        self.audit.append(&entry).await?;
        Ok(report)
    }

    async fn run_legal_gate(&self, tip: &mut Tip) -> Result<()> {
        for file in tip.files.iter_mut() {
            apply_legal_gate(file);
        }
        let status = aggregate_legal_status(tip);
        let blocked = tip.files.iter().filter(|f| f.file_access_blocked).count();

        let entry = AuditEntry::new(
            &tip.tip_id,
            AuditStage::LegalGate,
            AuditStatus::Success,
            format!(
                "{} of {} file(s) blocked; {} require a warrant. {}",
                blocked,
                tip.files.len(),
                status.files_requiring_warrant.len(),
                status.legal_note
            ),
        );
        self.audit.append(&entry).await?;

        tip.legal = StageOutput::Computed(status);
        Ok(())
    }

    async fn record_deconfliction(
        &self,
        tip: &mut Tip,
        outcome: DeconflictionOutcome,
    ) -> Result<()> {
        let entry = match &outcome {
            DeconflictionOutcome::Skipped { reason } => {
                AuditEntry::new(
                    &tip.tip_id,
                    AuditStage::Deconfliction,
                    AuditStatus::Skipped,
                    reason.clone(),
                )
            }
            DeconflictionOutcome::Checked(result) if result.match_found => {
                let overlap = result
                    .overlap_type
                    .as_ref()
                    .map(|o| o.as_str())
                    .unwrap_or("unspecified");
                if result.is_active_match() && tip.coordination.is_none() {
                    tip.review_flags.push(ReviewFlag::CoordinationRequired {
                        overlap_type: overlap.to_string(),
                    });
                }
                AuditEntry::new(
                    &tip.tip_id,
                    AuditStage::Deconfliction,
                    AuditStatus::Success,
                    format!(
                        "match via {}: {} (active: {}, coordinate: {})",
                        self.gate.provider_name(),
                        overlap,
                        result.active_investigation,
                        result.coordination_recommended
                    ),
                )
                .for_supervisor()
            }
            DeconflictionOutcome::Checked(_) => AuditEntry::new(
                &tip.tip_id,
                AuditStage::Deconfliction,
                AuditStatus::Success,
                format!("no conflicting investigation ({})", self.gate.provider_name()),
            ),
            DeconflictionOutcome::Indeterminate { reason } => {
                if tip.coordination.is_none() {
                    tip.review_flags.push(ReviewFlag::DeconflictionReview {
                        reason: reason.clone(),
                    });
                }
                AuditEntry::new(
                    &tip.tip_id,
                    AuditStage::Deconfliction,
                    AuditStatus::AgentError,
                    format!("check indeterminate, routed to manual review: {}", reason),
                )
                .for_supervisor()
            }
        };
        self.audit.append(&entry).await?;

        tip.deconfliction = StageOutput::Computed(outcome);
        Ok(())
    }

    async fn run_scoring(&self, tip: &mut Tip) -> Result<()> {
        let score = score_with_weights(tip, &self.weights);

        let mut summary = format!("score {} tier {}", score.score, score.tier.as_str());
        if tip.classification.is_pending() {
            summary.push_str("; classification pending, scored conservatively");
        }
        if score.automatic_actions_suspended {
            summary.push_str("; automatic actions suspended");
        }

        let mut entry = AuditEntry::new(
            &tip.tip_id,
            AuditStage::PriorityScoring,
            AuditStatus::Success,
            summary,
        );
        if score.supervisor_alert {
            entry = entry.for_supervisor();
        }
        self.audit.append(&entry).await?;

        info!(
            tip_id = %tip.tip_id,
            score = score.score,
            tier = score.tier.as_str(),
            victim_crisis = score.victim_crisis_alert,
            "Tip scored"
        );
        if score.tier == Tier::Paused {
            warn!(tip_id = %tip.tip_id, "Tip paused pending inter-agency coordination");
        }

        tip.priority = StageOutput::Computed(score);
        Ok(())
    }
}

fn reset_human_state(incoming: &mut Tip, stored: Option<&Tip>) {
    for file in incoming.files.iter_mut() {
        let previous = stored.and_then(|s| s.file(&file.file_id));
        file.warrant_status = previous.map(|p| p.warrant_status).unwrap_or_default();
        file.exigent_override = previous.and_then(|p| p.exigent_override.clone());
    }
    incoming.coordination = stored.and_then(|s| s.coordination.clone());
}

fn suspension_reason(tip: &Tip) -> String {
    match tip.priority.computed() {
        None => "tip has not been scored".to_string(),
        Some(p) if p.tier == Tier::Paused => {
            "tip is PAUSED for inter-agency coordination".to_string()
        }
        Some(p) if p.deconfliction_review_required => {
            "manual deconfliction review pending".to_string()
        }
        Some(_) => "coordination with another agency required".to_string(),
    }
}
