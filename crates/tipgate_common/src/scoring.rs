//! Priority scoring engine.
//!
//! Pure function of the tip record: same tip in, same score out.
//! Factors are stored as codes with their contribution, so every score can be
//! explained after the fact.
//!
//! Two rules sit above the additive score:
//! - crisis floor: a victim in crisis forces score >= 90, tier IMMEDIATE and both alerts
//! - AIG-CSAM only ever adds its fixed bonus

use serde::{Deserialize, Serialize};

use crate::legal::{access_permitted, aggregate_legal_status};
use crate::tip::{
    Classification, DeconflictionOutcome, ExtractedEntities, OffenseCategory, Severity,
    StageOutput, Tip,
};

/// Minimum score for any tip with a victim in crisis
pub const CRISIS_FLOOR: u8 = 90;

/// Triage tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Tier {
    Immediate,
    Urgent,
    Standard,
    Monitor,
    /// Held for inter-agency coordination
    Paused,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Immediate => "IMMEDIATE",
            Self::Urgent => "URGENT",
            Self::Standard => "STANDARD",
            Self::Monitor => "MONITOR",
            Self::Paused => "PAUSED",
        }
    }
}

/// Named scoring factors, in evaluation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactorKind {
    OffenseSeverity,
    OffenseCategory,
    NcmecUrgent,
    HashMatch,
    AccessibleFiles,
    YoungVictim,
    AigCsam,
    CrisisIndicators,
    Deconfliction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringFactor {
    pub kind: FactorKind,
    pub applied: bool,
    pub contribution: i32,
    pub rationale: String,
}

impl ScoringFactor {
    fn applied(kind: FactorKind, contribution: i32, rationale: impl Into<String>) -> Self {
        Self {
            kind,
            applied: true,
            contribution,
            rationale: rationale.into(),
        }
    }

    fn skipped(kind: FactorKind, rationale: impl Into<String>) -> Self {
        Self {
            kind,
            applied: false,
            contribution: 0,
            rationale: rationale.into(),
        }
    }
}

/// Result of one scoring pass. A rescore replaces it wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorityScore {
    pub score: u8,
    pub tier: Tier,
    pub factors: Vec<ScoringFactor>,
    pub supervisor_alert: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supervisor_alert_text: Option<String>,
    pub victim_crisis_alert: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub victim_crisis_alert_text: Option<String>,
    /// Preservation requests and warrant applications must wait
    pub automatic_actions_suspended: bool,
    pub deconfliction_review_required: bool,
}

impl PriorityScore {
    pub fn factor(&self, kind: FactorKind) -> Option<&ScoringFactor> {
        self.factors.iter().find(|f| f.kind == kind)
    }
}

/// Factor weights and tier thresholds (configurable)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub severity_low: u8,
    pub severity_moderate: u8,
    pub severity_high: u8,
    pub severity_critical: u8,
    /// Sextortion, enticement and trafficking
    pub contact_offense: u8,
    pub ncmec_urgent: u8,
    pub hash_match: u8,
    pub per_accessible_file: u8,
    pub accessible_files_cap: u8,
    pub young_victim: u8,
    pub young_victim_age: u8,
    pub aig_csam_bonus: u8,
    pub immediate_threshold: u8,
    pub urgent_threshold: u8,
    pub standard_threshold: u8,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            severity_low: 5,
            severity_moderate: 15,
            severity_high: 25,
            severity_critical: 35,
            contact_offense: 10,
            ncmec_urgent: 15,
            hash_match: 15,
            per_accessible_file: 3,
            accessible_files_cap: 12,
            young_victim: 10,
            young_victim_age: 13,
            aig_csam_bonus: 5,
            immediate_threshold: 85,
            urgent_threshold: 65,
            standard_threshold: 40,
        }
    }
}

impl ScoringWeights {
    /// Reject threshold tables that would make tiers overlap or exceed the scale
    pub fn validate(&self) -> Result<(), String> {
        if self.immediate_threshold > 100 {
            return Err(format!("immediate_threshold {} exceeds 100", self.immediate_threshold));
        }
        if !(self.immediate_threshold > self.urgent_threshold
            && self.urgent_threshold > self.standard_threshold)
        {
            return Err(format!(
                "tier thresholds must descend: immediate {} > urgent {} > standard {}",
                self.immediate_threshold, self.urgent_threshold, self.standard_threshold
            ));
        }
        if self.immediate_threshold > CRISIS_FLOOR {
            return Err(format!(
                "immediate_threshold {} is above the crisis floor {}",
                self.immediate_threshold, CRISIS_FLOOR
            ));
        }
        if self.aig_csam_bonus == 0 {
            return Err("aig_csam_bonus must be a positive bonus".to_string());
        }
        Ok(())
    }

    pub fn tier_for(&self, score: u8) -> Tier {
        if score >= self.immediate_threshold {
            Tier::Immediate
        } else if score >= self.urgent_threshold {
            Tier::Urgent
        } else if score >= self.standard_threshold {
            Tier::Standard
        } else {
            Tier::Monitor
        }
    }

    fn severity_points(&self, severity: Severity) -> u8 {
        match severity {
            Severity::Low => self.severity_low,
            Severity::Moderate => self.severity_moderate,
            Severity::High => self.severity_high,
            Severity::Critical => self.severity_critical,
        }
    }
}

/// Score a tip with the default weights.
pub fn score(tip: &Tip) -> PriorityScore {
    score_with_weights(tip, &ScoringWeights::default())
}

/// Score a tip.
///
/// Reads the computed LegalStatus when present and aggregates it otherwise.
/// Pending classification or entities count as "unknown": no factor applied.
pub fn score_with_weights(tip: &Tip, weights: &ScoringWeights) -> PriorityScore {
    let classification = tip.classification.computed();
    let entities = tip.entities.computed();
    let legal = match &tip.legal {
        StageOutput::Computed(status) => status.clone(),
        StageOutput::Pending => aggregate_legal_status(tip),
    };

    let mut factors = vec![
        severity_factor(classification, weights),
        category_factor(classification, weights),
        ncmec_factor(tip, weights),
        hash_factor(tip, weights),
        accessible_files_factor(tip, weights),
        young_victim_factor(entities, weights),
        aig_factor(tip, classification, weights),
    ];

    let sum: i32 = factors.iter().map(|f| f.contribution).sum();
    let mut score = sum.clamp(0, 100) as u8;

    let crisis = crisis_signals(classification, entities);
    factors.push(if crisis.is_empty() {
        ScoringFactor::skipped(FactorKind::CrisisIndicators, "no crisis indicators")
    } else {
        ScoringFactor::applied(
            FactorKind::CrisisIndicators,
            0,
            format!("crisis floor {} applies: {}", CRISIS_FLOOR, crisis.join(", ")),
        )
    });

    let mut tier = weights.tier_for(score);
    let mut supervisor_notes: Vec<String> = Vec::new();
    let mut victim_crisis_alert_text = None;

    if !crisis.is_empty() {
        score = score.max(CRISIS_FLOOR);
        tier = Tier::Immediate;
        victim_crisis_alert_text = Some(format!(
            "Victim in crisis ({}): immediate welfare action and supervisor notification required.",
            crisis.join("; ")
        ));
        supervisor_notes.push("Victim crisis alert raised.".to_string());
    }

    let deconfliction = deconfliction_state(tip);
    factors.push(deconfliction.factor.clone());

    if let Some(note) = &deconfliction.supervisor_note {
        supervisor_notes.push(note.clone());
    }
    if deconfliction.pause && crisis.is_empty() {
        tier = Tier::Paused;
    }

    if let Some(o) = &legal.exigent_circumstances {
        supervisor_notes.push(format!(
            "Exigent circumstances access authorized by {}.",
            o.authorized_by
        ));
    }

    let supervisor_alert = !supervisor_notes.is_empty();

    PriorityScore {
        score,
        tier,
        factors,
        supervisor_alert,
        supervisor_alert_text: supervisor_alert.then(|| supervisor_notes.join(" ")),
        victim_crisis_alert: victim_crisis_alert_text.is_some(),
        victim_crisis_alert_text,
        automatic_actions_suspended: deconfliction.suspend,
        deconfliction_review_required: deconfliction.review,
    }
}

/// Whether preservation requests or warrant applications may proceed automatically
pub fn automatic_actions_permitted(tip: &Tip) -> bool {
    match tip.priority.computed() {
        Some(p) => p.tier != Tier::Paused && !p.automatic_actions_suspended,
        None => false,
    }
}

fn severity_factor(
    classification: Option<&Classification>,
    weights: &ScoringWeights,
) -> ScoringFactor {
    match classification.and_then(|c| c.severity) {
        Some(severity) => ScoringFactor::applied(
            FactorKind::OffenseSeverity,
            weights.severity_points(severity) as i32,
            format!("severity rated {:?}", severity).to_lowercase(),
        ),
        None => ScoringFactor::skipped(FactorKind::OffenseSeverity, "severity unknown"),
    }
}

fn category_factor(
    classification: Option<&Classification>,
    weights: &ScoringWeights,
) -> ScoringFactor {
    let category = classification.map(|c| c.offense_category).unwrap_or_default();
    match category {
        OffenseCategory::Sextortion
        | OffenseCategory::Enticement
        | OffenseCategory::Trafficking => ScoringFactor::applied(
            FactorKind::OffenseCategory,
            weights.contact_offense as i32,
            format!("contact offense category: {:?}", category).to_lowercase(),
        ),
        OffenseCategory::Unknown => {
            ScoringFactor::skipped(FactorKind::OffenseCategory, "offense category unknown")
        }
        _ => ScoringFactor::skipped(FactorKind::OffenseCategory, "no contact offense indicated"),
    }
}

fn ncmec_factor(tip: &Tip, weights: &ScoringWeights) -> ScoringFactor {
    if tip.ncmec_urgent {
        ScoringFactor::applied(
            FactorKind::NcmecUrgent,
            weights.ncmec_urgent as i32,
            "NCMEC flagged urgent",
        )
    } else {
        ScoringFactor::skipped(FactorKind::NcmecUrgent, "not flagged urgent")
    }
}

fn hash_factor(tip: &Tip, weights: &ScoringWeights) -> ScoringFactor {
    let matched = tip.files.iter().filter(|f| f.hash_match).count();
    if matched > 0 {
        ScoringFactor::applied(
            FactorKind::HashMatch,
            weights.hash_match as i32,
            format!("{} file(s) matched known hashes", matched),
        )
    } else {
        ScoringFactor::skipped(FactorKind::HashMatch, "no hash matches")
    }
}

fn accessible_files_factor(tip: &Tip, weights: &ScoringWeights) -> ScoringFactor {
    let accessible = tip.files.iter().filter(|f| access_permitted(f)).count();
    if accessible == 0 {
        return ScoringFactor::skipped(FactorKind::AccessibleFiles, "no files accessible");
    }
    let points = (accessible as i32 * weights.per_accessible_file as i32)
        .min(weights.accessible_files_cap as i32);
    ScoringFactor::applied(
        FactorKind::AccessibleFiles,
        points,
        format!("{} file(s) reviewable now", accessible),
    )
}

fn young_victim_factor(
    entities: Option<&ExtractedEntities>,
    weights: &ScoringWeights,
) -> ScoringFactor {
    match entities.and_then(|e| e.estimated_victim_age) {
        Some(age) if age < weights.young_victim_age => ScoringFactor::applied(
            FactorKind::YoungVictim,
            weights.young_victim as i32,
            format!("estimated victim age {}", age),
        ),
        Some(_) => ScoringFactor::skipped(FactorKind::YoungVictim, "victim age above threshold"),
        None => ScoringFactor::skipped(FactorKind::YoungVictim, "victim age unknown"),
    }
}

fn aig_factor(
    tip: &Tip,
    classification: Option<&Classification>,
    weights: &ScoringWeights,
) -> ScoringFactor {
    let classified = classification.map(|c| c.aig_csam_flag).unwrap_or(false);
    let suspected_files = tip.files.iter().filter(|f| f.aig_suspected).count();
    if classified || suspected_files > 0 {
        ScoringFactor::applied(
            FactorKind::AigCsam,
            weights.aig_csam_bonus as i32,
            "suspected AI-generated material; treated as at least as severe as authentic",
        )
    } else {
        ScoringFactor::skipped(FactorKind::AigCsam, "no AI-generation suspicion")
    }
}

fn crisis_signals(
    classification: Option<&Classification>,
    entities: Option<&ExtractedEntities>,
) -> Vec<String> {
    let mut signals = Vec::new();
    if classification.map(|c| c.sextortion_victim_in_crisis).unwrap_or(false) {
        signals.push("sextortion victim in crisis".to_string());
    }
    if let Some(e) = entities {
        signals.extend(e.crisis_indicators.iter().filter(|i| !i.trim().is_empty()).cloned());
    }
    signals
}

struct DeconflictionState {
    factor: ScoringFactor,
    pause: bool,
    suspend: bool,
    review: bool,
    supervisor_note: Option<String>,
}

fn deconfliction_state(tip: &Tip) -> DeconflictionState {
    let coordinated = tip.coordination.is_some();
    match &tip.deconfliction {
        StageOutput::Pending => DeconflictionState {
            factor: ScoringFactor::skipped(FactorKind::Deconfliction, "deconfliction not yet run"),
            pause: false,
            suspend: true,
            review: false,
            supervisor_note: None,
        },
        StageOutput::Computed(DeconflictionOutcome::Skipped { reason }) => DeconflictionState {
            factor: ScoringFactor::skipped(FactorKind::Deconfliction, reason.clone()),
            pause: false,
            suspend: false,
            review: false,
            supervisor_note: None,
        },
        StageOutput::Computed(DeconflictionOutcome::Indeterminate { reason }) => {
            DeconflictionState {
                factor: ScoringFactor::skipped(
                    FactorKind::Deconfliction,
                    format!("check indeterminate: {}", reason),
                ),
                pause: false,
                suspend: !coordinated,
                review: !coordinated,
                supervisor_note: (!coordinated).then(|| {
                    "Deconfliction check failed; manual deconfliction review required \
                     before any action."
                        .to_string()
                }),
            }
        }
        StageOutput::Computed(DeconflictionOutcome::Checked(result)) => {
            let overlap = result
                .overlap_type
                .as_ref()
                .map(|o| o.as_str())
                .unwrap_or("unspecified");
            if result.is_active_match() && !coordinated {
                DeconflictionState {
                    factor: ScoringFactor::applied(
                        FactorKind::Deconfliction,
                        0,
                        format!("active investigation overlap ({})", overlap),
                    ),
                    pause: true,
                    suspend: true,
                    review: false,
                    supervisor_note: Some(format!(
                        "Active investigation by another agency ({}); preservation and warrant \
                         actions suspended until coordination is recorded.",
                        overlap
                    )),
                }
            } else if result.match_found {
                DeconflictionState {
                    factor: ScoringFactor::applied(
                        FactorKind::Deconfliction,
                        0,
                        if coordinated {
                            format!("overlap ({}) coordinated", overlap)
                        } else {
                            format!("overlap ({}) with no active investigation", overlap)
                        },
                    ),
                    pause: false,
                    suspend: false,
                    review: false,
                    supervisor_note: (result.coordination_recommended && !coordinated)
                        .then(|| format!("Coordination recommended on {} overlap.", overlap)),
                }
            } else {
                DeconflictionState {
                    factor: ScoringFactor::skipped(
                        FactorKind::Deconfliction,
                        "no conflicting investigation",
                    ),
                    pause: false,
                    suspend: false,
                    review: false,
                    supervisor_note: None,
                }
            }
        }
    }
}
