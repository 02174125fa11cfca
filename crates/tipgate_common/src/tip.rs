//! Tip data model.
//!
//! Records arrive schema-validated from ingestion. Upstream stage output that has
//! not been produced yet is `StageOutput::Pending`, never an absent field.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::scoring::PriorityScore;

/// Output of one pipeline stage: either not produced yet, or computed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum StageOutput<T> {
    Pending,
    Computed(T),
}

impl<T> Default for StageOutput<T> {
    fn default() -> Self {
        Self::Pending
    }
}

impl<T> StageOutput<T> {
    pub fn computed(&self) -> Option<&T> {
        match self {
            Self::Computed(value) => Some(value),
            Self::Pending => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

/// Warrant lifecycle for a single file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarrantStatus {
    #[default]
    NotNeeded,
    PendingApplication,
    Applied,
    Granted,
    Denied,
}

impl WarrantStatus {
    /// A court has ruled on the application
    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Granted | Self::Denied)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotNeeded => "not_needed",
            Self::PendingApplication => "pending_application",
            Self::Applied => "applied",
            Self::Granted => "granted",
            Self::Denied => "denied",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Image,
    Video,
    Document,
    Archive,
    #[default]
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashAlgorithm {
    Md5,
    Sha1,
    Sha256,
    PhotoDna,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHash {
    pub algorithm: HashAlgorithm,
    pub value: String,
}

/// Logged emergency access grant made before a warrant exists
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExigentOverride {
    pub authorized_by: String,
    pub authorized_at: DateTime<Utc>,
    pub justification: String,
}

fn default_true() -> bool {
    true
}

/// A file attached to a tip.
///
/// `warrant_required` and `file_access_blocked` are derived by the legal gate.
/// Deserialization defaults every signal toward blocking: an absent
/// `esp_viewed_missing` is read as missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TipFile {
    pub file_id: String,
    #[serde(default)]
    pub media_type: MediaType,
    #[serde(default)]
    pub hashes: Vec<FileHash>,
    #[serde(default)]
    pub esp_viewed: bool,
    #[serde(default = "default_true")]
    pub esp_viewed_missing: bool,
    #[serde(default)]
    pub publicly_available: bool,
    #[serde(default)]
    pub warrant_status: WarrantStatus,
    #[serde(default = "default_true")]
    pub warrant_required: bool,
    #[serde(default = "default_true")]
    pub file_access_blocked: bool,
    /// Matched a known-material hash list
    #[serde(default)]
    pub hash_match: bool,
    /// Upstream suspects the file is AI-generated
    #[serde(default)]
    pub aig_suspected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exigent_override: Option<ExigentOverride>,
}

impl TipFile {
    /// New file with every signal at its conservative default
    pub fn new(file_id: impl Into<String>) -> Self {
        Self {
            file_id: file_id.into(),
            media_type: MediaType::Other,
            hashes: Vec::new(),
            esp_viewed: false,
            esp_viewed_missing: true,
            publicly_available: false,
            warrant_status: WarrantStatus::NotNeeded,
            warrant_required: true,
            file_access_blocked: true,
            hash_match: false,
            aig_suspected: false,
            exigent_override: None,
        }
    }

    /// Set the three ESP signals at once
    pub fn with_signals(
        mut self,
        esp_viewed: bool,
        esp_viewed_missing: bool,
        publicly_available: bool,
    ) -> Self {
        self.esp_viewed = esp_viewed;
        self.esp_viewed_missing = esp_viewed_missing;
        self.publicly_available = publicly_available;
        self
    }

    pub fn with_warrant_status(mut self, status: WarrantStatus) -> Self {
        self.warrant_status = status;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OffenseCategory {
    Csam,
    Sextortion,
    Enticement,
    Trafficking,
    Grooming,
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Moderate,
    High,
    Critical,
}

/// Upstream offense classification. Every field is optional on the wire.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Classification {
    #[serde(default)]
    pub offense_category: OffenseCategory,
    #[serde(default)]
    pub aig_csam_flag: bool,
    #[serde(default)]
    pub sextortion_victim_in_crisis: bool,
    #[serde(default)]
    pub severity: Option<Severity>,
}

/// Upstream entity extraction, reduced to the fields scoring reads
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExtractedEntities {
    #[serde(default)]
    pub crisis_indicators: Vec<String>,
    #[serde(default)]
    pub estimated_victim_age: Option<u8>,
}

/// Per-tip aggregate of the legal gate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegalStatus {
    pub files_requiring_warrant: Vec<String>,
    pub all_warrants_resolved: bool,
    pub any_files_accessible: bool,
    pub legal_note: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exigent_circumstances: Option<ExigentOverride>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierType {
    Email,
    Phone,
    Username,
    IpAddress,
    Name,
    Other,
}

impl IdentifierType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Phone => "phone",
            Self::Username => "username",
            Self::IpAddress => "ip_address",
            Self::Name => "name",
            Self::Other => "other",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectIdentifier {
    pub identifier_type: IdentifierType,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapType {
    SameSubject,
    SameVictim,
    SameIndicator,
    #[serde(other)]
    Other,
}

impl OverlapType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SameSubject => "same_subject",
            Self::SameVictim => "same_victim",
            Self::SameIndicator => "same_indicator",
            Self::Other => "other",
        }
    }
}

/// Answer from a deconfliction provider
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DeconflictionResult {
    pub match_found: bool,
    #[serde(default)]
    pub overlap_type: Option<OverlapType>,
    #[serde(default)]
    pub active_investigation: bool,
    #[serde(default)]
    pub coordination_recommended: bool,
    #[serde(default)]
    pub notes: String,
}

impl DeconflictionResult {
    /// Another agency is actively working the same target
    pub fn is_active_match(&self) -> bool {
        self.match_found && self.active_investigation
    }
}

/// Outcome of the deconfliction stage. A failed check is `Indeterminate`,
/// never a clear result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DeconflictionOutcome {
    Skipped { reason: String },
    Checked(DeconflictionResult),
    Indeterminate { reason: String },
}

impl DeconflictionOutcome {
    pub fn active_match(&self) -> Option<&DeconflictionResult> {
        match self {
            Self::Checked(result) if result.is_active_match() => Some(result),
            _ => None,
        }
    }

    pub fn is_indeterminate(&self) -> bool {
        matches!(self, Self::Indeterminate { .. })
    }
}

/// Supervisor record that coordination with another agency happened
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinationRecord {
    pub supervisor: String,
    pub agency: String,
    #[serde(default)]
    pub notes: String,
    pub recorded_at: DateTime<Utc>,
}

/// Items routed to the human review queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReviewFlag {
    InjectionSuspected { tags: Vec<String> },
    DeconflictionReview { reason: String },
    CoordinationRequired { overlap_type: String },
}

/// A single report and everything the pipeline derived from it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tip {
    pub tip_id: String,
    pub received_at: DateTime<Utc>,
    #[serde(default)]
    pub source: String,
    /// Free text supplied by the reporter
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub ncmec_urgent: bool,
    #[serde(default)]
    pub jurisdiction: Option<String>,
    #[serde(default)]
    pub files: Vec<TipFile>,
    #[serde(default)]
    pub subject_identifiers: Vec<SubjectIdentifier>,
    #[serde(default)]
    pub classification: StageOutput<Classification>,
    #[serde(default)]
    pub entities: StageOutput<ExtractedEntities>,
    #[serde(default)]
    pub legal: StageOutput<LegalStatus>,
    #[serde(default)]
    pub deconfliction: StageOutput<DeconflictionOutcome>,
    #[serde(default)]
    pub priority: StageOutput<PriorityScore>,
    #[serde(default)]
    pub coordination: Option<CoordinationRecord>,
    #[serde(default)]
    pub review_flags: Vec<ReviewFlag>,
}

impl Tip {
    pub fn new(tip_id: impl Into<String>, received_at: DateTime<Utc>) -> Self {
        Self {
            tip_id: tip_id.into(),
            received_at,
            source: String::new(),
            description: String::new(),
            ncmec_urgent: false,
            jurisdiction: None,
            files: Vec::new(),
            subject_identifiers: Vec::new(),
            classification: StageOutput::Pending,
            entities: StageOutput::Pending,
            legal: StageOutput::Pending,
            deconfliction: StageOutput::Pending,
            priority: StageOutput::Pending,
            coordination: None,
            review_flags: Vec::new(),
        }
    }

    pub fn file(&self, file_id: &str) -> Option<&TipFile> {
        self.files.iter().find(|f| f.file_id == file_id)
    }

    pub fn file_mut(&mut self, file_id: &str) -> Option<&mut TipFile> {
        self.files.iter_mut().find(|f| f.file_id == file_id)
    }
}
