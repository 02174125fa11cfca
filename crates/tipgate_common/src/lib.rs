//! Shared types and decision logic for tipgate.
//!
//! Everything in this crate is pure: no I/O, no clocks consulted for decisions,
//! no shared mutable state. The daemon (`tipgated`) wires these pieces into the
//! per-tip pipeline and owns storage and network access.

pub mod audit;
pub mod error;
pub mod injection;
pub mod legal;
pub mod scoring;
pub mod tip;

pub use audit::{AuditEntry, AuditStage, AuditStatus, AuditTrail};
pub use error::GateError;
pub use injection::{detect_injection_attempts, InjectionReport};
pub use legal::{
    access_permitted, aggregate_legal_status, apply_legal_gate, apply_warrant_update,
    file_access_blocked, grant_exigent_access, warrant_required, WarrantTransition,
    WarrantUpdate,
};
pub use scoring::{
    automatic_actions_permitted, score, score_with_weights, PriorityScore, ScoringFactor,
    ScoringWeights, Tier, CRISIS_FLOOR,
};
pub use tip::{
    Classification, CoordinationRecord, DeconflictionOutcome, DeconflictionResult,
    ExigentOverride, ExtractedEntities, FileHash, HashAlgorithm, IdentifierType,
    LegalStatus, MediaType, OffenseCategory, OverlapType, ReviewFlag, Severity,
    StageOutput, SubjectIdentifier, Tip, TipFile, WarrantStatus,
};

/// Version string shared by all components
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
