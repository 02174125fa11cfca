//! tipgated - service layer for tip triage.
//!
//! Owns storage, the deconfliction provider and the per-tip pipeline. The
//! decision rules themselves live in `tipgate_common`.

pub mod audit_log;
pub mod config;
pub mod deconfliction;
pub mod pipeline;
pub mod repository;

pub use audit_log::{AuditLog, InMemoryAuditLog, JsonlAuditLog};
pub use config::{Config, ConfigError};
pub use deconfliction::{
    DeconflictionError, DeconflictionGate, DeconflictionProvider, DeconflictionQuery,
};
pub use pipeline::{ProcessedTip, TipPipeline};
pub use repository::{InMemoryTipRepository, JsonTipRepository, TipRepository};
