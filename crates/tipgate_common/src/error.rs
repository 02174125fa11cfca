//! Error types for tipgate.
//!
//! Policy ambiguity (missing signal fields, pending upstream output) is never an
//! error here; it resolves to the conservative decision instead.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GateError {
    #[error("Tip not found: {0}")]
    TipNotFound(String),

    #[error("File {file_id} not found on tip {tip_id}")]
    FileNotFound { tip_id: String, file_id: String },

    #[error("Invalid override: {0}")]
    InvalidOverride(String),

    #[error("Automatic actions suspended for tip {tip_id}: {reason}")]
    ActionsSuspended { tip_id: String, reason: String },
}

impl GateError {
    pub fn code(&self) -> i32 {
        match self {
            GateError::TipNotFound(_) => -32010,
            GateError::FileNotFound { .. } => -32011,
            GateError::InvalidOverride(_) => -32012,
            GateError::ActionsSuspended { .. } => -32013,
        }
    }
}
