//! Legal gate: warrant necessity and file access under Wilson compliance.
//!
//! United States v. Wilson (9th Cir. 2021): a file the reporting service did not
//! itself view, and that is not publicly available, may not be opened by
//! investigators without a warrant.
//!
//! # Rules
//!
//! - `publicly_available` → no warrant, never blocked
//! - `esp_viewed_missing` → warrant required, whatever `esp_viewed` says
//! - `esp_viewed` (flag present) → no warrant
//! - warrant required → blocked unless `warrant_status == granted`
//!
//! Nothing here fails on well-typed input. Missing signals resolve toward blocking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::GateError;
use crate::tip::{ExigentOverride, LegalStatus, Tip, TipFile, WarrantStatus};

/// Governing precedent cited in legal notes
pub const WILSON_CITATION: &str = "United States v. Wilson, 13 F.4th 961 (9th Cir. 2021)";

/// Whether opening this file needs a warrant.
pub fn warrant_required(file: &TipFile) -> bool {
    if file.publicly_available {
        return false;
    }
    if file.esp_viewed_missing {
        return true;
    }
    !file.esp_viewed
}

/// Whether the warrant rule blocks access to this file.
///
/// Ignores exigent overrides; use [`access_permitted`] to re-validate before
/// serving content.
pub fn file_access_blocked(file: &TipFile) -> bool {
    if file.publicly_available {
        return false;
    }
    if file.warrant_status == WarrantStatus::Granted {
        return false;
    }
    warrant_required(file)
}

/// Final answer for the API layer before it serves file content
pub fn access_permitted(file: &TipFile) -> bool {
    !file_access_blocked(file) || file.exigent_override.is_some()
}

/// Recompute the derived fields of one file.
pub fn apply_legal_gate(file: &mut TipFile) {
    file.warrant_required = warrant_required(file);
    file.file_access_blocked = !access_permitted(file);

    if file.esp_viewed_missing && file.esp_viewed && !file.publicly_available {
        debug!(
            file_id = %file.file_id,
            "esp_viewed set but viewed flag missing from report, treating as not viewed"
        );
    }
}

/// Aggregate per-file legal state into the tip's LegalStatus.
pub fn aggregate_legal_status(tip: &Tip) -> LegalStatus {
    let files_requiring_warrant: Vec<String> = tip
        .files
        .iter()
        .filter(|f| warrant_required(f))
        .map(|f| f.file_id.clone())
        .collect();

    let all_warrants_resolved = tip
        .files
        .iter()
        .filter(|f| warrant_required(f))
        .all(|f| f.warrant_status.is_resolved());

    let any_files_accessible = tip.files.iter().any(access_permitted);

    let exigent_circumstances = tip
        .files
        .iter()
        .filter_map(|f| f.exigent_override.as_ref())
        .max_by_key(|o| o.authorized_at)
        .cloned();

    let legal_note = build_legal_note(tip, exigent_circumstances.as_ref());

    LegalStatus {
        files_requiring_warrant,
        all_warrants_resolved,
        any_files_accessible,
        legal_note,
        exigent_circumstances,
    }
}

fn build_legal_note(tip: &Tip, exigent: Option<&ExigentOverride>) -> String {
    if tip.files.is_empty() {
        return "No files attached to this tip.".to_string();
    }

    let total = tip.files.len();
    let blocked: Vec<&TipFile> = tip.files.iter().filter(|f| !access_permitted(f)).collect();

    let mut parts = Vec::new();

    if blocked.is_empty() {
        parts.push(format!(
            "All {} file(s) accessible: viewed by the ESP, publicly available, \
             or covered by a granted warrant.",
            total
        ));
    } else {
        parts.push(format!(
            "Wilson compliance ({}): {} of {} file(s) blocked pending a warrant; do not open them.",
            WILSON_CITATION,
            blocked.len(),
            total
        ));

        let missing = blocked.iter().filter(|f| f.esp_viewed_missing).count();
        if missing > 0 {
            parts.push(format!(
                "{} file(s) blocked because the ESP 'viewed' flag is missing from the report; \
                 treated as not viewed.",
                missing
            ));
        }

        let denied = blocked
            .iter()
            .filter(|f| f.warrant_status == WarrantStatus::Denied)
            .count();
        if denied > 0 {
            parts.push(format!("Warrant denied for {} file(s); access remains blocked.", denied));
        }
    }

    if let Some(o) = exigent {
        parts.push(format!(
            "Exigent circumstances access authorized by {} at {}.",
            o.authorized_by,
            o.authorized_at.to_rfc3339()
        ));
    }

    parts.join(" ")
}

/// Warrant status values case-management staff may record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarrantUpdate {
    Applied,
    Granted,
    Denied,
}

impl From<WarrantUpdate> for WarrantStatus {
    fn from(update: WarrantUpdate) -> Self {
        match update {
            WarrantUpdate::Applied => WarrantStatus::Applied,
            WarrantUpdate::Granted => WarrantStatus::Granted,
            WarrantUpdate::Denied => WarrantStatus::Denied,
        }
    }
}

impl std::str::FromStr for WarrantUpdate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "applied" => Ok(Self::Applied),
            "granted" => Ok(Self::Granted),
            "denied" => Ok(Self::Denied),
            other => Err(format!(
                "unknown warrant status '{}': expected applied, granted or denied",
                other
            )),
        }
    }
}

/// Before/after view of one warrant status write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarrantTransition {
    pub file_id: String,
    pub previous_status: WarrantStatus,
    pub new_status: WarrantStatus,
    pub was_blocked: bool,
    pub now_blocked: bool,
    /// A denial withdraws any exigent access granted earlier
    pub exigent_revoked: bool,
}

/// Record a warrant status and recompute the file's derived fields in the same write.
pub fn apply_warrant_update(file: &mut TipFile, update: WarrantUpdate) -> WarrantTransition {
    let previous_status = file.warrant_status;
    let was_blocked = !access_permitted(file);

    file.warrant_status = update.into();
    let exigent_revoked = update == WarrantUpdate::Denied && file.exigent_override.take().is_some();
    apply_legal_gate(file);

    WarrantTransition {
        file_id: file.file_id.clone(),
        previous_status,
        new_status: file.warrant_status,
        was_blocked,
        now_blocked: file.file_access_blocked,
        exigent_revoked,
    }
}

/// Grant emergency access to a blocked file.
pub fn grant_exigent_access(
    file: &mut TipFile,
    authorized_by: &str,
    justification: &str,
    authorized_at: DateTime<Utc>,
) -> Result<ExigentOverride, GateError> {
    if authorized_by.trim().is_empty() {
        return Err(GateError::InvalidOverride("authorizer identity is required".to_string()));
    }
    if justification.trim().is_empty() {
        return Err(GateError::InvalidOverride("justification is required".to_string()));
    }
    if access_permitted(file) {
        return Err(GateError::InvalidOverride(format!(
            "file {} is not blocked",
            file.file_id
        )));
    }

    let record = ExigentOverride {
        authorized_by: authorized_by.trim().to_string(),
        authorized_at,
        justification: justification.trim().to_string(),
    };
    file.exigent_override = Some(record.clone());
    apply_legal_gate(file);
    Ok(record)
}
