//! Injection guard.
//!
//! Flags report text that tries to steer the legal gate or triage, such as
//! embedded instructions claiming a warrant was granted. Annotates only: the
//! text is returned untouched and the tags are advisory. Nothing downstream may
//! treat a detected claim as a legal fact.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::LazyLock;

/// Known manipulation patterns, tagged
static INJECTION_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    vec![
        (
            Regex::new(r"(?i)\b(ignore|disregard|forget|override)\s+(all\s+|any\s+)?(the\s+)?(prior|previous|above|earlier|preceding)\s+(instructions?|rules|prompts?|directives?)").unwrap(),
            "ignore_prior_instructions",
        ),
        (
            Regex::new(r"(?i)\b(you\s+are\s+now|act\s+as|pretend\s+to\s+be)\b|^\s*(system|assistant)\s*:").unwrap(),
            "role_impersonation",
        ),
        (
            Regex::new(r#"(?i)\bwarrant\s+(has\s+been\s+|was\s+|is\s+|already\s+)?(granted|approved|issued|obtained|signed)|warrant_status["']?\s*[:=]\s*["']?granted"#).unwrap(),
            "claims_warrant_granted",
        ),
        (
            Regex::new(r#"(?i)\bno\s+warrant\s+(is\s+)?(needed|required|necessary)|warrant_required["']?\s*[:=]\s*["']?false"#).unwrap(),
            "claims_warrant_not_required",
        ),
        (
            Regex::new(r#"(?i)\b(files?|images?|videos?|content|media)\s+(is|are|was|were)\s+(already\s+)?(publicly|openly)\s+(available|accessible|posted)|publicly_available["']?\s*[:=]\s*["']?true"#).unwrap(),
            "claims_publicly_available",
        ),
        (
            Regex::new(r#"(?i)\b(mark|set|treat|flag|record)\s+(all\s+)?(the\s+|these\s+|this\s+)?(files?|images?|attachments?|content)\s+as\s+(viewed|reviewed|seen)|esp_viewed["']?\s*[:=]\s*["']?true"#).unwrap(),
            "claims_esp_viewed",
        ),
        (
            Regex::new(r#"(?i)\b(unblock|unlock|release)\s+(all\s+)?(the\s+)?(files?|attachments?|access)|file_access_blocked["']?\s*[:=]\s*["']?false"#).unwrap(),
            "requests_unblock",
        ),
        (
            Regex::new(r"(?i)\b(set|lower|downgrade|reduce|change|mark)\s+(the\s+)?(priority|tier|urgency|score|this\s+tip)\s+(to|as)\b|\b(low|no)\s+priority\s+(tip|report)\b").unwrap(),
            "priority_manipulation",
        ),
        (
            Regex::new(r"(?i)\b(skip|bypass|disable|ignore)\s+(the\s+)?(deconfliction|conflict\s+check|legal\s+(check|gate|review))").unwrap(),
            "bypass_checks",
        ),
        (
            Regex::new(r"(?i)<\s*/?\s*(system|instructions?|prompt)\s*>|\[\s*(system|inst)\s*\]").unwrap(),
            "embedded_markup",
        ),
    ]
});

/// Result of scanning one text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InjectionReport {
    /// Always identical to the scanned input
    pub sanitized: String,
    /// Always false
    pub was_modified: bool,
    pub injection_attempts_detected: BTreeSet<String>,
}

impl InjectionReport {
    pub fn detected(&self) -> bool {
        !self.injection_attempts_detected.is_empty()
    }

    pub fn tags(&self) -> Vec<String> {
        self.injection_attempts_detected.iter().cloned().collect()
    }
}

/// Scan text against the pattern catalog.
pub fn detect_injection_attempts(text: &str) -> InjectionReport {
    let injection_attempts_detected = INJECTION_PATTERNS
        .iter()
        .filter(|(pattern, _)| pattern.is_match(text))
        .map(|(_, tag)| (*tag).to_string())
        .collect();

    InjectionReport {
        sanitized: text.to_string(),
        was_modified: false,
        injection_attempts_detected,
    }
}

/// Catalog tags, for documentation and review tooling
pub fn known_tags() -> Vec<&'static str> {
    INJECTION_PATTERNS.iter().map(|(_, tag)| *tag).collect()
}
