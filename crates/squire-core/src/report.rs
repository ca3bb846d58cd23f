//! Diff report schema (stable v1)
//!
//! This schema is STABLE and VERSIONED.
//! Breaking changes require a new version.

use serde::{Deserialize, Serialize};

/// Report schema version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportVersion {
    /// Major version (breaking changes)
    pub major: u32,

    /// Minor version (backward-compatible additions)
    pub minor: u32,
}

impl ReportVersion {
    /// Current report schema version
    pub const CURRENT: ReportVersion = ReportVersion { major: 1, minor: 0 };
}

impl std::fmt::Display for ReportVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Which database the diff was computed against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    /// The local development instance
    Dev,

    /// The production database
    Production,
}

/// Outcome of the optional dump verification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum VerificationStatus {
    /// Verification was not requested
    Skipped,

    /// Applying the diff reproduced the full schema
    Passed,

    /// The dumps differ; `diff` is a unified diff of the raw dumps
    Failed { diff: String },
}

/// Diff report (diff-report.json v1)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffReport {
    /// Schema version
    pub version: ReportVersion,

    /// Timestamp (ISO 8601)
    pub timestamp: String,

    /// Target database kind
    pub target: TargetKind,

    /// SQL statements produced by the diff tool
    pub diff: String,

    /// Verification outcome
    pub verification: VerificationStatus,
}

impl DiffReport {
    /// Create a report for a diff that was just computed
    pub fn new(target: TargetKind, diff: impl Into<String>, verification: VerificationStatus) -> Self {
        Self {
            version: ReportVersion::CURRENT,
            timestamp: chrono::Utc::now().to_rfc3339(),
            target,
            diff: diff.into(),
            verification,
        }
    }

    /// True when there is nothing to apply
    pub fn is_empty(&self) -> bool {
        self.diff.trim().is_empty()
    }

    /// True when verification ran and found a mismatch
    pub fn verification_failed(&self) -> bool {
        matches!(self.verification, VerificationStatus::Failed { .. })
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Save to file
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        let json = self.to_json().map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_diff_report() {
        let report = DiffReport::new(TargetKind::Dev, "\n", VerificationStatus::Skipped);
        assert_eq!(report.version, ReportVersion::CURRENT);
        assert!(report.is_empty());
        assert!(!report.verification_failed());
    }

    #[test]
    fn failed_verification_serialization() {
        let report = DiffReport::new(
            TargetKind::Production,
            "ALTER TABLE users ADD COLUMN bio text;\n",
            VerificationStatus::Failed {
                diff: "--- expected.sql\n+++ actual.sql\n".to_string(),
            },
        );
        assert!(report.verification_failed());

        let json = report.to_json().unwrap();
        assert!(json.contains("\"production\""));
        assert!(json.contains("\"status\": \"failed\""));
        assert!(json.contains("expected.sql"));
    }

    #[test]
    fn report_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("diff-report.json");
        let report = DiffReport::new(TargetKind::Dev, "", VerificationStatus::Passed);
        report.save_to_file(&path).unwrap();

        let parsed: DiffReport =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed, report);
    }
}
