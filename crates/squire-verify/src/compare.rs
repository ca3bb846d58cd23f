//! Dump comparison and mismatch rendering

use crate::normalize::normalize;
use similar::TextDiff;
use squire_core::VerificationStatus;

/// Label of the rebuilt-from-scratch side in the unified diff
pub const EXPECTED_LABEL: &str = "expected.sql";

/// Label of the diff-applied side in the unified diff
pub const ACTUAL_LABEL: &str = "actual.sql";

/// Result of comparing two dumps
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationOutcome {
    Passed,

    /// Unified diff of the two raw dumps
    Failed { diff: String },
}

impl VerificationOutcome {
    pub fn passed(&self) -> bool {
        matches!(self, VerificationOutcome::Passed)
    }

    /// Guidance to show alongside a failed outcome
    pub fn detail(&self) -> Option<String> {
        match self {
            VerificationOutcome::Passed => None,
            VerificationOutcome::Failed { diff } => Some(format!(
                "Verification failed! During verification, squire copies the schema of the\n\
                 target database, applies the diff, and then checks that the resulting schema\n\
                 is equivalent to a full reset.\n\
                 \n\
                 This process is NOT 100% accurate. Both false positives and false negatives\n\
                 are possible, but it gives an extra check during the diff. Always scrutinize\n\
                 both the diff and the verification failures to ensure deploy will do the\n\
                 correct thing.\n\
                 \n\
                 The full diff of the schemas is shown below. This is NOT an applyable diff;\n\
                 it is a text diff of the two schema dumps.\n\
                 \n\
                 The resolution is usually to manually apply a small subset of the full diff\n\
                 that the diff tool does not support.\n\
                 \n\
                 {diff}"
            )),
        }
    }
}

impl From<VerificationOutcome> for VerificationStatus {
    fn from(outcome: VerificationOutcome) -> Self {
        match outcome {
            VerificationOutcome::Passed => VerificationStatus::Passed,
            VerificationOutcome::Failed { diff } => VerificationStatus::Failed { diff },
        }
    }
}

/// Compare a rebuilt dump against a diff-applied dump.
///
/// Equality is decided on the normalized forms; the diff in a failed
/// outcome is computed over the raw texts.
pub fn compare_dumps(expected: &str, actual: &str) -> VerificationOutcome {
    if normalize(expected) == normalize(actual) {
        return VerificationOutcome::Passed;
    }

    let diff = TextDiff::from_lines(expected, actual)
        .unified_diff()
        .context_radius(3)
        .header(EXPECTED_LABEL, ACTUAL_LABEL)
        .to_string();

    VerificationOutcome::Failed { diff }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reordered_statements_pass() {
        let expected = "CREATE TABLE a (id int);\nCREATE TABLE b (id int);\n";
        let actual = "CREATE TABLE b (id int);\n\nCREATE TABLE a (id int);\n";
        assert!(compare_dumps(expected, actual).passed());
    }

    #[test]
    fn stray_comma_line_fails() {
        let expected = "CREATE TABLE t (\n a int\n);";
        let actual = "CREATE TABLE t (\n a int\n,\n);";
        assert!(!compare_dumps(expected, actual).passed());
    }

    #[test]
    fn failure_converts_to_report_status() {
        let outcome = compare_dumps("a\n", "b\n");
        let detail = outcome.detail().unwrap();
        assert!(detail.contains("NOT 100% accurate"));

        match VerificationStatus::from(outcome) {
            VerificationStatus::Failed { diff } => {
                assert!(diff.contains("-a"));
                assert!(diff.contains("+b"));
                assert!(detail.ends_with(&diff));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn passed_has_no_detail() {
        assert_eq!(VerificationOutcome::Passed.detail(), None);
        assert_eq!(VerificationStatus::from(VerificationOutcome::Passed), VerificationStatus::Passed);
    }
}
