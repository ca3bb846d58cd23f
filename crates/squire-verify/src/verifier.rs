//! The dump, apply, re-dump and compare workflow

use crate::compare::{compare_dumps, VerificationOutcome};
use crate::ops::{OpsError, SchemaOps};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, info_span, Instrument};

/// Steps of one verification attempt, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyStage {
    Dumping,
    Applying,
    ReDumping,
    Comparing,
}

impl fmt::Display for VerifyStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            VerifyStage::Dumping => "dumping",
            VerifyStage::Applying => "applying",
            VerifyStage::ReDumping => "re-dumping",
            VerifyStage::Comparing => "comparing",
        })
    }
}

/// Which database a failed dump was taken from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpSide {
    /// The freshly rebuilt database holding the full schema
    Reference,

    /// The database the diff is meant for
    Target,

    /// The scratch copy after the diff was applied
    Candidate,
}

impl fmt::Display for DumpSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DumpSide::Reference => "reference",
            DumpSide::Target => "target",
            DumpSide::Candidate => "verification",
        })
    }
}

/// Verification could not reach a verdict
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("error dumping {side} database: {source}")]
    DumpFailed {
        side: DumpSide,
        #[source]
        source: OpsError,
    },

    #[error("error loading the target dump into the verification database: {source}")]
    SeedFailed {
        #[source]
        source: OpsError,
    },

    #[error("error verifying diff: {source}")]
    DiffApplyFailed {
        #[source]
        source: OpsError,
    },
}

impl VerifyError {
    /// Stage the workflow was in when it failed
    pub fn stage(&self) -> VerifyStage {
        match self {
            VerifyError::DumpFailed {
                side: DumpSide::Candidate,
                ..
            } => VerifyStage::ReDumping,
            VerifyError::DumpFailed { .. } => VerifyStage::Dumping,
            VerifyError::SeedFailed { .. } | VerifyError::DiffApplyFailed { .. } => VerifyStage::Applying,
        }
    }

    /// Extended guidance for the user
    pub fn detail(&self) -> Option<String> {
        let text = match self {
            VerifyError::DumpFailed {
                side: DumpSide::Target,
                ..
            } => {
                "Error while dumping the target database. squire dumps the target database\n\
                 during diffing as a verification mechanism to ensure the diff is complete.\n\
                 It is possible to skip this by running \"squire diff\" without\n\
                 \"--verify-dump\", but it is typically prudent to check the error and\n\
                 run verification."
            }
            VerifyError::DumpFailed { .. } => {
                "Error while dumping the verification database. squire dumps the verification\n\
                 database to test that the generated diff would result in an equivalent schema.\n\
                 It is possible to skip this by running \"squire diff\" without\n\
                 \"--verify-dump\", but it is typically prudent to check the error and\n\
                 run verification."
            }
            VerifyError::SeedFailed { .. } => {
                "squire loads a dump of the target database into a temporary database so the\n\
                 diff can be tested without touching the target. Loading that dump failed;\n\
                 the error above usually points at an object the dump could not recreate."
            }
            VerifyError::DiffApplyFailed { .. } => {
                "Error while testing the generated diff on a dump of the target database.\n\
                 This usually means that attempting to deploy the diff on the real target\n\
                 database would fail. Inspect the error above to determine next steps."
            }
        };
        Some(text.to_string())
    }
}

/// Databases taking part in one verification
#[derive(Debug, Clone, Copy)]
pub struct VerifyTargets<'a> {
    /// Holds the full schema built from the fragment tree
    pub reference: &'a str,

    /// The database the diff was computed against; only ever read
    pub target: &'a str,

    /// Disposable database that receives the target dump and then the diff.
    /// May be the same database as `reference`, which is dumped first.
    pub scratch: &'a str,
}

/// Drives verification through a [`SchemaOps`] implementation
#[derive(Clone)]
pub struct DiffVerifier {
    ops: Arc<dyn SchemaOps>,
}

impl DiffVerifier {
    pub fn new(ops: Arc<dyn SchemaOps>) -> Self {
        Self { ops }
    }

    /// Check that applying `diff` to a copy of the target reproduces the
    /// reference schema.
    ///
    /// A mismatch is a normal outcome, not an error. Errors mean no verdict
    /// could be reached.
    pub async fn verify(&self, targets: VerifyTargets<'_>, diff: &str) -> Result<VerificationOutcome, VerifyError> {
        let span = info_span!("verify");
        async move {
            info!("verification requested, starting");

            debug!(stage = %VerifyStage::Dumping, "dumping reference database (full schema)");
            let expected = self.dump(targets.reference, DumpSide::Reference).await?;

            debug!(stage = %VerifyStage::Dumping, "dumping target database");
            let target_dump = self.dump(targets.target, DumpSide::Target).await?;

            debug!(stage = %VerifyStage::Applying, "seeding scratch database with target dump");
            self.ops
                .reset(targets.scratch, &target_dump)
                .await
                .map_err(|source| VerifyError::SeedFailed { source })?;

            if diff.trim().is_empty() {
                debug!(stage = %VerifyStage::Applying, "empty diff, nothing to apply");
            } else {
                debug!(stage = %VerifyStage::Applying, bytes = diff.len(), "applying diff");
                self.ops
                    .apply(targets.scratch, diff)
                    .await
                    .map_err(|source| VerifyError::DiffApplyFailed { source })?;
            }

            debug!(stage = %VerifyStage::ReDumping, "dumping scratch database");
            let actual = self.dump(targets.scratch, DumpSide::Candidate).await?;

            debug!(stage = %VerifyStage::Comparing, "comparing dumps");
            let outcome = compare_dumps(&expected, &actual);
            if outcome.passed() {
                info!("verification passed");
            } else {
                info!("verification failed, schema after apply does not match");
            }
            Ok(outcome)
        }
        .instrument(span)
        .await
    }

    async fn dump(&self, uri: &str, side: DumpSide) -> Result<String, VerifyError> {
        self.ops
            .dump(uri)
            .await
            .map_err(|source| VerifyError::DumpFailed { side, source })
    }
}
