//! Diff verification for squire
//!
//! Confirms that a generated schema diff, once applied to a copy of the
//! target, yields the same structure as a full rebuild. Both sides are
//! dumped, normalized into sorted line sets and compared; on mismatch the
//! raw dumps are rendered as a unified diff for a human to read.
//!
//! The comparison is a heuristic. Dump output is not canonical across
//! equivalent databases, so both false passes and false failures are
//! possible. Treat a failure as a prompt to inspect, not as proof.

pub mod compare;
pub mod mock;
pub mod normalize;
pub mod ops;
pub mod verifier;

pub use compare::{compare_dumps, VerificationOutcome, ACTUAL_LABEL, EXPECTED_LABEL};
pub use mock::{MockSchemaOps, OpsCall};
pub use normalize::{normalize, render};
pub use ops::{OpsError, SchemaOps};
pub use verifier::{DiffVerifier, DumpSide, VerifyError, VerifyStage, VerifyTargets};
