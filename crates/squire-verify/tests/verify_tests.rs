//! End-to-end verification flows over the in-memory ops

use pretty_assertions::assert_eq;
use squire_verify::{
    DiffVerifier, DumpSide, MockSchemaOps, OpsCall, VerificationOutcome, VerifyError, VerifyStage,
    VerifyTargets,
};
use std::sync::Arc;

const REFERENCE: &str = "postgres://127.0.0.1:5433/squire";
const TARGET: &str = "postgres://127.0.0.1:5432/squire";

fn targets() -> VerifyTargets<'static> {
    VerifyTargets {
        reference: REFERENCE,
        target: TARGET,
        scratch: REFERENCE,
    }
}

const FULL: &str = "\
--
-- PostgreSQL database dump
--

CREATE TABLE public.users (
    id integer,
    name text,
    email text
);
";

const TARGET_DUMP: &str = "\
CREATE TABLE public.users (
    id integer,
    name text
);
";

const DIFF: &str = "ALTER TABLE public.users ADD COLUMN email text;\n";

#[tokio::test]
async fn reordered_columns_and_commas_pass() {
    let reordered = "\
CREATE TABLE public.users (
    email text,
    id integer,
    name text
);
";
    let ops = MockSchemaOps::new()
        .with_database(REFERENCE, FULL)
        .with_database(TARGET, TARGET_DUMP)
        .with_apply_result(DIFF, reordered);

    let outcome = DiffVerifier::new(Arc::new(ops.clone()))
        .verify(targets(), DIFF)
        .await
        .unwrap();

    assert_eq!(outcome, VerificationOutcome::Passed);
    assert_eq!(
        ops.calls(),
        vec![
            OpsCall::Dump(REFERENCE.into()),
            OpsCall::Dump(TARGET.into()),
            OpsCall::Reset(REFERENCE.into()),
            OpsCall::Apply(REFERENCE.into()),
            OpsCall::Dump(REFERENCE.into()),
        ]
    );
    // The target itself is never written to
    assert_eq!(ops.dump_of(TARGET).as_deref(), Some(TARGET_DUMP));
}

#[tokio::test]
async fn extra_column_fails_with_labelled_diff() {
    let with_extra = "\
CREATE TABLE public.users (
    id integer,
    name text,
    email text,
    bio text
);
";
    let ops = MockSchemaOps::new()
        .with_database(REFERENCE, FULL)
        .with_database(TARGET, TARGET_DUMP)
        .with_apply_result(DIFF, with_extra);

    let outcome = DiffVerifier::new(Arc::new(ops)).verify(targets(), DIFF).await.unwrap();

    let VerificationOutcome::Failed { diff } = outcome else {
        panic!("expected a mismatch");
    };
    assert!(diff.contains("expected.sql"));
    assert!(diff.contains("actual.sql"));
    assert!(diff.contains("+    bio text"));
    // Raw text is diffed, so dump comments are visible as context or removals
    assert!(diff.contains("PostgreSQL database dump"));
}

#[tokio::test]
async fn empty_diff_skips_apply() {
    let ops = MockSchemaOps::new()
        .with_database(REFERENCE, TARGET_DUMP)
        .with_database(TARGET, TARGET_DUMP);

    let outcome = DiffVerifier::new(Arc::new(ops.clone()))
        .verify(targets(), "  \n")
        .await
        .unwrap();

    assert!(outcome.passed());
    assert!(!ops.calls().iter().any(|c| matches!(c, OpsCall::Apply(_))));
}

#[tokio::test]
async fn empty_diff_against_drifted_target_fails() {
    let ops = MockSchemaOps::new()
        .with_database(REFERENCE, FULL)
        .with_database(TARGET, TARGET_DUMP);

    let outcome = DiffVerifier::new(Arc::new(ops)).verify(targets(), "").await.unwrap();
    assert!(!outcome.passed());
}

#[tokio::test]
async fn apply_failure_is_diff_apply_error() {
    let ops = MockSchemaOps::new()
        .with_database(REFERENCE, FULL)
        .with_database(TARGET, TARGET_DUMP)
        .with_apply_failure("column \"email\" of relation \"users\" already exists");

    let err = DiffVerifier::new(Arc::new(ops)).verify(targets(), DIFF).await.unwrap_err();

    assert!(matches!(err, VerifyError::DiffApplyFailed { .. }));
    assert_eq!(err.stage(), VerifyStage::Applying);
    assert!(err.to_string().contains("already exists"));
    assert!(err.detail().unwrap().contains("would fail"));
}

#[tokio::test]
async fn dump_failures_name_the_side() {
    let ops = MockSchemaOps::new()
        .with_database(REFERENCE, FULL)
        .with_database(TARGET, TARGET_DUMP)
        .with_dump_failure(TARGET);

    let err = DiffVerifier::new(Arc::new(ops.clone()))
        .verify(targets(), DIFF)
        .await
        .unwrap_err();

    match &err {
        VerifyError::DumpFailed { side, .. } => assert_eq!(*side, DumpSide::Target),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.to_string().starts_with("error dumping target database"));
    assert_eq!(err.stage(), VerifyStage::Dumping);
    // Nothing was reset after the failure
    assert!(!ops.calls().iter().any(|c| matches!(c, OpsCall::Reset(_))));

    let ops = MockSchemaOps::new()
        .with_database(TARGET, TARGET_DUMP)
        .with_dump_failure(REFERENCE);
    let err = DiffVerifier::new(Arc::new(ops)).verify(targets(), DIFF).await.unwrap_err();
    assert!(matches!(
        err,
        VerifyError::DumpFailed {
            side: DumpSide::Reference,
            ..
        }
    ));
}

#[tokio::test]
async fn seed_failure_stops_before_apply() {
    let ops = MockSchemaOps::new()
        .with_database(REFERENCE, FULL)
        .with_database(TARGET, TARGET_DUMP)
        .with_reset_failure();

    let err = DiffVerifier::new(Arc::new(ops.clone()))
        .verify(targets(), DIFF)
        .await
        .unwrap_err();

    assert!(matches!(err, VerifyError::SeedFailed { .. }));
    assert!(!ops.calls().iter().any(|c| matches!(c, OpsCall::Apply(_))));
}
