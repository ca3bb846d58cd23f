use crate::container::RuntimeError;
use squire_build::BuildError;
use squire_core::ConfigError;
use squire_db::DbError;
use squire_exec::ExecError;
use squire_verify::{OpsError, VerifyError};
use std::fmt;

/// What a scratch instance was created for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScratchPurpose {
    Diff,
    Test,
}

impl fmt::Display for ScratchPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ScratchPurpose::Diff => "diff source",
            ScratchPurpose::Test => "test",
        })
    }
}

/// Errors from squire workflows
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error(transparent)]
    Verify(#[from] VerifyError),

    #[error("the dev database {name} is not running")]
    NotRunning { name: String },

    #[error("error preparing {purpose} instance: {source}")]
    Scratch {
        purpose: ScratchPurpose,
        #[source]
        source: OpsError,
    },

    #[error("{source}")]
    Deploy {
        #[source]
        source: OpsError,
    },

    #[error("error dumping database: {source}")]
    Dump {
        #[source]
        source: OpsError,
    },

    #[error("error running test query: {source}")]
    Query {
        #[source]
        source: OpsError,
    },

    #[error("error writing {what}: {source}")]
    Io {
        what: String,
        #[source]
        source: std::io::Error,
    },
}

impl EngineError {
    /// Extended guidance for the user, when there is any
    pub fn detail(&self) -> Option<String> {
        match self {
            EngineError::Config(e) => e.detail(),
            EngineError::Exec(e) => e.detail(),
            EngineError::Runtime(e) => e.detail(),
            EngineError::Verify(e) => e.detail(),
            EngineError::NotRunning { .. } => Some(NOT_RUNNING.to_string()),
            EngineError::Scratch { purpose, source } => {
                let guidance = match purpose {
                    ScratchPurpose::Diff => CREATING_SOURCE,
                    ScratchPurpose::Test => CREATING_TEST,
                };
                Some(with_cause_detail(guidance, source))
            }
            EngineError::Deploy { source } => match db_error(source) {
                Some(db @ DbError::SqlExecution { line: Some(_), .. }) => {
                    Some(format!("{}\n\n{SQL_POSITION}", db.detail().unwrap_or_default()))
                }
                Some(db) => db.detail(),
                None => exec_error(source).and_then(ExecError::detail),
            },
            EngineError::Dump { source } | EngineError::Query { source } => {
                exec_error(source).and_then(ExecError::detail).or_else(|| db_error(source).and_then(DbError::detail))
            }
            _ => None,
        }
    }
}

fn db_error(source: &OpsError) -> Option<&DbError> {
    source.downcast_ref::<DbError>()
}

fn exec_error(source: &OpsError) -> Option<&ExecError> {
    source.downcast_ref::<ExecError>()
}

fn with_cause_detail(guidance: &str, source: &OpsError) -> String {
    let cause = exec_error(source)
        .and_then(ExecError::detail)
        .or_else(|| db_error(source).and_then(DbError::detail));
    match cause {
        Some(cause) => format!("{guidance}\n\n{cause}"),
        None => guidance.to_string(),
    }
}

const NOT_RUNNING: &str = "\
A diff was requested against the dev database, but the dev database is not
currently running. Start it with \"squire up\".

If instead you meant to diff against another database, pass \"--production\"
or adjust the configuration. See \"squire diff --help\" for more.";

const CREATING_SOURCE: &str = "\
squire creates a temporary database instance holding a clean build of your
current schema in order to compute the diff. The dev database is not used for
this because it may hold extra data or manual changes, or it may be the
target of the diff itself.

The error above was received while preparing this source instance. Please
resolve the error and try again.";

const CREATING_TEST: &str = "\
squire creates a temporary database instance to run tests against so that
tests never touch the dev database.

The error above was received while preparing this test instance. Please
resolve the error and try again.";

const SQL_POSITION: &str = "\
The line and column refer to the assembled schema, not to your individual SQL
files. Run \"squire schema --write\" to save the assembled schema as
schema.sql in your SQL directory and look there.";
