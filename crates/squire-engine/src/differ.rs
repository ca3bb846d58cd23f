//! Structural diff between two databases

use squire_exec::{ExecError, ProcessRunner, RunOptions, Tool};
use tokio::io::AsyncWrite;
use tracing::info;

/// Produces the SQL that turns one database's structure into another's
#[async_trait::async_trait]
pub trait DiffTool: Send + Sync {
    /// Fail early when the tool cannot run at all
    fn check(&self) -> Result<(), ExecError> {
        Ok(())
    }

    /// Stream the statements that transform `target` into `source` into `out`
    async fn diff(
        &self,
        source: &str,
        target: &str,
        verbose: bool,
        out: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<(), ExecError>;
}

/// `pgquarrel` on the search path
#[derive(Debug, Clone)]
pub struct PgQuarrel {
    runner: ProcessRunner,
}

impl PgQuarrel {
    pub fn new(runner: ProcessRunner) -> Self {
        Self { runner }
    }

    pub fn args(source: &str, target: &str, verbose: bool) -> Vec<String> {
        let mut args = vec![
            "--source-dbname".to_string(),
            source.to_string(),
            "--target-dbname".to_string(),
            target.to_string(),
        ];
        if verbose {
            args.push("-vv".to_string());
        }
        args
    }
}

#[async_trait::async_trait]
impl DiffTool for PgQuarrel {
    fn check(&self) -> Result<(), ExecError> {
        Tool::PGQUARREL.resolve().map(|_| ())
    }

    async fn diff(
        &self,
        source: &str,
        target: &str,
        verbose: bool,
        out: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<(), ExecError> {
        info!(source, target, "diffing");
        self.runner
            .run(
                &Tool::PGQUARREL,
                Self::args(source, target, verbose),
                RunOptions::default().inherit_stdin(),
                out,
            )
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argument_order() {
        assert_eq!(
            PgQuarrel::args("postgres://a", "postgres://b", false),
            vec!["--source-dbname", "postgres://a", "--target-dbname", "postgres://b"]
        );
        assert_eq!(PgQuarrel::args("a", "b", true).last().map(String::as_str), Some("-vv"));
    }
}
