//! Database operations backed by `pg_dump` and a live connection

use squire_db::{recreate_database, Database, ReadinessPolicy, ResultTable};
use squire_exec::{ProcessRunner, RunOptions, Tool};
use squire_verify::{OpsError, SchemaOps};
use tokio::io::AsyncWrite;
use tracing::debug;

/// Runs a read-only query and decodes the result
#[async_trait::async_trait]
pub trait QueryOps: Send + Sync {
    async fn query(&self, uri: &str, sql: &str) -> Result<ResultTable, OpsError>;
}

/// Real implementation of [`SchemaOps`] and [`QueryOps`]
#[derive(Debug, Clone)]
pub struct LiveSchemaOps {
    runner: ProcessRunner,
    policy: ReadinessPolicy,
}

impl LiveSchemaOps {
    pub fn new(runner: ProcessRunner, policy: ReadinessPolicy) -> Self {
        Self { runner, policy }
    }

    pub fn dump_args(uri: &str) -> [&str; 3] {
        ["--no-comments", "-s", uri]
    }

    async fn connect(&self, uri: &str) -> Result<Database, OpsError> {
        Ok(Database::connect_ready(uri, self.policy, self.runner.cancel_token()).await?)
    }

    /// Stream a dump of `uri` into `out`
    pub async fn dump_to(&self, uri: &str, out: &mut (dyn AsyncWrite + Unpin + Send)) -> Result<(), OpsError> {
        self.runner
            .run(&Tool::PG_DUMP, Self::dump_args(uri), RunOptions::default().capture_stderr(), out)
            .await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl SchemaOps for LiveSchemaOps {
    async fn dump(&self, uri: &str) -> Result<String, OpsError> {
        let mut buf = Vec::new();
        self.dump_to(uri, &mut buf).await?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    async fn reset(&self, uri: &str, schema: &str) -> Result<(), OpsError> {
        // A freshly started server may still be initializing.
        self.connect(uri).await?;

        debug!("recreating the logical database");
        recreate_database(uri).await?;

        debug!(bytes = schema.len(), "loading schema");
        self.connect(uri).await?.execute(schema).await?;
        Ok(())
    }

    async fn apply(&self, uri: &str, sql: &str) -> Result<(), OpsError> {
        self.connect(uri).await?.execute(sql).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl QueryOps for LiveSchemaOps {
    async fn query(&self, uri: &str, sql: &str) -> Result<ResultTable, OpsError> {
        Ok(self.connect(uri).await?.query_table(sql).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dump_is_schema_only_without_comments() {
        assert_eq!(
            LiveSchemaOps::dump_args("postgres://x@h/db"),
            ["--no-comments", "-s", "postgres://x@h/db"]
        );
    }
}
