//! The squire workflows

use crate::container::{ContainerRuntime, Endpoint, InstanceSpec, InstanceState, RuntimeError};
use crate::differ::{DiffTool, PgQuarrel};
use crate::docker::DockerRuntime;
use crate::error::{EngineError, ScratchPurpose};
use crate::ops::{LiveSchemaOps, QueryOps};
use crate::tee::Tee;
use squire_build::{BuildSummary, SchemaAssembler, WalkOptions};
use squire_core::{Config, DiffReport, TargetKind, VerificationStatus};
use squire_db::{ReadinessPolicy, ResultTable};
use squire_exec::capture::success_only_async;
use squire_exec::ProcessRunner;
use squire_verify::{DiffVerifier, SchemaOps, VerifyTargets};
use std::future::Future;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncWrite;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Metadata key carrying the build time in assembled schemas
pub const GENERATION_TIME_KEY: &str = "Generation Time";

/// File name used by `schema --write`
const SCHEMA_FILE: &str = "schema.sql";

/// pgUnit test runner, installed into the test instance after the schema
pub const PGUNIT_SQL: &str = include_str!("../sql/pgunit.sql");

/// External capabilities a [`Squire`] works through
#[derive(Clone)]
pub struct Backends {
    pub runtime: Arc<dyn ContainerRuntime>,
    pub ops: Arc<dyn SchemaOps>,
    pub query: Arc<dyn QueryOps>,
    pub differ: Arc<dyn DiffTool>,
}

impl Backends {
    /// Docker, `pg_dump`, `pgquarrel` and PostgreSQL, all sharing `runner`'s
    /// cancellation
    pub fn live(runner: ProcessRunner, policy: ReadinessPolicy) -> Self {
        let ops = Arc::new(LiveSchemaOps::new(runner.clone(), policy));
        Self {
            runtime: Arc::new(DockerRuntime::new(runner.clone())),
            ops: ops.clone(),
            query: ops,
            differ: Arc::new(PgQuarrel::new(runner)),
        }
    }
}

/// Settings for one diff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiffOptions {
    pub target: TargetKind,

    /// Run dump verification after diffing
    pub verify: bool,

    /// Ask the diff tool for debug output
    pub verbose: bool,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            target: TargetKind::Dev,
            verify: false,
            verbose: false,
        }
    }
}

/// SQL resolved for a deploy, ready to be confirmed and applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployPlan {
    pub target: TargetKind,
    pub uri: String,
    pub sql: String,
}

impl DeployPlan {
    pub fn is_empty(&self) -> bool {
        self.sql.trim().is_empty()
    }
}

/// Entry point for every squire workflow
pub struct Squire {
    config: Config,
    backends: Backends,
    quiet_lifecycle: bool,
}

impl Squire {
    pub fn new(config: Config, backends: Backends) -> Self {
        Self {
            config,
            backends,
            quiet_lifecycle: false,
        }
    }

    /// Hide runtime chatter (image pulls and the like) while scratch
    /// instances start and stop, replaying it only when the step fails.
    ///
    /// This redirects the whole process's stdout and stderr, so leave it off
    /// when several workflows may run at once.
    pub fn with_quiet_lifecycle(mut self, quiet: bool) -> Self {
        self.quiet_lifecycle = quiet;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Spec of the dev database instance
    pub fn dev_spec(&self) -> InstanceSpec {
        InstanceSpec::dev(&self.config)
    }

    /// Assemble the schema from the configured SQL directory into `out`
    pub fn schema(&self, options: WalkOptions, out: &mut dyn Write) -> Result<BuildSummary, EngineError> {
        let generated = generation_time(&chrono::Local::now());
        let summary = SchemaAssembler::new(self.config.sql_root(), options)
            .with_metadata(GENERATION_TIME_KEY, generated)
            .build(out)?;
        if summary.is_empty() {
            warn!(root = %self.config.sql_root().display(), "no SQL fragments found");
        }
        Ok(summary)
    }

    /// Assemble the schema into memory
    pub fn schema_to_string(&self, options: WalkOptions) -> Result<String, EngineError> {
        let mut buf = Vec::new();
        self.schema(options, &mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    /// Assemble the schema and atomically replace `schema.sql` in the SQL
    /// directory. The file is left untouched if assembly fails.
    pub fn write_schema_file(&self, options: WalkOptions) -> Result<PathBuf, EngineError> {
        let root = self.config.sql_root();
        let path = root.join(SCHEMA_FILE);
        let io_err = |source| EngineError::Io {
            what: path.display().to_string(),
            source,
        };

        let mut schema = Vec::new();
        self.schema(options, &mut schema)?;

        let mut file = tempfile::NamedTempFile::new_in(&root).map_err(io_err)?;
        file.write_all(&schema).map_err(io_err)?;
        file.flush().map_err(io_err)?;
        file.persist(&path).map_err(|e| io_err(e.error))?;

        info!(path = %path.display(), "wrote schema");
        Ok(path)
    }

    /// Start the dev database
    pub async fn up(&self) -> Result<Endpoint, EngineError> {
        let spec = self.dev_spec();
        let endpoint = self.backends.runtime.up(&spec).await?;
        info!(instance = %spec.name, uri = %endpoint.conn_uri(), "dev database up");
        Ok(endpoint)
    }

    /// Stop and remove the dev database and its data
    pub async fn down(&self) -> Result<(), EngineError> {
        Ok(self.backends.runtime.down(&self.dev_spec()).await?)
    }

    pub async fn status(&self) -> Result<InstanceState, EngineError> {
        Ok(self.backends.runtime.status(&self.dev_spec()).await?)
    }

    /// Connection URI of the running dev database
    pub async fn dev_url(&self) -> Result<String, EngineError> {
        let spec = self.dev_spec();
        if !self.backends.runtime.status(&spec).await?.is_running() {
            return Err(EngineError::NotRunning { name: spec.name });
        }
        Ok(self.backends.runtime.endpoint(&spec).await?.conn_uri())
    }

    /// Connection URI for `target`
    pub async fn target_url(&self, target: TargetKind) -> Result<String, EngineError> {
        match target {
            TargetKind::Dev => self.dev_url().await,
            TargetKind::Production => Ok(self.config.prod_url()?),
        }
    }

    /// Recreate the dev database and load the schema into it.
    ///
    /// `schema` defaults to a fresh build of the SQL directory.
    pub async fn reset(&self, include_tests: bool, schema: Option<String>) -> Result<(), EngineError> {
        let uri = self.dev_url().await?;
        let schema = match schema {
            Some(schema) => schema,
            None => self.schema_to_string(walk_options(include_tests))?,
        };

        self.backends
            .ops
            .reset(&uri, &schema)
            .instrument(info_span!("reset"))
            .await
            .map_err(|source| EngineError::Deploy { source })?;
        info!("reset complete");
        Ok(())
    }

    /// Resolve what a deploy to `target` would run.
    ///
    /// Without explicit `sql` a diff against the target is computed.
    pub async fn plan_deploy(&self, target: TargetKind, sql: Option<String>) -> Result<DeployPlan, EngineError> {
        let uri = self.target_url(target).await?;
        let sql = match sql {
            Some(sql) => sql,
            None => {
                debug!("no SQL given, diffing against target");
                let options = DiffOptions {
                    target,
                    ..DiffOptions::default()
                };
                self.diff(options, &mut tokio::io::sink()).await?.diff
            }
        };
        Ok(DeployPlan { target, uri, sql })
    }

    /// Execute a planned deploy
    pub async fn deploy(&self, plan: &DeployPlan) -> Result<(), EngineError> {
        if plan.is_empty() {
            info!("nothing to deploy");
            return Ok(());
        }

        if plan.target == TargetKind::Production {
            warn!("deploying to production");
        }
        self.backends
            .ops
            .apply(&plan.uri, &plan.sql)
            .instrument(info_span!("deploy", target = ?plan.target))
            .await
            .map_err(|source| EngineError::Deploy { source })
    }

    /// Structure-only dump of `target`
    pub async fn dump(&self, target: TargetKind) -> Result<String, EngineError> {
        let uri = self.target_url(target).await?;
        self.backends
            .ops
            .dump(&uri)
            .await
            .map_err(|source| EngineError::Dump { source })
    }

    /// Diff a clean build of the schema against `options.target`.
    ///
    /// The diff is streamed to `out` as it is produced. A clone of the dev
    /// instance holds the clean build and is removed afterwards on every
    /// path. A verification mismatch is reported in the returned
    /// [`DiffReport`], not as an error.
    pub async fn diff(
        &self,
        options: DiffOptions,
        out: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<DiffReport, EngineError> {
        let span = info_span!("diff", target = ?options.target, verify = options.verify);
        async move {
            info!("starting diff");
            self.backends.differ.check()?;
            let target_uri = self.target_url(options.target).await?;

            let suffix = format!("diff-{}", chrono::Utc::now().timestamp());
            let scratch = self.dev_spec().clone_named(&suffix);

            let source = self.start_scratch(&scratch, ScratchPurpose::Diff).await?;
            let result = self.diff_against(source, target_uri, options, out).await;
            self.teardown(&scratch).await;
            result
        }
        .instrument(span)
        .await
    }

    async fn diff_against(
        &self,
        source: Endpoint,
        target_uri: String,
        options: DiffOptions,
        out: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<DiffReport, EngineError> {
        let source_uri = source.conn_uri();
        let schema = self.schema_to_string(WalkOptions::default())?;
        self.backends
            .ops
            .reset(&source_uri, &schema)
            .await
            .map_err(|source| EngineError::Scratch {
                purpose: ScratchPurpose::Diff,
                source,
            })?;

        let mut captured = Vec::new();
        {
            let mut tee = Tee::new(out, &mut captured);
            self.backends
                .differ
                .diff(&source_uri, &target_uri, options.verbose, &mut tee)
                .await?;
        }
        let diff = String::from_utf8_lossy(&captured).into_owned();

        let verification = if options.verify {
            let targets = VerifyTargets {
                reference: &source_uri,
                target: &target_uri,
                scratch: &source_uri,
            };
            DiffVerifier::new(self.backends.ops.clone())
                .verify(targets, &diff)
                .await?
                .into()
        } else {
            debug!("no verify, diff complete");
            VerificationStatus::Skipped
        };

        Ok(DiffReport::new(options.target, diff, verification))
    }

    /// Build the schema with tests into a clone of the dev instance and run
    /// the configured test query there
    pub async fn test(&self) -> Result<ResultTable, EngineError> {
        let scratch = self.dev_spec().clone_named("test");
        async move {
            let endpoint = self.start_scratch(&scratch, ScratchPurpose::Test).await?;
            let result = self.run_tests(endpoint).await;
            self.teardown(&scratch).await;
            result
        }
        .instrument(info_span!("test"))
        .await
    }

    async fn run_tests(&self, endpoint: Endpoint) -> Result<ResultTable, EngineError> {
        let uri = endpoint.conn_uri();
        let schema = self.schema_to_string(WalkOptions::with_tests())?;
        self.backends
            .ops
            .reset(&uri, &schema)
            .await
            .map_err(|source| EngineError::Scratch {
                purpose: ScratchPurpose::Test,
                source,
            })?;

        debug!("deploying pgUnit");
        self.backends
            .ops
            .apply(&uri, PGUNIT_SQL)
            .await
            .map_err(|source| EngineError::Scratch {
                purpose: ScratchPurpose::Test,
                source,
            })?;

        debug!(query = %self.config.test.query, "running tests");
        self.backends
            .query
            .query(&uri, &self.config.test.query)
            .await
            .map_err(|source| EngineError::Query { source })
    }

    /// Start a scratch instance. Callers own it from here on and must pass
    /// it to [`Squire::teardown`] on every path.
    async fn start_scratch(&self, spec: &InstanceSpec, purpose: ScratchPurpose) -> Result<Endpoint, EngineError> {
        debug!(instance = %spec.name, "launching scratch instance");
        match self.lifecycle(self.backends.runtime.up(spec)).await {
            Ok(endpoint) => Ok(endpoint),
            Err(e) => {
                // A half-created instance is still ours to remove.
                self.teardown(spec).await;
                Err(EngineError::Scratch {
                    purpose,
                    source: Box::new(e),
                })
            }
        }
    }

    /// Remove a scratch instance. Failures are logged and never replace the
    /// result of the work done on it.
    async fn teardown(&self, spec: &InstanceSpec) {
        debug!(instance = %spec.name, "removing scratch instance");
        if let Err(e) = self.lifecycle(self.backends.runtime.down(spec)).await {
            error!(instance = %spec.name, error = %e, "error destroying scratch instance, may still be dangling");
        }
    }

    async fn lifecycle<T, Fut>(&self, step: Fut) -> Result<T, RuntimeError>
    where
        Fut: Future<Output = Result<T, RuntimeError>>,
    {
        if !self.quiet_lifecycle {
            return step.await;
        }
        let mut out = std::io::sink();
        let mut err = std::io::sink();
        success_only_async(&mut out, &mut err, step).await
    }
}

/// Unix-date style timestamp in the zone of `now`
fn generation_time<Tz>(now: &chrono::DateTime<Tz>) -> String
where
    Tz: chrono::TimeZone,
    Tz::Offset: std::fmt::Display,
{
    now.format("%a %b %e %H:%M:%S %Z %Y").to_string()
}

fn walk_options(include_tests: bool) -> WalkOptions {
    if include_tests {
        WalkOptions::with_tests()
    } else {
        WalkOptions::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone};

    #[test]
    fn generation_time_keeps_the_local_zone() {
        let zone = FixedOffset::east_opt(2 * 3600).unwrap();
        let now = zone.with_ymd_and_hms(2006, 1, 2, 15, 4, 5).unwrap();
        assert_eq!(generation_time(&now), "Mon Jan  2 15:04:05 +02:00 2006");
    }
}
