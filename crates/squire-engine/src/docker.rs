//! [`ContainerRuntime`] backed by the `docker` command-line client

use crate::container::{ContainerRuntime, Endpoint, InstanceSpec, InstanceState, RuntimeError, POSTGRES_PORT};
use squire_exec::{ExecError, ProcessRunner, RunOptions, Tool};
use std::time::Duration;
use tracing::{debug, info};

/// Label attached to every container squire creates
const MANAGED_LABEL: &str = "io.squire.managed=true";

/// Upper bound on `docker rm` during teardown
const REMOVE_TIMEOUT: Duration = Duration::from_secs(60);

/// Drives Docker through its CLI.
///
/// Removal runs on its own runner that ignores cancellation, so scratch
/// instances are still cleaned up after the user interrupts a workflow.
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    runner: ProcessRunner,
    cleanup: ProcessRunner,
}

impl DockerRuntime {
    pub fn new(runner: ProcessRunner) -> Self {
        Self {
            runner,
            cleanup: ProcessRunner::default(),
        }
    }

    async fn docker(&self, args: &[String]) -> Result<String, ExecError> {
        self.runner
            .output(&Tool::DOCKER, args, RunOptions::default().capture_stderr())
            .await
    }

    fn run_args(spec: &InstanceSpec) -> Vec<String> {
        let publish = match spec.port {
            Some(port) => format!("127.0.0.1:{port}:{POSTGRES_PORT}"),
            None => format!("127.0.0.1::{POSTGRES_PORT}"),
        };

        let mut args = vec![
            "run".to_string(),
            "--detach".to_string(),
            "--name".to_string(),
            spec.name.clone(),
            "--label".to_string(),
            MANAGED_LABEL.to_string(),
            "--publish".to_string(),
            publish,
        ];
        for (key, value) in &spec.env {
            args.push("--env".to_string());
            args.push(format!("{key}={value}"));
        }
        args.push(spec.image.clone());
        args
    }
}

#[async_trait::async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn up(&self, spec: &InstanceSpec) -> Result<Endpoint, RuntimeError> {
        match self.status(spec).await? {
            InstanceState::Running => {
                debug!(instance = %spec.name, "already running");
            }
            InstanceState::NotCreated => {
                info!(instance = %spec.name, image = %spec.image, "creating");
                self.docker(&Self::run_args(spec)).await?;
            }
            state => {
                info!(instance = %spec.name, %state, "starting existing instance");
                self.docker(&["start".to_string(), spec.name.clone()]).await?;
            }
        }
        self.endpoint(spec).await
    }

    async fn down(&self, spec: &InstanceSpec) -> Result<(), RuntimeError> {
        info!(instance = %spec.name, "removing");
        let args = ["rm", "--force", "--volumes", spec.name.as_str()];
        let options = RunOptions::default().capture_stderr().with_timeout(REMOVE_TIMEOUT);

        match self.cleanup.output(&Tool::DOCKER, args, options).await {
            Ok(_) => Ok(()),
            Err(ExecError::Failed { stderr, .. }) if is_missing(&stderr) => {
                debug!(instance = %spec.name, "nothing to remove");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn status(&self, spec: &InstanceSpec) -> Result<InstanceState, RuntimeError> {
        let args = [
            "inspect".to_string(),
            "--type".to_string(),
            "container".to_string(),
            "--format".to_string(),
            "{{.State.Status}}".to_string(),
            spec.name.clone(),
        ];
        match self.docker(&args).await {
            Ok(out) => Ok(InstanceState::parse(&out)),
            Err(ExecError::Failed { stderr, .. }) if is_missing(&stderr) => Ok(InstanceState::NotCreated),
            Err(e) => Err(e.into()),
        }
    }

    async fn endpoint(&self, spec: &InstanceSpec) -> Result<Endpoint, RuntimeError> {
        let out = self
            .docker(&["port".to_string(), spec.name.clone(), format!("{POSTGRES_PORT}/tcp")])
            .await
            .map_err(|e| match e {
                ExecError::Failed { ref stderr, .. } if is_missing(stderr) || is_not_running(stderr) => {
                    RuntimeError::NotRunning {
                        name: spec.name.clone(),
                    }
                }
                other => other.into(),
            })?;

        let port = parse_port_mapping(&out).ok_or_else(|| RuntimeError::Unexpected {
            name: spec.name.clone(),
            message: format!("no published port in {:?}", out.trim()),
        })?;

        Ok(Endpoint {
            host: "127.0.0.1".to_string(),
            port,
            user: spec.user.clone(),
            database: spec.database.clone(),
        })
    }
}

fn is_missing(stderr: &str) -> bool {
    stderr.contains("No such container") || stderr.contains("No such object")
}

fn is_not_running(stderr: &str) -> bool {
    stderr.contains("is not running")
}

/// First host port in `docker port` output such as `127.0.0.1:49153` or
/// `[::]:49153`
fn parse_port_mapping(output: &str) -> Option<u16> {
    output
        .lines()
        .filter_map(|line| line.trim().rsplit_once(':'))
        .find_map(|(_, port)| port.parse().ok())
}
