//! Cancellable execution of external programs

use crate::error::ExecError;
use crate::tool::Tool;
use std::ffi::OsStr;
use std::io;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::{Child, ChildStdout, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, warn, Instrument};

/// Where the child's stdin comes from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StdinPolicy {
    /// Closed; the child sees EOF immediately
    #[default]
    Null,

    /// Shared with this process, for tools that may prompt
    Inherit,
}

/// Where the child's stderr goes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StderrPolicy {
    /// Straight to this process's stderr
    #[default]
    Inherit,

    /// Collected and attached to the result or the error
    Capture,
}

/// Per-run settings
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    pub stdin: StdinPolicy,
    pub stderr: StderrPolicy,

    /// Kill the child if it runs longer than this
    pub timeout: Option<Duration>,
}

impl RunOptions {
    pub fn capture_stderr(mut self) -> Self {
        self.stderr = StderrPolicy::Capture;
        self
    }

    pub fn inherit_stdin(mut self) -> Self {
        self.stdin = StdinPolicy::Inherit;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// What a successful run produced besides the streamed stdout
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutput {
    /// Bytes copied from the child's stdout into the sink
    pub bytes: u64,

    /// Captured stderr, when [`StderrPolicy::Capture`] was used
    pub stderr: Option<String>,
}

/// Runs external tools under a shared cancellation token.
///
/// Cancelling the token kills any child started through this runner.
/// Clones share the token.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    cancel: CancellationToken,
}

enum Outcome {
    Finished(io::Result<(u64, ExitStatus)>),
    Cancelled,
    TimedOut(Duration),
}

impl ProcessRunner {
    pub fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Run `tool` with `args`, streaming its stdout into `sink` as it is
    /// produced.
    ///
    /// A non-zero exit is an error. Any bytes already streamed stay in the
    /// sink, so callers that need all-or-nothing output should pass a buffer.
    pub async fn run<I, S, W>(
        &self,
        tool: &Tool,
        args: I,
        options: RunOptions,
        sink: &mut W,
    ) -> Result<RunOutput, ExecError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
        W: AsyncWrite + Unpin + ?Sized,
    {
        let program_path = tool.resolve()?;
        let program = tool.name.to_string();

        let mut command = Command::new(&program_path);
        command
            .args(args)
            .stdout(Stdio::piped())
            .stdin(match options.stdin {
                StdinPolicy::Null => Stdio::null(),
                StdinPolicy::Inherit => Stdio::inherit(),
            })
            .stderr(match options.stderr {
                StderrPolicy::Inherit => Stdio::inherit(),
                StderrPolicy::Capture => Stdio::piped(),
            })
            .kill_on_drop(true);

        let span = info_span!("exec", program = %program);
        async move {
            debug!(path = %program_path.display(), "spawning");
            let mut child = command.spawn().map_err(|source| ExecError::Spawn {
                program: program.clone(),
                source,
            })?;

            let mut stdout = child.stdout.take().ok_or_else(|| ExecError::Io {
                program: program.clone(),
                source: io::Error::other("child stdout was not piped"),
            })?;

            let stderr_task = child.stderr.take().map(|mut pipe| {
                tokio::spawn(async move {
                    let mut buf = Vec::new();
                    pipe.read_to_end(&mut buf).await.map(|_| buf)
                })
            });

            let outcome = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Outcome::Cancelled,
                _ = deadline(options.timeout) => Outcome::TimedOut(options.timeout.unwrap_or_default()),
                result = drive(&mut child, &mut stdout, sink) => Outcome::Finished(result),
            };

            let (bytes, status) = match outcome {
                Outcome::Finished(Ok(done)) => done,
                Outcome::Finished(Err(source)) => {
                    stop(&mut child, stderr_task).await;
                    return Err(ExecError::Io { program, source });
                }
                Outcome::Cancelled => {
                    warn!("cancelled, killing child");
                    stop(&mut child, stderr_task).await;
                    return Err(ExecError::Cancelled { program });
                }
                Outcome::TimedOut(after) => {
                    warn!(?after, "timed out, killing child");
                    stop(&mut child, stderr_task).await;
                    return Err(ExecError::TimedOut { program, after });
                }
            };

            let stderr = match stderr_task {
                Some(task) => {
                    let collected = task
                        .await
                        .map_err(io::Error::other)
                        .and_then(|r| r)
                        .map_err(|source| ExecError::Io {
                            program: program.clone(),
                            source,
                        })?;
                    Some(String::from_utf8_lossy(&collected).into_owned())
                }
                None => None,
            };

            debug!(%status, bytes, "child exited");
            if !status.success() {
                return Err(ExecError::Failed {
                    program,
                    status,
                    stderr: stderr.unwrap_or_default(),
                });
            }

            Ok(RunOutput { bytes, stderr })
        }
        .instrument(span)
        .await
    }

    /// Run and collect stdout as a string
    pub async fn output<I, S>(&self, tool: &Tool, args: I, options: RunOptions) -> Result<String, ExecError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut buf = Vec::new();
        self.run(tool, args, options, &mut buf).await?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

async fn drive<W>(child: &mut Child, stdout: &mut ChildStdout, sink: &mut W) -> io::Result<(u64, ExitStatus)>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let bytes = tokio::io::copy(stdout, sink).await?;
    sink.flush().await?;
    let status = child.wait().await?;
    Ok((bytes, status))
}

async fn deadline(timeout: Option<Duration>) {
    match timeout {
        Some(after) => tokio::time::sleep(after).await,
        None => std::future::pending().await,
    }
}

async fn stop(child: &mut Child, stderr_task: Option<tokio::task::JoinHandle<io::Result<Vec<u8>>>>) {
    if let Err(e) = child.start_kill() {
        debug!(error = %e, "kill failed, child probably exited already");
    }
    if let Err(e) = child.wait().await {
        warn!(error = %e, "failed to reap child");
    }
    if let Some(task) = stderr_task {
        task.abort();
    }
}
