use crate::tool::Tool;
use std::process::ExitStatus;
use std::time::Duration;

/// Errors running an external program
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("{} could not be found on PATH", tool.name)]
    ToolNotFound { tool: Tool },

    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error while running {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} was cancelled")]
    Cancelled { program: String },

    #[error("{program} did not finish within {after:?}")]
    TimedOut { program: String, after: Duration },

    #[error("{program} exited with {status}{}", stderr_suffix(stderr))]
    Failed {
        program: String,
        status: ExitStatus,
        stderr: String,
    },
}

impl ExecError {
    /// Extended guidance for the user, when there is any
    pub fn detail(&self) -> Option<String> {
        match self {
            ExecError::ToolNotFound { tool } => Some(tool.missing_detail()),
            _ => None,
        }
    }

    /// The tool that was missing, if that is what went wrong
    pub fn missing_tool(&self) -> Option<&Tool> {
        match self {
            ExecError::ToolNotFound { tool } => Some(tool),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ExecError::Cancelled { .. })
    }
}

fn stderr_suffix(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(": {}", trimmed)
    }
}
