//! Handing the terminal over to an interactive program

use crate::error::ExecError;
use crate::tool::Tool;
use std::process::Command;
use tracing::debug;

/// Run `tool` with `args` on this process's terminal.
///
/// On unix the current process image is replaced, so this only returns on
/// failure. Elsewhere the child inherits stdio and its exit code is
/// returned once it finishes.
pub fn hand_over(tool: Tool, args: &[&str]) -> Result<i32, ExecError> {
    let program = tool.resolve()?;
    debug!(program = %program.display(), ?args, "handing over terminal");

    let mut command = Command::new(&program);
    command.args(args);
    replace(command, tool.name)
}

#[cfg(unix)]
fn replace(mut command: Command, name: &str) -> Result<i32, ExecError> {
    use std::os::unix::process::CommandExt;

    let source = command.exec();
    Err(ExecError::Spawn {
        program: name.to_string(),
        source,
    })
}

#[cfg(not(unix))]
fn replace(mut command: Command, name: &str) -> Result<i32, ExecError> {
    let status = command.status().map_err(|source| ExecError::Spawn {
        program: name.to_string(),
        source,
    })?;
    Ok(status.code().unwrap_or(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_program_is_reported_not_started() {
        let tool = Tool::new("squire-no-such-console", "testing", "Install it.");
        let err = hand_over(tool, &["postgres://localhost/db"]).unwrap_err();

        assert!(matches!(err, ExecError::ToolNotFound { tool } if tool.name == "squire-no-such-console"));
        assert!(err.detail().unwrap().contains("Install it."));
    }
}
