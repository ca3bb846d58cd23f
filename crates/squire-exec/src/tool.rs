//! Registry of the external tools squire shells out to

use crate::error::ExecError;
use std::path::{Path, PathBuf};

/// An external executable together with the guidance shown when it is missing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tool {
    /// Executable name looked up on `PATH`
    pub name: &'static str,

    /// Why squire needs it, in a few words
    pub purpose: &'static str,

    /// What the user should do to make it available
    pub guidance: &'static str,
}

impl Tool {
    /// Structural diff tool used by `squire diff`
    pub const PGQUARREL: Tool = Tool::new(
        "pgquarrel",
        "diffing schemas",
        "Please install pgquarrel prior to continuing.\n\nhttps://github.com/eulerto/pgquarrel",
    );

    /// Schema dump tool used for diff verification and `squire dump`
    pub const PG_DUMP: Tool = Tool::new(
        "pg_dump",
        "generating a schema dump. Schema dumps are used to verify that diffs are accurate",
        "Please install \"pg_dump\" and try again. The \"pg_dump\" program is usually \
         shipped with PostgreSQL.",
    );

    /// Interactive client started by `squire console`
    pub const PSQL: Tool = Tool::new(
        "psql",
        "opening an interactive database console",
        "Please install \"psql\" and try again. The \"psql\" program is usually \
         shipped with PostgreSQL.",
    );

    /// Container runtime backing the dev database and scratch clones
    pub const DOCKER: Tool = Tool::new(
        "docker",
        "running the development database and the temporary databases used by diff and test",
        "Please install Docker and make sure the daemon is running.\n\nhttps://docs.docker.com/get-docker/",
    );

    pub const fn new(name: &'static str, purpose: &'static str, guidance: &'static str) -> Self {
        Self {
            name,
            purpose,
            guidance,
        }
    }

    /// Resolve the executable on `PATH`
    pub fn resolve(&self) -> Result<PathBuf, ExecError> {
        lookup_path(self.name).ok_or(ExecError::ToolNotFound { tool: *self })
    }

    /// Full user-facing explanation for a missing tool
    pub fn missing_detail(&self) -> String {
        format!(
            "The program \"{}\" could not be found. {} is required for {}.\n{}",
            self.name, self.name, self.purpose, self.guidance
        )
    }
}

impl std::fmt::Display for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name)
    }
}

/// Find an executable by name on `PATH`.
///
/// Names containing a path separator are checked as given.
pub fn lookup_path(name: &str) -> Option<PathBuf> {
    let direct = Path::new(name);
    if direct.components().count() > 1 {
        return is_executable(direct).then(|| direct.to_path_buf());
    }

    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths).find_map(|dir| {
        let candidate = dir.join(name);
        if is_executable(&candidate) {
            return Some(candidate);
        }
        if cfg!(windows) {
            let exe = candidate.with_extension("exe");
            if is_executable(&exe) {
                return Some(exe);
            }
        }
        None
    })
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_tool_reports_guidance() {
        let tool = Tool::new("squire-no-such-binary", "testing", "Install it.");
        let err = tool.resolve().unwrap_err();
        assert!(matches!(err, ExecError::ToolNotFound { .. }));
        assert!(err.to_string().contains("squire-no-such-binary"));

        let detail = err.detail().unwrap();
        assert!(detail.contains("required for testing"));
        assert!(detail.contains("Install it."));
    }

    #[cfg(unix)]
    #[test]
    fn finds_shell() {
        let found = lookup_path("sh").expect("sh on PATH");
        assert!(found.ends_with("sh"));
    }

    #[cfg(unix)]
    #[test]
    fn absolute_path_checked_directly() {
        assert_eq!(lookup_path("/bin/sh"), Some(PathBuf::from("/bin/sh")));
        assert_eq!(lookup_path("/definitely/not/here"), None);
    }

    #[test]
    fn builtin_tools_explain_themselves() {
        for tool in [Tool::PGQUARREL, Tool::PG_DUMP, Tool::PSQL, Tool::DOCKER] {
            let detail = tool.missing_detail();
            assert!(detail.contains(tool.name));
            assert!(detail.contains("required for"));
        }
    }
}
