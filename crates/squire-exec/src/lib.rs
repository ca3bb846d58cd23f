//! External process plumbing
//!
//! Everything squire needs from third-party binaries (`pgquarrel`,
//! `pg_dump`, `docker`) goes through [`ProcessRunner`]: the executable is
//! resolved on `PATH` up front so a missing tool is reported with
//! installation guidance, stdout is streamed into a caller-supplied sink,
//! and the child is killed promptly when the run is cancelled.
//!
//! [`capture`] covers the other direction: temporarily redirecting this
//! process's own stdout/stderr file descriptors for code that insists on
//! writing to them. Interactive programs such as `psql` are not run at all
//! but handed the terminal through [`handoff`].

pub mod capture;
pub mod error;
pub mod handoff;
pub mod runner;
pub mod tool;

pub use error::ExecError;
pub use handoff::hand_over;
pub use runner::{ProcessRunner, RunOptions, RunOutput, StderrPolicy, StdinPolicy};
pub use tool::{lookup_path, Tool};
pub use tokio_util::sync::CancellationToken;
