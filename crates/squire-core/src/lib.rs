//! Squire Core
//!
//! Shared domain model for the squire workspace: project configuration,
//! source positions inside executed SQL, and the versioned diff report.

pub mod config;
pub mod location;
pub mod report;

pub use config::{Config, ConfigError, DevConfig, DiffConfig, ProductionConfig, TestConfig, CONFIG_FILENAME};
pub use location::{position_to_line_col, Location};
pub use report::{DiffReport, ReportVersion, TargetKind, VerificationStatus};
