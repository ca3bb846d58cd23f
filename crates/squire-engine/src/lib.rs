//! Workflow orchestration for squire
//!
//! [`Squire`] ties the pieces together: it assembles the schema, manages
//! the dev database and its disposable clones through a
//! [`ContainerRuntime`], runs the structural diff tool, and optionally
//! verifies the diff. Scratch instances are always torn down, whatever
//! happened before.
//!
//! All external effects go through injected capabilities
//! ([`ContainerRuntime`], [`SchemaOps`], [`QueryOps`], [`DiffTool`]) so the
//! workflows can be exercised without Docker or PostgreSQL.

pub mod container;
pub mod differ;
pub mod docker;
pub mod error;
pub mod ops;
pub mod squire;
mod tee;

pub use container::{ContainerRuntime, Endpoint, InstanceSpec, InstanceState, RuntimeError, POSTGRES_PORT};
pub use differ::{DiffTool, PgQuarrel};
pub use docker::DockerRuntime;
pub use error::{EngineError, ScratchPurpose};
pub use ops::{LiveSchemaOps, QueryOps};
pub use squire::{Backends, DeployPlan, DiffOptions, Squire, GENERATION_TIME_KEY, PGUNIT_SQL};
pub use squire_verify::{OpsError, SchemaOps};
