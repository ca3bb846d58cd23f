//! Database instance lifecycle abstraction

use squire_core::Config;
use squire_exec::ExecError;
use std::collections::BTreeMap;
use std::fmt;

/// Port PostgreSQL listens on inside the container
pub const POSTGRES_PORT: u16 = 5432;

/// Everything needed to create one database instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceSpec {
    /// Unique instance (container) name
    pub name: String,

    pub image: String,

    /// Host port to publish; `None` lets the runtime pick a free one
    pub port: Option<u16>,

    pub database: String,
    pub user: String,

    /// Extra environment for the container
    pub env: BTreeMap<String, String>,
}

impl InstanceSpec {
    /// The dev instance described by the project configuration
    pub fn dev(config: &Config) -> Self {
        let mut env = BTreeMap::new();
        env.insert("POSTGRES_HOST_AUTH_METHOD".to_string(), "trust".to_string());
        env.insert("POSTGRES_USER".to_string(), config.dev.user.clone());
        env.insert("POSTGRES_DB".to_string(), config.dev.database.clone());

        Self {
            name: config.dev_name(),
            image: config.dev.image.clone(),
            port: Some(config.dev.port),
            database: config.dev.database.clone(),
            user: config.dev.user.clone(),
            env,
        }
    }

    /// Same settings under the name `<name>-<suffix>` on a runtime-chosen
    /// port. No data is copied.
    pub fn clone_named(&self, suffix: &str) -> Self {
        Self {
            name: format!("{}-{}", self.name, suffix),
            port: None,
            ..self.clone()
        }
    }
}

/// Where a running instance can be reached
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub database: String,
}

impl Endpoint {
    /// Connection URI understood by both `tokio-postgres` and the
    /// PostgreSQL command-line tools
    pub fn conn_uri(&self) -> String {
        format!(
            "postgres://{}@{}:{}/{}?sslmode=disable",
            self.user, self.host, self.port, self.database
        )
    }
}

/// Lifecycle state of an instance, as reported by the runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceState {
    NotCreated,
    Created,
    Restarting,
    Running,
    Paused,
    Exited,
    Dead,

    /// Anything the runtime reports that is not listed above
    Other(String),
}

impl InstanceState {
    /// Parse a runtime state string, case-insensitively
    pub fn parse(state: &str) -> Self {
        match state.trim().to_ascii_lowercase().as_str() {
            "not-created" => InstanceState::NotCreated,
            "created" => InstanceState::Created,
            "restarting" => InstanceState::Restarting,
            "running" => InstanceState::Running,
            "paused" => InstanceState::Paused,
            "exited" => InstanceState::Exited,
            "dead" => InstanceState::Dead,
            other => InstanceState::Other(other.to_string()),
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, InstanceState::Running)
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InstanceState::NotCreated => "not-created",
            InstanceState::Created => "created",
            InstanceState::Restarting => "restarting",
            InstanceState::Running => "running",
            InstanceState::Paused => "paused",
            InstanceState::Exited => "exited",
            InstanceState::Dead => "dead",
            InstanceState::Other(other) => other,
        })
    }
}

/// Errors from a container runtime
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error("instance {name} is not running")]
    NotRunning { name: String },

    #[error("unexpected runtime output for {name}: {message}")]
    Unexpected { name: String, message: String },

    #[error("output capture failed: {0}")]
    Io(#[from] std::io::Error),
}

impl RuntimeError {
    pub fn detail(&self) -> Option<String> {
        match self {
            RuntimeError::Exec(e) => e.detail(),
            _ => None,
        }
    }
}

/// Starts, stops and inspects database instances
#[async_trait::async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Create and start the instance if needed; a running instance is left
    /// alone
    async fn up(&self, spec: &InstanceSpec) -> Result<Endpoint, RuntimeError>;

    /// Stop the instance and remove it along with its data. Removing an
    /// instance that does not exist succeeds.
    async fn down(&self, spec: &InstanceSpec) -> Result<(), RuntimeError>;

    async fn status(&self, spec: &InstanceSpec) -> Result<InstanceState, RuntimeError>;

    /// Connection endpoint of a running instance
    async fn endpoint(&self, spec: &InstanceSpec) -> Result<Endpoint, RuntimeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dev_spec_from_config() {
        let mut config = Config::default();
        config.dev.name = Some("shop".to_string());

        let spec = InstanceSpec::dev(&config);
        assert_eq!(spec.name, "shop");
        assert_eq!(spec.image, "postgres:13.4");
        assert_eq!(spec.port, Some(5432));
        assert_eq!(spec.env.get("POSTGRES_HOST_AUTH_METHOD").map(String::as_str), Some("trust"));
    }

    #[test]
    fn clones_get_suffix_and_free_port() {
        let mut config = Config::default();
        config.dev.name = Some("shop".to_string());

        let clone = InstanceSpec::dev(&config).clone_named("diff-1700000000");
        assert_eq!(clone.name, "shop-diff-1700000000");
        assert_eq!(clone.port, None);
        assert_eq!(clone.database, "squire");
    }

    #[test]
    fn conn_uri_format() {
        let endpoint = Endpoint {
            host: "127.0.0.1".to_string(),
            port: 49153,
            user: "postgres".to_string(),
            database: "squire".to_string(),
        };
        assert_eq!(endpoint.conn_uri(), "postgres://postgres@127.0.0.1:49153/squire?sslmode=disable");
    }

    #[test]
    fn state_parsing() {
        assert_eq!(InstanceState::parse("Running\n"), InstanceState::Running);
        assert_eq!(InstanceState::parse("exited"), InstanceState::Exited);
        assert_eq!(InstanceState::parse("removing"), InstanceState::Other("removing".to_string()));
        assert_eq!(InstanceState::NotCreated.to_string(), "not-created");
        assert!(InstanceState::Running.is_running());
    }
}
