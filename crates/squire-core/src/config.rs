//! Configuration schema (.squire.toml)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration filename, searched for in the working directory
/// and then each parent directory.
pub const CONFIG_FILENAME: &str = ".squire.toml";

/// Development database settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DevConfig {
    /// Container image used for the dev database and every scratch clone
    pub image: String,

    /// Container name. Defaults to `<project dir>-default` when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Host port published for the dev database
    pub port: u16,

    /// Logical database name created inside the instance
    pub database: String,

    /// Database superuser
    pub user: String,
}

impl Default for DevConfig {
    fn default() -> Self {
        Self {
            image: "postgres:13.4".to_string(),
            name: None,
            port: 5432,
            database: "squire".to_string(),
            user: "postgres".to_string(),
        }
    }
}

/// Production database settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductionConfig {
    /// Environment variable holding the production connection URI
    pub env: String,
}

impl Default for ProductionConfig {
    fn default() -> Self {
        Self {
            env: "PGURI".to_string(),
        }
    }
}

/// Diff settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffConfig {
    /// Verify every diff against a dump clone of the target
    pub verify: bool,
}

/// SQL unit test settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestConfig {
    /// Query executed after the schema (with tests) is loaded
    pub query: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            query: "select * from pgunit.test_run_all()".to_string(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Root directory of the SQL fragment tree
    #[serde(default = "default_sql_dir")]
    pub sql_dir: PathBuf,

    /// Development database
    #[serde(default)]
    pub dev: DevConfig,

    /// Production database
    #[serde(default)]
    pub production: ProductionConfig,

    /// Diff behaviour
    #[serde(default)]
    pub diff: DiffConfig,

    /// SQL unit tests
    #[serde(default)]
    pub test: TestConfig,

    /// Project root path (for resolving relative paths)
    #[serde(skip)]
    pub project_root: PathBuf,
}

fn default_sql_dir() -> PathBuf {
    PathBuf::from("sql")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sql_dir: default_sql_dir(),
            dev: DevConfig::default(),
            production: ProductionConfig::default(),
            diff: DiffConfig::default(),
            test: TestConfig::default(),
            project_root: std::env::current_dir().unwrap_or_default(),
        }
    }
}

impl Config {
    /// Load config from TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        let mut config = Self::from_toml(&contents)?;

        config.project_root = config_dir(path)?;
        Ok(config)
    }

    /// Load config from TOML string
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Find and load the nearest config file starting at `start`, falling
    /// back to defaults rooted at `start` when none exists.
    pub fn discover(start: &Path) -> Result<Self, ConfigError> {
        match find_config_path(start, CONFIG_FILENAME)? {
            Some(path) => Self::from_file(&path),
            None => Ok(Self {
                project_root: start.to_path_buf(),
                ..Self::default()
            }),
        }
    }

    /// Serialize to pretty TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))
    }

    /// Fragment root, resolved against the project root
    pub fn sql_root(&self) -> PathBuf {
        if self.sql_dir.is_absolute() {
            self.sql_dir.clone()
        } else {
            self.project_root.join(&self.sql_dir)
        }
    }

    /// Name of the dev database instance
    pub fn dev_name(&self) -> String {
        if let Some(name) = &self.dev.name {
            return name.clone();
        }

        let base = self
            .project_root
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("squire");
        format!("{}-default", base)
    }

    /// Production connection URI, read from the configured environment variable
    pub fn prod_url(&self) -> Result<String, ConfigError> {
        match std::env::var(&self.production.env) {
            Ok(url) if !url.trim().is_empty() => Ok(url),
            _ => Err(ConfigError::MissingProductionUrl {
                env: self.production.env.clone(),
            }),
        }
    }
}

/// Directory holding the config file at `path`. A bare file name lives in
/// the working directory.
fn config_dir(path: &Path) -> Result<PathBuf, ConfigError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => Ok(parent.to_path_buf()),
        _ => std::env::current_dir().map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Look for `filename` in `start` and then in each parent directory.
///
/// Returns `Ok(None)` when the filesystem root is reached without a match.
/// Errors other than "not found" while probing abort the search.
pub fn find_config_path(start: &Path, filename: &str) -> Result<Option<PathBuf>, ConfigError> {
    let mut dir = Some(start);

    while let Some(current) = dir {
        let candidate = current.join(filename);
        match std::fs::metadata(&candidate) {
            Ok(_) => return Ok(Some(candidate)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(ConfigError::Io {
                    path: candidate,
                    source: e,
                })
            }
        }
        dir = current.parent();
    }

    Ok(None)
}

/// Config error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Serialize error: {0}")]
    Serialize(String),

    #[error("production database URL not set: environment variable {env} is empty")]
    MissingProductionUrl { env: String },
}

impl ConfigError {
    /// Extended guidance for the user, when there is any
    pub fn detail(&self) -> Option<String> {
        match self {
            Self::MissingProductionUrl { env } => Some(format!(
                "The production connection URI is read from the \"{env}\" environment \
                 variable. Set it (or add it to a .env file) or change \
                 [production].env in {CONFIG_FILENAME}."
            )),
            _ => None,
        }
    }
}
