//! In-memory [`SchemaOps`] for tests
//!
//! Each URI maps to the text its dump returns. `reset` replaces that text
//! with the loaded schema, and `apply` either swaps in a registered result
//! for the exact SQL or appends the SQL to the current text.
//!
//! ```rust,ignore
//! let ops = MockSchemaOps::new()
//!     .with_database("ref", "CREATE TABLE a (id int, name text);")
//!     .with_database("target", "CREATE TABLE a (id int);")
//!     .with_apply_result("ALTER TABLE a ADD name text;", "CREATE TABLE a (id int, name text);");
//! ```

use crate::ops::{OpsError, SchemaOps};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

/// One recorded call against the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpsCall {
    Dump(String),
    Reset(String),
    Apply(String),
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct MockOpsError(String);

#[derive(Default)]
struct State {
    dumps: HashMap<String, String>,
    calls: Vec<OpsCall>,
}

/// Mock database operations keyed by URI
#[derive(Default, Clone)]
pub struct MockSchemaOps {
    state: Arc<RwLock<State>>,
    apply_results: HashMap<String, String>,
    failing_dumps: HashSet<String>,
    fail_reset: bool,
    apply_failure: Option<String>,
}

impl MockSchemaOps {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a database whose dump returns `dump`
    pub fn with_database(self, uri: &str, dump: &str) -> Self {
        self.write().dumps.insert(uri.to_string(), dump.to_string());
        self
    }

    /// After `sql` is applied to any database, its dump returns `result`
    pub fn with_apply_result(mut self, sql: &str, result: &str) -> Self {
        self.apply_results.insert(sql.to_string(), result.to_string());
        self
    }

    /// Make dumps of `uri` fail
    pub fn with_dump_failure(mut self, uri: &str) -> Self {
        self.failing_dumps.insert(uri.to_string());
        self
    }

    pub fn with_reset_failure(mut self) -> Self {
        self.fail_reset = true;
        self
    }

    /// Make every apply fail with `message`
    pub fn with_apply_failure(mut self, message: &str) -> Self {
        self.apply_failure = Some(message.to_string());
        self
    }

    /// Every call made so far, in order
    pub fn calls(&self) -> Vec<OpsCall> {
        self.read().calls.clone()
    }

    /// Current dump text of `uri`
    pub fn dump_of(&self, uri: &str) -> Option<String> {
        self.read().dumps.get(uri).cloned()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait::async_trait]
impl SchemaOps for MockSchemaOps {
    async fn dump(&self, uri: &str) -> Result<String, OpsError> {
        let mut state = self.write();
        state.calls.push(OpsCall::Dump(uri.to_string()));
        if self.failing_dumps.contains(uri) {
            return Err(Box::new(MockOpsError(format!("pg_dump: connection to {uri} failed"))));
        }
        state
            .dumps
            .get(uri)
            .cloned()
            .ok_or_else(|| Box::new(MockOpsError(format!("database {uri} does not exist"))) as OpsError)
    }

    async fn reset(&self, uri: &str, schema: &str) -> Result<(), OpsError> {
        let mut state = self.write();
        state.calls.push(OpsCall::Reset(uri.to_string()));
        if self.fail_reset {
            return Err(Box::new(MockOpsError("reset failed".to_string())));
        }
        state.dumps.insert(uri.to_string(), schema.to_string());
        Ok(())
    }

    async fn apply(&self, uri: &str, sql: &str) -> Result<(), OpsError> {
        let mut state = self.write();
        state.calls.push(OpsCall::Apply(uri.to_string()));
        if let Some(message) = &self.apply_failure {
            return Err(Box::new(MockOpsError(message.clone())));
        }
        let next = match self.apply_results.get(sql) {
            Some(result) => result.clone(),
            None => format!("{}{}", state.dumps.get(uri).cloned().unwrap_or_default(), sql),
        };
        state.dumps.insert(uri.to_string(), next);
        Ok(())
    }
}
