//! Database operations the verifier depends on

/// Error type returned by [`SchemaOps`] implementations
pub type OpsError = Box<dyn std::error::Error + Send + Sync>;

/// The handful of things verification needs to do to a database.
///
/// Every database is addressed by connection URI.
#[async_trait::async_trait]
pub trait SchemaOps: Send + Sync {
    /// Structure-only dump of the database
    async fn dump(&self, uri: &str) -> Result<String, OpsError>;

    /// Drop and recreate the database, then load `schema` into it
    async fn reset(&self, uri: &str, schema: &str) -> Result<(), OpsError>;

    /// Execute `sql` against the database
    async fn apply(&self, uri: &str, sql: &str) -> Result<(), OpsError>;
}
