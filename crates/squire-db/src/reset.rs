//! Recreating a logical database

use crate::database::{parse_url, Database};
use crate::error::DbError;
use tracing::{debug, info_span, Instrument};

/// Maintenance database used to drop and create the target
const MAINTENANCE_DB: &str = "postgres";

/// Drop and recreate the database named in `url`.
///
/// Connects through the `postgres` maintenance database on the same server.
/// Uses `WITH (FORCE)`, so other sessions are terminated; requires
/// PostgreSQL 13 or newer.
pub async fn recreate_database(url: &str) -> Result<(), DbError> {
    let mut config = parse_url(url)?;
    let name = config
        .get_dbname()
        .filter(|n| !n.is_empty())
        .ok_or(DbError::MissingDatabaseName)?
        .to_string();
    config.dbname(MAINTENANCE_DB);

    let span = info_span!("recreate_database", database = %name);
    async move {
        let admin = Database::connect_config(config).await?;
        let ident = quote_ident(&name);

        debug!("dropping");
        admin.execute(&format!("DROP DATABASE {ident} WITH (FORCE)")).await?;
        debug!("creating");
        admin.execute(&format!("CREATE DATABASE {ident}")).await?;
        Ok(())
    }
    .instrument(span)
    .await
}

/// Quote an SQL identifier, doubling embedded quotes
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
