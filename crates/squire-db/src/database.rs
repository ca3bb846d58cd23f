//! Connections and SQL execution

use crate::error::DbError;
use crate::readiness::{wait_ready, ReadinessError, ReadinessPolicy};
use crate::value::ResultTable;
use squire_core::position_to_line_col;
use std::time::Duration;
use tokio_postgres::error::ErrorPosition;
use tokio_postgres::{Client, Config as PgConfig, NoTls};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, warn, Instrument};

/// Applied when the URL does not set its own `connect_timeout`
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// An open connection to one logical database
pub struct Database {
    client: Client,
    dbname: Option<String>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").field("dbname", &self.dbname).finish()
    }
}

impl Database {
    /// Single connection attempt
    pub async fn connect(url: &str) -> Result<Self, DbError> {
        Self::connect_config(parse_url(url)?).await
    }

    /// Connect, retrying under `policy` until the server accepts us
    pub async fn connect_ready(
        url: &str,
        policy: ReadinessPolicy,
        cancel: &CancellationToken,
    ) -> Result<Self, DbError> {
        let config = parse_url(url)?;
        let attempt = || open(config.clone());

        match wait_ready(attempt, policy, cancel).await {
            Ok(db) => Ok(db),
            Err(ReadinessError::Exhausted { attempts, last }) => {
                warn!(attempts, error = %last, "database never became ready");
                Err(DbError::NotReady {
                    attempts,
                    source: last,
                })
            }
            Err(ReadinessError::Cancelled) => Err(DbError::Cancelled),
        }
    }

    pub(crate) async fn connect_config(config: PgConfig) -> Result<Self, DbError> {
        open(config).await.map_err(DbError::Connect)
    }

    pub fn dbname(&self) -> Option<&str> {
        self.dbname.as_deref()
    }

    /// Execute a whole SQL document (any number of statements)
    pub async fn execute(&self, sql: &str) -> Result<(), DbError> {
        let span = info_span!("execute", bytes = sql.len());
        async {
            self.client
                .batch_execute(sql)
                .await
                .map_err(|e| execution_error(sql, e))?;
            debug!("SQL executed");
            Ok(())
        }
        .instrument(span)
        .await
    }

    /// Run one query and decode every row
    pub async fn query_table(&self, sql: &str) -> Result<ResultTable, DbError> {
        let statement = self
            .client
            .prepare(sql)
            .await
            .map_err(|e| execution_error(sql, e))?;
        let rows = self
            .client
            .query(&statement, &[])
            .await
            .map_err(|e| execution_error(sql, e))?;
        ResultTable::from_rows(statement.columns(), &rows)
    }

    /// Simple liveness check
    pub async fn ping(&self) -> Result<(), DbError> {
        self.client
            .simple_query("SELECT 1")
            .await
            .map(|_| ())
            .map_err(DbError::Query)
    }
}

pub(crate) fn parse_url(url: &str) -> Result<PgConfig, DbError> {
    let mut config: PgConfig = url.parse().map_err(|e: tokio_postgres::Error| DbError::InvalidUrl {
        message: e.to_string(),
    })?;
    if config.get_connect_timeout().is_none() {
        config.connect_timeout(CONNECT_TIMEOUT);
    }
    Ok(config)
}

async fn open(config: PgConfig) -> Result<Database, tokio_postgres::Error> {
    let dbname = config.get_dbname().map(str::to_string);
    let (client, connection) = config.connect(NoTls).await?;

    let label = dbname.clone().unwrap_or_default();
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            warn!(database = %label, error = %e, "connection error");
        }
    });

    debug!(database = ?dbname, "connected");
    Ok(Database { client, dbname })
}

/// Attach a line/column to server errors that report a position in `sql`
fn execution_error(sql: &str, err: tokio_postgres::Error) -> DbError {
    let Some(db) = err.as_db_error() else {
        return DbError::Query(err);
    };

    let location = match db.position() {
        Some(ErrorPosition::Original(position)) => position_to_line_col(sql, *position as usize),
        _ => None,
    };

    let detail = match (db.detail(), db.hint()) {
        (Some(detail), Some(hint)) => Some(format!("{detail}\n\nHint: {hint}")),
        (Some(detail), None) => Some(detail.to_string()),
        (None, Some(hint)) => Some(format!("Hint: {hint}")),
        (None, None) => None,
    };

    DbError::SqlExecution {
        message: db.message().to_string(),
        code: db.code().code().to_string(),
        line: location.map(|l| l.line),
        column: location.map(|l| l.column),
        detail,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_parsing() {
        let config = parse_url("postgres://postgres@127.0.0.1:5432/squire?sslmode=disable").unwrap();
        assert_eq!(config.get_dbname(), Some("squire"));
        assert_eq!(config.get_user(), Some("postgres"));
        assert_eq!(config.get_connect_timeout(), Some(&CONNECT_TIMEOUT));
    }

    #[test]
    fn explicit_timeout_kept() {
        let config = parse_url("postgres://u@localhost/db?connect_timeout=1").unwrap();
        assert_eq!(config.get_connect_timeout(), Some(&Duration::from_secs(1)));
    }

    #[test]
    fn invalid_url() {
        assert!(matches!(
            parse_url("postgres://u@localhost/db?sslmode=bogus"),
            Err(DbError::InvalidUrl { .. })
        ));
    }
}
