use squire_core::Location;

/// Database errors
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("invalid connection URL: {message}")]
    InvalidUrl { message: String },

    #[error("connection URL does not name a database")]
    MissingDatabaseName,

    #[error("could not connect to database: {0}")]
    Connect(#[source] tokio_postgres::Error),

    #[error("database did not become ready after {attempts} attempts: {source}")]
    NotReady {
        attempts: u32,
        #[source]
        source: tokio_postgres::Error,
    },

    #[error("cancelled while connecting to the database")]
    Cancelled,

    #[error("error executing SQL{}: {message}", location_suffix(*line, *column))]
    SqlExecution {
        message: String,

        /// SQLSTATE code
        code: String,

        line: Option<usize>,
        column: Option<usize>,

        /// Server-provided detail and hint, if any
        detail: Option<String>,
    },

    #[error("query failed: {0}")]
    Query(#[source] tokio_postgres::Error),
}

impl DbError {
    /// Extended guidance for the user, when there is any
    pub fn detail(&self) -> Option<String> {
        match self {
            DbError::SqlExecution {
                line: Some(line),
                column: Some(column),
                detail,
                ..
            } => {
                let mut text = format!(
                    "The error occurred at {} of the executed SQL.",
                    Location::new(*line, *column)
                );
                if let Some(detail) = detail {
                    text.push_str("\n\n");
                    text.push_str(detail);
                }
                Some(text)
            }
            DbError::SqlExecution { detail, .. } => detail.clone(),
            DbError::NotReady { .. } => Some(
                "The database did not accept connections in time. Check that the \
                 container is running (`squire status`) and inspect its logs with \
                 `docker logs`."
                    .to_string(),
            ),
            _ => None,
        }
    }
}

fn location_suffix(line: Option<usize>, column: Option<usize>) -> String {
    match (line, column) {
        (Some(line), Some(column)) => format!(" at {}", Location::new(line, column)),
        _ => String::new(),
    }
}
