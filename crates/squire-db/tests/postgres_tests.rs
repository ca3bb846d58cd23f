//! Integration tests against a live PostgreSQL server
//!
//! These need a disposable server whose superuser may drop and create
//! databases, so they are marked with `#[ignore]`.
//!
//! ## Running Tests
//!
//! ```bash
//! docker run -d --rm -p 5433:5432 -e POSTGRES_HOST_AUTH_METHOD=trust postgres:13.4
//! SQUIRE_TEST_PGURI=postgres://postgres@127.0.0.1:5433/squire_test?sslmode=disable \
//! cargo test -p squire-db --test postgres_tests -- --ignored
//! ```

use squire_db::{recreate_database, Database, DbError, ReadinessPolicy, Value};
use tokio_util::sync::CancellationToken;

fn test_url() -> Option<String> {
    let url = std::env::var("SQUIRE_TEST_PGURI").ok();
    if url.is_none() {
        eprintln!("Skipping PostgreSQL test: SQUIRE_TEST_PGURI is not set");
    }
    url
}

async fn fresh(url: &str) -> Database {
    recreate_database(url).await.unwrap();
    Database::connect_ready(url, ReadinessPolicy::default(), &CancellationToken::new())
        .await
        .unwrap()
}

#[tokio::test]
#[ignore]
async fn execute_and_query() {
    let Some(url) = test_url() else { return };
    let db = fresh(&url).await;

    db.execute("CREATE TABLE users (id int8, name text, active bool);\nINSERT INTO users VALUES (1, 'ada', true), (2, NULL, false);")
        .await
        .unwrap();

    let table = db.query_table("SELECT id, name, active FROM users ORDER BY id").await.unwrap();
    assert_eq!(table.columns, vec!["id", "name", "active"]);
    assert_eq!(
        table.rows,
        vec![
            vec![Value::Int(1), Value::Text("ada".into()), Value::Bool(true)],
            vec![Value::Int(2), Value::Null, Value::Bool(false)],
        ]
    );
}

#[tokio::test]
#[ignore]
async fn syntax_error_reports_line_and_column() {
    let Some(url) = test_url() else { return };
    let db = fresh(&url).await;

    let err = db
        .execute("CREATE TABLE a (id int);\nCREATE TABLEX b (id int);\n")
        .await
        .unwrap_err();

    match &err {
        DbError::SqlExecution { line, column, code, .. } => {
            assert_eq!(*line, Some(2));
            assert_eq!(*column, Some(8));
            assert_eq!(code, "42601");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.detail().unwrap().contains("line 2, column 8"));
}

#[tokio::test]
#[ignore]
async fn recreate_drops_everything() {
    let Some(url) = test_url() else { return };
    let db = fresh(&url).await;
    db.execute("CREATE TABLE leftover (id int);").await.unwrap();
    drop(db);

    let db = fresh(&url).await;
    let table = db
        .query_table("SELECT count(*)::int8 AS n FROM pg_tables WHERE tablename = 'leftover'")
        .await
        .unwrap();
    assert_eq!(table.rows, vec![vec![Value::Int(0)]]);
}

#[tokio::test]
async fn unreachable_server_exhausts_quickly() {
    let policy = ReadinessPolicy {
        interval: std::time::Duration::from_millis(5),
        deadline: std::time::Duration::from_millis(50),
    };
    let err = Database::connect_ready(
        "postgres://postgres@127.0.0.1:1/squire?connect_timeout=1",
        policy,
        &CancellationToken::new(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, DbError::NotReady { .. }));
    assert!(err.detail().is_some());
}

#[tokio::test]
async fn single_attempt_failure_is_connect_error() {
    let err = Database::connect("postgres://postgres@127.0.0.1:1/squire?connect_timeout=1")
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Connect(_)));
}
