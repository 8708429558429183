//! End-to-end load tests against a live PostgreSQL instance.
//!
//! These tests are marked `#[ignore]` and run with `cargo test -- --ignored`
//! once `STAGELOAD_DB_*` points at a database the test role can create
//! schemas in. Each test provisions its own tables under dedicated schemas
//! so repeated runs start clean.

use std::io::Write as _;
use std::path::PathBuf;

use sqlx::{PgConnection, Row};
use stageload_etl::audit::{ProcessLogger, ETL_PROCESS};
use stageload_etl::config::{AuditConfig, EtlConfig};
use stageload_etl::mapping::{find, standard_mappings};
use stageload_etl::{loader, pipeline, EtlError};

const TEST_SCHEMA: &str = "stageload_test";
const TEST_LOG_SCHEMA: &str = "stageload_test_logs";

async fn connect() -> PgConnection {
    let config = EtlConfig::load().expect("config");
    pipeline::connect(&config.database).await.expect("connect")
}

fn test_audit() -> AuditConfig {
    AuditConfig {
        schema: TEST_LOG_SCHEMA.to_string(),
        table: "etl_logs".to_string(),
    }
}

async fn provision(conn: &mut PgConnection) {
    let statements = [
        format!("CREATE SCHEMA IF NOT EXISTS {TEST_SCHEMA}"),
        format!("CREATE SCHEMA IF NOT EXISTS {TEST_LOG_SCHEMA}"),
        format!(
            "CREATE TABLE IF NOT EXISTS {TEST_LOG_SCHEMA}.etl_logs (\
               process_name text NOT NULL,\
               start_time timestamptz NOT NULL,\
               end_time timestamptz,\
               status text NOT NULL,\
               rows_processed bigint,\
               error_message text)"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {TEST_SCHEMA}.ft_balance_f (\
               on_date date,\
               account_rk bigint,\
               currency_rk bigint,\
               balance_out double precision)"
        ),
        format!("TRUNCATE TABLE {TEST_LOG_SCHEMA}.etl_logs"),
        format!("TRUNCATE TABLE {TEST_SCHEMA}.ft_balance_f"),
    ];
    for statement in &statements {
        sqlx::query(statement).execute(&mut *conn).await.expect("provision");
    }
}

fn balance_extract(rows: usize) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    writeln!(file, "on_date;account_rk;currency_rk;balance_out").unwrap();
    for i in 0..rows {
        writeln!(file, "31.01.2018;{};810;{}.25", 1000 + i, i).unwrap();
    }
    file.flush().unwrap();
    file
}

async fn table_count(conn: &mut PgConnection) -> i64 {
    sqlx::query_scalar(&format!("SELECT count(*) FROM {TEST_SCHEMA}.ft_balance_f"))
        .fetch_one(conn)
        .await
        .expect("count")
}

async fn last_audit_row(conn: &mut PgConnection, process: &str) -> (String, Option<i64>, Option<String>) {
    let row = sqlx::query(&format!(
        "SELECT status, rows_processed, error_message \
         FROM {TEST_LOG_SCHEMA}.etl_logs \
         WHERE process_name = $1 AND status <> 'STARTED' \
         ORDER BY end_time DESC LIMIT 1"
    ))
    .bind(process)
    .fetch_one(conn)
    .await
    .expect("audit row");
    (row.get(0), row.get(1), row.get(2))
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database (set STAGELOAD_DB_*)"]
async fn loads_2500_rows_in_three_batches() {
    let mut conn = connect().await;
    provision(&mut conn).await;

    let mappings = standard_mappings();
    let balance = find(&mappings, "ft_balance_f").unwrap();
    let extract = balance_extract(2500);
    let logger = ProcessLogger::new(&test_audit());

    let rows = loader::load(&mut conn, &logger, TEST_SCHEMA, balance, extract.path())
        .await
        .expect("load");

    assert_eq!(rows, 2500);
    assert_eq!(table_count(&mut conn).await, 2500);

    let (status, rows_processed, error) = last_audit_row(&mut conn, "LOAD_ft_balance_f").await;
    assert_eq!(status, "COMPLETED");
    assert_eq!(rows_processed, Some(2500));
    assert_eq!(error, None);
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database (set STAGELOAD_DB_*)"]
async fn unparseable_dates_are_skipped_not_fatal() {
    let mut conn = connect().await;
    provision(&mut conn).await;

    let mut extract = tempfile::NamedTempFile::new().unwrap();
    writeln!(extract, "on_date;account_rk;currency_rk;balance_out").unwrap();
    writeln!(extract, "31.01.2018;1;810;1.5").unwrap();
    writeln!(extract, "not-a-date;2;810;2.5").unwrap();
    writeln!(extract, "2018-01-31;garbage;810;still-loads").unwrap();
    extract.flush().unwrap();

    let mappings = standard_mappings();
    let balance = find(&mappings, "ft_balance_f").unwrap();
    let logger = ProcessLogger::new(&test_audit());

    let rows = loader::load(&mut conn, &logger, TEST_SCHEMA, balance, extract.path())
        .await
        .expect("load");

    // Row 2 is dropped for its date; row 3 survives with nulled numerics.
    assert_eq!(rows, 2);
    assert_eq!(table_count(&mut conn).await, 2);
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database (set STAGELOAD_DB_*)"]
async fn missing_column_aborts_before_any_insert() {
    let mut conn = connect().await;
    provision(&mut conn).await;

    let mut extract = tempfile::NamedTempFile::new().unwrap();
    writeln!(extract, "on_date;account_rk;currency_rk").unwrap();
    writeln!(extract, "31.01.2018;1;810").unwrap();
    extract.flush().unwrap();

    let mappings = standard_mappings();
    let balance = find(&mappings, "ft_balance_f").unwrap();
    let logger = ProcessLogger::new(&test_audit());

    let err = loader::load(&mut conn, &logger, TEST_SCHEMA, balance, extract.path())
        .await
        .unwrap_err();

    match err {
        EtlError::Load { table, source } => {
            assert_eq!(table, "ft_balance_f");
            assert!(matches!(*source, EtlError::MissingColumns { .. }));
        },
        other => panic!("unexpected error: {other}"),
    }

    assert_eq!(table_count(&mut conn).await, 0);

    let (status, rows_processed, error) = last_audit_row(&mut conn, "LOAD_ft_balance_f").await;
    assert_eq!(status, "FAILED");
    assert_eq!(rows_processed, Some(0));
    assert!(error.unwrap().contains("balance_out"));
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database (set STAGELOAD_DB_*)"]
async fn failed_load_leaves_no_completed_pipeline_row() {
    let mut conn = connect().await;
    provision(&mut conn).await;

    // Point the pipeline at a data directory where the first table's extract
    // is malformed (missing a mapped column); the run must stop there.
    let dir = tempfile::tempdir().unwrap();
    for table in stageload_etl::config::STAGING_TABLES {
        std::fs::write(
            dir.path().join(format!("{table}.csv")),
            "not_a_mapped_column\nvalue\n",
        )
        .unwrap();
    }

    let mut config = EtlConfig::load().expect("config");
    config.data_dir = dir.path().to_path_buf();
    config.staging_schema = TEST_SCHEMA.to_string();
    config.audit = test_audit();

    let err = pipeline::run(&config).await.unwrap_err();
    assert!(matches!(err, EtlError::Load { .. }));

    let statuses: Vec<String> = sqlx::query_scalar(&format!(
        "SELECT status FROM {TEST_LOG_SCHEMA}.etl_logs WHERE process_name = $1"
    ))
    .bind(ETL_PROCESS)
    .fetch_all(&mut conn)
    .await
    .expect("statuses");
    assert!(statuses.contains(&"STARTED".to_string()));
    assert!(!statuses.contains(&"COMPLETED".to_string()));

    // Fail-fast: nothing after the first table was attempted.
    let later: i64 = sqlx::query_scalar(&format!(
        "SELECT count(*) FROM {TEST_LOG_SCHEMA}.etl_logs WHERE process_name = 'LOAD_ft_posting_f'"
    ))
    .fetch_one(&mut conn)
    .await
    .expect("count");
    assert_eq!(later, 0);
}

// No database needed: the file check rejects the run before connecting.
#[tokio::test]
async fn missing_extract_fails_before_connecting() {
    let dir = tempfile::tempdir().unwrap();
    let config = EtlConfig {
        data_dir: PathBuf::from(dir.path()),
        ..EtlConfig::default()
    };

    let err = pipeline::run(&config).await.unwrap_err();
    assert!(matches!(err, EtlError::Config(_)));
    assert!(err.to_string().contains("ft_balance_f.csv"));
}
