//! Pipeline orchestration
//!
//! Drives the per-table loaders over the configured table list in order on a
//! single connection. The pipeline is fail-fast: the first table-level
//! failure aborts the run and no later table is attempted.

use chrono::Utc;
use sqlx::postgres::PgConnectOptions;
use sqlx::{Connection, PgConnection};
use tracing::{error, info, warn};

use crate::audit::{ProcessLogger, ProcessStatus, ETL_PROCESS};
use crate::config::{DatabaseConfig, EtlConfig};
use crate::loader;
use crate::mapping;
use stageload_common::{EtlError, Result};

/// Run the whole staging refresh described by `config`.
pub async fn run(config: &EtlConfig) -> Result<()> {
    let overall_start = Utc::now();
    info!("starting staging refresh");

    // Fail before touching the database if any extract is absent.
    check_files_exist(config)?;

    let mut conn = connect(&config.database).await?;
    let logger = ProcessLogger::new(&config.audit);
    logger.log_start(&mut conn, ETL_PROCESS, overall_start).await;

    let result = load_all(&mut conn, &logger, config).await;

    match &result {
        Ok(total_rows) => {
            logger
                .log_end(
                    &mut conn,
                    ETL_PROCESS,
                    overall_start,
                    Utc::now(),
                    ProcessStatus::Completed,
                    None,
                    None,
                )
                .await;
            let elapsed_secs = (Utc::now() - overall_start).num_seconds();
            info!(total_rows, elapsed_secs, "staging refresh completed");
        },
        Err(err) => {
            error!(error = %err, "staging refresh aborted");
        },
    }

    conn.close().await.ok();

    result.map(|_| ())
}

/// Verify every configured input file exists. All missing paths are
/// collected into one error so a single run reports the full shortfall.
pub fn check_files_exist(config: &EtlConfig) -> Result<()> {
    let missing: Vec<String> = config
        .input_files()
        .into_iter()
        .filter(|(_, path)| !path.exists())
        .map(|(_, path)| path.display().to_string())
        .collect();

    if missing.is_empty() {
        info!("all input files present");
        Ok(())
    } else {
        Err(EtlError::Config(format!(
            "missing input files: {}",
            missing.join(", ")
        )))
    }
}

/// Open the single connection used for the whole run.
pub async fn connect(database: &DatabaseConfig) -> Result<PgConnection> {
    let options = PgConnectOptions::new()
        .host(&database.host)
        .port(database.port)
        .database(&database.database)
        .username(&database.user)
        .password(&database.password);

    let conn = PgConnection::connect_with(&options).await?;
    info!(
        host = %database.host,
        database = %database.database,
        "connected to database"
    );
    Ok(conn)
}

async fn load_all(
    conn: &mut PgConnection,
    logger: &ProcessLogger,
    config: &EtlConfig,
) -> Result<u64> {
    let mappings = mapping::standard_mappings();
    let mut total_rows: u64 = 0;

    for (table, file) in config.input_files() {
        match mapping::find(&mappings, table) {
            Some(table_mapping) => {
                info!(table, file = %file.display(), "loading table");
                total_rows += loader::load(
                    conn,
                    logger,
                    &config.staging_schema,
                    table_mapping,
                    &file,
                )
                .await?;
            },
            None => {
                warn!(table, "no mapping configured for table, skipping");
            },
        }
    }

    Ok(total_rows)
}
