//! Table loader
//!
//! Truncate-then-load of one staging table: detect the input dialect, stream
//! records, coerce them, and insert in batched transactions. Rows with
//! unparseable dates are skipped; everything else fatal aborts the table,
//! rolls back the in-flight batch, and surfaces as a load error.

use std::path::Path;

use chrono::Utc;
use sqlx::{Connection, PgConnection, Postgres, QueryBuilder, Transaction};
use tracing::{error, info, warn};

use crate::audit::{ProcessLogger, ProcessStatus};
use crate::coerce::{self, CoercedValue, PreparedRow};
use crate::format;
use crate::mapping::TableMapping;
use crate::sql;
use stageload_common::{EtlError, Result};

/// Load one table from its extract. Returns the number of rows inserted.
///
/// The whole attempt is bracketed by STARTED/COMPLETED/FAILED audit rows for
/// process `LOAD_<table>`; on failure the count of rows already committed is
/// recorded alongside the error message.
pub async fn load(
    conn: &mut PgConnection,
    logger: &ProcessLogger,
    schema: &str,
    mapping: &TableMapping,
    file: &Path,
) -> Result<u64> {
    let started_at = Utc::now();
    let process = format!("LOAD_{}", mapping.table);
    let mut rows_processed: u64 = 0;

    logger.log_start(conn, &process, started_at).await;

    match run_load(conn, schema, mapping, file, &mut rows_processed).await {
        Ok(()) => {
            info!(
                table = mapping.table,
                rows = rows_processed,
                "table loaded"
            );
            logger
                .log_end(
                    conn,
                    &process,
                    started_at,
                    Utc::now(),
                    ProcessStatus::Completed,
                    Some(rows_processed as i64),
                    None,
                )
                .await;
            Ok(rows_processed)
        },
        Err(err) => {
            error!(table = mapping.table, error = %err, "table load failed");
            logger
                .log_end(
                    conn,
                    &process,
                    started_at,
                    Utc::now(),
                    ProcessStatus::Failed,
                    Some(rows_processed as i64),
                    Some(&err.to_string()),
                )
                .await;
            Err(EtlError::load(mapping.table, err))
        },
    }
}

async fn run_load(
    conn: &mut PgConnection,
    schema: &str,
    mapping: &TableMapping,
    file: &Path,
    rows_processed: &mut u64,
) -> Result<()> {
    let mut tx = conn.begin().await?;

    if mapping.truncate_before_load {
        sqlx::query(&format!(
            "TRUNCATE TABLE {}",
            sql::qualified(schema, mapping.table)
        ))
        .execute(&mut *tx)
        .await?;
        info!(table = mapping.table, "truncated before load");
    }

    if !file.exists() {
        return Err(EtlError::Config(format!(
            "input file {} not found",
            file.display()
        )));
    }

    let csv_format = format::detect_format(file)?;
    if !csv_format.has_header {
        return Err(EtlError::FormatDetection {
            path: file.to_path_buf(),
            reason: "no header row detected".to_string(),
        });
    }

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(csv_format.delimiter)
        .quote(csv_format.quote)
        .has_headers(true)
        .flexible(true)
        .from_reader(format::open_after_bom(file)?);

    let headers = reader.headers()?.clone();
    let column_indexes = resolve_columns(&headers, mapping, file)?;

    let insert_prefix = insert_statement_prefix(schema, mapping);
    let mut batch: Vec<PreparedRow> = Vec::with_capacity(mapping.batch_size);
    // The header occupies line 1; data starts at line 2.
    let mut line: u64 = 1;

    for record in reader.records() {
        let record = record?;
        line += 1;

        let raw: Vec<&str> = column_indexes
            .iter()
            .map(|&idx| record.get(idx).unwrap_or(""))
            .collect();

        match coerce::prepare(mapping, &raw) {
            Ok(row) => {
                batch.push(row);
                *rows_processed += 1;
            },
            Err(err) if err.is_row_scoped() => {
                warn!(table = mapping.table, line, error = %err, "skipping row");
                continue;
            },
            Err(err) => return Err(err),
        }

        if batch.len() >= mapping.batch_size {
            insert_batch(&mut tx, &insert_prefix, &batch).await?;
            tx.commit().await?;
            tx = conn.begin().await?;
            batch.clear();
        }
    }

    if !batch.is_empty() {
        insert_batch(&mut tx, &insert_prefix, &batch).await?;
    }
    tx.commit().await?;

    Ok(())
}

/// Map the mapping's columns onto header positions. Every mapped column must
/// be present; the error names all that are not.
fn resolve_columns(
    headers: &csv::StringRecord,
    mapping: &TableMapping,
    file: &Path,
) -> Result<Vec<usize>> {
    let mut indexes = Vec::with_capacity(mapping.columns.len());
    let mut missing = Vec::new();

    for name in mapping.column_names() {
        match headers.iter().position(|header| header.trim() == name) {
            Some(idx) => indexes.push(idx),
            None => missing.push(name.to_string()),
        }
    }

    if !missing.is_empty() {
        return Err(EtlError::MissingColumns {
            path: file.to_path_buf(),
            columns: missing,
        });
    }

    Ok(indexes)
}

fn insert_statement_prefix(schema: &str, mapping: &TableMapping) -> String {
    let columns = mapping
        .column_names()
        .map(sql::quote_ident)
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {} ({}) ",
        sql::qualified(schema, mapping.table),
        columns
    )
}

async fn insert_batch(
    tx: &mut Transaction<'_, Postgres>,
    insert_prefix: &str,
    batch: &[PreparedRow],
) -> Result<()> {
    let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(insert_prefix);

    query_builder.push_values(batch, |mut b, row| {
        for value in row {
            match value {
                CoercedValue::Date(v) => b.push_bind(*v),
                CoercedValue::Integer(v) => b.push_bind(*v),
                CoercedValue::Decimal(v) => b.push_bind(*v),
                CoercedValue::Text(v) => b.push_bind(v.clone()),
            };
        }
    });

    query_builder.build().execute(&mut **tx).await?;

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::mapping::{find, standard_mappings};
    use std::path::PathBuf;

    #[test]
    fn resolves_columns_in_mapping_order() {
        let mappings = standard_mappings();
        let balance = find(&mappings, "ft_balance_f").unwrap();

        // Extract column order differs from mapping order; extra columns are fine.
        let headers = csv::StringRecord::from(vec![
            "balance_out",
            "on_date",
            "extra",
            "currency_rk",
            "account_rk",
        ]);
        let indexes = resolve_columns(&headers, balance, &PathBuf::from("x.csv")).unwrap();
        assert_eq!(indexes, vec![1, 4, 3, 0]);
    }

    #[test]
    fn missing_columns_are_all_named() {
        let mappings = standard_mappings();
        let balance = find(&mappings, "ft_balance_f").unwrap();

        let headers = csv::StringRecord::from(vec!["on_date", "currency_rk"]);
        let err = resolve_columns(&headers, balance, &PathBuf::from("ft_balance_f.csv"))
            .unwrap_err();
        match err {
            EtlError::MissingColumns { columns, .. } => {
                assert_eq!(columns, vec!["account_rk", "balance_out"]);
            },
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn header_whitespace_is_tolerated() {
        let mappings = standard_mappings();
        let balance = find(&mappings, "ft_balance_f").unwrap();

        let headers = csv::StringRecord::from(vec![
            " on_date ",
            "account_rk",
            "currency_rk",
            "balance_out",
        ]);
        assert!(resolve_columns(&headers, balance, &PathBuf::from("x.csv")).is_ok());
    }

    #[test]
    fn insert_prefix_quotes_every_identifier() {
        let mappings = standard_mappings();
        let posting = find(&mappings, "ft_posting_f").unwrap();

        let prefix = insert_statement_prefix("ds", posting);
        assert!(prefix.starts_with("INSERT INTO \"ds\".\"ft_posting_f\" (\"oper_date\""));
        assert!(prefix.contains("\"debet_amount\""));
        assert!(prefix.ends_with(") "));
    }
}
