//! Ad-hoc table copy utilities
//!
//! CSV export of a table, structural table copies, and CSV re-import into an
//! existing table. These are thin wrappers around the database used for
//! one-off copies; unlike the staging loaders they carry no audit trail.

use std::path::Path;

use sqlx::{Connection, PgConnection, Postgres, QueryBuilder, Row};
use tracing::info;

use crate::format;
use crate::sql;
use stageload_common::{EtlError, Result};

/// Rows per INSERT statement on import; the whole import still commits once.
const IMPORT_CHUNK_SIZE: usize = 1000;

/// Column name and catalog type of a target table column.
#[derive(Debug, Clone)]
struct TargetColumn {
    name: String,
    data_type: String,
}

async fn describe_table(
    conn: &mut PgConnection,
    schema: &str,
    table: &str,
) -> Result<Vec<TargetColumn>> {
    let rows = sqlx::query(
        "SELECT column_name::text, data_type::text \
         FROM information_schema.columns \
         WHERE table_schema = $1 AND table_name = $2 \
         ORDER BY ordinal_position",
    )
    .bind(schema)
    .bind(table)
    .fetch_all(&mut *conn)
    .await?;

    if rows.is_empty() {
        return Err(EtlError::Config(format!(
            "table {}.{} does not exist",
            schema, table
        )));
    }

    let mut columns = Vec::with_capacity(rows.len());
    for row in rows {
        columns.push(TargetColumn {
            name: row.try_get(0)?,
            data_type: row.try_get(1)?,
        });
    }
    Ok(columns)
}

/// Export every row of `schema.table` to a comma-delimited CSV file with a
/// header row. NULLs become empty cells. Returns the exported row count.
pub async fn export_table(
    conn: &mut PgConnection,
    table_ref: &str,
    output: &Path,
) -> Result<u64> {
    let (schema, table) = sql::parse_table_ref(table_ref)?;
    info!(table = %table_ref, output = %output.display(), "exporting table");

    let columns = describe_table(conn, &schema, &table).await?;
    let select_list = columns
        .iter()
        .map(|column| format!("{}::text", sql::quote_ident(&column.name)))
        .collect::<Vec<_>>()
        .join(", ");

    let rows = sqlx::query(&format!(
        "SELECT {} FROM {}",
        select_list,
        sql::qualified(&schema, &table)
    ))
    .fetch_all(&mut *conn)
    .await?;

    let mut writer = csv::Writer::from_path(output)?;
    writer.write_record(columns.iter().map(|column| column.name.as_str()))?;
    for row in &rows {
        let mut record = Vec::with_capacity(columns.len());
        for idx in 0..columns.len() {
            record.push(row.try_get::<Option<String>, _>(idx)?.unwrap_or_default());
        }
        writer.write_record(&record)?;
    }
    writer.flush()?;

    info!(rows = rows.len(), "export completed");
    Ok(rows.len() as u64)
}

/// Create an emptied structural copy of `source_ref` named `target_ref`
/// (`CREATE TABLE IF NOT EXISTS .. (LIKE .. INCLUDING ALL)` plus truncate).
pub async fn create_table_copy(
    conn: &mut PgConnection,
    source_ref: &str,
    target_ref: &str,
) -> Result<()> {
    let (src_schema, src_table) = sql::parse_table_ref(source_ref)?;
    let (dst_schema, dst_table) = sql::parse_table_ref(target_ref)?;
    info!(source = %source_ref, target = %target_ref, "creating table copy");

    let mut tx = conn.begin().await?;
    sqlx::query(&format!(
        "CREATE TABLE IF NOT EXISTS {} (LIKE {} INCLUDING ALL)",
        sql::qualified(&dst_schema, &dst_table),
        sql::qualified(&src_schema, &src_table)
    ))
    .execute(&mut *tx)
    .await?;
    sqlx::query(&format!(
        "TRUNCATE TABLE {}",
        sql::qualified(&dst_schema, &dst_table)
    ))
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    info!(target = %target_ref, "table copy ready");
    Ok(())
}

/// Import a headered CSV file into an existing table. Values are bound as
/// text and cast server-side to each column's catalog type; empty cells
/// become NULL. The whole import commits as one transaction. Returns the
/// imported row count.
pub async fn import_csv(
    conn: &mut PgConnection,
    input: &Path,
    table_ref: &str,
) -> Result<u64> {
    let (schema, table) = sql::parse_table_ref(table_ref)?;
    info!(input = %input.display(), table = %table_ref, "importing CSV");

    let columns = describe_table(conn, &schema, &table).await?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(format::open_after_bom(input)?);
    let headers = reader.headers()?.clone();

    let mut cast_types = Vec::with_capacity(headers.len());
    let mut unknown = Vec::new();
    for header in headers.iter() {
        match columns.iter().find(|column| column.name == header.trim()) {
            Some(column) => cast_types.push(column.data_type.clone()),
            None => unknown.push(header.to_string()),
        }
    }
    if !unknown.is_empty() {
        return Err(EtlError::Config(format!(
            "table {} has no columns named: {}",
            table_ref,
            unknown.join(", ")
        )));
    }

    let mut rows: Vec<Vec<Option<String>>> = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(
            (0..headers.len())
                .map(|idx| {
                    record
                        .get(idx)
                        .filter(|cell| !cell.is_empty())
                        .map(str::to_string)
                })
                .collect(),
        );
    }

    if rows.is_empty() {
        info!(table = %table_ref, "nothing to import");
        return Ok(0);
    }

    let insert_prefix = format!(
        "INSERT INTO {} ({}) ",
        sql::qualified(&schema, &table),
        headers
            .iter()
            .map(|header| sql::quote_ident(header.trim()))
            .collect::<Vec<_>>()
            .join(", ")
    );

    let mut tx = conn.begin().await?;
    for chunk in rows.chunks(IMPORT_CHUNK_SIZE) {
        let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(&insert_prefix);
        query_builder.push_values(chunk, |mut b, row| {
            for (value, data_type) in row.iter().zip(&cast_types) {
                b.push_bind(value.clone())
                    .push_unseparated(format!("::{}", data_type));
            }
        });
        query_builder.build().execute(&mut *tx).await?;
    }
    tx.commit().await?;

    info!(rows = rows.len(), table = %table_ref, "import completed");
    Ok(rows.len() as u64)
}
