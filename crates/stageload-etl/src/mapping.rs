//! Static per-table load descriptors
//!
//! Each staging table gets one [`TableMapping`] describing the columns the
//! input extract must provide, their semantic types, and the load policy
//! (truncate flag, batch size). Column order defines both the required input
//! columns and the insert column order.

/// Default rows per insert transaction.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Semantic type of a mapped column, driving coercion and bind types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Date,
    Integer,
    Decimal,
    Text,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Date => "date",
            Self::Integer => "integer",
            Self::Decimal => "decimal",
            Self::Text => "text",
        }
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One mapped column: name plus semantic type.
#[derive(Debug, Clone, Copy)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub column_type: ColumnType,
}

/// Static descriptor for one target table.
#[derive(Debug, Clone)]
pub struct TableMapping {
    pub table: &'static str,
    pub columns: Vec<ColumnSpec>,
    /// Informational only; uniqueness is enforced by the target schema.
    pub primary_key: &'static [&'static str],
    pub truncate_before_load: bool,
    pub batch_size: usize,
}

impl TableMapping {
    pub fn column_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.columns.iter().map(|c| c.name)
    }
}

fn col(name: &'static str, column_type: ColumnType) -> ColumnSpec {
    ColumnSpec { name, column_type }
}

/// Mappings for the staging tables refreshed by the pipeline.
pub fn standard_mappings() -> Vec<TableMapping> {
    use ColumnType::{Date, Decimal, Integer, Text};

    vec![
        TableMapping {
            table: "ft_balance_f",
            columns: vec![
                col("on_date", Date),
                col("account_rk", Integer),
                col("currency_rk", Integer),
                col("balance_out", Decimal),
            ],
            primary_key: &["on_date", "account_rk"],
            truncate_before_load: true,
            batch_size: DEFAULT_BATCH_SIZE,
        },
        TableMapping {
            table: "ft_posting_f",
            columns: vec![
                col("oper_date", Date),
                col("credit_account_rk", Integer),
                col("debet_account_rk", Integer),
                col("credit_amount", Decimal),
                col("debet_amount", Decimal),
            ],
            primary_key: &[],
            truncate_before_load: true,
            batch_size: DEFAULT_BATCH_SIZE,
        },
        TableMapping {
            table: "md_account_d",
            columns: vec![
                col("data_actual_date", Date),
                col("data_actual_end_date", Date),
                col("account_rk", Integer),
                col("account_number", Text),
                col("char_type", Text),
                col("currency_rk", Integer),
                col("currency_code", Text),
            ],
            primary_key: &["data_actual_date", "account_rk"],
            truncate_before_load: true,
            batch_size: DEFAULT_BATCH_SIZE,
        },
        TableMapping {
            table: "md_currency_d",
            columns: vec![
                col("currency_rk", Integer),
                col("data_actual_date", Date),
                col("data_actual_end_date", Date),
                col("currency_code", Text),
                col("code_iso_char", Text),
            ],
            primary_key: &["currency_rk", "data_actual_date"],
            truncate_before_load: true,
            batch_size: DEFAULT_BATCH_SIZE,
        },
        TableMapping {
            table: "md_exchange_rate_d",
            columns: vec![
                col("data_actual_date", Date),
                col("data_actual_end_date", Date),
                col("currency_rk", Integer),
                col("reduced_cource", Decimal),
                col("code_iso_num", Text),
            ],
            primary_key: &["data_actual_date", "currency_rk"],
            truncate_before_load: true,
            batch_size: DEFAULT_BATCH_SIZE,
        },
        TableMapping {
            table: "md_ledger_account_s",
            columns: vec![
                col("chapter", Text),
                col("chapter_name", Text),
                col("section_number", Integer),
                col("section_name", Text),
                col("subsection_name", Text),
                col("ledger1_account", Integer),
                col("ledger1_account_name", Text),
                col("ledger_account", Integer),
                col("ledger_account_name", Text),
                col("characteristic", Text),
                col("start_date", Date),
                col("end_date", Date),
            ],
            primary_key: &["ledger_account", "start_date"],
            truncate_before_load: true,
            batch_size: DEFAULT_BATCH_SIZE,
        },
    ]
}

/// Look up a mapping by table name.
pub fn find<'a>(mappings: &'a [TableMapping], table: &str) -> Option<&'a TableMapping> {
    mappings.iter().find(|m| m.table == table)
}
