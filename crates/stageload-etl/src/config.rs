//! Configuration management

use std::path::PathBuf;

use stageload_common::{EtlError, Result};

// ============================================================================
// Configuration Constants
// ============================================================================

/// Default database host.
pub const DEFAULT_DB_HOST: &str = "localhost";

/// Default database port.
pub const DEFAULT_DB_PORT: u16 = 5432;

/// Default database name.
pub const DEFAULT_DB_NAME: &str = "staging";

/// Default database user.
pub const DEFAULT_DB_USER: &str = "postgres";

/// Default directory holding the input extracts.
pub const DEFAULT_DATA_DIR: &str = "./data";

/// Default staging namespace the loaders write into.
pub const DEFAULT_STAGING_SCHEMA: &str = "ds";

/// Default schema of the audit log table.
pub const DEFAULT_AUDIT_SCHEMA: &str = "logs";

/// Default audit log table name.
pub const DEFAULT_AUDIT_TABLE: &str = "etl_logs";

/// Tables refreshed by the pipeline, in load order. The order is fixed so
/// runs are deterministic and reference data lands before fact data.
pub const STAGING_TABLES: &[&str] = &[
    "ft_balance_f",
    "ft_posting_f",
    "md_account_d",
    "md_currency_d",
    "md_exchange_rate_d",
    "md_ledger_account_s",
];

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct EtlConfig {
    pub database: DatabaseConfig,
    /// Directory containing one `<table>.csv` extract per staging table.
    pub data_dir: PathBuf,
    pub staging_schema: String,
    pub audit: AuditConfig,
}

/// Database connection parameters
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
}

/// Audit store location
#[derive(Debug, Clone)]
pub struct AuditConfig {
    pub schema: String,
    pub table: String,
}

impl EtlConfig {
    /// Load configuration from environment and defaults.
    ///
    /// Environment variables: `STAGELOAD_DB_HOST`, `STAGELOAD_DB_PORT`,
    /// `STAGELOAD_DB_NAME`, `STAGELOAD_DB_USER`, `STAGELOAD_DB_PASSWORD`,
    /// `STAGELOAD_DATA_DIR`, `STAGELOAD_STAGING_SCHEMA`,
    /// `STAGELOAD_AUDIT_SCHEMA`, `STAGELOAD_AUDIT_TABLE`. A `.env` file is
    /// honored if present.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = EtlConfig {
            database: DatabaseConfig {
                host: env_or("STAGELOAD_DB_HOST", DEFAULT_DB_HOST),
                port: env_parse("STAGELOAD_DB_PORT", DEFAULT_DB_PORT),
                database: env_or("STAGELOAD_DB_NAME", DEFAULT_DB_NAME),
                user: env_or("STAGELOAD_DB_USER", DEFAULT_DB_USER),
                password: std::env::var("STAGELOAD_DB_PASSWORD").unwrap_or_default(),
            },
            data_dir: PathBuf::from(env_or("STAGELOAD_DATA_DIR", DEFAULT_DATA_DIR)),
            staging_schema: env_or("STAGELOAD_STAGING_SCHEMA", DEFAULT_STAGING_SCHEMA),
            audit: AuditConfig {
                schema: env_or("STAGELOAD_AUDIT_SCHEMA", DEFAULT_AUDIT_SCHEMA),
                table: env_or("STAGELOAD_AUDIT_TABLE", DEFAULT_AUDIT_TABLE),
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.database.port == 0 {
            return Err(EtlError::Config(
                "database port must be greater than 0".to_string(),
            ));
        }
        if self.database.database.is_empty() {
            return Err(EtlError::Config("database name cannot be empty".to_string()));
        }
        if self.database.user.is_empty() {
            return Err(EtlError::Config("database user cannot be empty".to_string()));
        }
        crate::sql::validate_ident(&self.staging_schema)?;
        crate::sql::validate_ident(&self.audit.schema)?;
        crate::sql::validate_ident(&self.audit.table)?;
        Ok(())
    }

    /// Ordered table-to-file mapping: one `<table>.csv` per staging table
    /// under the data directory.
    pub fn input_files(&self) -> Vec<(&'static str, PathBuf)> {
        STAGING_TABLES
            .iter()
            .map(|table| (*table, self.data_dir.join(format!("{table}.csv"))))
            .collect()
    }
}

impl Default for EtlConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                host: DEFAULT_DB_HOST.to_string(),
                port: DEFAULT_DB_PORT,
                database: DEFAULT_DB_NAME.to_string(),
                user: DEFAULT_DB_USER.to_string(),
                password: String::new(),
            },
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            staging_schema: DEFAULT_STAGING_SCHEMA.to_string(),
            audit: AuditConfig {
                schema: DEFAULT_AUDIT_SCHEMA.to_string(),
                table: DEFAULT_AUDIT_TABLE.to_string(),
            },
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}
