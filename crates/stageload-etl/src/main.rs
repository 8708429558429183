//! stageload - staging table refresh tool

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use stageload_common::logging::{init_logging, LogConfig, LogLevel};
use stageload_etl::config::EtlConfig;
use stageload_etl::{copy, pipeline};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "stageload")]
#[command(author, version, about = "Delimited-extract loader for relational staging tables")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Refresh every staging table from the configured data directory
    Run {
        /// Directory holding the input extracts (overrides STAGELOAD_DATA_DIR)
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },

    /// Export a table to a CSV file
    Export {
        /// Source table as schema.table
        #[arg(long)]
        table: String,

        /// Output CSV path
        #[arg(long)]
        output: PathBuf,
    },

    /// Create an emptied structural copy of a table
    Copy {
        /// Source table as schema.table
        #[arg(long)]
        table: String,

        /// Target table as schema.table
        #[arg(long)]
        target: String,
    },

    /// Import a CSV file into an existing table
    Import {
        /// Input CSV path
        #[arg(long)]
        file: PathBuf,

        /// Target table as schema.table
        #[arg(long)]
        table: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };
    let base = LogConfig {
        level,
        ..LogConfig::default()
    };
    // Environment variables take precedence over CLI-derived defaults.
    let log_config = LogConfig::from_env(base.clone()).unwrap_or(base);

    if let Err(err) = init_logging(&log_config) {
        eprintln!("failed to initialize logging: {err}");
        std::process::exit(1);
    }

    if let Err(err) = run(cli).await {
        error!(error = %err, "terminating with error");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> stageload_common::Result<()> {
    let mut config = EtlConfig::load()?;

    match cli.command {
        Command::Run { data_dir } => {
            if let Some(dir) = data_dir {
                config.data_dir = dir;
            }
            pipeline::run(&config).await
        },
        Command::Export { table, output } => {
            let mut conn = pipeline::connect(&config.database).await?;
            let rows = copy::export_table(&mut conn, &table, &output).await?;
            info!(rows, output = %output.display(), "export finished");
            Ok(())
        },
        Command::Copy { table, target } => {
            let mut conn = pipeline::connect(&config.database).await?;
            copy::create_table_copy(&mut conn, &table, &target).await
        },
        Command::Import { file, table } => {
            let mut conn = pipeline::connect(&config.database).await?;
            let rows = copy::import_csv(&mut conn, &file, &table).await?;
            info!(rows, table = %table, "import finished");
            Ok(())
        },
    }
}
