//! rowbind CLI - inspect and query a rowbind database

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use rowbind::config::{self, RowbindConfig};
use rowbind::storage::SqliteStore;
use rowbind::ui;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "rowbind")]
#[command(version = "0.0.1")]
#[command(about = "Object-relational mapping for plain Rust structs over embedded SQLite")]
#[command(long_about = r#"
rowbind stores entity tables in a single SQLite file. This tool inspects that file:
  • List tables with their row counts
  • Run ad-hoc queries, rendered as a table or JSON
  • Execute maintenance statements

Example usage:
  rowbind init --database data/app.db
  rowbind tables
  rowbind query --sql "SELECT * FROM BOOK" --format json
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a config file pointing at a database
    Init {
        /// Path to the database file
        #[arg(short, long)]
        database: Option<PathBuf>,

        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },

    /// List tables and their row counts
    Tables {
        /// Path to the database file
        #[arg(short, long)]
        database: Option<PathBuf>,
    },

    /// Run a query and print its rows
    Query {
        /// SQL to run
        #[arg(short, long)]
        sql: String,

        /// Path to the database file
        #[arg(short, long)]
        database: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: Format,
    },

    /// Execute a statement and report the rows it changed
    Exec {
        /// SQL to execute
        #[arg(short, long)]
        sql: String,

        /// Path to the database file
        #[arg(short, long)]
        database: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Table,
    Json,
}

/// Flag first, then the config file, then the default location
fn resolve_database(flag: Option<PathBuf>, config_path: Option<&Path>) -> anyhow::Result<PathBuf> {
    if let Some(path) = flag {
        return Ok(path);
    }
    let config_path = config_path.map(Path::to_path_buf).unwrap_or_else(config::default_config_path);
    if let Some(database) = RowbindConfig::load(&config_path)?.and_then(|c| c.database_path()) {
        return Ok(database);
    }
    Ok(config::default_database_path_in(&std::env::current_dir()?))
}

fn open_store(path: &Path) -> anyhow::Result<SqliteStore> {
    config::ensure_db_dir(path)
        .with_context(|| format!("creating directory for {}", path.display()))?;
    tracing::debug!("Opening {}", path.display());
    Ok(SqliteStore::open(path)?)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config_path = cli.config.clone();

    match cli.command {
        Commands::Init { database, force } => {
            let path = config_path.unwrap_or_else(config::default_config_path);
            let database = match database {
                Some(database) => database,
                None => config::default_database_path_in(&std::env::current_dir()?),
            };

            RowbindConfig::for_database(&database).save(&path, force)?;
            open_store(&database)?;

            ui::success(&format!("Wrote {}", path.display()));
            ui::info("Database", &database.display().to_string());
        }

        Commands::Tables { database } => {
            let database = resolve_database(database, config_path.as_deref())?;
            let store = open_store(&database)?;
            let stats = store.stats()?;

            ui::header(&format!("Tables in {}", database.display()));
            if stats.is_empty() {
                ui::empty("tables");
            } else {
                println!("{}", ui::stats_table(&stats));
            }
        }

        Commands::Query { sql, database, format } => {
            let database = resolve_database(database, config_path.as_deref())?;
            let store = open_store(&database)?;
            let rows = store.read_rows(&sql, &[])?;

            match format {
                Format::Json => {
                    let json: Vec<_> = rows.iter().map(|r| r.to_json()).collect();
                    println!("{}", serde_json::to_string_pretty(&json)?);
                }
                Format::Table => {
                    if rows.is_empty() {
                        ui::empty("rows");
                    } else {
                        println!("{}", ui::rows_table(&rows));
                        ui::info("Rows", &rows.len().to_string());
                    }
                }
            }
        }

        Commands::Exec { sql, database } => {
            let database = resolve_database(database, config_path.as_deref())?;
            let store = open_store(&database)?;

            match store.execute(&sql, &[]) {
                Ok(changed) => ui::success(&format!("{} rows changed", changed)),
                Err(err) => {
                    ui::error(&err.to_string());
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}
