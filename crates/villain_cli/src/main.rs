//! Command-line front end for the villain store.
//!
//! # Responsibility
//! - Expose the provider verbs (`query`, `type`, `insert`, `update`, `delete`)
//!   over a file-backed store.
//! - Own the store lifecycle for the process.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use villain_core::db::open_db;
use villain_core::{
    init_logging, ChangeNotifier, ProviderConfig, ProviderError, SqliteVillainRepository,
    VillainColumn, VillainProvider, VillainQuery, VillainRepository, VillainSort, VillainValues,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the SQLite database file
    #[arg(long, default_value = "villains.sqlite3")]
    db: PathBuf,

    /// Locator scheme served by the provider
    #[arg(long, default_value = villain_core::provider::villain_provider::DEFAULT_SCHEME)]
    scheme: String,

    /// Locator authority served by the provider
    #[arg(long, default_value = villain_core::provider::villain_provider::DEFAULT_AUTHORITY)]
    authority: String,

    /// Absolute directory for rolling log files; logging is off when omitted
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Log level (trace|debug|info|warn|error)
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print villains at a locator as JSON lines
    Query {
        locator: String,
        /// Only return villains from this series
        #[arg(long)]
        series: Option<String>,
        /// Sort column (`_id`, `villain_name` or `series`)
        #[arg(long)]
        sort: Option<String>,
        /// Sort descending
        #[arg(long, requires = "sort")]
        desc: bool,
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Print the resource type of a locator
    Type { locator: String },
    /// Insert a villain and print its item locator
    Insert {
        locator: String,
        /// Explicit id; an existing row with this id is replaced
        #[arg(long)]
        id: Option<i64>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        series: Option<String>,
    },
    /// Replace the villain at an item locator and print rows affected
    Update {
        locator: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        series: Option<String>,
    },
    /// Delete the villain at an item locator and print rows affected
    Delete { locator: String },
    /// Replace the store contents with the sample villains
    Seed,
    /// Print the number of stored villains
    Count,
}

/// Exit status for store faults, which may succeed on retry, as opposed to
/// usage errors (status 1).
const STORAGE_FAULT_EXIT: u8 = 2;

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    if let Some(log_dir) = &cli.log_dir {
        let level = cli
            .log_level
            .clone()
            .unwrap_or_else(|| villain_core::default_log_level().as_str().to_string());
        init_logging(&level, log_dir)
            .map_err(|err| anyhow!("failed to initialize logging: {err}"))?;
    }

    let conn = open_db(&cli.db)
        .with_context(|| format!("failed to open database `{}`", cli.db.display()))?;
    let repo = SqliteVillainRepository::try_new(conn)?;
    let config = ProviderConfig {
        scheme: cli.scheme.clone(),
        authority: cli.authority.clone(),
    };
    let provider = VillainProvider::new(config, repo, Arc::new(ChangeNotifier::new()))?;

    match run(&provider, cli.command) {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(err)
            if err
                .downcast_ref::<ProviderError>()
                .is_some_and(ProviderError::is_storage_fault) =>
        {
            eprintln!("Error: {err:#}");
            Ok(ExitCode::from(STORAGE_FAULT_EXIT))
        }
        Err(err) => Err(err),
    }
}

fn run(provider: &VillainProvider<SqliteVillainRepository>, command: Commands) -> Result<()> {
    match command {
        Commands::Query {
            locator,
            series,
            sort,
            desc,
            limit,
        } => {
            let sort = sort
                .map(|value| {
                    VillainColumn::parse(&value)
                        .map(|column| VillainSort {
                            column,
                            descending: desc,
                        })
                        .ok_or_else(|| anyhow!("unknown sort column `{value}`"))
                })
                .transpose()?;
            let query = VillainQuery {
                series,
                sort,
                limit,
            };
            for villain in provider.query(&locator, &query)?.iter() {
                println!("{}", serde_json::to_string(villain)?);
            }
        }
        Commands::Type { locator } => println!("{}", provider.resource_type(&locator)?),
        Commands::Insert {
            locator,
            id,
            name,
            series,
        } => {
            let values = VillainValues { id, name, series };
            println!("{}", provider.insert(&locator, Some(&values))?);
        }
        Commands::Update {
            locator,
            name,
            series,
        } => {
            let values = VillainValues {
                id: None,
                name,
                series,
            };
            println!("{}", provider.update(&locator, Some(&values))?);
        }
        Commands::Delete { locator } => println!("{}", provider.delete(&locator)?),
        Commands::Seed => {
            println!("{}", provider.seed_samples()?.len());
        }
        Commands::Count => {
            let count = provider
                .repository()
                .count()
                .map_err(ProviderError::from)?;
            println!("{count}");
        }
    }

    Ok(())
}
