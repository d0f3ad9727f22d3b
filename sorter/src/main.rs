//! Command-line access to the sorter data directory.
//!
//! Used on the device by the sorting process (to record tallies) and by
//! operators (to inspect status and batches). Only `init` writes run state,
//! to create the default file; every other command peeks at it. Control
//! commands go through the server, which owns the writer.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::debug;

use sorter::coordinator::Coordinator;
use sorter::core::types::BatchCounts;
use sorter::exit_codes;
use sorter::io::config::{CONFIG_FILE, SorterConfig, SorterPaths, load_config, write_config};
use sorter::io::run_state::RunStateStore;

#[derive(Parser)]
#[command(
    name = "sorter",
    version,
    about = "Cacao sorter run-state and batch tool"
)]
struct Cli {
    /// Data directory holding config.toml, the batch database and run state.
    #[arg(long, global = true, default_value = ".")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create config, database and default run state if missing.
    Init {
        /// Overwrite an existing config.toml with defaults.
        #[arg(short, long)]
        force: bool,
    },
    /// Print the merged status snapshot as JSON.
    Status,
    /// Print all batches, newest first, as JSON.
    Batches,
    /// Create a batch numbered by the monthly scheme.
    AddBatch(CountArgs),
    /// Overwrite the tallies of a batch (defaults to the active batch).
    Record {
        /// Batch id; the run state's active batch when omitted.
        #[arg(long)]
        batch: Option<i64>,
        #[command(flatten)]
        counts: CountArgs,
    },
}

#[derive(Args, Debug)]
struct CountArgs {
    #[arg(long, default_value_t = 0)]
    total: u64,
    #[arg(long, default_value_t = 0)]
    large: u64,
    #[arg(long, default_value_t = 0)]
    medium: u64,
    #[arg(long, default_value_t = 0)]
    small: u64,
    #[arg(long, default_value_t = 0)]
    quality_good: u64,
    #[arg(long, default_value_t = 0)]
    quality_bad: u64,
}

impl From<&CountArgs> for BatchCounts {
    fn from(args: &CountArgs) -> Self {
        Self {
            total: args.total,
            large: args.large,
            medium: args.medium,
            small: args.small,
            quality_good: args.quality_good,
            quality_bad: args.quality_bad,
        }
    }
}

fn main() {
    sorter::logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    debug!(data_dir = %cli.data_dir.display(), "sorter starting");
    match cli.command {
        Command::Init { force } => cmd_init(&cli.data_dir, force),
        Command::Status => cmd_status(&cli.data_dir),
        Command::Batches => cmd_batches(&cli.data_dir),
        Command::AddBatch(counts) => cmd_add_batch(&cli.data_dir, &counts),
        Command::Record { batch, counts } => cmd_record(&cli.data_dir, batch, &counts),
    }
}

fn cmd_init(data_dir: &Path, force: bool) -> Result<i32> {
    let config_path = data_dir.join(CONFIG_FILE);
    let cfg = if force || !config_path.exists() {
        let cfg = SorterConfig::default();
        write_config(&config_path, &cfg)?;
        cfg
    } else {
        load_config(&config_path)?
    };
    let paths = SorterPaths::new(data_dir, &cfg);
    Coordinator::from_config(data_dir, &cfg).context("initialize batch database")?;
    RunStateStore::new(&paths.run_state_path).load()?;
    println!("{}", paths.data_dir.display());
    Ok(exit_codes::OK)
}

fn cmd_status(data_dir: &Path) -> Result<i32> {
    let coordinator = Coordinator::open(data_dir)?;
    let status = coordinator.status()?;
    print_json(&status.report())?;
    Ok(exit_codes::OK)
}

fn cmd_batches(data_dir: &Path) -> Result<i32> {
    let coordinator = Coordinator::open(data_dir)?;
    print_json(&coordinator.list_batches()?)?;
    Ok(exit_codes::OK)
}

fn cmd_add_batch(data_dir: &Path, counts: &CountArgs) -> Result<i32> {
    let coordinator = Coordinator::open(data_dir)?;
    let created = coordinator.create_batch(counts.into())?;
    print_json(&created.report())?;
    Ok(exit_codes::OK)
}

fn cmd_record(data_dir: &Path, batch: Option<i64>, counts: &CountArgs) -> Result<i32> {
    let cfg = load_config(&data_dir.join(CONFIG_FILE))?;
    let batch_id = match batch {
        Some(id) => id,
        None => {
            let paths = SorterPaths::new(data_dir, &cfg);
            RunStateStore::new(paths.run_state_path).peek()?.value.batch_id
        }
    };
    let coordinator = Coordinator::from_config(data_dir, &cfg)?;
    match coordinator.record_counts(batch_id, counts.into())? {
        Some(updated) => {
            print_json(&updated)?;
            Ok(exit_codes::OK)
        }
        None => {
            eprintln!("batch {batch_id} not found");
            Ok(exit_codes::NOT_FOUND)
        }
    }
}

/// Print `value` as pretty JSON on stdout.
fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let payload = serde_json::to_string_pretty(value).context("serialize json")?;
    println!("{payload}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_init() {
        let cli = Cli::parse_from(["sorter", "init"]);
        assert!(matches!(cli.command, Command::Init { force: false }));
        assert_eq!(cli.data_dir, PathBuf::from("."));
    }

    #[test]
    fn parse_record_with_counts() {
        let cli = Cli::parse_from([
            "sorter",
            "--data-dir",
            "/var/lib/sorter",
            "record",
            "--batch",
            "4",
            "--total",
            "10",
            "--quality-bad",
            "2",
        ]);
        assert_eq!(cli.data_dir, PathBuf::from("/var/lib/sorter"));
        match cli.command {
            Command::Record { batch, counts } => {
                assert_eq!(batch, Some(4));
                let counts = BatchCounts::from(&counts);
                assert_eq!(counts.total, 10);
                assert_eq!(counts.quality_bad, 2);
                assert_eq!(counts.large, 0);
            }
            _ => panic!("expected record"),
        }
    }

    #[test]
    fn parse_add_batch_defaults_to_zero() {
        let cli = Cli::parse_from(["sorter", "add-batch"]);
        match cli.command {
            Command::AddBatch(counts) => {
                assert_eq!(BatchCounts::from(&counts), BatchCounts::default());
            }
            _ => panic!("expected add-batch"),
        }
    }
}
