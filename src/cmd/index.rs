//! Index command: inspect and prune the SMA artifact cache.

use anyhow::Result;
use clap::{Args, Subcommand, ValueHint};
use std::path::PathBuf;

use crate::config::EngineConfig;
use crate::sma::SmaStore;
use crate::stats::StatsManager;

/// Inspect or prune cached SMA index artifacts
#[derive(Args, Debug)]
pub struct IndexArgs {
    #[command(subcommand)]
    pub action: IndexAction,

    /// Directory for index artifacts and stats (defaults to the platform cache dir)
    #[arg(long, global = true, value_hint = ValueHint::DirPath)]
    pub base_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum IndexAction {
    /// List cached artifacts with their sizes
    List,
    /// Delete every cached artifact
    Clear,
    /// Show per-predicate budgets and counters
    Stats,
}

pub fn run(args: IndexArgs) -> Result<()> {
    let config = EngineConfig {
        base_dir: args.base_dir,
        ..Default::default()
    };
    let base_dir = config.resolve_base_dir()?;
    let store = SmaStore::new(&base_dir)?;

    match args.action {
        IndexAction::List => {
            let keys = store.list()?;
            if keys.is_empty() {
                println!("No index artifacts cached.");
                println!("Cache directory: {}", store.base_dir().display());
                return Ok(());
            }
            let mut total = 0u64;
            for key in &keys {
                let size = std::fs::metadata(store.artifact_path(key))
                    .map(|m| m.len())
                    .unwrap_or(0);
                total += size;
                println!("  {}  ({:.1} KB)", key, size as f64 / 1024.0);
            }
            println!();
            println!(
                "{} artifact(s), {:.1} KB total in {}",
                keys.len(),
                total as f64 / 1024.0,
                store.base_dir().display()
            );
        }
        IndexAction::Clear => {
            let removed = store.clear()?;
            println!("Removed {} index artifact(s)", removed);
        }
        IndexAction::Stats => {
            let stats = StatsManager::load(&base_dir);
            let snapshot = stats.snapshot();
            if snapshot.is_empty() {
                println!("No accounting recorded yet.");
                return Ok(());
            }
            println!("Current query id: {}", stats.current_query_id());
            println!();
            for entry in snapshot {
                println!("{}", entry.key);
                println!(
                    "  budget: {:.4}  scans: {}  skips: {}  outlier reads: {}",
                    entry.budget,
                    entry.metrics.scan_count,
                    entry.metrics.skipped_count,
                    entry.metrics.outlier_retrieved_count
                );
                println!(
                    "  total scan time: {:.3}s  builds: {}  evictions: {}",
                    entry.metrics.total_scan_time,
                    entry.metrics.construction_count,
                    entry.metrics.deconstruction_count
                );
            }
        }
    }

    Ok(())
}
