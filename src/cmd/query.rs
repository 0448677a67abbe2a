//! Query command: one-shot accelerated queries and the interactive REPL.

use anyhow::{Context, Result};
use clap::{Args, ValueHint};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use crate::config::{load_policy, EngineConfig};
use crate::engine::{OutputFormat, QueryResultFormatter, SmaEngine};

/// Run accelerated queries against Parquet files
#[derive(Args, Debug)]
#[command(after_help = "Examples:
  smaq query \"SELECT * FROM 'orders.parquet' WHERE price > 100\"
  smaq query \"SELECT price FROM read_parquet(['a.parquet', 'b.parquet']) WHERE price <= 10\" -f json
  smaq query \"SELECT * FROM 'orders.parquet' WHERE price > 100\" -o results.csv -f csv
  smaq query --interactive
  smaq query --base-dir /var/cache/smaq \"SELECT ...\" --timing")]
pub struct QueryArgs {
    /// SQL query to execute (omit for --interactive mode)
    #[arg(value_name = "QUERY")]
    pub query: Option<String>,

    /// Output format: table, json, jsonl, csv, tsv
    #[arg(short, long, default_value = "table")]
    pub format: String,

    /// Write output to file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Directory for index artifacts and stats (defaults to the platform cache dir)
    #[arg(long, value_hint = ValueHint::DirPath)]
    pub base_dir: Option<PathBuf>,

    /// YAML file overriding the economic policy constants
    #[arg(long, value_name = "FILE")]
    pub policy: Option<PathBuf>,

    /// Memory limit for DuckDB (e.g., "4GB")
    #[arg(long, value_name = "LIMIT")]
    pub memory_limit: Option<String>,

    /// Show query timing and the per-file action breakdown
    #[arg(long)]
    pub timing: bool,

    /// Start interactive query session (REPL)
    #[arg(short, long)]
    pub interactive: bool,
}

/// Run the query command
pub fn run(args: QueryArgs) -> Result<()> {
    if !args.interactive && args.query.is_none() {
        anyhow::bail!("Query is required (or use --interactive mode)");
    }

    let output_format: OutputFormat = args
        .format
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;

    let mut config = EngineConfig {
        base_dir: args.base_dir,
        memory_limit: args.memory_limit,
        ..Default::default()
    };
    if let Some(ref path) = args.policy {
        config.policy = load_policy(path)?;
    }

    let engine = SmaEngine::new(&config)?;

    if args.interactive {
        return run_repl(&engine, output_format, args.timing);
    }

    let query = args.query.unwrap();
    let result = engine.execute(&query)?;
    let formatted = QueryResultFormatter::format(&result, output_format);

    if let Some(output_path) = args.output {
        let file = File::create(&output_path)
            .with_context(|| format!("Cannot create output file: {}", output_path.display()))?;
        let mut writer = BufWriter::new(file);
        writer.write_all(formatted.as_bytes())?;
        eprintln!(
            "Wrote {} rows to {}",
            result.num_rows(),
            output_path.display()
        );
    } else {
        print!("{}", formatted);
    }

    if args.timing {
        eprintln!(
            "Query executed in {:.3}s ({} skipped, {} outlier reads, {} scanned in {:.3}s)",
            result.execution_time_secs,
            result.files_skipped,
            result.files_outlier_read,
            result.files_scanned,
            result.scan_time_secs
        );
    }

    Ok(())
}

/// Run the interactive REPL
fn run_repl(engine: &SmaEngine, default_format: OutputFormat, timing: bool) -> Result<()> {
    let mut rl = DefaultEditor::new()?;

    let history_path = dirs::cache_dir()
        .map(|d| d.join("smaq").join("query_history"))
        .unwrap_or_else(|| PathBuf::from(".smaq_history"));

    let _ = rl.load_history(&history_path);

    println!("smaq query REPL");
    println!("Type .help for available commands, .exit to quit");
    println!();

    let mut current_format = default_format;

    loop {
        let readline = rl.readline("smaq> ");

        match readline {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(trimmed);

                if trimmed.starts_with('.') {
                    if handle_meta_command(trimmed, engine, &mut current_format)? {
                        break;
                    }
                    continue;
                }

                match engine.execute(trimmed) {
                    Ok(result) => {
                        let formatted = QueryResultFormatter::format(&result, current_format);
                        print!("{}", formatted);
                        if timing {
                            eprintln!(
                                "({:.3}s, {} skipped, {} outlier reads, {} scanned)",
                                result.execution_time_secs,
                                result.files_skipped,
                                result.files_outlier_read,
                                result.files_scanned
                            );
                        }
                    }
                    Err(e) => {
                        eprintln!("Error: {}", e);
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                eprintln!("Error: {:?}", err);
                break;
            }
        }
    }

    if let Some(parent) = history_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let _ = rl.save_history(&history_path);

    Ok(())
}

/// Handle REPL meta-commands. Returns true if the REPL should exit.
fn handle_meta_command(
    command: &str,
    engine: &SmaEngine,
    format: &mut OutputFormat,
) -> Result<bool> {
    let parts: Vec<&str> = command.split_whitespace().collect();
    let cmd = parts.first().copied().unwrap_or("");

    match cmd {
        ".exit" | ".quit" | ".q" => {
            println!("Goodbye!");
            return Ok(true);
        }
        ".help" | ".h" | ".?" => {
            println!("Available commands:");
            println!("  .indexes             List cached index artifacts");
            println!("  .stats               Show per-predicate budgets and counters");
            println!("  .format <fmt>        Set output format (table, json, jsonl, csv, tsv)");
            println!("  .exit, .quit, .q     Exit the REPL");
            println!();
        }
        ".indexes" => {
            let keys = engine.store().list()?;
            if keys.is_empty() {
                println!("No index artifacts cached.");
            }
            for key in keys {
                println!("  {}", key);
            }
        }
        ".stats" => {
            for entry in engine.stats().snapshot() {
                println!("  {}", entry.key);
                println!(
                    "    budget: {:.4}, scans: {}, skips: {}, outlier reads: {}, builds: {}, evictions: {}",
                    entry.budget,
                    entry.metrics.scan_count,
                    entry.metrics.skipped_count,
                    entry.metrics.outlier_retrieved_count,
                    entry.metrics.construction_count,
                    entry.metrics.deconstruction_count
                );
            }
        }
        ".format" => {
            if parts.len() < 2 {
                println!("Current format: {}", format);
                println!("Usage: .format <table|json|jsonl|csv|tsv>");
            } else {
                match parts[1].parse::<OutputFormat>() {
                    Ok(new_format) => {
                        *format = new_format;
                        println!("Output format set to: {}", format);
                    }
                    Err(e) => {
                        eprintln!("Error: {}", e);
                    }
                }
            }
        }
        _ => {
            eprintln!(
                "Unknown command: {}. Type .help for available commands.",
                cmd
            );
        }
    }

    Ok(false)
}
