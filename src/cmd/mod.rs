mod index;
mod query;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::io;

const AFTER_HELP: &str = "\x1b[1mCommon workflows:\x1b[0m
  Run an accelerated Parquet query:
    smaq query \"SELECT price FROM read_parquet(['orders.parquet']) WHERE price > 100\"

  Explore interactively:
    smaq query --interactive

  Inspect the index cache:
    smaq index list
    smaq index stats

\x1b[1mMore info:\x1b[0m
  Run 'smaq <command> --help' for command-specific options.
  Enable completions: smaq completions <shell>";

#[derive(Parser)]
#[command(name = "smaq")]
#[command(version)]
#[command(about = "Accelerate analytical Parquet queries with sparse materialised aggregates")]
#[command(after_help = AFTER_HELP)]
#[command(arg_required_else_help = true)]
#[command(max_term_width = 100)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable debug logging (same as RUST_LOG=smaq=debug)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run an accelerated query against Parquet files
    #[command(visible_alias = "q")]
    Query(query::QueryArgs),

    /// Inspect or prune the SMA index cache
    Index(index::IndexArgs),

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

pub fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Query(args) => query::run(args),
        Commands::Index(args) => index::run(args),
        Commands::Completions { shell } => {
            generate(shell, &mut Cli::command(), "smaq", &mut io::stdout());
            Ok(())
        }
    }
}
