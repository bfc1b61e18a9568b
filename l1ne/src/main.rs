//! # L1NE Orchestrator CLI
//!
//! Command surface over the orchestrator core: deploy and proxy a fleet
//! (`start`), inspect it (`status`), read the write-ahead log (`wal`),
//! drive deterministic simulations (`simulate`), and benchmark a target.
//!
//! Exit code is 0 on success and 1 on any propagated error; the error is
//! printed as one concise line (set `RUST_LOG` for context).

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use l1ne::commands::{self, OutputFormat};
use l1ne_common::consts::{DEFAULT_BIND_ADDR, DEFAULT_STATE_DIR};
use tracing::error;

#[derive(Parser)]
#[command(name = "l1ne", version, about = "Single-node service orchestrator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load configuration, deploy services, begin accepting and proxying.
    Start {
        /// Configuration file describing the fleet.
        #[arg(long)]
        config: PathBuf,
        /// Address the proxy listens on.
        #[arg(long, default_value = DEFAULT_BIND_ADDR)]
        bind: String,
        /// Directory holding the write-ahead log.
        #[arg(long, default_value = DEFAULT_STATE_DIR)]
        state_dir: PathBuf,
    },
    /// Report currently running services.
    Status,
    /// Read write-ahead log records in a human-readable form.
    Wal {
        /// Log file to read.
        path: PathBuf,
        /// Maximum records to print.
        #[arg(long, default_value_t = 32)]
        lines: usize,
        /// Keep tailing for appended records.
        #[arg(long)]
        follow: bool,
        /// Node filter (single-node deployments ignore this).
        #[arg(long)]
        node: Option<String>,
    },
    /// Run a scenario deterministically and emit results.
    Simulate {
        /// Scenario description file.
        #[arg(long)]
        config: PathBuf,
        /// Override the configured seed.
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long, value_enum, default_value = "text")]
        output: OutputFormat,
    },
    /// Print version information.
    Version {
        #[arg(long)]
        verbose: bool,
    },
    /// Drive a target with echo rounds and report latencies.
    Benchmark {
        /// Wall-clock run time [s].
        #[arg(long, default_value_t = 10)]
        duration: u64,
        /// Rounds per batch.
        #[arg(long, default_value_t = 4)]
        connections: u32,
        /// Target address.
        #[arg(long, default_value = DEFAULT_BIND_ADDR)]
        target: String,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Start {
            config,
            bind,
            state_dir,
        } => commands::start(&config, &bind, &state_dir),
        Commands::Status => commands::status(),
        Commands::Wal {
            path,
            lines,
            follow,
            node,
        } => commands::wal(&path, lines, follow, node.as_deref()),
        Commands::Simulate {
            config,
            seed,
            output,
        } => commands::simulate(&config, seed, output),
        Commands::Version { verbose } => {
            commands::version(verbose);
            Ok(())
        }
        Commands::Benchmark {
            duration,
            connections,
            target,
        } => commands::benchmark(duration, connections, &target),
    };

    if let Err(e) = result {
        error!("{e}");
        std::process::exit(1);
    }
}
