//! kairos CLI: adaptive time-marching runs, benchmarks and config checks.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "kairos")]
#[command(version, about = "kairos: step-doubling adaptive time stepping")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a simulation from a config file.
    Simulate {
        /// Path to run config (TOML).
        #[arg(short, long, default_value = "simulation.toml")]
        config: String,

        /// Write every telemetry event to this file as JSON lines.
        #[arg(short, long)]
        events: Option<String>,
    },

    /// Run benchmark suite.
    Benchmark {
        /// Which scenario to run (exponential_decay, logistic, van_der_pol, heat_rod, all).
        #[arg(short, long, default_value = "all")]
        scenario: String,

        /// Output CSV file path.
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Print a complete run config for a scenario.
    Template {
        /// Scenario whose defaults are written out.
        #[arg(short, long, default_value = "exponential_decay")]
        scenario: String,
    },

    /// Validate a run config.
    Validate {
        /// Path to config file.
        path: String,
    },
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Simulate { config, events } => commands::simulate(&config, events.as_deref()),
        Commands::Benchmark { scenario, output } => {
            commands::benchmark(&scenario, output.as_deref())
        }
        Commands::Template { scenario } => commands::template(&scenario),
        Commands::Validate { path } => commands::validate(&path),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
