mod commands;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;

use commands::financing::FinancingArgs;
use commands::metrics::MetricsArgs;
use commands::run::RunArgs;
use commands::xirr::XirrArgs;

/// Private credit fund performance: gross and net of fund leverage
#[derive(Parser)]
#[command(
    name = "cperf",
    version,
    about = "Private credit fund performance: gross and net of fund leverage",
    long_about = "A CLI for private credit fund performance with decimal precision. \
                  Aggregates paid-in, distributions, MOIC and XIRR per facility, deal \
                  and fund, builds the fund leverage financing schedule, and reports \
                  gross against net returns."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Log progress and debug detail
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Solve XIRR for a dated cash flow series
    Xirr(XirrArgs),
    /// Paid-in, distributions, MOIC and XIRR grouped by level
    Metrics(MetricsArgs),
    /// Build the fund leverage financing schedule
    Financing(FinancingArgs),
    /// Run gross metrics, financing and net metrics end to end
    Run(RunArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn init_logging(quiet: bool, verbose: bool) {
    let default_filter = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "warn"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.quiet, cli.verbose);

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Xirr(args) => commands::xirr::run_xirr(args),
        Commands::Metrics(args) => commands::metrics::run_metrics(args),
        Commands::Financing(args) => commands::financing::run_financing(args),
        Commands::Run(args) => commands::run::run_pipeline(args),
        Commands::Version => {
            println!("cperf {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            log::debug!("command failed: {e:?}");
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}
