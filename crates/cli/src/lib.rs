pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use brokerage_core::config::{AppConfig, LoadOptions, LogFormat};

#[derive(Debug, Parser)]
#[command(
    name = "brokerage",
    about = "Brokerage commission operator CLI",
    long_about = "Inspect configuration, apply migrations, validate commission setups, ingest \
                  sales, recalculate commissions and record payments.",
    after_help = "Examples:\n  brokerage config\n  brokerage validate --file commissions.toml \
                  --apply\n  brokerage recalculate --sale V-2031 --refresh\n  brokerage pay \
                  --sale V-2031 --position 0"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Validate a commission document and optionally store it")]
    Validate {
        #[arg(long, help = "TOML document with global roles, developments, rules and partners")]
        file: PathBuf,
        #[arg(long, help = "Store the document when every configuration is valid")]
        apply: bool,
    },
    #[command(about = "Map upstream CRM sale records from a JSON file and store them")]
    Ingest {
        #[arg(long, help = "JSON array of sale records")]
        file: PathBuf,
    },
    #[command(about = "Recalculate commissions for the given sales, or for every sale")]
    Recalculate {
        #[arg(long = "sale", help = "Sale id to recalculate; repeat for several")]
        sales: Vec<String>,
        #[arg(long, help = "Use the current configuration instead of frozen percents")]
        refresh: bool,
    },
    #[command(about = "Mark one distribution row of a sale as paid")]
    Pay {
        #[arg(long, help = "Sale id")]
        sale: String,
        #[arg(long, help = "Row position as listed for the sale, starting at 0")]
        position: usize,
    },
}

fn init_logging() {
    use tracing::Level;

    let Ok(config) = AppConfig::load(LoadOptions::default()) else {
        return;
    };
    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(log_level)
        .with_writer(std::io::stderr);

    let _ = match config.logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    init_logging();

    let result = match cli.command {
        Command::Config => commands::config::run(),
        Command::Migrate => commands::migrate::run(),
        Command::Validate { file, apply } => commands::validate::run(&file, apply),
        Command::Ingest { file } => commands::ingest::run(&file),
        Command::Recalculate { sales, refresh } => commands::recalculate::run(sales, refresh),
        Command::Pay { sale, position } => commands::pay::run(sale, position),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
