use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use divorce_sim::core::{
    CalculationSelection, ConstantsTable, EngineContext, FinancialFacts, SelectionPreset,
    normalize, simulate_facts,
};
use divorce_sim::report::{SessionId, render_report, write_report};
use serde_json::Value;
use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Divorce outcome estimates: compensatory allowance, child support,
/// liquidation and disposable income.
#[derive(Parser, Debug)]
#[command(name = "divorce-sim", version, about, long_about = None)]
struct Cli {
    /// Constants table (TOML); the compiled-in 2026 table is used otherwise
    #[arg(long, global = true, value_name = "FILE", env = "DIVORCE_SIM_CONSTANTS")]
    constants: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, global = true, env = "DIVORCE_SIM_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API
    Serve {
        #[arg(long, env = "DIVORCE_SIM_HOST", default_value = "0.0.0.0")]
        host: IpAddr,
        #[arg(short, long, env = "DIVORCE_SIM_PORT", default_value_t = 8080)]
        port: u16,
    },
    /// Print the simulation result as JSON
    Simulate {
        #[command(flatten)]
        inputs: InputArgs,
    },
    /// Write the text report into a directory
    Report {
        #[command(flatten)]
        inputs: InputArgs,
        #[arg(long, value_name = "DIR", default_value = ".")]
        out: PathBuf,
    },
    /// Print the active constants table as TOML
    Constants,
}

#[derive(clap::Args, Debug)]
struct InputArgs {
    /// Financial facts record (JSON)
    #[arg(long, value_name = "FILE")]
    facts: PathBuf,
    /// Stored calculation selection (JSON); all calculations when omitted
    #[arg(long, value_name = "FILE", conflicts_with = "preset")]
    selection: Option<PathBuf>,
    #[arg(long, value_enum)]
    preset: Option<CliPreset>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliPreset {
    Express,
    Standard,
    PcPrecision,
    Complete,
}

impl From<CliPreset> for SelectionPreset {
    fn from(value: CliPreset) -> Self {
        match value {
            CliPreset::Express => SelectionPreset::Express,
            CliPreset::Standard => SelectionPreset::Standard,
            CliPreset::PcPrecision => SelectionPreset::PcPrecision,
            CliPreset::Complete => SelectionPreset::Complete,
        }
    }
}

#[derive(Debug, Error)]
enum CliError {
    #[error("Cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

fn init_tracing(log_level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn read_json(path: &Path) -> Result<Value, CliError> {
    let raw = fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| CliError::Json {
        path: path.to_path_buf(),
        source,
    })
}

fn load_inputs(
    args: &InputArgs,
) -> Result<(FinancialFacts, CalculationSelection), Box<dyn std::error::Error>> {
    let facts = normalize(&read_json(&args.facts)?)?;
    let selection = match (&args.selection, args.preset) {
        (Some(path), _) => CalculationSelection::from_value(Some(&read_json(path)?))?,
        (None, Some(preset)) => CalculationSelection::preset(preset.into()),
        (None, None) => CalculationSelection::all(),
    };
    Ok((facts, selection))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let constants = match &cli.constants {
        Some(path) => {
            let table = ConstantsTable::load(path)?;
            tracing::info!(path = %path.display(), version = %table.version, "constants table loaded");
            table
        }
        None => ConstantsTable::default(),
    };

    match cli.command {
        Command::Serve { host, port } => {
            divorce_sim::api::run_http_server(SocketAddr::new(host, port), constants).await?;
        }
        Command::Simulate { inputs } => {
            let (facts, selection) = load_inputs(&inputs)?;
            let ctx = EngineContext::today(&constants);
            let result = simulate_facts(&facts, selection, &ctx);
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Report { inputs, out } => {
            let (facts, selection) = load_inputs(&inputs)?;
            let ctx = EngineContext::today(&constants);
            let result = simulate_facts(&facts, selection, &ctx);
            let written = render_report(&facts, &result, SessionId::random(), &ctx)
                .and_then(|report| write_report(&report, &out));
            match written {
                Ok(path) => println!("{}", path.display()),
                Err(err) => {
                    tracing::error!(error = %err, "report generation failed");
                    eprintln!("{}", err.user_message());
                    return Err(err.into());
                }
            }
        }
        Command::Constants => {
            print!("{}", constants.to_toml_string()?);
        }
    }

    Ok(())
}
