use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use dependi_python::Envelope;
use dependi_python::config::Config;

#[derive(Parser)]
#[command(name = "dependi-python")]
#[command(about = "Extract declared dependencies from Python manifests", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract dependencies from a pyproject.toml
    Pyproject {
        /// Path to the pyproject.toml file
        path: PathBuf,
    },
    /// Extract dependencies from the requirement lists of a directory
    Requirements {
        /// Directory holding *.txt / *.in requirement lists
        directory: PathBuf,
    },
    /// Extract dependencies from the setup.py and setup.cfg of a directory
    Setup {
        /// Directory holding setup.py and/or setup.cfg
        directory: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // stdout carries the JSON envelope only
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(cli.command) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands) -> anyhow::Result<ExitCode> {
    let config = Config::from_env();

    let result = match command {
        Commands::Pyproject { path } => dependi_python::extract_pyproject(&path),
        Commands::Requirements { directory } => {
            dependi_python::extract_requirements_with(&directory, &config)
        }
        Commands::Setup { directory } => dependi_python::extract_setup_with(&directory, &config),
    };

    let envelope = Envelope::from_result(result);
    let json = envelope.to_json().context("failed to serialize result envelope")?;

    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{json}").context("failed to write result envelope")?;
    stdout.flush().context("failed to flush stdout")?;

    Ok(envelope.exit_code())
}
