//! exotracker CI entry point
//!
//! Invoked once per CI step. Everything that varies between jobs comes from
//! the environment matrix; the command line only picks the step.
//!
//! ## Commands
//!
//! - `build`: configure with CMake and build with Ninja
//! - `test`: run the unit tests from the build directory
//! - `archive`: package the release and its debug symbols

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use exotracker_ci::telemetry::{wants_json, LOG_FORMAT_VAR};
use exotracker_ci::{
    init_tracing, platform, BuildMatrix, CiError, Orchestrator, ProcessRunner, SystemRunner,
    Workspace,
};
use std::ffi::OsString;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, Level};

#[derive(Parser)]
#[command(name = "exotracker-ci")]
#[command(about = "Build, test and package exotracker on CI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure and build in the per-job build directory
    Build,

    /// Run exotracker-tests from an existing build directory
    Test,

    /// Stage the executable with its Qt runtime and create release archives
    Archive,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // clap exits with status 2 and usage on stderr for a missing or unknown command.
    let cli = Cli::parse();

    let json = wants_json(std::env::var(LOG_FORMAT_VAR).ok().as_deref());
    init_tracing(json, Level::INFO);

    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:?}");
            let code = err
                .downcast_ref::<CiError>()
                .map(CiError::exit_code)
                .unwrap_or(1);
            ExitCode::from(code)
        }
    }
}

async fn run(command: Commands) -> Result<()> {
    dispatch(command, |key| std::env::var_os(key), Arc::new(SystemRunner)).await
}

/// Run one step with the matrix read through `lookup` and processes spawned
/// through `runner`.
async fn dispatch<F>(command: Commands, lookup: F, runner: Arc<dyn ProcessRunner>) -> Result<()>
where
    F: Fn(&str) -> Option<OsString>,
{
    let matrix = BuildMatrix::from_os_lookup(lookup).context("Invalid CI matrix configuration")?;
    debug!(
        matrix = %serde_json::to_string(&matrix)?,
        build_dir = %matrix.build_dir_name(),
        archive = %matrix.archive_name(),
        "Resolved build matrix"
    );

    let workspace = Workspace::from_current_dir()?;
    let orchestrator = Orchestrator::new(matrix, workspace, runner);

    match command {
        Commands::Build => orchestrator.build().await?,
        Commands::Test => orchestrator.test().await?,
        Commands::Archive => {
            let platform = platform::current()?;
            let outputs = orchestrator.archive(platform.as_ref()).await?;
            println!("{}", outputs.application.path.display());
            if let Some(symbols) = &outputs.debug_symbols {
                println!("{}", symbols.path.display());
            }
        }
    }
    Ok(())
}
