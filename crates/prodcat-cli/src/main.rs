//! Prodcat CLI - product catalog command-line interface.
//!
//! The main entry point for the `prodcat` CLI binary.

use std::process::ExitCode;

use clap::Parser;

use prodcat_cli::{Cli, Commands, EXIT_FAILURE, exit_code};
use prodcat_core::observability::{LogFormat, init_logging};

fn main() -> ExitCode {
    init_logging(LogFormat::from_env());

    // Parse CLI arguments
    let cli = Cli::parse();
    let config = cli.config();

    // Create runtime and execute
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!(error = %e, "failed to start async runtime");
            return ExitCode::from(EXIT_FAILURE);
        }
    };

    let result = runtime.block_on(async {
        match cli.command {
            Commands::Update(args) => prodcat_cli::commands::update::execute(args, &config).await,
            Commands::Show(args) => prodcat_cli::commands::show::execute(args, &config).await,
        }
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %format_args!("{err:#}"), "prodcat failed");
            ExitCode::from(exit_code(&err))
        }
    }
}
