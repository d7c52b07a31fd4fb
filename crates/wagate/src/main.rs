// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wagate - a multi-tenant WhatsApp-to-CRM gateway.
//!
//! Binary entry point: parses the CLI and dispatches to `serve`.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

mod connector;
mod serve;

/// Wagate - a multi-tenant WhatsApp-to-CRM gateway.
#[derive(Parser, Debug)]
#[command(name = "wagate", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the gateway daemon.
    Serve {
        /// Explicit config file path (skips the XDG lookup).
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config } => {
            let config = match load(config) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("error: invalid configuration: {e}");
                    return ExitCode::FAILURE;
                }
            };
            if let Err(e) = serve::run_serve(config).await {
                eprintln!("error: {e}");
                return ExitCode::FAILURE;
            }
            ExitCode::SUCCESS
        }
    }
}

fn load(path: Option<PathBuf>) -> Result<wagate_config::WagateConfig, String> {
    let result = match path {
        Some(path) => wagate_config::load_config_from_path(&path),
        None => wagate_config::load_config(),
    };
    result.map_err(|e| e.to_string())
}
