//! Credit risk CLI
//!
//! Scores loan applications against a running risk API, checks its health,
//! and inspects or scores model artifacts offline.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use client::{ApiClient, ClientError};
use commands::{batch, health, model, predict};
use std::path::PathBuf;

/// Credit risk CLI
#[derive(Parser)]
#[command(name = "crisk")]
#[command(author, version, about = "CLI for the Credit Risk prediction service", long_about = None)]
pub struct Cli {
    /// API endpoint URL (can also be set via CRISK_API_URL env var)
    #[arg(long, env = "CRISK_API_URL", default_value = "http://localhost:8000")]
    pub api_url: String,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Score a single application
    Predict(predict::ApplicationArgs),

    /// Score every application in a JSON file
    Batch {
        /// JSON array of applications, or an object with an `applications` array
        file: PathBuf,
    },

    /// Show service status and readiness
    Health,

    /// Describe a model artifact without starting the server
    Inspect {
        /// Path to the artifact manifest
        artifact: PathBuf,
    },

    /// Score applications locally against a model artifact
    Score {
        /// Path to the artifact manifest
        #[arg(long, short)]
        model: PathBuf,

        /// JSON array of applications, or an object with an `applications` array
        file: PathBuf,
    },
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Predict(args) => {
            let client = ApiClient::new(&cli.api_url)?;
            predict::run(&client, args, cli.format).await
        }
        Commands::Batch { file } => {
            let client = ApiClient::new(&cli.api_url)?;
            batch::run(&client, &file, cli.format).await
        }
        Commands::Health => {
            let client = ApiClient::new(&cli.api_url)?;
            health::run(&client, cli.format).await
        }
        Commands::Inspect { artifact } => model::inspect(&artifact, cli.format),
        Commands::Score { model: artifact, file } => model::score(&artifact, &file, cli.format),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(err) = run(cli).await {
        output::print_error(&format!("{:#}", err));
        if let Some(ClientError::Api {
            details: Some(details),
            ..
        }) = err.downcast_ref::<ClientError>()
        {
            output::print_details(details);
        }
        std::process::exit(1);
    }
}
