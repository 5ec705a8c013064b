#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

mod command;
mod config;

use std::process;

use anyhow::{Context, bail};
use bucketry_minio::StorageClient;

use crate::config::Cli;

// Tracing target constants
pub const TRACING_TARGET_STARTUP: &str = "bucketry_cli::startup";
pub const TRACING_TARGET_SHUTDOWN: &str = "bucketry_cli::shutdown";
pub const TRACING_TARGET_CONFIG: &str = "bucketry_cli::config";
pub const TRACING_TARGET_COMMAND: &str = "bucketry_cli::command";

#[tokio::main]
async fn main() {
    let Err(error) = run().await else {
        tracing::debug!(
            target: TRACING_TARGET_SHUTDOWN,
            "command completed successfully"
        );
        process::exit(0);
    };

    if tracing::enabled!(tracing::Level::ERROR) {
        tracing::error!(
            target: TRACING_TARGET_SHUTDOWN,
            error = %format!("{error:#}"),
            "command failed"
        );
    } else {
        eprintln!("Error: {error:#}");
    }

    process::exit(1);
}

/// Main application entry point.
async fn run() -> anyhow::Result<()> {
    let cli = Cli::init();

    Cli::init_tracing();
    cli.log();

    let Some(client) =
        StorageClient::from_config(cli.storage.clone()).context("invalid storage configuration")?
    else {
        bail!("object storage is disabled (set MINIO_ENABLE=true to enable it)");
    };

    command::execute(&client, cli.bucket.as_deref(), cli.command).await
}
