//! Marketplace command-line client
//!
//! Thin shell around `marketplace-client`:
//! 1. Parses arguments and loads configuration
//! 2. Opens the credential store (file-backed or in memory)
//! 3. Runs one command against the API, refreshing tokens as needed
//! 4. Prints the result on stdout; logs go to stderr as JSON

mod cli;
mod commands;
mod config;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use marketplace_auth::CredentialStore;
use marketplace_client::{ApiClient, CancellationToken};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use transport::ReqwestTransport;

use crate::cli::{Cli, Command};
use crate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // JSON logs on stderr so stdout stays clean for command output
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr),
        )
        .init();

    let cli = Cli::parse();

    let config_path = Config::resolve_path(cli.config_path.as_deref());
    let config = Config::load_or_default(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;
    info!(
        base_url = %config.api.base_url,
        timeout_secs = config.api.timeout_secs,
        persistent = config.credentials.path.is_some(),
        "configuration loaded"
    );

    let store = match &config.credentials.path {
        Some(path) => CredentialStore::load(path.clone()).await,
        None => CredentialStore::in_memory(),
    };
    if store.path().is_none() && matches!(cli.command, Command::Login { .. }) {
        warn!("no [credentials] path configured, tokens will not outlive this process");
    }

    let http = reqwest::Client::builder()
        .build()
        .context("failed to build HTTP client")?;
    let transport = ReqwestTransport::new(http, config.api.base_url.clone(), config.timeout());
    let client = ApiClient::new(Arc::new(transport), Arc::new(store));

    // Ctrl-C cancels the in-flight request
    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        }
    });

    let output = commands::run(&client, cli.command, &cancel).await?;
    println!("{output}");
    Ok(())
}
