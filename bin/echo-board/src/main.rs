//! # echo-board
//!
//! Command-line entry point. Loads settings, wires the XRPC agent and the
//! file session store into a `ClientContext`, then runs one command.

mod cli;
mod commands;
mod logging;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use eb_configs::Settings;
use eb_services::{ClientContext, ClientSettings, RetryPolicy, SessionManager};
use eb_session_file::FileSessionStore;
use eb_xrpc::XrpcAgentFactory;
use tracing::{debug, warn};

use cli::{Cli, Command};

fn client_settings(settings: &Settings) -> ClientSettings {
    ClientSettings {
        default_service_url: settings.service_url.clone(),
        fanout_batch_size: settings.fanout_batch_size,
        follow_limit: settings.follow_limit,
        page_limit: settings.page_limit,
        max_pages: settings.max_pages,
        follow_timeout: settings.follow_timeout(),
        retry: RetryPolicy {
            max_attempts: settings.retry_max_attempts,
            base_delay: settings.retry_base_delay(),
            max_delay: settings.retry_max_delay(),
        },
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref()).context("loading configuration")?;
    logging::init_tracing(&settings);

    let store = Arc::new(FileSessionStore::new(settings.session_dir.clone()));
    debug!(dir = %store.root().display(), "session store ready");
    let ctx = ClientContext::new(
        client_settings(&settings),
        SessionManager::load(store),
        Arc::new(XrpcAgentFactory::new(settings.http_timeout())),
    );

    if !matches!(cli.command, Command::Login { .. } | Command::Logout) && ctx.session().is_logged_in() {
        match ctx.resume().await {
            Ok(true) => debug!("session resumed"),
            Ok(false) => warn!("stored session was rejected, log in again"),
            Err(err) if err.is_transient() => {
                warn!(error = %err, "service unavailable, could not refresh the stored session")
            }
            Err(err) => return Err(err).context("resuming stored session"),
        }
    }

    commands::run(&ctx, &settings, cli.command).await
}
