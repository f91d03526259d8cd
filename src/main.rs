//! # listing_watch
//!
//! Watches a handful of rental listing pages and sends a Telegram message
//! whenever listings appear or disappear.
//!
//! ## Usage
//!
//! ```sh
//! TELEGRAM_BOT_TOKEN=... TELEGRAM_CHAT_ID=... listing_watch -c targets.yaml
//! curl http://localhost:3000/run
//! ```
//!
//! ## Architecture
//!
//! 1. **Fetching**: download each target page, retrying a bounded number of times
//! 2. **Detection**: count markers or look for a phrase in the page
//! 3. **State**: compare with the previous successful check
//! 4. **Notification**: message only on transitions
//!
//! Cycles repeat on a fixed interval and can be triggered over HTTP.

use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod config;
mod detect;
mod error;
mod fetch;
mod models;
mod monitor;
mod notify;
mod state;
mod trigger;
mod utils;

use cli::Cli;
use error::{MonitorError, Result};
use fetch::HttpFetcher;
use monitor::Monitor;
use notify::TelegramNotifier;

/// How long in-flight trigger requests get to finish at shutdown.
const SERVER_DRAIN: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> ExitCode {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let args = Cli::parse();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Failed to start monitor");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Cli) -> Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "listing_watch starting up");

    let config = config::load(args.config.as_deref()).await?;
    let fetcher = HttpFetcher::new(config.timing.request_timeout())?;
    let notifier = TelegramNotifier::new(args.telegram_bot_token, args.telegram_chat_id)?;
    info!(telegram = notifier.is_enabled(), "Notifier ready");

    let listener = trigger::bind(&args.listen).await?;
    let monitor = Arc::new(Monitor::new(config, fetcher, notifier));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut server = tokio::spawn(trigger::serve(
        listener,
        Arc::clone(&monitor),
        shutdown_rx.clone(),
    ));
    let scheduler = tokio::spawn({
        let monitor = Arc::clone(&monitor);
        async move { monitor.run(shutdown_rx).await }
    });

    let exited = tokio::select! {
        _ = shutdown_signal() => None,
        // The server only returns early when its accept loop fails.
        joined = &mut server => Some(joined),
    };

    let _ = shutdown_tx.send(true);
    // A scheduled cycle may be mid-fetch; it is abandoned with the process.
    scheduler.abort();
    let _ = scheduler.await;

    let joined = match exited {
        Some(joined) => Some(joined),
        None => match tokio::time::timeout(SERVER_DRAIN, server).await {
            Ok(joined) => Some(joined),
            Err(_) => {
                warn!(timeout = ?SERVER_DRAIN, "Trigger server still draining");
                None
            }
        },
    };
    let outcome = match joined {
        None | Some(Ok(Ok(()))) => Ok(()),
        Some(Ok(Err(e))) => Err(e),
        Some(Err(e)) => Err(MonitorError::Server(std::io::Error::other(e))),
    };
    if let Err(e) = &outcome {
        error!(error = %e, "Trigger server stopped unexpectedly");
    }

    // Waits for a manual cycle still in flight, so the stop message comes last.
    monitor.announce_stop().await;
    info!("Monitor stopped");
    outcome
}

/// Resolve on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Interrupt received"),
        _ = terminate => info!("Terminate signal received"),
    }
}
