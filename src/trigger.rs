//! HTTP surface for running a cycle on demand.
//!
//! | Route | Effect |
//! |-------|--------|
//! | `GET /run` | Runs a full cycle, answers once it is done |
//! | `GET /status` | JSON list of every target's last known state |

use crate::error::{MonitorError, Result};
use crate::fetch::PageFetch;
use crate::models::TargetStatus;
use crate::monitor::Monitor;
use crate::notify::Notify;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, instrument};

/// Body of a successful `GET /run` reply.
pub const RUN_ACK: &str = "Manual check finished";

/// Build the trigger routes around a shared monitor.
///
/// # Arguments
///
/// * `monitor` - The monitor whose cycle `/run` starts and whose state `/status` reads
///
/// # Returns
///
/// A [`Router`] with its state already attached, ready for [`axum::serve`].
pub fn router<F, N>(monitor: Arc<Monitor<F, N>>) -> Router
where
    F: PageFetch + Send + Sync + 'static,
    N: Notify + Send + Sync + 'static,
{
    Router::new()
        .route("/run", get(run_now::<F, N>))
        .route("/status", get(status::<F, N>))
        .with_state(monitor)
}

#[instrument(level = "info", skip_all)]
async fn run_now<F, N>(
    State(monitor): State<Arc<Monitor<F, N>>>,
) -> std::result::Result<&'static str, (StatusCode, &'static str)>
where
    F: PageFetch + Send + Sync + 'static,
    N: Notify + Send + Sync + 'static,
{
    info!("Manual run requested");
    // The cycle runs in its own task: a client hanging up drops this handler,
    // and must not cut a cycle off between recording a signal and notifying.
    let cycle = tokio::spawn(async move { monitor.run_cycle().await });
    match cycle.await {
        Ok(()) => Ok(RUN_ACK),
        Err(e) => {
            error!(error = %e, "Manual cycle did not complete");
            Err((StatusCode::INTERNAL_SERVER_ERROR, "Manual check failed"))
        }
    }
}

async fn status<F, N>(State(monitor): State<Arc<Monitor<F, N>>>) -> Json<Vec<TargetStatus>>
where
    F: PageFetch + Send + Sync + 'static,
    N: Notify + Send + Sync + 'static,
{
    Json(monitor.snapshot().await)
}

/// Bind `addr` for the trigger server.
///
/// # Arguments
///
/// * `addr` - A `host:port` pair, as given on the command line
///
/// # Errors
///
/// [`MonitorError::Bind`] when the address is malformed or already taken.
pub async fn bind(addr: &str) -> Result<TcpListener> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| MonitorError::Bind {
            addr: addr.to_string(),
            source,
        })?;
    Ok(listener)
}

/// Serve the trigger routes until `shutdown` turns `true`.
///
/// Shutdown is graceful: requests already in flight, including a `/run`
/// waiting on its cycle, are answered before this returns.
///
/// # Arguments
///
/// * `listener` - A listener from [`bind`]
/// * `monitor` - Shared with the scheduler
/// * `shutdown` - Flips to `true` when the process is stopping
///
/// # Errors
///
/// [`MonitorError::Server`] if the accept loop fails.
pub async fn serve<F, N>(
    listener: TcpListener,
    monitor: Arc<Monitor<F, N>>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()>
where
    F: PageFetch + Send + Sync + 'static,
    N: Notify + Send + Sync + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "Trigger server listening");
    }
    axum::serve(listener, router(monitor))
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await
        .map_err(MonitorError::Server)
}
