mod config;
mod services;
mod state;

use squares_shared::Grid;
use tokio::signal;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use crate::services::loader::{self, Loader, LoaderOptions};
use crate::services::source::http_fetch;
use crate::services::store::TileStore;
use crate::services::walker;
use crate::state::FetcherState;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let Some(template) = config::tile_template() else {
        tracing::error!("SQUARES_TILE_TEMPLATE is required to run squares-fetcher");
        return;
    };
    let state = match FetcherState::new() {
        Ok(state) => state,
        Err(e) => {
            tracing::error!(error = %e, "failed to build HTTP client");
            return;
        }
    };

    let path = config::walk_path();
    let (width, height) = config::viewport_size();
    let scheduler = config::scheduler_config();
    let store = TileStore::new(config::out_dir());
    tracing::info!(
        %template,
        max_concurrent = scheduler.max_concurrent,
        steps = path.len(),
        width,
        height,
        out_dir = %store.root().display(),
        "starting tile walk"
    );

    let center = path.first().copied().unwrap_or(config::DEFAULT_CENTER);
    let grid = Grid::new(width, height, center, config::pyramid());
    let (tx, rx) = mpsc::channel(config::COMMAND_BUFFER);
    let loader = Loader::new(
        LoaderOptions {
            grid,
            template,
            scheduler,
            store,
        },
        http_fetch(state.http_client.clone()),
        tx.clone(),
        state.counters.clone(),
    );

    let mut actor = tokio::spawn(loader::run(loader, rx));
    tokio::spawn(walker::drive(tx, path, config::step_interval()));

    tokio::select! {
        joined = &mut actor => match joined {
            Ok(summary) => tracing::info!(
                loaded = summary.counters.loaded_total,
                failed = summary.counters.failed_total,
                cancelled = summary.counters.cancelled_total,
                stale = summary.counters.stale_completions_total,
                cache_dispatched = summary.counters.cache_dispatched_total,
                session_urls = summary.session_urls,
                "tile walk finished"
            ),
            Err(e) => tracing::error!(error = %e, "loader task failed"),
        },
        () = shutdown_signal() => {
            actor.abort();
            let counters = state.counters.snapshot();
            tracing::warn!(
                loaded = counters.loaded_total,
                failed = counters.failed_total,
                "tile walk interrupted"
            );
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                return;
            }
        };
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
