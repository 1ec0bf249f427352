//! Router, shared state and the background sweeper.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    routing::{get, post},
};
use gather_core::aggregate::{Aggregator, Completion};
use gather_core::error::Result as GatherResult;
use gather_core::sink::MarkdownSink;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;

use crate::handlers::{gather, health_check};

/// State shared across handlers.
pub struct AppState<S: MarkdownSink> {
    pub aggregator: Arc<Aggregator<S>>,
}

impl<S: MarkdownSink> AppState<S> {
    pub fn new(aggregator: Aggregator<S>) -> Self {
        Self {
            aggregator: Arc::new(aggregator),
        }
    }
}

impl<S: MarkdownSink> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            aggregator: Arc::clone(&self.aggregator),
        }
    }
}

pub fn build_router<S: MarkdownSink + 'static>(state: AppState<S>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/v1/parser/ppl/gather", post(gather::<S>))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn log_flushed(results: Vec<GatherResult<Completion>>) {
    for result in results {
        match result {
            Ok(done) => tracing::info!(
                doc_id = %done.doc_id,
                reason = ?done.reason,
                pages = done.pages,
                fragments = done.fragments,
                "document flushed"
            ),
            Err(e) => tracing::error!(error = %e, "flush failed"),
        }
    }
}

/// Force-flushes stale documents every `sweep_interval` until aborted.
pub fn spawn_sweeper<S: MarkdownSink + 'static>(
    aggregator: Arc<Aggregator<S>>,
    sweep_interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let aggregator = Arc::clone(&aggregator);
            match tokio::task::spawn_blocking(move || aggregator.sweep_stale()).await {
                Ok(results) => log_flushed(results),
                Err(e) => tracing::error!(error = %e, "sweep task failed"),
            }
        }
    })
}

/// Serves until `shutdown` resolves, then stops the sweeper and flushes
/// every document still in flight.
pub async fn serve<S, F>(
    listener: TcpListener,
    state: AppState<S>,
    shutdown: F,
) -> std::io::Result<()>
where
    S: MarkdownSink + 'static,
    F: Future<Output = ()> + Send + 'static,
{
    let aggregator = Arc::clone(&state.aggregator);
    let sweeper = spawn_sweeper(Arc::clone(&aggregator), aggregator.config().sweep_interval);

    tracing::info!(addr = ?listener.local_addr().ok(), "gather server listening");
    let served = axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await;

    sweeper.abort();
    let in_flight = aggregator.in_flight();
    if in_flight > 0 {
        tracing::info!(in_flight, "flushing in-flight documents");
        match tokio::task::spawn_blocking(move || aggregator.flush_all()).await {
            Ok(results) => log_flushed(results),
            Err(e) => tracing::error!(error = %e, "shutdown flush failed"),
        }
    }

    served
}
