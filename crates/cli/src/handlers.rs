//! HTTP request handlers.

use std::sync::Arc;

use axum::{Json, body::Bytes, extract::State, http::StatusCode};
use gather_core::aggregate::SubmitOutcome;
use gather_core::error::GatherError;
use gather_core::fragment::Envelope;
use gather_core::sink::MarkdownSink;
use tracing::{error, info, warn};

use crate::server::AppState;
use crate::types::{GatherResponse, HealthResponse};

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        timestamp: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
    })
}

/// Accepts one fragment.
///
/// The body is decoded here rather than by the `Json` extractor so that an
/// unreadable envelope is a rejection like any other. Returns 400 when the
/// fragment is rejected and 500 when a document this
/// fragment completed could not be written. Every other submission,
/// including one that completes its document, gets `{"text": "none"}`.
pub async fn gather<S: MarkdownSink + 'static>(
    State(state): State<AppState<S>>,
    body: Bytes,
) -> Result<Json<GatherResponse>, (StatusCode, String)> {
    let envelope = Envelope::from_slice(&body).map_err(|e| {
        warn!(error = %e, "unreadable fragment envelope");
        (StatusCode::BAD_REQUEST, e.to_string())
    })?;
    let key = envelope.route_info.uuid.clone();
    let kind = envelope.route_info.kind.clone();

    let fragment = envelope.into_fragment().map_err(|e| {
        warn!(key = %key, kind = %kind, error = %e, "fragment rejected");
        (StatusCode::BAD_REQUEST, e.to_string())
    })?;
    info!(fragment = %fragment.id, "fragment received");

    // Completion renders and writes to disk, so keep it off the async workers.
    let aggregator = Arc::clone(&state.aggregator);
    let outcome = tokio::task::spawn_blocking(move || aggregator.submit(fragment))
        .await
        .map_err(|e| {
            error!(key = %key, error = %e, "submission task failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })?;

    match outcome {
        Ok(SubmitOutcome::Pending) => {}
        Ok(SubmitOutcome::Completed(done)) => {
            info!(
                doc_id = %done.doc_id,
                pages = done.pages,
                fragments = done.fragments,
                "document gathered"
            );
        }
        Err(e) if e.is_rejection() => {
            warn!(key = %key, error = %e, "fragment rejected");
            return Err((StatusCode::BAD_REQUEST, e.to_string()));
        }
        Err(GatherError::Persist {
            doc_id,
            markdown,
            source,
        }) => {
            // Last copy of the document; log it whole so it can be recovered.
            error!(doc_id = %doc_id, error = %source, markdown = %markdown, "document lost");
            return Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("failed to persist document {doc_id}: {source}"),
            ));
        }
        Err(e) => {
            error!(key = %key, error = %e, "submission failed");
            return Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()));
        }
    }

    Ok(Json(GatherResponse::accepted()))
}
