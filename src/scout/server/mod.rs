// SPDX-License-Identifier: MIT

//! HTTP surface: one-shot runs and SSE-streamed runs

use axum::{
    extract::State,
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use futures::stream::Stream;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::adk::error::ScoutError;
use crate::scout::research::{ResearchAgent, ResearchOutcome, ResearchRequest};
use crate::scout::workflow::graph::{RunEvent, RunReport, RunStatus};

type AppState = Arc<ResearchAgent>;

pub fn router(agent: Arc<ResearchAgent>) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/runs", post(create_run))
        .route("/api/runs/stream", post(stream_run))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(agent)
}

pub async fn serve(port: u16, agent: ResearchAgent) -> Result<(), ScoutError> {
    let app = router(Arc::new(agent));

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    log::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Response body for a finished run
pub fn report_body(report: RunReport) -> Value {
    let run_id = report.run_id;
    let steps = report.steps;
    let failures = report.failures.clone();
    let status = report.status;

    match status {
        RunStatus::Completed => match ResearchOutcome::from_report(report) {
            Ok(outcome) => json!({
                "status": "completed",
                "run_id": run_id,
                "steps": steps,
                "failures": failures,
                "outcome": outcome,
            }),
            Err(e) => json!({ "status": "failed", "run_id": run_id, "error": e.to_string() }),
        },
        RunStatus::Cancelled => json!({ "status": "cancelled", "run_id": run_id, "steps": steps }),
        _ => json!({
            "status": "failed",
            "run_id": run_id,
            "error": report
                .error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "run did not complete".to_string()),
        }),
    }
}

async fn create_run(
    State(agent): State<AppState>,
    Json(request): Json<ResearchRequest>,
) -> (StatusCode, Json<Value>) {
    match agent.execute(request, None, CancellationToken::new()).await {
        Ok(report) => {
            let code = if report.status == RunStatus::Failed {
                StatusCode::INTERNAL_SERVER_ERROR
            } else {
                StatusCode::OK
            };
            (code, Json(report_body(report)))
        }
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "status": "failed", "error": e.to_string() })),
        ),
    }
}

async fn stream_run(
    State(agent): State<AppState>,
    Json(request): Json<ResearchRequest>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::channel::<Event>(100);

    tokio::spawn(async move {
        let (events_tx, mut events_rx) = mpsc::channel::<RunEvent>(100);
        let cancel = CancellationToken::new();

        // A closed SSE channel means the client went away
        let forward = {
            let tx = tx.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                while let Some(event) = events_rx.recv().await {
                    let Ok(sse) = Event::default().event("progress").json_data(&event) else {
                        continue;
                    };
                    if tx.send(sse).await.is_err() {
                        log::info!("Client disconnected, cancelling run");
                        cancel.cancel();
                        break;
                    }
                }
            })
        };

        let body = match agent.execute(request, Some(events_tx), cancel).await {
            Ok(report) => report_body(report),
            Err(e) => json!({ "status": "failed", "error": e.to_string() }),
        };
        if let Err(e) = forward.await {
            log::error!("Event forwarding task failed: {}", e);
        }

        if let Ok(sse) = Event::default().event("result").json_data(&body) {
            let _ = tx.send(sse).await;
        }
    });

    let stream = ReceiverStream::new(rx).map(Ok::<_, Infallible>);

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(1)))
}
