//! WebSocket session transport.
//!
//! Each connection gets its own orchestrator and a dedicated writer task fed
//! by a bounded channel; the read loop handles exactly one inbound message
//! at a time, so all outbound frames of turn *n* are enqueued before turn
//! *n + 1* is read.  Dropping the connection drops the orchestrator future,
//! which aborts any in-flight adapter call.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use viva_engine::{SessionFlow, SessionOrchestrator};
use viva_protocol::{ErrorBody, ErrorCode, Inbound, Outbound};

use crate::AppState;

#[derive(Debug, Deserialize)]
pub(crate) struct SessionParams {
    interview_id: Uuid,
}

pub(crate) async fn upgrade(
    ws: WebSocketUpgrade,
    Query(params): Query<SessionParams>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| run_session(socket, params.interview_id, state))
}

async fn run_session(socket: WebSocket, interview_id: Uuid, state: AppState) {
    let (mut sink, mut stream) = socket.split();

    if !state.claim_session(interview_id).await {
        warn!(%interview_id, "refusing second concurrent session");
        let refusal = Outbound::Error(ErrorBody::new(
            ErrorCode::InvalidState,
            "this interview already has a live session",
            false,
            false,
        ));
        if let Ok(json) = serde_json::to_string(&refusal) {
            let _ = sink.send(Message::Text(json.into())).await;
        }
        let _ = sink.send(Message::Close(None)).await;
        return;
    }
    info!(%interview_id, "session connected");

    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Outbound>(64);
    // Single writer task: serialises all writes on the socket, preserving
    // the enqueue order across the whole session.
    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            let json = match serde_json::to_string(&frame) {
                Ok(json) => json,
                Err(err) => {
                    warn!(%err, kind = frame.kind(), "failed to encode outbound frame");
                    continue;
                }
            };
            if sink.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
        let _ = sink.send(Message::Close(None)).await;
    });

    let error_tx = outbound_tx.clone();
    let mut orchestrator = SessionOrchestrator::new(
        interview_id,
        state.ports.clone(),
        state.config.clone(),
        outbound_tx,
    );

    if orchestrator.announce().await == SessionFlow::Continue {
        while let Some(message) = stream.next().await {
            let flow = match message {
                Ok(Message::Text(text)) => match serde_json::from_str::<Inbound>(&text) {
                    Ok(frame) => orchestrator.on_frame(frame).await,
                    Err(err) => {
                        debug!(%interview_id, %err, "unparseable inbound frame");
                        let _ = error_tx
                            .send(Outbound::Error(ErrorBody::new(
                                ErrorCode::InvalidMessage,
                                format!("unrecognised frame: {err}"),
                                false,
                                false,
                            )))
                            .await;
                        SessionFlow::Continue
                    }
                },
                Ok(Message::Binary(bytes)) => orchestrator.on_binary(&bytes).await,
                Ok(Message::Close(_)) => {
                    debug!(%interview_id, "client closed the session");
                    break;
                }
                Ok(_) => SessionFlow::Continue, // ping/pong
                Err(err) => {
                    warn!(%interview_id, %err, "session transport error");
                    break;
                }
            };
            if flow == SessionFlow::Closed {
                break;
            }
        }
    }

    // Drop both senders so the writer drains the queue and exits.
    drop(orchestrator);
    drop(error_tx);
    let _ = writer.await;
    state.release_session(interview_id).await;
    info!(%interview_id, "session disconnected");
}
