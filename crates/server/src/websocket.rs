//! WebSocket transport (spec §6, §16).
//!
//! A single `GET /ws` upgrade endpoint; `session_id` travels in-band on
//! every client message rather than as a path parameter, so a reconnecting
//! client can `resume` the same session on a brand-new socket without the
//! URL itself encoding session identity.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use tts_gateway_core::ErrorCode;

use crate::protocol::{audio_spec_from_start, ClientMessage, ServerMessage};
use crate::session::SessionState;
use crate::state::AppState;
use crate::synth_loop;

pub async fn upgrade_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (ws_sender, mut ws_receiver) = socket.split();
    let ws_sender = Arc::new(Mutex::new(ws_sender));
    let mut forwarder: Option<JoinHandle<()>> = None;

    while let Some(msg) = ws_receiver.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Binary(_)) => continue,
            Err(e) => {
                tracing::debug!(error = %e, "websocket read error");
                break;
            },
        };

        let client_msg: ClientMessage = match serde_json::from_str(&text) {
            Ok(m) => m,
            Err(e) => {
                // Malformed or unparseable input is terminal for the connection
                // (spec's error-handling design: missing required fields cause
                // a bad_request error and session termination).
                send_direct(&ws_sender, ServerMessage::error("", 0, ErrorCode::BadRequest, e.to_string())).await;
                break;
            },
        };

        handle_message(client_msg, &state, &ws_sender, &mut forwarder).await;
    }

    if let Some(handle) = forwarder.take() {
        handle.abort();
    }
}

async fn handle_message(
    msg: ClientMessage,
    state: &AppState,
    ws_sender: &Arc<Mutex<futures::stream::SplitSink<WebSocket, Message>>>,
    forwarder: &mut Option<JoinHandle<()>>,
) {
    match msg {
        ClientMessage::Start { session_id, audio_format, sample_rate, channels } => {
            let audio_spec = audio_spec_from_start(audio_format, sample_rate, channels);
            let session = state.manager.create(session_id, audio_spec);
            attach_forwarder(forwarder, session, ws_sender.clone());
        },

        ClientMessage::TextDelta { session_id, text, .. } => {
            match state.manager.get(&session_id) {
                Some(session) => {
                    session.touch();
                    if !session.is_cancelled() {
                        session.append_text(&text);
                        ensure_synth_task(&session, state);
                    }
                },
                None => {
                    send_direct(ws_sender, ServerMessage::error(&session_id, 0, ErrorCode::BadRequest, "session not started")).await;
                },
            }
        },

        ClientMessage::TextEnd { session_id, .. } => {
            match state.manager.get(&session_id) {
                Some(session) => {
                    session.touch();
                    if !session.is_cancelled() {
                        session.finished.store(true, Ordering::SeqCst);
                        ensure_synth_task(&session, state);
                    }
                },
                None => {
                    send_direct(ws_sender, ServerMessage::error(&session_id, 0, ErrorCode::BadRequest, "session not started")).await;
                },
            }
        },

        ClientMessage::Cancel { session_id, .. } => {
            if let Some(session) = state.manager.get(&session_id) {
                session.touch();
                session.request_cancel();
                metrics::counter!("tts_gateway_sessions_cancelled_total").increment(1);
            }
        },

        ClientMessage::Resume { session_id, last_unit_index_received } => {
            match state.manager.get(&session_id) {
                Some(session) => {
                    session.touch();
                    attach_forwarder(forwarder, session.clone(), ws_sender.clone());
                    replay_after(&session, last_unit_index_received).await;
                },
                None => {
                    send_direct(ws_sender, ServerMessage::error(&session_id, 0, ErrorCode::UnknownSession, "unknown or expired session")).await;
                },
            }
        },
    }
}

/// Spawn the task forwarding this session's send queue to the socket,
/// replacing any prior forwarder for this connection. Aborting the old
/// task drops its lock on `send_rx`, letting the new one reclaim it.
fn attach_forwarder(
    forwarder: &mut Option<JoinHandle<()>>,
    session: Arc<SessionState>,
    ws_sender: Arc<Mutex<futures::stream::SplitSink<WebSocket, Message>>>,
) {
    if let Some(handle) = forwarder.take() {
        handle.abort();
    }
    *forwarder = Some(tokio::spawn(async move {
        let mut rx = session.send_rx.lock().await;
        while let Some(message) = rx.recv().await {
            let json = match serde_json::to_string(&message) {
                Ok(json) => json,
                Err(e) => {
                    tracing::error!(error = %e, "failed to serialize outbound message");
                    continue;
                },
            };
            let mut sender = ws_sender.lock().await;
            if sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    }));
}

fn ensure_synth_task(session: &Arc<SessionState>, state: &AppState) {
    let mut task_slot = session.synth_task.lock();
    if task_slot.as_ref().is_some_and(|h| !h.is_finished()) {
        return;
    }
    let session = session.clone();
    let engine = state.engine.clone();
    let max_pending_units = state.settings.session.max_pending_units;
    let max_send_queue = state.settings.session.max_send_queue;
    let poll_interval = Duration::from_millis(state.settings.session.flush_poll_interval_ms);
    *task_slot = Some(tokio::spawn(async move {
        synth_loop::run(session, engine, max_pending_units, max_send_queue, poll_interval).await;
    }));
}

async fn replay_after(session: &Arc<SessionState>, last_unit_index_received: u64) {
    for chunk in session.chunks_after(last_unit_index_received) {
        let seq = session.next_seq();
        let message = ServerMessage::from_chunk(&session.session_id, seq, &chunk);
        if session.send_tx.send(message).await.is_err() {
            break;
        }
    }
}

async fn send_direct(ws_sender: &Arc<Mutex<futures::stream::SplitSink<WebSocket, Message>>>, message: ServerMessage) {
    if let Ok(json) = serde_json::to_string(&message) {
        let mut sender = ws_sender.lock().await;
        let _ = sender.send(Message::Text(json)).await;
    }
}
