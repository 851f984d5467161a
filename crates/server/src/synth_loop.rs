//! The per-session synth loop state machine (spec §4.4).
//!
//! One loop per session, spawned lazily on first ingress. Drains the
//! pending buffer, calls the engine, and enqueues chunks onto the send
//! queue. Every suspension point (the flush-poll timer, the engine call,
//! the queue send) races against the session's cancel signal so a cancel
//! unblocks immediately instead of waiting out whatever it raced against.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::sleep;

use tts_gateway_core::{ErrorCode, Segment};
use tts_gateway_engine::SynthesisEngine;

use crate::protocol::ServerMessage;
use crate::session::SessionState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopExit {
    NaturalEnd,
    Cancelled,
}

pub async fn run(
    session: Arc<SessionState>,
    engine: Arc<dyn SynthesisEngine>,
    max_pending_units: usize,
    max_send_queue: usize,
    flush_poll_interval: Duration,
) {
    session.mark_synth_running();
    let mut cancel_rx = session.cancel_rx();

    let exit = loop_body(&session, &engine, max_pending_units, max_send_queue, flush_poll_interval, &mut cancel_rx).await;

    if exit == LoopExit::NaturalEnd && !session.is_cancelled() {
        let seq = session.next_seq();
        let _ = session.send_tx.try_send(ServerMessage::tts_end(&session.session_id, seq, false));
    }
    session.mark_synth_done();
}

async fn loop_body(
    session: &Arc<SessionState>,
    engine: &Arc<dyn SynthesisEngine>,
    max_pending_units: usize,
    max_send_queue: usize,
    flush_poll_interval: Duration,
    cancel_rx: &mut watch::Receiver<bool>,
) -> LoopExit {
    loop {
        if session.is_cancelled() {
            return LoopExit::Cancelled;
        }

        if session.send_queue_len() >= max_send_queue {
            let seq = session.next_seq();
            let _ = session.send_tx.try_send(ServerMessage::error(
                &session.session_id,
                seq,
                ErrorCode::Backpressure,
                "send queue saturated, client too slow",
            ));
            metrics::counter!("tts_gateway_sessions_backpressure_total").increment(1);
            session.request_cancel();
            return LoopExit::Cancelled;
        }

        match session.pop_pending_segment(max_pending_units, false) {
            Some(segment) => {
                if synthesize_and_enqueue(session, engine, segment, cancel_rx).await.is_none() {
                    return LoopExit::Cancelled;
                }
            },
            None => {
                if session.finished.load(std::sync::atomic::Ordering::SeqCst) {
                    if let Some(segment) = session.pop_pending_segment(max_pending_units, true) {
                        let _ = synthesize_and_enqueue(session, engine, segment, cancel_rx).await;
                    }
                    return LoopExit::NaturalEnd;
                }

                if cancellable(sleep(flush_poll_interval), cancel_rx).await.is_none() {
                    return LoopExit::Cancelled;
                }
            },
        }
    }
}

/// Synthesize one segment and enqueue its `audio_chunk`. Returns `None` if
/// the session was cancelled during synthesis or the send, in which case
/// the caller must stop the loop without retrying.
async fn synthesize_and_enqueue(
    session: &Arc<SessionState>,
    engine: &Arc<dyn SynthesisEngine>,
    segment: Segment,
    cancel_rx: &mut watch::Receiver<bool>,
) -> Option<()> {
    if session.is_cancelled() {
        return None;
    }

    let audio_bytes = match cancellable(engine.synthesize_pcm16(&segment.text, &session.audio_spec), cancel_rx).await {
        Some(Ok(bytes)) => bytes,
        Some(Err(e)) => {
            tracing::warn!(session_id = %session.session_id, error = %e, "synthesis engine failed");
            let seq = session.next_seq();
            let _ = session.send_tx.try_send(ServerMessage::error(
                &session.session_id,
                seq,
                ErrorCode::EngineFailure,
                e.0,
            ));
            session.request_cancel();
            return None;
        },
        None => return None,
    };

    if session.is_cancelled() {
        return None;
    }

    let chunk = session.cache_chunk(segment.start, segment.end, segment.text.clone(), audio_bytes);
    let seq = session.next_seq();
    let message = ServerMessage::from_chunk(&session.session_id, seq, &chunk);
    metrics::counter!("tts_gateway_chunks_emitted_total").increment(1);

    cancellable(session.send_tx.send(message), cancel_rx)
        .await
        .and_then(|r| r.ok())
}

/// Race `fut` against the cancel signal becoming true. `None` means cancel
/// won; `Some(output)` means `fut` completed first.
async fn cancellable<F: Future>(fut: F, cancel_rx: &mut watch::Receiver<bool>) -> Option<F::Output> {
    if *cancel_rx.borrow() {
        return None;
    }
    tokio::select! {
        biased;
        _ = wait_for_cancel(cancel_rx) => None,
        out = fut => Some(out),
    }
}

async fn wait_for_cancel(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
