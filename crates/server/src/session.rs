//! Per-session state (spec §3, §4.4).
//!
//! A session bundles three independently-lockable pieces of state so the
//! ingress path, the synth loop, and the websocket handler never contend on
//! state they don't touch:
//!
//! - [`PendingState`]: the not-yet-flushed character buffer.
//! - [`CacheState`]: synthesized chunks kept for resume, plus the chunk
//!   sequence counter.
//! - everything else (cancel/synth-done signals, the send queue, outbound
//!   seq) lives directly on [`SessionState`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use tts_gateway_core::{is_punctuation, AudioSpec, CachedChunk, Segment};

use crate::protocol::ServerMessage;

/// The not-yet-flushed tail of ingressed text, plus the indices needed to
/// assign contiguous unit indices to whatever gets popped next.
#[derive(Debug, Default)]
pub struct PendingState {
    pub buffer: String,
    /// Unit index the first character currently in `buffer` will receive.
    pub pending_start_index: u64,
    /// Unit index the next *appended* character will receive.
    pub next_unit_index: u64,
}

impl PendingState {
    fn new() -> Self {
        Self {
            buffer: String::new(),
            pending_start_index: 0,
            next_unit_index: 0,
        }
    }
}

/// Synthesized chunks retained for resume, and the monotonic chunk counter.
#[derive(Debug, Default)]
pub struct CacheState {
    pub chunk_seq: u64,
    pub chunks: Vec<CachedChunk>,
}

impl CacheState {
    fn new() -> Self {
        Self {
            chunk_seq: 0,
            chunks: Vec::new(),
        }
    }
}

/// State machine for a single streaming synthesis session.
pub struct SessionState {
    pub session_id: String,
    pub audio_spec: AudioSpec,

    pub pending: Mutex<PendingState>,
    pub cache: Mutex<CacheState>,
    /// How long a cached chunk is kept before it's trimmed on the next
    /// insert (spec §4.1); independent of the session's own idle TTL.
    cache_ttl: Duration,

    /// Bound applied at construction time: `max_send_queue + 1`, the extra
    /// slot reserved so a terminal message (`tts_end`/`error`) can always be
    /// enqueued even when the data queue is saturated.
    max_send_queue: usize,
    pub send_tx: mpsc::Sender<ServerMessage>,
    /// Wrapped so a reconnecting websocket can reclaim draining after the
    /// previous connection's forwarder task drops its lock on disconnect.
    pub send_rx: tokio::sync::Mutex<mpsc::Receiver<ServerMessage>>,

    /// Flipped true to ask the synth loop to stop after its current unit of
    /// work; a `watch` channel (not `Notify`) so a cancel that races ahead
    /// of the loop's first `.changed()` poll is never missed.
    cancel_tx: watch::Sender<bool>,
    cancel_rx: watch::Receiver<bool>,

    /// `true` whenever no synth task is currently running for this session
    /// (idle at creation, flips false/true around each task's lifetime).
    synth_done_tx: watch::Sender<bool>,
    synth_done_rx: watch::Receiver<bool>,

    pub synth_task: Mutex<Option<JoinHandle<()>>>,

    pub finished: std::sync::atomic::AtomicBool,
    pub cancelled: std::sync::atomic::AtomicBool,

    /// Outbound message sequence number, assigned in send order.
    outbound_seq: AtomicU64,

    /// Last-touched timestamp for TTL-based reclamation (updated on any
    /// client message and on cache writes).
    pub last_activity: Mutex<Instant>,
}

impl SessionState {
    pub fn new(session_id: String, audio_spec: AudioSpec, max_send_queue: usize, cache_ttl: Duration) -> Self {
        let (send_tx, send_rx) = mpsc::channel(max_send_queue + 1);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (synth_done_tx, synth_done_rx) = watch::channel(true);

        Self {
            session_id,
            audio_spec,
            pending: Mutex::new(PendingState::new()),
            cache: Mutex::new(CacheState::new()),
            cache_ttl,
            max_send_queue,
            send_tx,
            send_rx: tokio::sync::Mutex::new(send_rx),
            cancel_tx,
            cancel_rx,
            synth_done_tx,
            synth_done_rx,
            synth_task: Mutex::new(None),
            finished: std::sync::atomic::AtomicBool::new(false),
            cancelled: std::sync::atomic::AtomicBool::new(false),
            outbound_seq: AtomicU64::new(0),
            last_activity: Mutex::new(Instant::now()),
        }
    }

    pub fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    pub fn idle_for(&self) -> std::time::Duration {
        self.last_activity.lock().elapsed()
    }

    pub fn next_seq(&self) -> u64 {
        self.outbound_seq.fetch_add(1, Ordering::SeqCst)
    }

    /// Append newly-ingressed text to the pending buffer (spec §4.1).
    pub fn append_text(&self, text: &str) {
        if text.is_empty() {
            return;
        }
        let mut pending = self.pending.lock();
        pending.buffer.push_str(text);
        pending.next_unit_index += text.chars().count() as u64;
    }

    /// Pop a segment per the flush policy (spec §4.1): the whole buffer if
    /// `force` (a `text_end` arrived) or it already ends on punctuation or
    /// has reached `max_pending_units`; otherwise `None`.
    pub fn pop_pending_segment(&self, max_pending_units: usize, force: bool) -> Option<Segment> {
        let mut pending = self.pending.lock();
        if pending.buffer.is_empty() {
            return None;
        }
        let should_flush = force || should_flush_buffer(&pending.buffer, max_pending_units);
        if !should_flush {
            return None;
        }

        let text = std::mem::take(&mut pending.buffer);
        let unit_count = text.chars().count() as u64;
        let start = pending.pending_start_index;
        let end = start + unit_count - 1;
        pending.pending_start_index = start + unit_count;

        Some(Segment { start, end, text })
    }

    pub fn pending_len(&self) -> usize {
        self.pending.lock().buffer.chars().count()
    }

    /// Append a synthesized chunk to the resume cache, trimming any chunk
    /// older than `cache_ttl` on the same insert (spec §4.1).
    pub fn cache_chunk(&self, unit_index_start: u64, unit_index_end: u64, units_text: String, audio_bytes: Vec<u8>) -> CachedChunk {
        let mut cache = self.cache.lock();
        cache.chunk_seq += 1;
        let chunk = CachedChunk {
            created_at: Instant::now(),
            chunk_seq: cache.chunk_seq,
            unit_index_start,
            unit_index_end,
            units_text,
            audio_spec: self.audio_spec.clone(),
            audio_bytes,
        };
        cache.chunks.push(chunk.clone());
        let ttl = self.cache_ttl;
        cache.chunks.retain(|c| c.created_at.elapsed() <= ttl);
        chunk
    }

    /// Chunks not yet received by the client as of `last_unit_index_received`
    /// (spec §4.4 resume semantics), in emission order.
    pub fn chunks_after(&self, last_unit_index_received: u64) -> Vec<CachedChunk> {
        let cache = self.cache.lock();
        cache
            .chunks
            .iter()
            .filter(|c| !c.already_received(last_unit_index_received))
            .cloned()
            .collect()
    }

    /// Current number of messages occupying the send queue, derived from the
    /// sender's remaining permit count (the channel has no direct `len()`).
    pub fn send_queue_len(&self) -> usize {
        (self.max_send_queue + 1).saturating_sub(self.send_tx.capacity())
    }

    pub fn is_backpressured(&self) -> bool {
        self.send_queue_len() >= self.max_send_queue
    }

    pub fn request_cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        let _ = self.cancel_tx.send(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel_rx.borrow()
    }

    pub fn cancel_rx(&self) -> watch::Receiver<bool> {
        self.cancel_rx.clone()
    }

    pub fn mark_synth_running(&self) {
        let _ = self.synth_done_tx.send(false);
    }

    pub fn mark_synth_done(&self) {
        let _ = self.synth_done_tx.send(true);
    }

    pub fn synth_done_rx(&self) -> watch::Receiver<bool> {
        self.synth_done_rx.clone()
    }
}

/// Whether a pending buffer should flush without waiting for more input:
/// it has hit the size cap, or its last character is a flush-triggering
/// punctuation mark (spec §4.1).
fn should_flush_buffer(buffer: &str, max_pending_units: usize) -> bool {
    if buffer.chars().count() >= max_pending_units {
        return true;
    }
    matches!(buffer.chars().last(), Some(c) if is_punctuation(c))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_session() -> SessionState {
        SessionState::new(
            "s1".to_string(),
            AudioSpec::new("pcm16_wav", 16000, 1),
            200,
            Duration::from_secs(120),
        )
    }

    #[test]
    fn does_not_flush_below_cap_without_punctuation() {
        let session = new_session();
        session.append_text("hello");
        assert!(session.pop_pending_segment(24, false).is_none());
        assert_eq!(session.pending_len(), 5);
    }

    #[test]
    fn flushes_on_trailing_punctuation() {
        let session = new_session();
        session.append_text("hello,");
        let segment = session.pop_pending_segment(24, false).unwrap();
        assert_eq!(segment.text, "hello,");
        assert_eq!(segment.start, 0);
        assert_eq!(segment.end, 5);
    }

    #[test]
    fn flushes_on_cjk_punctuation() {
        let session = new_session();
        session.append_text("你好。");
        let segment = session.pop_pending_segment(24, false).unwrap();
        assert_eq!(segment.text, "你好。");
    }

    #[test]
    fn flushes_on_size_cap_without_punctuation() {
        let session = new_session();
        session.append_text("abcdefghij");
        let segment = session.pop_pending_segment(10, false).unwrap();
        assert_eq!(segment.text, "abcdefghij");
        assert_eq!(segment.end, 9);
    }

    #[test]
    fn forced_flush_empties_buffer_regardless_of_policy() {
        let session = new_session();
        session.append_text("no trailing punct");
        let segment = session.pop_pending_segment(1000, true).unwrap();
        assert_eq!(segment.text, "no trailing punct");
    }

    #[test]
    fn successive_segments_have_contiguous_indices() {
        let session = new_session();
        session.append_text("ab,");
        let first = session.pop_pending_segment(24, false).unwrap();
        assert_eq!((first.start, first.end), (0, 2));

        session.append_text("cd.");
        let second = session.pop_pending_segment(24, false).unwrap();
        assert_eq!((second.start, second.end), (3, 5));
    }

    #[test]
    fn empty_buffer_never_flushes() {
        let session = new_session();
        assert!(session.pop_pending_segment(24, true).is_none());
    }

    #[test]
    fn chunks_after_excludes_already_received_ranges() {
        let session = new_session();
        session.cache_chunk(0, 4, "hello".to_string(), vec![1, 2]);
        session.cache_chunk(5, 9, "world".to_string(), vec![3, 4]);

        let remaining = session.chunks_after(4);
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].unit_index_start, 5);
    }

    #[test]
    fn chunks_after_excludes_all_chunks_up_to_and_including_the_last_one() {
        let session = new_session();
        session.cache_chunk(0, 4, "aaaaa".to_string(), vec![]);
        session.cache_chunk(5, 9, "bbbbb".to_string(), vec![]);
        session.cache_chunk(10, 14, "ccccc".to_string(), vec![]);

        assert!(session.chunks_after(14).is_empty());

        let remaining = session.chunks_after(9);
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].unit_index_start, 10);
    }

    #[test]
    fn cache_chunk_trims_entries_older_than_ttl() {
        let session = SessionState::new(
            "s1".to_string(),
            AudioSpec::new("pcm16_wav", 16000, 1),
            200,
            Duration::from_millis(5),
        );
        session.cache_chunk(0, 4, "hello".to_string(), vec![]);
        std::thread::sleep(Duration::from_millis(20));
        session.cache_chunk(5, 9, "world".to_string(), vec![]);

        let cache = session.cache.lock();
        assert_eq!(cache.chunks.len(), 1);
        assert_eq!(cache.chunks[0].unit_index_start, 5);
    }

    #[test]
    fn send_queue_len_reflects_capacity_in_use() {
        let session = new_session();
        assert_eq!(session.send_queue_len(), 0);
        assert!(!session.is_backpressured());
    }

    #[test]
    fn cancel_flag_is_observable_after_request() {
        let session = new_session();
        assert!(!session.is_cancelled());
        session.request_cancel();
        assert!(session.is_cancelled());
    }
}
