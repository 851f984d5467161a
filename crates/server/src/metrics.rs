//! Prometheus metrics exposition (spec §15, ambient).

use axum::response::IntoResponse;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the global Prometheus recorder and describe every metric this
/// gateway emits. Call once at startup, before any session activity.
pub fn init_metrics() -> PrometheusHandle {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    metrics::describe_gauge!("tts_gateway_sessions_active", "Sessions currently registered");
    metrics::describe_counter!("tts_gateway_sessions_created_total", "Sessions created via start");
    metrics::describe_counter!("tts_gateway_chunks_emitted_total", "audio_chunk messages enqueued");
    metrics::describe_counter!("tts_gateway_sessions_cancelled_total", "Sessions ended by cancel");
    metrics::describe_counter!("tts_gateway_sessions_backpressure_total", "Sessions tripped on a saturated send queue");
    metrics::describe_counter!("tts_gateway_sessions_expired_total", "Sessions reclaimed by the TTL cleanup loop");

    handle
}

pub async fn metrics_handler(axum::extract::State(state): axum::extract::State<crate::state::AppState>) -> impl IntoResponse {
    state.metrics_handle.render()
}
