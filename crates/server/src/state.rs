//! Shared application state handed to every axum handler.

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;

use tts_gateway_config::Settings;
use tts_gateway_engine::SynthesisEngine;

use crate::manager::SessionManager;

#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<SessionManager>,
    pub engine: Arc<dyn SynthesisEngine>,
    pub settings: Arc<Settings>,
    pub metrics_handle: PrometheusHandle,
}

impl AppState {
    pub fn new(settings: Settings, engine: Arc<dyn SynthesisEngine>, metrics_handle: PrometheusHandle) -> Self {
        let manager = Arc::new(SessionManager::new(
            settings.session.max_send_queue,
            settings.session.ttl_seconds,
        ));
        Self {
            manager,
            engine,
            settings: Arc::new(settings),
            metrics_handle,
        }
    }
}
