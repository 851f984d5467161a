//! Streaming text-to-speech gateway: session registry, synth loop, and the
//! axum HTTP/WebSocket surface.

pub mod http;
pub mod manager;
pub mod metrics;
pub mod protocol;
pub mod session;
pub mod state;
pub mod synth_loop;
pub mod websocket;

pub use http::create_router;
pub use manager::SessionManager;
pub use metrics::init_metrics;
pub use session::SessionState;
pub use state::AppState;
