// crates/server/src/routes/ws.rs
//! Streaming generation over WebSocket.
//!
//! - `WS /ws/tts` - one generation per connection, see [`crate::streaming`]

use std::sync::Arc;

use axum::{
    extract::{State, WebSocketUpgrade},
    response::Response,
    routing::get,
    Router,
};
use futures_util::StreamExt;

use crate::routes::MULTIPART_OVERHEAD;
use crate::state::AppState;
use crate::streaming::StreamingSession;

/// Upgrade and hand the socket to a [`StreamingSession`].
async fn ws_tts_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    let max_message = state.settings.max_audio_upload_bytes() + MULTIPART_OVERHEAD;
    ws.max_message_size(max_message)
        .on_upgrade(move |socket| async move {
            tracing::info!("WebSocket client connected");
            let (sink, stream) = socket.split();
            let orchestrator = Arc::clone(&state.orchestrator);
            let state = StreamingSession::new(orchestrator, sink, stream).run().await;
            tracing::debug!(?state, "WebSocket session finished");
        })
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/ws/tts", get(ws_tts_handler))
}
