// crates/server/src/lib.rs
//! ttsweb server library.
//!
//! Axum HTTP and WebSocket front end for asynchronous speech-synthesis jobs:
//! REST job creation and polling, streamed generation over WebSocket,
//! metadata, tokenizer and health endpoints.

pub mod config;
pub mod error;
pub mod metrics;
pub mod openapi;
pub mod orchestrator;
pub mod routes;
pub mod state;
pub mod streaming;

pub use config::Settings;
pub use error::*;
pub use metrics::{init_metrics, render_metrics};
pub use orchestrator::{GenerationError, Orchestrator};
pub use routes::api_routes;
pub use state::AppState;
pub use streaming::{ServerMessage, StreamingSession};

use std::any::Any;
use std::sync::Arc;

use axum::http::{header, HeaderValue, Method};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any as AnyHeader, CorsLayer};
use ttsweb_observability::{request_id_layers, trace_layer, REQUEST_ID_HEADER};

/// Create the Axum application with all routes and middleware.
///
/// Middleware, outermost first: request-id assignment, HTTP tracing,
/// request-id propagation, CORS, panic-to-500.
pub fn create_app(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.settings);
    with_middleware(api_routes(state), cors)
}

fn with_middleware(router: Router, cors: CorsLayer) -> Router {
    let (set_request_id, propagate_request_id) = request_id_layers();
    router
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(cors)
        .layer(propagate_request_id)
        .layer(trace_layer())
        .layer(set_request_id)
}

/// Only the configured origins; exposes the headers clients need to read.
fn cors_layer(settings: &Settings) -> CorsLayer {
    let origins: Vec<HeaderValue> = settings
        .cors_origin_list()
        .into_iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(%origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(AnyHeader)
        .expose_headers([
            REQUEST_ID_HEADER,
            routes::X_SAMPLE_RATE,
            header::CONTENT_DISPOSITION,
        ])
}

/// The panic message is logged, never returned.
fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let message = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else {
        "unknown panic".to_string()
    };
    tracing::error!(panic = %message, "Request handler panicked");
    (
        axum::http::StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::new("Internal server error")),
    )
        .into_response()
}
