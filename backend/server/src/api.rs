use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State, WebSocketUpgrade};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;

use crate::error::SessionError;
use crate::session::Session;
use crate::ws;

#[derive(Clone)]
pub struct AppState {
    pub session: Arc<Session>,
}

pub fn router(state: AppState, max_image_bytes: usize) -> Router {
    Router::new()
        .route("/api/connect", post(connect))
        .route(
            "/api/image",
            get(get_image)
                .post(drop_image)
                .layer(DefaultBodyLimit::max(max_image_bytes)),
        )
        .route("/api/state", get(get_state))
        .route("/api/health", get(health))
        .route("/ws", get(ws_upgrade))
        .with_state(state)
}

async fn connect(State(state): State<AppState>) -> Result<impl IntoResponse, SessionError> {
    let pubkey = state.session.connect().await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "public_key": pubkey.to_hex()
    })))
}

/// The request body is the dropped file, unchanged.
async fn drop_image(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<impl IntoResponse, SessionError> {
    tracing::info!("File dropped ({} bytes)", body.len());
    let outcome = state.session.drop_file(body.to_vec()).await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "result": outcome
    })))
}

async fn get_image(State(state): State<AppState>) -> Response {
    match state.session.image().await {
        Some((bytes, outpoint)) => (
            [
                (header::CONTENT_TYPE, "image/png".to_string()),
                (
                    header::HeaderName::from_static("x-current-outpoint"),
                    outpoint,
                ),
                (
                    header::CACHE_CONTROL,
                    "no-cache, must-revalidate".to_string(),
                ),
            ],
            bytes,
        )
            .into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

async fn get_state(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.session.snapshot().await)
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let accepted = state.session.chain().accepted_count().await;
    let phase = state.session.snapshot().await.phase;

    match accepted {
        Ok(count) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ok",
                "accepted_transactions": count,
                "phase": phase
            })),
        ),
        Err(e) => {
            tracing::warn!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({
                    "status": "degraded",
                    "error": e.to_string(),
                    "phase": phase
                })),
            )
        }
    }
}

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| ws::handle_socket(socket, state))
}
