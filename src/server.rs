use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::stream::StreamExt;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::core::audio::{decode_wav, normalize};
use crate::core::engine::{DecodeOptions, EngineRegistry};
use crate::core::errors::EngineError;
use crate::core::messages::ServerEvent;
use crate::core::session::{Session, SessionConfig};

#[derive(Clone)]
struct AppState {
    config: Arc<AppConfig>,
    session: SessionConfig,
    engines: Arc<EngineRegistry>,
}

pub fn router(config: AppConfig, engines: Arc<EngineRegistry>) -> Router {
    let session = SessionConfig {
        sample_rate: config.sample_rate,
        default_language: config.language.clone(),
        partial_interval: config.partial_interval,
        partial_window: config.partial_window,
        silence_duration: config.silence_duration,
        silence_rms: config.silence_rms,
    };
    let state = AppState {
        config: Arc::new(config),
        session,
        engines,
    };
    Router::new()
        .route("/asr", get(ws_handler))
        .route("/health", get(health))
        .route("/transcribe", post(transcribe_once))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({ "status": "ok", "model": state.config.model_path.clone() }))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| websocket_loop(socket, state))
}

/// Drive one streaming session over its websocket.
///
/// Frames are processed strictly in arrival order; the session decides what
/// goes back to the peer and when the connection is done.
async fn websocket_loop(mut socket: WebSocket, state: AppState) {
    info!("websocket connected");
    let mut session = Session::new(state.session.clone(), Arc::clone(&state.engines));

    if let Err(err) = send_event(&mut socket, ServerEvent::Ready).await {
        warn!(error = ?err, "failed to send ready greeting");
        return;
    }

    while let Some(result) = socket.next().await {
        let events = match result {
            Ok(Message::Text(text)) => session.handle_text(&text).await,
            Ok(Message::Binary(data)) => session.handle_audio(&data).await,
            Ok(Message::Close(frame)) => {
                info!(?frame, "websocket closed by client");
                session.abort();
                break;
            }
            Ok(Message::Ping(payload)) => {
                if let Err(err) = socket.send(Message::Pong(payload)).await {
                    warn!(error = ?err, "failed to reply to ping");
                    session.abort();
                    break;
                }
                continue;
            }
            Ok(Message::Pong(_)) => continue,
            Err(err) => {
                error!(error = ?err, "websocket error");
                session.abort();
                break;
            }
        };
        for event in events {
            if let Err(err) = send_event(&mut socket, event).await {
                warn!(error = ?err, "failed to send event");
                session.abort();
                break;
            }
        }
        if session.is_closed() {
            break;
        }
    }

    let _ = socket.send(Message::Close(None)).await;
    info!("websocket disconnected");
}

async fn send_event(socket: &mut WebSocket, event: ServerEvent) -> Result<(), axum::Error> {
    let json = serde_json::to_string(&event).map_err(axum::Error::new)?;
    socket.send(Message::Text(json)).await
}

#[derive(Debug, Deserialize)]
struct TranscribeParams {
    lang: Option<String>,
}

/// One-shot transcription of a complete WAV body. Stateless; none of the
/// streaming session machinery is involved.
async fn transcribe_once(
    State(state): State<AppState>,
    Query(params): Query<TranscribeParams>,
    body: Bytes,
) -> Response {
    let samples = match decode_wav(&body, state.config.sample_rate) {
        Ok(samples) => samples,
        Err(err) => {
            warn!(error = %err, "rejected one-shot payload");
            return error_response(StatusCode::BAD_REQUEST, err.to_string());
        }
    };
    let options = DecodeOptions {
        language: params.lang,
        filter_silence: true,
        with_timestamps: false,
    };
    match state.engines.transcribe(normalize(&samples), options).await {
        Ok(transcription) => {
            let text = transcription.joined_text();
            let lang = transcription
                .detected_language
                .unwrap_or_else(|| state.config.language.clone());
            Json(json!({ "text": text, "lang": lang })).into_response()
        }
        Err(err @ (EngineError::MissingModel(_) | EngineError::Init(_))) => {
            warn!(error = %err, "speech engine unavailable");
            error_response(StatusCode::SERVICE_UNAVAILABLE, err.to_string())
        }
        Err(err) => {
            error!(error = %err, "one-shot decode failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

fn error_response(status: StatusCode, message: String) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}
