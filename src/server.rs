use axum::{
    Json, Router,
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::error::{DubberError, Result};
use crate::pipeline::{DirectRequest, Pipeline};
use crate::source::{crc_response, is_own_event, normalize_webhook_payload};

#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<Pipeline>,
    consumer_secret: Arc<str>,
}

impl AppState {
    pub fn new(pipeline: Arc<Pipeline>, consumer_secret: impl Into<Arc<str>>) -> Self {
        Self {
            pipeline,
            consumer_secret: consumer_secret.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CrcQuery {
    crc_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DubQuery {
    tweet_id: Option<String>,
    tweet_url: Option<String>,
    target_language: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DubResponse {
    success: bool,
    language: String,
    dubbed_video_url: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/webhook", get(webhook_challenge).post(webhook_events))
        .route("/dub", get(dub))
        .with_state(state)
}

/// Bind `listen_addr` and serve until Ctrl-C
pub async fn serve(state: AppState, listen_addr: &str) -> Result<()> {
    let listener = TcpListener::bind(listen_addr).await?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn webhook_challenge(State(state): State<AppState>, Query(query): Query<CrcQuery>) -> Response {
    let Some(token) = query.crc_token.filter(|t| !t.is_empty()) else {
        return json_error(StatusCode::BAD_REQUEST, "validation_error", "crc_token is required");
    };

    match crc_response(&token, &state.consumer_secret) {
        Ok(response_token) => Json(json!({ "response_token": response_token })).into_response(),
        Err(e) => {
            error!("Cannot answer CRC challenge: {}", e);
            json_error(StatusCode::INTERNAL_SERVER_ERROR, e.code(), e.user_message())
        }
    }
}

async fn webhook_events(State(state): State<AppState>, body: Bytes) -> Response {
    let events = match normalize_webhook_payload(&body) {
        Ok(events) => events,
        Err(e) => {
            warn!("Rejected webhook delivery: {}", e);
            return json_error(StatusCode::BAD_REQUEST, e.code(), e.to_string());
        }
    };

    let bot_handle = state.pipeline.settings().bot_handle.clone();
    let (own, events): (Vec<_>, Vec<_>) = events.into_iter().partition(|e| is_own_event(e, &bot_handle));
    for event in &own {
        if let Err(e) = state.pipeline.skip_mention(event).await {
            warn!("Failed to record own post {}: {}", event.id, e);
        }
    }
    let accepted = events.len();

    if accepted > 0 {
        let pipeline = state.pipeline.clone();
        tokio::spawn(async move {
            for event in events {
                if let Err(e) = pipeline.handle_mention(&event).await {
                    error!("Webhook mention {} aborted: {}", event.id, e);
                }
            }
        });
    }

    Json(json!({ "accepted": accepted })).into_response()
}

async fn dub(State(state): State<AppState>, Query(query): Query<DubQuery>) -> Response {
    let request = DirectRequest {
        tweet_id: query.tweet_id,
        tweet_url: query.tweet_url,
        target_language: query.target_language,
        reply: false,
    };

    match state.pipeline.dub_direct(&request).await {
        Ok(outcome) => Json(DubResponse {
            success: true,
            language: outcome.language.name().to_string(),
            dubbed_video_url: outcome.result_url,
        })
        .into_response(),
        Err(e) => {
            warn!("Direct dub failed [{}]: {}", e.code(), e);
            json_error(error_status(&e), e.code(), e.user_message())
        }
    }
}

fn error_status(err: &DubberError) -> StatusCode {
    match err {
        DubberError::Validation(_) | DubberError::UnsupportedLanguage(_) => StatusCode::BAD_REQUEST,
        DubberError::Download(_) => StatusCode::UNPROCESSABLE_ENTITY,
        DubberError::VendorRejected(_) | DubberError::VendorFailed(_) => StatusCode::BAD_GATEWAY,
        DubberError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({
            "success": false,
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
