//! HTTP surface: `GET /health` and the `POST /callback` webhook.

use std::net::SocketAddr;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Router,
};
use tracing::{error, info, warn};

use crate::gateway::{WebhookBody, SIGNATURE_HEADER};
use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/callback", post(callback))
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

async fn callback(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> StatusCode {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());
    if !state.verifier.verify(&body, signature) {
        warn!(target: "gohoubi", event = "webhook_signature_rejected");
        return StatusCode::BAD_REQUEST;
    }

    let payload = match WebhookBody::parse(&body) {
        Ok(payload) => payload,
        Err(err) => {
            err.log_with_event("webhook_malformed");
            return StatusCode::BAD_REQUEST;
        }
    };

    let messages = payload.text_messages();
    info!(
        target: "gohoubi",
        event = "webhook_received",
        events = payload.events.len(),
        text_messages = messages.len()
    );

    for message in messages {
        let reply = state
            .handler
            .handle(&message.text, &message.chat_user_id)
            .await;
        if let Err(err) = state.sender.send(&message.reply_token, &reply).await {
            error!(
                target: "gohoubi",
                event = "reply_failed",
                chat_user_id = %message.chat_user_id,
                code = err.code(),
                error = %err
            );
        }
    }

    StatusCode::OK
}

/// Serve until ctrl-c.
pub async fn serve(state: AppState, bind: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(target: "gohoubi", event = "server_listening", addr = %bind);
    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!(target: "gohoubi", event = "server_shutdown");
        })
        .await?;
    Ok(())
}
