//! Messaging platform edge: webhook payloads, reply delivery and the
//! signature seam.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{AppError, AppResult};

pub const LINE_REPLY_ENDPOINT: &str = "https://api.line.me/v2/bot/message/reply";
pub const SIGNATURE_HEADER: &str = "x-line-signature";

/// Longest text the reply API accepts in one message.
pub const MAX_REPLY_CHARS: usize = 5000;

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookBody {
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub events: Vec<WebhookEvent>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub reply_token: Option<String>,
    #[serde(default)]
    pub source: Option<EventSource>,
    #[serde(default)]
    pub message: Option<EventMessage>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSource {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: Option<String>,
}

/// One text message that needs an answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundText {
    pub reply_token: String,
    pub chat_user_id: String,
    pub text: String,
}

impl WebhookBody {
    pub fn parse(raw: &[u8]) -> AppResult<Self> {
        serde_json::from_slice(raw)
            .map_err(|e| AppError::from(e).with_context("operation", "webhook_parse"))
    }

    /// Text message events carrying everything needed to reply. Other event
    /// and message kinds are skipped.
    pub fn text_messages(&self) -> Vec<InboundText> {
        self.events
            .iter()
            .filter(|event| event.kind == "message")
            .filter_map(|event| {
                let message = event.message.as_ref()?;
                if message.kind != "text" {
                    return None;
                }
                Some(InboundText {
                    reply_token: event.reply_token.clone()?,
                    chat_user_id: event.source.as_ref()?.user_id.clone()?,
                    text: message.text.clone()?,
                })
            })
            .collect()
    }
}

/// Checks the webhook signature header against the raw body.
pub trait SignatureVerifier: Send + Sync {
    fn verify(&self, body: &[u8], signature: Option<&str>) -> bool;
}

/// Accepts every request. Used when signatures are checked in front of this
/// service.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrustUpstream;

impl SignatureVerifier for TrustUpstream {
    fn verify(&self, _body: &[u8], _signature: Option<&str>) -> bool {
        true
    }
}

#[async_trait]
pub trait ReplySender: Send + Sync {
    async fn send(&self, reply_token: &str, text: &str) -> AppResult<()>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReplyRequest<'a> {
    reply_token: &'a str,
    messages: [OutgoingText<'a>; 1],
}

#[derive(Serialize)]
struct OutgoingText<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    text: &'a str,
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Delivers replies through the LINE reply API.
pub struct LineReplyClient {
    http_client: reqwest::Client,
    endpoint: String,
    access_token: String,
}

impl LineReplyClient {
    pub fn new(access_token: impl Into<String>) -> AppResult<Self> {
        Self::with_endpoint(access_token, LINE_REPLY_ENDPOINT)
    }

    pub fn with_endpoint(
        access_token: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> AppResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AppError::new("REPLY/CLIENT", e.to_string()))?;
        Ok(Self {
            http_client,
            endpoint: endpoint.into(),
            access_token: access_token.into(),
        })
    }
}

#[async_trait]
impl ReplySender for LineReplyClient {
    async fn send(&self, reply_token: &str, text: &str) -> AppResult<()> {
        let body = ReplyRequest {
            reply_token,
            messages: [OutgoingText {
                kind: "text",
                text: truncate_chars(text, MAX_REPLY_CHARS),
            }],
        };
        let response = self
            .http_client
            .post(&self.endpoint)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::new("REPLY/TRANSPORT", e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(AppError::new("REPLY/REJECTED", format!("reply api returned {status}"))
                .with_context("status", status.as_u16().to_string())
                .with_context("body", detail));
        }
        info!(target: "gohoubi", event = "reply_sent", chars = text.chars().count());
        Ok(())
    }
}

/// Writes replies to the log instead of delivering them.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReplySender;

#[async_trait]
impl ReplySender for LogReplySender {
    async fn send(&self, reply_token: &str, text: &str) -> AppResult<()> {
        warn!(
            target: "gohoubi",
            event = "reply_not_delivered",
            reply_token,
            text,
            reason = "no channel access token configured"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAYLOAD: &str = r#"{
        "destination": "Ubot",
        "events": [
            {
                "type": "message",
                "replyToken": "r-1",
                "source": { "type": "user", "userId": "U1" },
                "message": { "id": "m1", "type": "text", "text": "宿題やった" }
            },
            {
                "type": "message",
                "replyToken": "r-2",
                "source": { "type": "user", "userId": "U1" },
                "message": { "id": "m2", "type": "sticker", "packageId": "1" }
            },
            {
                "type": "follow",
                "replyToken": "r-3",
                "source": { "type": "user", "userId": "U2" }
            }
        ]
    }"#;

    #[test]
    fn keeps_only_text_messages() {
        let body = WebhookBody::parse(PAYLOAD.as_bytes()).unwrap();
        assert_eq!(body.events.len(), 3);
        assert_eq!(
            body.text_messages(),
            vec![InboundText {
                reply_token: "r-1".into(),
                chat_user_id: "U1".into(),
                text: "宿題やった".into(),
            }]
        );
    }

    #[test]
    fn empty_event_list_is_valid() {
        let body = WebhookBody::parse(br#"{"destination":"Ubot","events":[]}"#).unwrap();
        assert!(body.text_messages().is_empty());
    }

    #[test]
    fn malformed_json_is_an_error() {
        let err = WebhookBody::parse(b"{not json").unwrap_err();
        assert_eq!(err.context().get("operation").map(String::as_str), Some("webhook_parse"));
    }

    #[test]
    fn reply_request_uses_platform_field_names() {
        let body = ReplyRequest {
            reply_token: "r-1",
            messages: [OutgoingText {
                kind: "text",
                text: "hi",
            }],
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["replyToken"], "r-1");
        assert_eq!(json["messages"][0]["type"], "text");
        assert_eq!(json["messages"][0]["text"], "hi");
    }

    #[test]
    fn truncates_on_char_boundaries() {
        assert_eq!(truncate_chars("ごほうび", 2), "ごほ");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }
}
