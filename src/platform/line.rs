//! LINE Messaging API: webhook signature check, event parsing, reply client.

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{debug, info};

use crate::config::LineConfig;
use crate::platform::{InboundEvent, MessageKind, ReplySender};

pub const SIGNATURE_HEADER: &str = "x-line-signature";

/// LINE rejects text messages longer than this many characters
const MAX_TEXT_CHARS: usize = 5000;

type HmacSha256 = Hmac<Sha256>;

/// Checks `signature` (base64 HMAC-SHA256 of the raw body) against the channel secret.
pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let Ok(expected) = STANDARD.decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Signature LINE would send for `body`.
#[cfg(test)]
pub fn sign(secret: &str, body: &[u8]) -> String {
    // HMAC accepts keys of any length
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC key of any size");
    mac.update(body);
    STANDARD.encode(mac.finalize().into_bytes())
}

#[derive(Debug, Deserialize)]
struct WebhookEnvelope {
    #[serde(default)]
    destination: Option<String>,
    #[serde(default)]
    events: Vec<WebhookEvent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WebhookEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    reply_token: Option<String>,
    #[serde(default)]
    message: Option<WebhookMessage>,
}

#[derive(Debug, Deserialize)]
struct WebhookMessage {
    #[serde(rename = "type")]
    message_type: String,
    #[serde(default)]
    text: Option<String>,
}

/// Message events from a webhook body; follow, postback and other event types are skipped.
pub fn parse_events(body: &[u8]) -> Result<Vec<InboundEvent>> {
    let envelope: WebhookEnvelope =
        serde_json::from_slice(body).context("Failed to parse LINE webhook body")?;

    debug!(
        "Webhook for {} with {} event(s)",
        envelope.destination.as_deref().unwrap_or("-"),
        envelope.events.len()
    );

    let events = envelope
        .events
        .into_iter()
        .filter_map(|event| {
            if event.event_type != "message" {
                debug!("Skipping LINE {} event", event.event_type);
                return None;
            }
            let message = event.message?;
            let kind = match (message.message_type.as_str(), message.text) {
                ("text", Some(text)) => MessageKind::Text(text),
                (other, _) => MessageKind::Other(other.to_string()),
            };
            Some(InboundEvent {
                reply_token: event.reply_token,
                message: kind,
            })
        })
        .collect();

    Ok(events)
}

/// Cut `text` to the platform limit without splitting a character
fn truncate_text(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReplyRequest<'a> {
    reply_token: &'a str,
    messages: Vec<TextMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct TextMessage<'a> {
    #[serde(rename = "type")]
    message_type: &'static str,
    text: &'a str,
}

/// Client for the LINE reply endpoint
pub struct LineClient {
    client: reqwest::Client,
    config: LineConfig,
}

impl LineClient {
    pub fn new(config: LineConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl ReplySender for LineClient {
    async fn reply(&self, reply_token: &str, text: &str) -> Result<()> {
        let request = ReplyRequest {
            reply_token,
            messages: vec![TextMessage {
                message_type: "text",
                text: truncate_text(text, MAX_TEXT_CHARS),
            }],
        };

        let url = format!("{}/message/reply", self.config.api_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.channel_token)
            .json(&request)
            .send()
            .await
            .context("Failed to send reply to LINE")?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            anyhow::bail!("LINE reply error ({}): {}", status, error_body);
        }

        info!("Reply sent ({} chars)", text.chars().count());
        Ok(())
    }
}
