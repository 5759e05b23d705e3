pub mod line;

use anyhow::Result;
use async_trait::async_trait;

/// What an inbound message carried
#[derive(Debug, Clone, PartialEq)]
pub enum MessageKind {
    Text(String),
    /// Any other message type (sticker, image, location, ...), by its platform name
    Other(String),
}

/// A message event received from any platform
#[derive(Debug, Clone, PartialEq)]
pub struct InboundEvent {
    /// Single-use token for replying to this event
    pub reply_token: Option<String>,
    pub message: MessageKind,
}

impl InboundEvent {
    /// The text to route, if this event should get a reply at all.
    pub fn reply_target(&self) -> Option<(&str, &str)> {
        match (&self.reply_token, &self.message) {
            (Some(token), MessageKind::Text(text)) if !token.is_empty() => {
                Some((token.as_str(), text.as_str()))
            }
            _ => None,
        }
    }
}

/// Sends a text reply bound to an inbound event's reply token
#[async_trait]
pub trait ReplySender: Send + Sync {
    async fn reply(&self, reply_token: &str, text: &str) -> Result<()>;
}
