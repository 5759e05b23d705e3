use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::commands::{CommandTable, Route};
use crate::config::Config;
use crate::error::WebhookError;
use crate::formatter::{DelegatedFormatter, DirectFormatter, ReplyFormatter};
use crate::llm::LlmClient;
use crate::places::{Coordinates, GooglePlacesClient, PlaceSearch};
use crate::platform::line::{self, LineClient};
use crate::platform::{InboundEvent, MessageKind, ReplySender};

pub const SEARCH_FAILED_TEXT: &str = "😵 查詢附近地點時發生錯誤，請稍後再試。";

/// The webhook pipeline: verify, parse, then route/fetch/format/reply per event.
/// Holds only read-only state, so one instance serves concurrent requests.
pub struct Bot {
    commands: CommandTable,
    places: Arc<dyn PlaceSearch>,
    formatter: Box<dyn ReplyFormatter>,
    replier: Arc<dyn ReplySender>,
    channel_secret: String,
    origin: Coordinates,
}

impl Bot {
    pub fn new(
        config: &Config,
        places: Arc<dyn PlaceSearch>,
        formatter: Box<dyn ReplyFormatter>,
        replier: Arc<dyn ReplySender>,
    ) -> Self {
        Self {
            commands: CommandTable::new(&config.commands),
            places,
            formatter,
            replier,
            channel_secret: config.line.channel_secret.clone(),
            origin: Coordinates {
                lat: config.location.latitude,
                lng: config.location.longitude,
            },
        }
    }

    /// Wire the real LINE, Places and (optionally) LLM clients.
    pub fn from_config(config: &Config) -> Self {
        let formatter: Box<dyn ReplyFormatter> = match &config.llm {
            Some(llm) => {
                info!("Replies: delegated to {} ({})", llm.provider, llm.model);
                let language = llm.language.clone();
                Box::new(DelegatedFormatter::new(
                    Arc::new(LlmClient::new(llm.clone())),
                    language,
                ))
            }
            None => {
                info!("Replies: direct listing");
                Box::new(DirectFormatter)
            }
        };

        Self::new(
            config,
            Arc::new(GooglePlacesClient::new(config.places.clone())),
            formatter,
            Arc::new(LineClient::new(config.line.clone())),
        )
    }

    pub fn commands(&self) -> &CommandTable {
        &self.commands
    }

    pub fn verify(&self, body: &[u8], signature: Option<&str>) -> Result<(), WebhookError> {
        let signature = signature.ok_or(WebhookError::MissingSignature)?;
        if line::verify_signature(&self.channel_secret, body, signature) {
            Ok(())
        } else {
            Err(WebhookError::InvalidSignature)
        }
    }

    /// Returns how many replies were sent.
    pub async fn handle_webhook(
        &self,
        body: &[u8],
        signature: Option<&str>,
    ) -> Result<usize, WebhookError> {
        if let Err(e) = self.verify(body, signature) {
            warn!("Rejected webhook: {}", e);
            return Err(e);
        }

        let events = line::parse_events(body)
            .map_err(|e| WebhookError::MalformedBody(format!("{:#}", e)))?;

        let mut replied = 0;
        for event in &events {
            if self.handle_event(event).await {
                replied += 1;
            }
        }
        Ok(replied)
    }

    /// Whether a reply was sent for `event`.
    pub async fn handle_event(&self, event: &InboundEvent) -> bool {
        let Some((reply_token, text)) = event.reply_target() else {
            match &event.message {
                MessageKind::Other(kind) => debug!("Ignoring {} message", kind),
                MessageKind::Text(_) => debug!("Ignoring text message without reply token"),
            }
            return false;
        };

        info!("Text message: {}", text);
        let reply = self.respond(text).await;

        match self.replier.reply(reply_token, &reply).await {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to send reply: {:#}", e);
                false
            }
        }
    }

    /// Reply text for one message.
    pub async fn respond(&self, text: &str) -> String {
        let command = match self.commands.route(text) {
            Route::Search(command) => command,
            Route::Help(help) => return help.to_string(),
        };

        match self.places.search(&command.keyword, self.origin).await {
            Ok(places) => self.formatter.format(&places, &command.keyword).await,
            Err(e) => {
                error!("Nearby search for {} failed: {:#}", command.keyword, e);
                SEARCH_FAILED_TEXT.to_string()
            }
        }
    }
}
