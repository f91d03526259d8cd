//! Outbound notifications through the Telegram Bot API.
//!
//! Sending is best-effort. A missing token or chat id turns the notifier into
//! a logger, and a failed send is logged and forgotten.

use crate::error::MonitorError;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

const TELEGRAM_API: &str = "https://api.telegram.org";
const SEND_TIMEOUT: Duration = Duration::from_secs(15);

/// Something that can deliver a text message to a person.
pub trait Notify {
    /// Deliver `message`. Never fails from the caller's point of view.
    fn notify(&self, message: &str) -> impl Future<Output = ()> + Send;
}

#[derive(Debug, Clone)]
struct Credentials {
    token: String,
    chat_id: String,
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApiReply {
    ok: bool,
    description: Option<String>,
}

/// Sends every message to one Telegram chat.
#[derive(Debug, Clone)]
pub struct TelegramNotifier {
    client: reqwest::Client,
    credentials: Option<Credentials>,
}

impl TelegramNotifier {
    /// Sending is enabled only when both settings are present and non-empty.
    pub fn new(
        token: Option<String>,
        chat_id: Option<String>,
    ) -> Result<Self, MonitorError> {
        let credentials = match (token, chat_id) {
            (Some(token), Some(chat_id)) if !token.trim().is_empty() && !chat_id.trim().is_empty() => {
                Some(Credentials { token, chat_id })
            }
            _ => None,
        };
        let client = reqwest::Client::builder().timeout(SEND_TIMEOUT).build()?;
        Ok(Self {
            client,
            credentials,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.credentials.is_some()
    }

    async fn send(&self, credentials: &Credentials, message: &str) -> Result<(), String> {
        let endpoint = format!("{}/bot{}/sendMessage", TELEGRAM_API, credentials.token);
        let response = self
            .client
            .post(&endpoint)
            .json(&SendMessage {
                chat_id: &credentials.chat_id,
                text: message,
            })
            .send()
            .await
            // The token is part of the URL; keep it out of the logs.
            .map_err(|e| e.without_url().to_string())?;

        let status = response.status();
        let reply: ApiReply = response
            .json()
            .await
            .map_err(|e| format!("unreadable reply (HTTP {status}): {}", e.without_url()))?;

        if reply.ok {
            Ok(())
        } else {
            Err(format!(
                "HTTP {status}: {}",
                reply.description.unwrap_or_else(|| "no description".to_string())
            ))
        }
    }
}

impl Notify for TelegramNotifier {
    #[instrument(level = "info", skip_all)]
    async fn notify(&self, message: &str) {
        let Some(credentials) = &self.credentials else {
            warn!(%message, "Telegram not configured; message not sent");
            return;
        };

        match self.send(credentials, message).await {
            Ok(()) => info!("Telegram notification sent"),
            Err(e) => error!(error = %e, "Telegram notification failed"),
        }
    }
}
