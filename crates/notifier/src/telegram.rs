//! Telegram Bot API notifier.
//!
//! Owns transport details only: endpoint construction, the request timeout
//! and mapping of HTTP failures to [`NotifyError`].

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Serialize;

use crate::{Notifier, NotifyError, Result, StatusChange};

const DEFAULT_API_BASE: &str = "https://api.telegram.org";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Bot credentials and transport settings.
#[derive(Clone)]
pub struct TelegramConfig {
    /// Bot token issued by BotFather.
    pub bot_token: String,
    /// Chat that receives the messages.
    pub chat_id: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Base URL of the Bot API.
    pub api_base: String,
}

impl TelegramConfig {
    /// Creates a configuration for the public Bot API.
    pub fn new(bot_token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
            timeout: DEFAULT_TIMEOUT,
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }
}

impl fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token", &"<redacted>")
            .field("chat_id", &self.chat_id)
            .field("timeout", &self.timeout)
            .field("api_base", &self.api_base)
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: String,
}

/// Notifier posting to a Telegram chat through `sendMessage`.
pub struct TelegramNotifier {
    client: Client,
    endpoint: Url,
    chat_id: String,
}

impl TelegramNotifier {
    /// Builds a notifier with a reqwest client bounded by `config.timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error when the endpoint is not a valid URL or the client
    /// cannot be constructed.
    pub fn new(config: TelegramConfig) -> Result<Self> {
        let endpoint = send_message_endpoint(&config.api_base, &config.bot_token)?;
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|error| NotifyError::Transport(error.to_string()))?;
        Ok(Self {
            client,
            endpoint,
            chat_id: config.chat_id,
        })
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    #[tracing::instrument(skip(self, change), fields(order_id = %change.order_id))]
    async fn send(&self, change: &StatusChange) -> Result<()> {
        let payload = SendMessage {
            chat_id: &self.chat_id,
            text: change.text(),
        };
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&payload)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.bytes().await.map_err(map_transport_error)?;
        Err(map_status_error(status, body.as_ref()))
    }
}

fn send_message_endpoint(api_base: &str, bot_token: &str) -> Result<Url> {
    if bot_token.trim().is_empty() {
        return Err(NotifyError::Unavailable(
            "telegram bot token is empty".to_string(),
        ));
    }
    let base = api_base.trim_end_matches('/');
    // The token is part of the path; keep it out of the error text.
    Url::parse(&format!("{base}/bot{bot_token}/sendMessage"))
        .map_err(|_| NotifyError::Unavailable(format!("invalid telegram api base '{base}'")))
}

fn map_transport_error(error: reqwest::Error) -> NotifyError {
    let error = error.without_url();
    if error.is_timeout() {
        NotifyError::Timeout(error.to_string())
    } else {
        NotifyError::Transport(error.to_string())
    }
}

fn map_status_error(status: StatusCode, body: &[u8]) -> NotifyError {
    const PREVIEW_CHAR_LIMIT: usize = 160;

    let compact = String::from_utf8_lossy(body)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let body = compact.chars().take(PREVIEW_CHAR_LIMIT).collect::<String>();

    match status {
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
            NotifyError::Timeout(format!("status {}", status.as_u16()))
        }
        _ => NotifyError::Rejected {
            status: status.as_u16(),
            body,
        },
    }
}
