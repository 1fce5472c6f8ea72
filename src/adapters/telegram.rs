//! Telegram Bot API adapter.
//!
//! Announcements go out through `sendMessage`; media parts are uploaded
//! with `sendDocument` as replies to the announcement.

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Body;
use serde::Deserialize;
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::config::TelegramConfig;
use crate::core::PipelineError;

use super::{Channel, MessageId};

/// Telegram Bot API client
pub struct TelegramClient {
    /// Bot token
    bot_token: String,
    /// Target chat ID
    chat_id: String,
    /// HTTP client
    client: reqwest::Client,
}

/// Response from Telegram API
#[derive(Debug, Deserialize)]
struct TelegramResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

/// Message result from sendMessage/sendDocument
#[derive(Debug, Deserialize)]
struct MessageResult {
    message_id: i64,
}

impl TelegramClient {
    /// Create a new Telegram client
    pub fn new(bot_token: String, chat_id: String) -> Self {
        Self {
            bot_token,
            chat_id,
            client: reqwest::Client::new(),
        }
    }

    /// Create from config; fails when the token or chat id is missing
    pub fn from_config(config: &TelegramConfig) -> Result<Self> {
        let bot_token = config
            .bot_token
            .clone()
            .filter(|t| !t.is_empty())
            .context("telegram.bot_token is not configured (or set TELEGRAM_BOT_TOKEN)")?;
        let chat_id = config
            .chat_id
            .clone()
            .filter(|c| !c.is_empty())
            .context("telegram.chat_id is not configured (or set TELEGRAM_CHAT_ID)")?;
        Ok(Self::new(bot_token, chat_id))
    }

    /// Build API URL
    fn api_url(&self, method: &str) -> String {
        format!("https://api.telegram.org/bot{}/{}", self.bot_token, method)
    }

    /// Send a text message
    pub async fn send_message(&self, text: &str) -> Result<i64> {
        let response = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&serde_json::json!({
                "chat_id": self.chat_id,
                "text": text,
            }))
            .send()
            .await
            .context("Failed to send Telegram message")?;

        Self::message_id(response).await
    }

    /// Upload a file as a document
    pub async fn send_file(&self, path: &Path, reply_to: Option<i64>) -> Result<i64> {
        let file_name = path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();

        let file = tokio::fs::File::open(path)
            .await
            .with_context(|| format!("Failed to open {}", path.display()))?;
        let length = file
            .metadata()
            .await
            .with_context(|| format!("Failed to stat {}", path.display()))?
            .len();
        debug!(file = %file_name, bytes = length, "Uploading document");

        let body = Body::wrap_stream(ReaderStream::new(file));
        let file_part = Part::stream_with_length(body, length)
            .file_name(file_name)
            .mime_str(mime_for(path))?;

        let mut form = Form::new()
            .text("chat_id", self.chat_id.clone())
            .part("document", file_part);

        if let Some(reply_to) = reply_to {
            form = form.text("reply_to_message_id", reply_to.to_string());
        }

        let response = self
            .client
            .post(self.api_url("sendDocument"))
            .multipart(form)
            .send()
            .await
            .context("Failed to send Telegram document")?;

        Self::message_id(response).await
    }

    /// Best-effort operator report: `Error <context>: <error>`
    pub async fn report(&self, context: &str, error: &anyhow::Error) -> Result<i64> {
        self.send_message(&format!("Error {}: {:#}", context, error))
            .await
    }

    async fn message_id(response: reqwest::Response) -> Result<i64> {
        let body = response
            .text()
            .await
            .context("Failed to read Telegram response")?;
        parse_message_id(&body)
    }
}

/// Sent message id from a Telegram API response body
fn parse_message_id(body: &str) -> Result<i64> {
    let result: TelegramResponse<MessageResult> =
        serde_json::from_str(body).context("Failed to parse Telegram response")?;

    if !result.ok {
        anyhow::bail!(
            "Telegram API error: {}",
            result.description.unwrap_or_default()
        );
    }

    result
        .result
        .map(|r| r.message_id)
        .context("Telegram response carries no message")
}

fn mime_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("mp4") | Some("m4v") => "video/mp4",
        Some("webm") => "video/webm",
        Some("mkv") => "video/x-matroska",
        _ => "application/octet-stream",
    }
}

#[async_trait]
impl Channel for TelegramClient {
    async fn send_text(&self, text: &str) -> Result<MessageId, PipelineError> {
        self.send_message(text)
            .await
            .map_err(|e| PipelineError::Delivery(format!("{:#}", e)))
    }

    async fn send_document(
        &self,
        path: &Path,
        reply_to: Option<MessageId>,
    ) -> Result<MessageId, PipelineError> {
        self.send_file(path, reply_to)
            .await
            .map_err(|e| PipelineError::Delivery(format!("{:#}", e)))
    }
}
