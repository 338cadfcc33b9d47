//! Telegram Bot channel — message sending via the Bot API.

use async_trait::async_trait;
use herald_core::config::TelegramConfig;
use herald_core::error::{HeraldError, Result};
use herald_core::traits::DeliveryPort;
use serde::Deserialize;

/// Telegram Bot API client used as a delivery port.
pub struct TelegramChannel {
    api_base: String,
    bot_token: String,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(config: &TelegramConfig) -> Result<Self> {
        if config.bot_token.is_empty() {
            return Err(HeraldError::Config(
                "Telegram bot token is not set (BOT_TOKEN or [telegram].bot_token)".into(),
            ));
        }
        let client = reqwest::Client::builder()
            .user_agent("Herald/1.0")
            .build()
            .map_err(|e| HeraldError::Channel(format!("Client error: {e}")))?;
        Ok(Self::with_client(config, client))
    }

    /// Build with a preconfigured HTTP client.
    pub fn with_client(config: &TelegramConfig, client: reqwest::Client) -> Self {
        Self {
            api_base: config.api_base.trim_end_matches('/').to_string(),
            bot_token: config.bot_token.clone(),
            client,
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.bot_token, method)
    }

    /// Send a plain-text message. `chat_id` is a numeric id or an `@channel`
    /// username.
    pub async fn send_message(&self, chat_id: &str, text: &str) -> Result<()> {
        let body = serde_json::json!({
            "chat_id": chat_id_value(chat_id),
            "text": text,
        });

        let response = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&body)
            .send()
            .await
            .map_err(|e| HeraldError::Channel(format!("sendMessage failed: {e}")))?;

        let status = response.status();
        let result: TelegramApiResponse<serde_json::Value> = response.json().await.map_err(|e| {
            HeraldError::Channel(format!("Invalid send response (HTTP {status}): {e}"))
        })?;

        if !result.ok {
            return Err(HeraldError::Channel(format!(
                "Send failed: {}",
                result.description.unwrap_or_else(|| status.to_string())
            )));
        }
        Ok(())
    }

    /// Get bot info. Used to check the token at start-up.
    pub async fn get_me(&self) -> Result<TelegramUser> {
        let response = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| HeraldError::Channel(format!("getMe failed: {e}")))?;
        let body: TelegramApiResponse<TelegramUser> = response
            .json()
            .await
            .map_err(|e| HeraldError::Channel(format!("Invalid getMe response: {e}")))?;
        if !body.ok {
            return Err(HeraldError::Channel(format!(
                "getMe rejected: {}",
                body.description.unwrap_or_default()
            )));
        }
        body.result
            .ok_or_else(|| HeraldError::Channel("No bot info".into()))
    }
}

fn chat_id_value(chat_id: &str) -> serde_json::Value {
    match chat_id.trim().parse::<i64>() {
        Ok(id) => serde_json::Value::from(id),
        Err(_) => serde_json::Value::from(chat_id.trim()),
    }
}

#[async_trait]
impl DeliveryPort for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn deliver(&self, recipient: &str, payload: &str) -> Result<()> {
        self.send_message(recipient, payload).await?;
        tracing::debug!("Telegram message sent to {recipient}");
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct TelegramApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
    pub is_bot: bool,
    pub first_name: String,
    pub username: Option<String>,
}
