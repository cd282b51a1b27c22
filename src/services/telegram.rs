// src/services/telegram.rs

//! Telegram Bot API channel.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use super::Channel;
use crate::error::{Result, SendError};
use crate::models::{HttpConfig, TelegramConfig};
use crate::utils::http;

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
    disable_web_page_preview: bool,
}

#[derive(Debug, Default, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Default, Deserialize)]
struct ResponseParameters {
    #[serde(default)]
    retry_after: Option<u64>,
}

/// Map a failed Bot API response onto the delivery error classes.
fn classify_failure(status: StatusCode, body: &str) -> SendError {
    let response: ApiResponse = serde_json::from_str(body).unwrap_or_default();
    let description = response
        .description
        .unwrap_or_else(|| format!("HTTP {status}"));

    if status == StatusCode::TOO_MANY_REQUESTS {
        let secs = response
            .parameters
            .and_then(|p| p.retry_after)
            .unwrap_or(1);
        return SendError::RateLimited {
            retry_after: Duration::from_secs(secs),
        };
    }

    let lowered = description.to_lowercase();
    if status == StatusCode::FORBIDDEN
        || lowered.contains("chat not found")
        || lowered.contains("bot was blocked")
        || lowered.contains("user is deactivated")
    {
        return SendError::PermanentlyBlocked(description);
    }

    if status == StatusCode::BAD_REQUEST
        && (lowered.contains("message is too long") || lowered.contains("can't parse entities"))
    {
        return SendError::Rejected(description);
    }

    SendError::Transient(description)
}

/// Sends HTML messages through `sendMessage`.
pub struct TelegramChannel {
    client: Client,
    endpoint: String,
}

impl TelegramChannel {
    pub fn new(config: &TelegramConfig, token: &str, http_config: &HttpConfig) -> Result<Self> {
        let client = http::create_async_client(http_config)?;
        Ok(Self {
            client,
            endpoint: format!(
                "{}/bot{}/sendMessage",
                config.api_base.trim_end_matches('/'),
                token
            ),
        })
    }
}

#[async_trait]
impl Channel for TelegramChannel {
    async fn send(&self, destination: &str, message: &str) -> std::result::Result<(), SendError> {
        let payload = SendMessage {
            chat_id: destination,
            text: message,
            parse_mode: "HTML",
            disable_web_page_preview: true,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(|e| SendError::Transient(e.without_url().to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SendError::Transient(e.without_url().to_string()))?;

        if status.is_success() {
            let parsed: ApiResponse = serde_json::from_str(&body).unwrap_or_default();
            if parsed.ok {
                return Ok(());
            }
        }

        Err(classify_failure(status, &body))
    }
}
