// src/utils/http.rs

//! HTTP client utilities.

use std::time::Duration;

use serde::de::DeserializeOwned;

use crate::error::{AppError, Result};
use crate::models::HttpConfig;

/// Create a configured asynchronous HTTP client.
pub fn create_async_client(config: &HttpConfig) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(&config.user_agent)
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;
    Ok(client)
}

/// GET a URL, retrying up to `max_retries` times on network errors and
/// non-success statuses. Returns the response body.
pub async fn get_text_with_retry(
    client: &reqwest::Client,
    url: &str,
    config: &HttpConfig,
) -> Result<String> {
    let attempts = config.max_retries.max(1);
    let mut last_error = None;

    for attempt in 1..=attempts {
        let outcome = async {
            let response = client.get(url).send().await?.error_for_status()?;
            response.text().await
        }
        .await;

        match outcome {
            Ok(text) => return Ok(text),
            Err(e) => {
                log::warn!("GET {} failed (attempt {}/{}): {}", url, attempt, attempts, e);
                last_error = Some(e);
                if attempt < attempts {
                    tokio::time::sleep(Duration::from_millis(config.retry_delay_ms)).await;
                }
            }
        }
    }

    match last_error {
        Some(e) => Err(AppError::Http(e)),
        None => Err(AppError::fetch(url, "no attempts made")),
    }
}

/// GET a URL with retries and decode the JSON body.
pub async fn get_json_with_retry<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    config: &HttpConfig,
) -> Result<T> {
    let text = get_text_with_retry(client, url, config).await?;
    Ok(serde_json::from_str(&text)?)
}
