// src/services/recovery.rs

//! Recovery-updates API adapter.
//!
//! The endpoint returns `lender → items[year block] → items[update]`; each
//! dated update is flattened into one `UpdateRecord` carrying its year
//! block's status and the lender's display name.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value};

use super::{UpdateBatch, UpdateSource};
use crate::error::{AppError, Result};
use crate::models::{HttpConfig, LenderConfig, UpdateRecord};
use crate::utils::http;

#[derive(Debug, Deserialize)]
struct RecoveryResponse {
    #[serde(default)]
    items: Vec<YearBlock>,
}

#[derive(Debug, Deserialize)]
struct YearBlock {
    #[serde(default)]
    year: Value,
    #[serde(default)]
    status: Value,
    #[serde(default)]
    substatus: Value,
    #[serde(default)]
    items: Vec<Map<String, Value>>,
}

/// Turn one lender's response into flat records, skipping malformed items.
fn flatten_response(lender: &LenderConfig, response: RecoveryResponse) -> Vec<UpdateRecord> {
    let mut records = Vec::new();

    for block in response.items {
        for mut item in block.items {
            item.insert("lenderId".into(), Value::String(lender.id.clone()));
            item.insert(
                "companyName".into(),
                Value::String(lender.display_name().to_string()),
            );
            item.insert("year".into(), block.year.clone());
            item.entry("status").or_insert_with(|| block.status.clone());
            item.entry("substatus")
                .or_insert_with(|| block.substatus.clone());

            match serde_json::from_value::<UpdateRecord>(Value::Object(item)) {
                Ok(record) => records.push(record),
                Err(e) => log::warn!("Skipping malformed update for lender {}: {}", lender.id, e),
            }
        }
    }

    records
}

/// Fetches recovery updates over HTTP.
pub struct RecoveryApi {
    client: Client,
    api_base: String,
    http: HttpConfig,
}

impl RecoveryApi {
    pub fn new(api_base: impl Into<String>, http: HttpConfig) -> Result<Self> {
        let client = http::create_async_client(&http)?;
        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    fn url_for(&self, lender_id: &str) -> String {
        format!(
            "{}/lender-companies/{}/recovery-updates",
            self.api_base, lender_id
        )
    }

    async fn fetch_lender(&self, lender: &LenderConfig) -> Result<Vec<UpdateRecord>> {
        let url = self.url_for(&lender.id);
        let response: RecoveryResponse =
            http::get_json_with_retry(&self.client, &url, &self.http).await?;
        Ok(flatten_response(lender, response))
    }
}

#[async_trait]
impl UpdateSource for RecoveryApi {
    async fn fetch_updates(&self, lenders: &[LenderConfig]) -> Result<UpdateBatch> {
        let delay = Duration::from_millis(self.http.request_delay_ms);
        let concurrency = self.http.max_concurrent.max(1);

        let requests: Vec<_> = lenders
            .iter()
            .map(|lender| async move { (lender, self.fetch_lender(lender).await) })
            .collect();
        let mut results = stream::iter(requests).buffered(concurrency);

        let mut batch = UpdateBatch::default();
        while let Some((lender, result)) = results.next().await {
            match result {
                Ok(updates) => {
                    log::debug!("Lender {}: {} updates", lender.id, updates.len());
                    batch.records.extend(updates);
                }
                Err(e) => {
                    log::warn!("Failed to fetch updates for lender {}: {}", lender.id, e);
                    batch.failed_lenders.push(lender.id.clone());
                }
            }

            if delay.as_millis() > 0 {
                tokio::time::sleep(delay).await;
            }
        }

        let failures = batch.failed_lenders.len();
        if !lenders.is_empty() && failures == lenders.len() {
            return Err(AppError::fetch(
                "recovery updates",
                format!("all {} lenders failed", failures),
            ));
        }

        log::info!(
            "Fetched {} updates from {}/{} lenders",
            batch.records.len(),
            lenders.len() - failures,
            lenders.len()
        );
        Ok(batch)
    }
}
