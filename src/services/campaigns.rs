// src/services/campaigns.rs

//! Campaigns API adapter.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use super::CampaignSource;
use crate::error::{AppError, Result};
use crate::models::{CampaignRecord, HttpConfig};
use crate::utils::http;

/// The endpoint answers with a bare list, `{ "campaigns": [...] }`, or a
/// single campaign object.
fn parse_campaigns(body: Value) -> Result<Vec<CampaignRecord>> {
    let raw = match body {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("campaigns") {
            Some(Value::Array(items)) => items,
            Some(other) => {
                return Err(AppError::fetch(
                    "campaigns",
                    format!("expected 'campaigns' to be a list, got {other}"),
                ));
            }
            None => vec![Value::Object(map)],
        },
        other => {
            return Err(AppError::fetch(
                "campaigns",
                format!("unexpected response: {other}"),
            ));
        }
    };

    let mut campaigns = Vec::with_capacity(raw.len());
    for item in raw {
        match serde_json::from_value::<CampaignRecord>(item) {
            Ok(campaign) => campaigns.push(campaign),
            Err(e) => log::warn!("Skipping malformed campaign: {}", e),
        }
    }
    Ok(campaigns)
}

/// Fetches the current campaign list over HTTP.
pub struct CampaignApi {
    client: Client,
    url: String,
    http: HttpConfig,
}

impl CampaignApi {
    pub fn new(url: impl Into<String>, http: HttpConfig) -> Result<Self> {
        let client = http::create_async_client(&http)?;
        Ok(Self {
            client,
            url: url.into(),
            http,
        })
    }
}

#[async_trait]
impl CampaignSource for CampaignApi {
    async fn fetch_campaigns(&self) -> Result<Vec<CampaignRecord>> {
        let body: Value = http::get_json_with_retry(&self.client, &self.url, &self.http).await?;
        let campaigns = parse_campaigns(body)?;
        log::info!("Fetched {} campaigns", campaigns.len());
        Ok(campaigns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bare_list() {
        let parsed = parse_campaigns(json!([{"id": 1}, {"id": "2"}])).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[1].id, "2");
    }

    #[test]
    fn test_wrapped_list() {
        let parsed = parse_campaigns(json!({"campaigns": [{"id": 1, "type": 2}]})).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].category, Some(2));
    }

    #[test]
    fn test_single_object() {
        let parsed = parse_campaigns(json!({"id": 5, "name": "Solo"})).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].name.as_deref(), Some("Solo"));
    }

    #[test]
    fn test_malformed_entries_skipped() {
        let parsed = parse_campaigns(json!([{"id": 1}, {"name": "no id"}])).unwrap();
        assert_eq!(parsed.len(), 1);
    }

    #[test]
    fn test_wrong_wrapper_type_is_error() {
        assert!(parse_campaigns(json!({"campaigns": "nope"})).is_err());
        assert!(parse_campaigns(json!("nope")).is_err());
    }
}
