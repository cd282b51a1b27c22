//! Promotional campaign record.

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};

use super::{Domain, Entity, amount_text, flexible};
use crate::utils::{escape_html, format_currency};

/// A campaign as returned by the campaigns endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CampaignRecord {
    #[serde(deserialize_with = "flexible::id")]
    pub id: String,

    /// Campaign category (`type` on the wire)
    #[serde(rename = "type", default, deserialize_with = "flexible::opt_category")]
    pub category: Option<i64>,

    #[serde(default, deserialize_with = "flexible::opt_text")]
    pub name: Option<String>,

    #[serde(default, deserialize_with = "flexible::opt_text")]
    pub short_description: Option<String>,

    #[serde(default, deserialize_with = "flexible::opt_text")]
    pub valid_from: Option<String>,

    #[serde(default, deserialize_with = "flexible::opt_text")]
    pub valid_to: Option<String>,

    #[serde(default, deserialize_with = "flexible::opt_amount")]
    pub bonus_amount: Option<f64>,

    #[serde(default, deserialize_with = "flexible::opt_amount")]
    pub required_principal_exposure: Option<f64>,

    #[serde(default, deserialize_with = "flexible::opt_text")]
    pub terms_conditions_link: Option<String>,
}

impl CampaignRecord {
    /// Human label of the campaign category.
    pub fn category_label(&self) -> String {
        match self.category {
            Some(1) => "Refer a Friend".to_string(),
            Some(2) => "Cashback".to_string(),
            Some(4) => "Special Promotion".to_string(),
            Some(other) => format!("Campaign (Type {other})"),
            None => "Campaign".to_string(),
        }
    }
}

fn display_date(raw: &str) -> String {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.format("%d.%m.%Y").to_string())
        .unwrap_or_else(|_| raw.to_string())
}

fn opt(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

impl Entity for CampaignRecord {
    const DOMAIN: Domain = Domain::Campaigns;
    const REQUIRED_FIELDS: &'static [&'static str] = &["id"];

    fn identity_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("id", self.id.clone()),
            ("name", opt(&self.name)),
            ("validFrom", opt(&self.valid_from)),
            ("validTo", opt(&self.valid_to)),
        ]
    }

    fn significant_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("name", opt(&self.name)),
            ("shortDescription", opt(&self.short_description)),
            ("validFrom", opt(&self.valid_from)),
            ("validTo", opt(&self.valid_to)),
            ("bonusAmount", amount_text(self.bonus_amount)),
            (
                "requiredPrincipalExposure",
                amount_text(self.required_principal_exposure),
            ),
            ("termsConditionsLink", opt(&self.terms_conditions_link)),
        ]
    }

    fn business_date(&self) -> Option<NaiveDate> {
        None
    }

    fn render(&self) -> String {
        let mut message = String::from("🎯 <b>New Campaign</b>\n\n");

        if let Some(name) = &self.name {
            message.push_str(&format!("<b>{}</b>\n\n", escape_html(name)));
        }

        message.push_str(&format!(
            "📊 <b>Type:</b> {}\n",
            escape_html(&self.category_label())
        ));

        if let (Some(from), Some(to)) = (&self.valid_from, &self.valid_to) {
            message.push_str(&format!(
                "📅 <b>Valid:</b> {} – {}\n",
                display_date(from),
                display_date(to)
            ));
        }

        if self.bonus_amount.is_some() {
            message.push_str(&format!(
                "💰 <b>Bonus:</b> {}\n",
                format_currency(self.bonus_amount)
            ));
        }

        if self.required_principal_exposure.is_some() {
            message.push_str(&format!(
                "📈 <b>Required investment:</b> {}\n",
                format_currency(self.required_principal_exposure)
            ));
        }

        if let Some(description) = &self.short_description {
            message.push('\n');
            message.push_str(&escape_html(description));
            message.push('\n');
        }

        if let Some(link) = &self.terms_conditions_link {
            message.push_str(&format!(
                "\n🔗 <a href=\"{}\">Terms and conditions</a>\n",
                escape_html(link)
            ));
        }

        message
    }

    fn label(&self) -> String {
        match &self.name {
            Some(name) => format!("campaign {} ({})", self.id, name),
            None => format!("campaign {}", self.id),
        }
    }
}
