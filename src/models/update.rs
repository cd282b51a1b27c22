//! Recovery update record.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{Domain, Entity, amount_text, flexible, parse_business_date};
use crate::utils::{escape_html, format_currency};

/// One dated recovery update for a tracked lender.
///
/// The remote API nests updates as lender → year → items; the fetch
/// adapter flattens that into one record per dated item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRecord {
    /// Lender company identifier
    #[serde(deserialize_with = "flexible::id")]
    pub lender_id: String,

    /// Display name of the lender (falls back to the id)
    #[serde(default)]
    pub company_name: String,

    /// Reporting year the update belongs to
    #[serde(deserialize_with = "flexible::id")]
    pub year: String,

    #[serde(default, deserialize_with = "flexible::opt_text")]
    pub status: Option<String>,

    #[serde(default, deserialize_with = "flexible::opt_text")]
    pub substatus: Option<String>,

    /// Reported date, `YYYY-MM-DD`
    #[serde(default)]
    pub date: String,

    #[serde(default)]
    pub description: String,

    #[serde(default, deserialize_with = "flexible::opt_amount")]
    pub recovered_amount: Option<f64>,

    #[serde(default, deserialize_with = "flexible::opt_amount")]
    pub remaining_amount: Option<f64>,
}

impl Entity for UpdateRecord {
    const DOMAIN: Domain = Domain::Updates;
    const REQUIRED_FIELDS: &'static [&'static str] = &["lenderId", "year", "date"];

    fn identity_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("lenderId", self.lender_id.clone()),
            ("year", self.year.clone()),
            ("date", self.date.trim().to_string()),
        ]
    }

    fn significant_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("description", self.description.trim().to_string()),
            ("date", self.date.trim().to_string()),
            ("recoveredAmount", amount_text(self.recovered_amount)),
            ("remainingAmount", amount_text(self.remaining_amount)),
        ]
    }

    fn business_date(&self) -> Option<NaiveDate> {
        parse_business_date(&self.date)
    }

    fn render(&self) -> String {
        let company = if self.company_name.is_empty() {
            &self.lender_id
        } else {
            &self.company_name
        };

        let mut message = format!("🏢 <b>{}</b>\n", escape_html(company));
        message.push_str(&format!(
            "📅 {} (year {})\n",
            escape_html(&self.date),
            escape_html(&self.year)
        ));

        match (&self.status, &self.substatus) {
            (Some(status), Some(sub)) => message.push_str(&format!(
                "📌 Status: {} / {}\n",
                escape_html(status),
                escape_html(sub)
            )),
            (Some(status), None) => {
                message.push_str(&format!("📌 Status: {}\n", escape_html(status)))
            }
            _ => {}
        }

        if !self.description.trim().is_empty() {
            message.push('\n');
            message.push_str(&escape_html(self.description.trim()));
            message.push('\n');
        }

        if self.recovered_amount.is_some() || self.remaining_amount.is_some() {
            message.push_str(&format!(
                "\n💰 Recovered: {}\n⏳ Remaining: {}\n",
                format_currency(self.recovered_amount),
                format_currency(self.remaining_amount)
            ));
        }

        message
    }

    fn label(&self) -> String {
        format!("lender {} update {}", self.lender_id, self.date)
    }
}
