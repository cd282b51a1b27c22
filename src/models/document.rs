//! Company document record.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{Domain, Entity, parse_business_date};
use crate::utils::escape_html;

/// A document published on a lender's company page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentRecord {
    pub company_name: String,

    /// `presentation`, `financials`, `loan_agreement` or `document`
    #[serde(rename = "type")]
    pub doc_type: String,

    #[serde(default)]
    pub title: String,

    /// Normalised `YYYY-MM-DD`, empty when the page shows no date
    #[serde(default)]
    pub date: String,

    pub url: String,

    #[serde(default)]
    pub company_page_url: Option<String>,
}

impl DocumentRecord {
    fn emoji(&self) -> &'static str {
        match self.doc_type.to_lowercase().as_str() {
            "presentation" => "📊",
            "financials" => "💰",
            "loan_agreement" => "🤝",
            _ => "📃",
        }
    }

    /// `loan_agreement` → `Loan Agreement`
    fn display_type(&self) -> String {
        self.doc_type
            .split('_')
            .filter(|w| !w.is_empty())
            .map(|w| {
                let mut chars = w.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl Entity for DocumentRecord {
    const DOMAIN: Domain = Domain::Documents;
    const REQUIRED_FIELDS: &'static [&'static str] = &["company", "type", "url"];

    fn identity_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("company", self.company_name.trim().to_string()),
            ("type", self.doc_type.trim().to_lowercase()),
            ("url", self.url.trim().to_string()),
        ]
    }

    fn significant_fields(&self) -> Vec<(&'static str, String)> {
        vec![("date", self.date.trim().to_string())]
    }

    fn business_date(&self) -> Option<NaiveDate> {
        parse_business_date(&self.date)
    }

    fn render(&self) -> String {
        let date = if self.date.is_empty() {
            "Unknown date"
        } else {
            self.date.as_str()
        };
        let title = if self.title.is_empty() {
            "Untitled Document"
        } else {
            self.title.as_str()
        };

        let mut message = format!(
            "{} <b>{}</b> from <b>{}</b>\n\n📄 <b>Title:</b> {}\n📅 <b>Date:</b> {}\n\n🔗 <a href=\"{}\">View Document</a>",
            self.emoji(),
            escape_html(&self.display_type()),
            escape_html(&self.company_name),
            escape_html(title),
            escape_html(date),
            escape_html(&self.url),
        );
        if let Some(page) = &self.company_page_url {
            message.push_str(&format!(
                "\n🏢 <a href=\"{}\">Company Page</a>",
                escape_html(page)
            ));
        }
        message
    }

    fn label(&self) -> String {
        format!("{} {} ({})", self.company_name, self.doc_type, self.url)
    }
}
