// src/services/documents.rs

//! Company page document scraper.
//!
//! Selects document links on each configured company page, classifies
//! them by keyword and attaches the closest date found near the link,
//! falling back to the page's own "last updated" date.

use std::collections::HashSet;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use regex::Regex;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use super::DocumentSource;
use crate::error::{AppError, Result};
use crate::models::{CompanyPage, DocumentRecord, HttpConfig};
use crate::utils::{http, resolve_url};

static LABELLED_DATE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:last\s+updated|updated|date):?\s*(\d{4}-\d{1,2}-\d{1,2}|\d{1,2}[./]\d{1,2}[./]\d{2,4})")
        .ok()
});

static BARE_DATE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(\d{4}-\d{2}-\d{2}|\d{1,2}\.\d{1,2}\.\d{4}|\d{1,2}/\d{1,2}/\d{4})").ok()
});

/// Normalise `dd.mm.yyyy`, `dd/mm/yyyy`, `dd.mm.yy` and `yyyy-m-d` to
/// `YYYY-MM-DD`.
pub(crate) fn normalize_date(raw: &str) -> Option<String> {
    let raw = raw.trim();
    // Two-digit years first: %Y would read "25" as the year 25.
    const FORMATS: [&str; 5] = ["%Y-%m-%d", "%d.%m.%y", "%d/%m/%y", "%d.%m.%Y", "%d/%m/%Y"];
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
        .map(|d| d.format("%Y-%m-%d").to_string())
}

/// First date in `text`, preferring labelled dates.
fn find_date(text: &str) -> Option<String> {
    [&*LABELLED_DATE, &*BARE_DATE]
        .into_iter()
        .flatten()
        .find_map(|re| re.captures(text).and_then(|c| c.get(1)))
        .and_then(|m| normalize_date(m.as_str()))
}

/// Document type from the link text and target.
fn classify(text: &str, href: &str) -> &'static str {
    let haystack = format!("{} {}", text.to_lowercase(), href.to_lowercase());
    if haystack.contains("presentation") {
        "presentation"
    } else if haystack.contains("financial") {
        "financials"
    } else if haystack.contains("agreement") {
        "loan_agreement"
    } else {
        "document"
    }
}

/// Date printed near a link, searching up to three ancestors.
fn date_near(link: &ElementRef) -> Option<String> {
    let mut node = link.parent();
    for _ in 0..3 {
        let current = node?;
        if let Some(element) = ElementRef::wrap(current) {
            let text: String = element.text().collect();
            if let Some(date) = find_date(&text) {
                return Some(date);
            }
        }
        node = current.parent();
    }
    None
}

fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
}

/// Extract documents from one company page.
fn parse_company_page(
    company: &CompanyPage,
    html: &str,
    link_selector: &Selector,
) -> Result<Vec<DocumentRecord>> {
    let document = Html::parse_document(html);
    let base_url = Url::parse(&company.url)?;
    let page_text: String = document.root_element().text().collect();
    let page_date = find_date(&page_text);

    let mut seen = HashSet::new();
    let mut records = Vec::new();

    for link in document.select(link_selector) {
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        let url = resolve_url(&base_url, href);
        if !seen.insert(url.clone()) {
            continue;
        }

        let title = link.text().collect::<Vec<_>>().join(" ");
        let title = title.split_whitespace().collect::<Vec<_>>().join(" ");

        records.push(DocumentRecord {
            company_name: company.name.clone(),
            doc_type: classify(&title, href).to_string(),
            date: date_near(&link)
                .or_else(|| page_date.clone())
                .unwrap_or_default(),
            title,
            url,
            company_page_url: Some(company.url.clone()),
        });
    }

    Ok(records)
}

/// Scrapes documents from configured company pages.
pub struct DocumentScraper {
    client: Client,
    companies: Vec<CompanyPage>,
    link_selector: Selector,
    http: HttpConfig,
}

impl DocumentScraper {
    pub fn new(companies: Vec<CompanyPage>, link_selector: &str, http: HttpConfig) -> Result<Self> {
        let client = http::create_async_client(&http)?;
        Ok(Self {
            client,
            companies,
            link_selector: parse_selector(link_selector)?,
            http,
        })
    }
}

#[async_trait]
impl DocumentSource for DocumentScraper {
    async fn fetch_documents(&self) -> Result<Vec<DocumentRecord>> {
        let delay = Duration::from_millis(self.http.request_delay_ms);
        let mut records = Vec::new();
        let mut failures = 0usize;

        for company in &self.companies {
            let result = match http::get_text_with_retry(&self.client, &company.url, &self.http).await
            {
                Ok(html) => parse_company_page(company, &html, &self.link_selector),
                Err(e) => Err(e),
            };

            match result {
                Ok(docs) => {
                    log::debug!("{}: {} documents", company.name, docs.len());
                    records.extend(docs);
                }
                Err(e) => {
                    failures += 1;
                    log::warn!("Failed to scrape {} ({}): {}", company.name, company.url, e);
                }
            }

            if delay.as_millis() > 0 {
                tokio::time::sleep(delay).await;
            }
        }

        if !self.companies.is_empty() && failures == self.companies.len() {
            return Err(AppError::fetch(
                "documents",
                format!("all {} company pages failed", failures),
            ));
        }

        log::info!(
            "Scraped {} documents from {} company pages",
            records.len(),
            self.companies.len() - failures
        );
        Ok(records)
    }
}
