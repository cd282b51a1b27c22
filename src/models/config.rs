//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{Domain, flexible};
use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Where persisted state lives
    #[serde(default)]
    pub paths: PathsConfig,

    /// HTTP client behavior for the fetch adapters
    #[serde(default)]
    pub http: HttpConfig,

    /// Chat channel settings
    #[serde(default)]
    pub telegram: TelegramConfig,

    /// Remote endpoints and document pages
    #[serde(default)]
    pub sources: SourcesConfig,

    /// Tracked lenders for recovery updates
    #[serde(default)]
    pub lenders: Vec<LenderConfig>,

    /// Delivery pacing and retry policy
    #[serde(default)]
    pub dispatch: DispatchConfig,

    #[serde(default)]
    pub campaigns: CampaignsConfig,

    #[serde(default)]
    pub updates: UpdatesConfig,

    /// Snapshot shrink protection
    #[serde(default)]
    pub snapshot_guard: SnapshotGuardConfig,

    /// Per-domain scheduling
    #[serde(default)]
    pub schedule: SchedulesConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.http.user_agent.trim().is_empty() {
            return Err(AppError::validation("http.user_agent is empty"));
        }
        if self.http.timeout_secs == 0 {
            return Err(AppError::validation("http.timeout_secs must be > 0"));
        }
        if self.http.max_concurrent == 0 {
            return Err(AppError::validation("http.max_concurrent must be > 0"));
        }
        if self.telegram.token_env.trim().is_empty() {
            return Err(AppError::validation("telegram.token_env is empty"));
        }
        if self.dispatch.max_attempts == 0 {
            return Err(AppError::validation("dispatch.max_attempts must be > 0"));
        }
        if self.dispatch.base_delay_ms > self.dispatch.max_delay_ms {
            return Err(AppError::validation(
                "dispatch.base_delay_ms must not exceed dispatch.max_delay_ms",
            ));
        }
        if self.snapshot_guard.max_drop_percent > 100 {
            return Err(AppError::validation(
                "snapshot_guard.max_drop_percent must be <= 100",
            ));
        }
        for domain in Domain::ALL {
            self.schedule
                .for_domain(domain)
                .validate()
                .map_err(|e| AppError::validation(format!("schedule.{domain}: {e}")))?;
        }
        for lender in &self.lenders {
            if lender.id.trim().is_empty() {
                return Err(AppError::validation("lenders entry with empty id"));
            }
        }
        for company in &self.sources.companies {
            url::Url::parse(&company.url).map_err(|e| {
                AppError::validation(format!("sources.companies '{}': {e}", company.name))
            })?;
        }
        Ok(())
    }

    /// Read the bot token from the configured environment variable.
    pub fn telegram_token(&self) -> Result<String> {
        match std::env::var(&self.telegram.token_env) {
            Ok(token) if !token.trim().is_empty() => Ok(token.trim().to_string()),
            _ => Err(AppError::config(format!(
                "environment variable {} is not set",
                self.telegram.token_env
            ))),
        }
    }
}

/// Filesystem locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory holding snapshots, ledgers, queue and subscriber files
    #[serde(default = "defaults::data_dir")]
    pub data_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: defaults::data_dir(),
        }
    }
}

/// HTTP client behavior for fetch adapters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Attempts per request before the adapter gives up
    #[serde(default = "defaults::max_retries")]
    pub max_retries: u32,

    /// Pause between retries of the same request
    #[serde(default = "defaults::retry_delay")]
    pub retry_delay_ms: u64,

    /// Delay between consecutive requests in milliseconds
    #[serde(default = "defaults::request_delay")]
    pub request_delay_ms: u64,

    /// Maximum concurrent requests
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            max_retries: defaults::max_retries(),
            retry_delay_ms: defaults::retry_delay(),
            request_delay_ms: defaults::request_delay(),
            max_concurrent: defaults::max_concurrent(),
        }
    }
}

/// Telegram channel settings. The token itself is never stored here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default = "defaults::telegram_api_base")]
    pub api_base: String,

    /// Name of the environment variable holding the bot token
    #[serde(default = "defaults::token_env")]
    pub token_env: String,

    /// Destinations that get campaigns immediately
    #[serde(default)]
    pub admin_ids: Vec<String>,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            api_base: defaults::telegram_api_base(),
            token_env: defaults::token_env(),
            admin_ids: Vec::new(),
        }
    }
}

/// Remote endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// API base; updates are read from `{base}/lender-companies/{id}/recovery-updates`
    #[serde(default = "defaults::recovery_api_base")]
    pub recovery_api_base: String,

    #[serde(default = "defaults::campaigns_url")]
    pub campaigns_url: String,

    /// Company pages scraped for documents
    #[serde(default)]
    pub companies: Vec<CompanyPage>,

    /// CSS selector for document links on a company page
    #[serde(default = "defaults::document_link_selector")]
    pub document_link_selector: String,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            recovery_api_base: defaults::recovery_api_base(),
            campaigns_url: defaults::campaigns_url(),
            companies: Vec::new(),
            document_link_selector: defaults::document_link_selector(),
        }
    }
}

/// A company page to scan for documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyPage {
    pub name: String,
    pub url: String,
}

/// A tracked lender.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LenderConfig {
    #[serde(deserialize_with = "flexible::id")]
    pub id: String,

    #[serde(default)]
    pub name: String,
}

impl LenderConfig {
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

/// Delivery pacing and retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Base pause before each message
    #[serde(default = "defaults::base_delay")]
    pub base_delay_ms: u64,

    /// Extra pause per 1000 characters of message
    #[serde(default = "defaults::delay_per_kb")]
    pub delay_per_kb_ms: u64,

    /// Upper bound of the adaptive pause
    #[serde(default = "defaults::max_delay")]
    pub max_delay_ms: u64,

    /// Send attempts for transient failures
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u32,

    /// First backoff between transient retries, doubled each attempt
    #[serde(default = "defaults::retry_base")]
    pub retry_base_ms: u64,

    /// Added to the server-advised wait after a rate limit
    #[serde(default = "defaults::rate_limit_buffer")]
    pub rate_limit_buffer_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: defaults::base_delay(),
            delay_per_kb_ms: defaults::delay_per_kb(),
            max_delay_ms: defaults::max_delay(),
            max_attempts: defaults::max_attempts(),
            retry_base_ms: defaults::retry_base(),
            rate_limit_buffer_ms: defaults::rate_limit_buffer(),
        }
    }
}

impl DispatchConfig {
    /// Pause before sending a message of `len` characters.
    ///
    /// First attempts go a little faster, retries a little slower.
    pub fn adaptive_delay(&self, len: usize, first_attempt: bool) -> std::time::Duration {
        let scaled = self.base_delay_ms + (len as u64 * self.delay_per_kb_ms) / 1000;
        let capped = scaled.min(self.max_delay_ms);
        let factor = if first_attempt { 0.8 } else { 1.2 };
        std::time::Duration::from_millis((capped as f64 * factor) as u64)
    }
}

/// Campaign two-tier delivery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignsConfig {
    /// Hours between admin delivery and the general broadcast
    #[serde(default = "defaults::delay_hours")]
    pub delay_hours: f64,

    /// Categories never broadcast to non-admin subscribers
    #[serde(default = "defaults::excluded_categories")]
    pub excluded_categories: Vec<i64>,
}

impl Default for CampaignsConfig {
    fn default() -> Self {
        Self {
            delay_hours: defaults::delay_hours(),
            excluded_categories: defaults::excluded_categories(),
        }
    }
}

impl CampaignsConfig {
    pub fn is_excluded(&self, category: Option<i64>) -> bool {
        category.is_some_and(|c| self.excluded_categories.contains(&c))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdatesConfig {
    /// Only deliver updates dated today
    #[serde(default = "defaults::same_day_only")]
    pub same_day_only: bool,
}

impl Default for UpdatesConfig {
    fn default() -> Self {
        Self {
            same_day_only: defaults::same_day_only(),
        }
    }
}

/// Protection against a broken fetch wiping a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotGuardConfig {
    /// Largest tolerated drop in entity count, percent
    #[serde(default = "defaults::max_drop_percent")]
    pub max_drop_percent: u8,

    /// Snapshots smaller than this are not guarded
    #[serde(default = "defaults::min_baseline")]
    pub min_baseline: usize,

    /// Consecutive large drops after which the smaller list is accepted
    /// as the new baseline; 0 never accepts
    #[serde(default = "defaults::accept_after_trips")]
    pub accept_after_trips: u32,
}

impl Default for SnapshotGuardConfig {
    fn default() -> Self {
        Self {
            max_drop_percent: defaults::max_drop_percent(),
            min_baseline: defaults::min_baseline(),
            accept_after_trips: defaults::accept_after_trips(),
        }
    }
}

/// Schedules for every domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulesConfig {
    #[serde(default = "defaults::updates_schedule")]
    pub updates: ScheduleConfig,

    #[serde(default = "defaults::campaigns_schedule")]
    pub campaigns: ScheduleConfig,

    #[serde(default = "defaults::documents_schedule")]
    pub documents: ScheduleConfig,
}

impl Default for SchedulesConfig {
    fn default() -> Self {
        Self {
            updates: defaults::updates_schedule(),
            campaigns: defaults::campaigns_schedule(),
            documents: defaults::documents_schedule(),
        }
    }
}

impl SchedulesConfig {
    pub fn for_domain(&self, domain: Domain) -> &ScheduleConfig {
        match domain {
            Domain::Updates => &self.updates,
            Domain::Campaigns => &self.campaigns,
            Domain::Documents => &self.documents,
        }
    }
}

/// Gate, cooldown and backoff for one domain loop.
///
/// `hours` and `override_hours` list permitted local hours; an empty list
/// means every hour.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduleConfig {
    #[serde(default)]
    pub weekdays_only: bool,

    #[serde(default)]
    pub hours: Vec<u32>,

    /// Sleep between gate checks while idle
    #[serde(default = "defaults::poll_interval")]
    pub poll_interval_secs: u64,

    /// Sleep after a successful run
    #[serde(default = "defaults::poll_interval")]
    pub success_cooldown_secs: u64,

    /// First backoff after a failed run
    #[serde(default = "defaults::error_backoff")]
    pub error_backoff_secs: u64,

    #[serde(default = "defaults::max_backoff")]
    pub max_backoff_secs: u64,

    /// Consecutive failures before the extended cooldown applies
    #[serde(default)]
    pub escalate_after_failures: Option<u32>,

    #[serde(default)]
    pub extended_cooldown_secs: u64,

    /// Snapshot age that forces a run outside the normal window
    #[serde(default)]
    pub stale_after_hours: Option<f64>,

    #[serde(default)]
    pub override_weekdays_only: bool,

    #[serde(default)]
    pub override_hours: Vec<u32>,

    /// Skip runs while the snapshot is younger than this
    #[serde(default)]
    pub min_snapshot_age_hours: Option<f64>,

    /// Mark everything sent on the very first pass instead of delivering
    #[serde(default)]
    pub bootstrap_silently: bool,
}

impl ScheduleConfig {
    fn validate(&self) -> std::result::Result<(), String> {
        if self.poll_interval_secs == 0 {
            return Err("poll_interval_secs must be > 0".into());
        }
        if let Some(h) = self.hours.iter().chain(&self.override_hours).find(|h| **h > 23) {
            return Err(format!("hour {h} is out of range"));
        }
        if self.error_backoff_secs > self.max_backoff_secs.max(self.extended_cooldown_secs) {
            return Err("error_backoff_secs exceeds every backoff cap".into());
        }
        if self.stale_after_hours.is_some_and(|h| h <= 0.0) {
            return Err("stale_after_hours must be > 0".into());
        }
        Ok(())
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            weekdays_only: false,
            hours: Vec::new(),
            poll_interval_secs: defaults::poll_interval(),
            success_cooldown_secs: defaults::poll_interval(),
            error_backoff_secs: defaults::error_backoff(),
            max_backoff_secs: defaults::max_backoff(),
            escalate_after_failures: None,
            extended_cooldown_secs: 0,
            stale_after_hours: None,
            override_weekdays_only: false,
            override_hours: Vec::new(),
            min_snapshot_age_hours: None,
            bootstrap_silently: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is unset
    #[serde(default = "defaults::log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::log_level(),
        }
    }
}

mod defaults {
    use std::path::PathBuf;

    use super::ScheduleConfig;

    // Paths
    pub fn data_dir() -> PathBuf {
        PathBuf::from("data")
    }

    // HTTP defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; lender-watch/1.0)".into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn max_retries() -> u32 {
        3
    }
    pub fn retry_delay() -> u64 {
        1000
    }
    pub fn request_delay() -> u64 {
        250
    }
    pub fn max_concurrent() -> usize {
        4
    }

    // Telegram
    pub fn telegram_api_base() -> String {
        "https://api.telegram.org".into()
    }
    pub fn token_env() -> String {
        "TELEGRAM_BOT_TOKEN".into()
    }

    // Sources
    pub fn recovery_api_base() -> String {
        "https://www.mintos.com/webapp/api/marketplace-api/v1".into()
    }
    pub fn campaigns_url() -> String {
        "https://www.mintos.com/webapp/api/en/webapp-api/user/campaigns".into()
    }
    pub fn document_link_selector() -> String {
        "a[href$='.pdf'], a[href*='/documents/'], a[download]".into()
    }

    // Dispatch
    pub fn base_delay() -> u64 {
        2000
    }
    pub fn delay_per_kb() -> u64 {
        1000
    }
    pub fn max_delay() -> u64 {
        5000
    }
    pub fn max_attempts() -> u32 {
        3
    }
    pub fn retry_base() -> u64 {
        1000
    }
    pub fn rate_limit_buffer() -> u64 {
        1000
    }

    // Campaigns
    pub fn delay_hours() -> f64 {
        4.0
    }
    pub fn excluded_categories() -> Vec<i64> {
        vec![1, 4]
    }

    // Updates
    pub fn same_day_only() -> bool {
        true
    }

    // Snapshot guard
    pub fn max_drop_percent() -> u8 {
        50
    }
    pub fn min_baseline() -> usize {
        10
    }
    pub fn accept_after_trips() -> u32 {
        3
    }

    // Schedule
    pub fn poll_interval() -> u64 {
        300
    }
    pub fn error_backoff() -> u64 {
        180
    }
    pub fn max_backoff() -> u64 {
        1800
    }

    pub fn updates_schedule() -> ScheduleConfig {
        ScheduleConfig {
            weekdays_only: true,
            hours: vec![15, 16, 17],
            poll_interval_secs: 300,
            success_cooldown_secs: 3300,
            error_backoff_secs: 180,
            max_backoff_secs: 1800,
            escalate_after_failures: Some(3),
            extended_cooldown_secs: 3600,
            stale_after_hours: Some(24.0),
            override_weekdays_only: true,
            override_hours: (9..=18).collect(),
            min_snapshot_age_hours: None,
            bootstrap_silently: false,
        }
    }

    pub fn campaigns_schedule() -> ScheduleConfig {
        ScheduleConfig {
            weekdays_only: true,
            hours: (6..20).collect(),
            poll_interval_secs: 600,
            success_cooldown_secs: 600,
            error_backoff_secs: 120,
            max_backoff_secs: 1800,
            ..ScheduleConfig::default()
        }
    }

    pub fn documents_schedule() -> ScheduleConfig {
        ScheduleConfig {
            poll_interval_secs: 3600,
            success_cooldown_secs: 3600,
            error_backoff_secs: 600,
            max_backoff_secs: 7200,
            min_snapshot_age_hours: Some(24.0),
            ..ScheduleConfig::default()
        }
    }

    // Logging
    pub fn log_level() -> String {
        "info".into()
    }
}
