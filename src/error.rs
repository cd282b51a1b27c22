// src/error.rs

//! Unified error handling for the notifier.

use std::fmt;

use thiserror::Error;

use crate::models::Domain;

/// Result type alias for notifier operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// CSS selector parsing failed
    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// A fetch adapter could not produce a usable snapshot
    #[error("Fetch error for {source_name}: {message}")]
    Fetch {
        source_name: String,
        message: String,
    },

    /// A record lacks a field its identity key is built from
    #[error("Cannot fingerprint {domain} record: missing '{field}'")]
    Identity { domain: Domain, field: &'static str },

    /// Circuit breaker triggered
    #[error(
        "Circuit breaker triggered: {previous_count} → {current_count} records ({drop_percent:.1}% drop > {threshold_percent}%)"
    )]
    CircuitBreakerTriggered {
        current_count: usize,
        previous_count: usize,
        drop_percent: f64,
        threshold_percent: u8,
    },

    /// Fetch returned nothing while a non-empty snapshot exists
    #[error("Fetch returned no records while the previous snapshot was non-empty")]
    EmptyFetchResult,

    /// Another run, possibly in another process, holds the domain lock
    #[error("{0} is locked by another run")]
    Locked(Domain),
}

impl AppError {
    /// Create a selector parsing error.
    pub fn selector(selector: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a fetch error with the name of the failing source.
    pub fn fetch(source_name: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Fetch {
            source_name: source_name.into(),
            message: message.to_string(),
        }
    }
}

/// Classified failure of a channel send.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SendError {
    /// The destination asked us to slow down
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: std::time::Duration },

    /// The destination blocked us or no longer exists
    #[error("destination permanently unavailable: {0}")]
    PermanentlyBlocked(String),

    /// The message itself can never be delivered (too long, bad markup)
    #[error("message rejected: {0}")]
    Rejected(String),

    /// Anything else; worth retrying
    #[error("transient send failure: {0}")]
    Transient(String),
}
