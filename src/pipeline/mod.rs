//! Change detection and notification.
//!
//! - `identity`: stable keys and content digests
//! - `diff`: compare a fetch against the stored snapshot
//! - `circuit_breaker`: refuse suspicious snapshot replacements
//! - `dispatch`: paced, retrying fan-out to subscribers
//! - `cycle` / `notifier`: one poll-diff-dispatch pass per domain

pub mod circuit_breaker;
pub mod cycle;
pub mod diff;
pub mod dispatch;
pub mod identity;
pub mod notifier;

pub use cycle::CycleReport;
pub use notifier::{DomainInfo, Notifier, RunStatus, Sources};
