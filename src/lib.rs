// src/lib.rs

//! lender-watch library
//!
//! Polls recovery updates, campaigns and documents, detects what changed
//! since the last poll and notifies subscribers once per change.

pub mod error;
pub mod models;
pub mod pipeline;
pub mod scheduler;
pub mod services;
pub mod storage;
pub mod utils;

#[cfg(test)]
mod test_utils;
