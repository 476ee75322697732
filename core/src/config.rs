//! Client configuration.
//!
//! # Design
//! `Config` is a read-only bundle of the values every request needs: where
//! the API lives, who is calling, and the ownership to stamp on records that
//! were saved without one. The core never loads configuration from disk or
//! environment; sourcing these values is the embedding application's job.
//! The struct derives serde traits for app-side loading but performs no I/O.

use serde::{Deserialize, Serialize};

/// Connection and identity settings for a [`RecordClient`](crate::RecordClient).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// API base URL, e.g. `https://secure.solve360.com`. Stored without a
    /// trailing slash.
    pub base_url: String,
    /// Account email used as the basic-auth username.
    pub username: String,
    /// API token used as the basic-auth password.
    pub token: String,
    /// Ownership id applied to a record at save time when the record has
    /// none of its own.
    pub default_ownership: u64,
}

impl Config {
    /// Builds a config, trimming any trailing slash from `base_url` so path
    /// joining stays predictable.
    pub fn new(
        base_url: impl Into<String>,
        username: impl Into<String>,
        token: impl Into<String>,
        default_ownership: u64,
    ) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            username: username.into(),
            token: token.into(),
            default_ownership,
        }
    }
}
