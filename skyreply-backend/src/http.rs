//! Shared HTTP client

use once_cell::sync::Lazy;
use std::time::Duration;

/// Per-request timeout applied to every outbound call
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

static SHARED_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .user_agent(concat!("skyreply/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_else(|e| {
            log::warn!("Failed to build configured HTTP client, using defaults: {}", e);
            reqwest::Client::new()
        })
});

/// Process-wide reqwest client (connection pool is shared across clones)
pub fn shared_client() -> &'static reqwest::Client {
    &SHARED_CLIENT
}
