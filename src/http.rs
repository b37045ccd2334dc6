use reqwest::Client;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 20;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Shared outbound client. Every remote call in the pipeline goes through a
/// client built here so request and connect timeouts stay bounded.
pub fn build_client() -> Client {
    Client::builder()
        .timeout(Duration::from_secs(secs_from_env(
            "HTTP_TIMEOUT_SECS",
            DEFAULT_TIMEOUT_SECS,
        )))
        .connect_timeout(Duration::from_secs(secs_from_env(
            "HTTP_CONNECT_TIMEOUT_SECS",
            DEFAULT_CONNECT_TIMEOUT_SECS,
        )))
        .build()
        .unwrap_or_else(|_| Client::new())
}

fn secs_from_env(key: &str, fallback: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(fallback)
}
