//! HTTP Client Pool for maintaining persistent connections per base URL.
//!
//! Every backend client asks this pool for a `reqwest::Client` instead of building its own, so
//! agents and strategies that talk to the same endpoint share connections, DNS results and TLS
//! sessions:
//! - `pool_idle_timeout`: keeps idle connections alive for 90 seconds
//! - `pool_max_idle_per_host`: allows up to 10 idle connections per host
//! - `tcp_keepalive`: sends keepalive packets every 60 seconds
//!
//! Per-call deadlines are enforced by the orchestrator (see
//! [`ExecutionOptions`](crate::backend::ExecutionOptions)), so the pooled clients only carry a
//! generous connect timeout.

use lazy_static::lazy_static;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

lazy_static! {
    /// Global HTTP client pool, lazily initialized on first access.
    static ref HTTP_CLIENT_POOL: Mutex<HashMap<String, reqwest::Client>> =
        Mutex::new(HashMap::new());
}

/// Get or create a shared HTTP client for the given base URL.
pub fn get_http_client(base_url: &str) -> reqwest::Client {
    let mut pool = match HTTP_CLIENT_POOL.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };

    if let Some(client) = pool.get(base_url) {
        return client.clone();
    }

    let client = match reqwest::ClientBuilder::new()
        .pool_idle_timeout(Some(Duration::from_secs(90)))
        .pool_max_idle_per_host(10)
        .tcp_keepalive(Some(Duration::from_secs(60)))
        .connect_timeout(Duration::from_secs(30))
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            log::warn!(
                "conclave::clients::http_pool: falling back to default client for {}: {}",
                base_url,
                e
            );
            reqwest::Client::new()
        }
    };

    pool.insert(base_url.to_string(), client.clone());
    client
}

/// Whether a client for `base_url` has already been created.
pub fn is_pooled(base_url: &str) -> bool {
    match HTTP_CLIENT_POOL.lock() {
        Ok(guard) => guard.contains_key(base_url),
        Err(poisoned) => poisoned.into_inner().contains_key(base_url),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_is_pooled_after_first_use() {
        assert!(!is_pooled("https://pool-test.example.com"));
        let _a = get_http_client("https://pool-test.example.com");
        assert!(is_pooled("https://pool-test.example.com"));
        let _b = get_http_client("https://pool-test.example.com");
        assert!(is_pooled("https://pool-test.example.com"));
    }

    #[test]
    fn test_unknown_base_url_is_not_pooled() {
        assert!(!is_pooled("https://never-requested.example.com"));
    }
}
