//! Shared HTTP connection pool.
//!
//! Planning and executor clients for the same endpoint reuse one
//! `reqwest::Client` (and therefore one connection pool). Clients are keyed
//! by a SHA-256 fingerprint of the endpoint settings so the API key never
//! appears in a map key or a log line.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use reqwest::Client;
use sha2::{Digest, Sha256};

use crate::llm::client::LlmError;

/// Upper bound on connection setup, independent of per-call timeouts
const MAX_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Idle keep-alive connections retained per host
const DEFAULT_MAX_IDLE_PER_HOST: usize = 10;

/// Connection settings for one upstream endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub base_url: String,
    pub api_key: String,
    pub timeout: Duration,
}

impl Endpoint {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            timeout,
        }
    }

    /// `{base_url}/chat/completions`, tolerating a trailing slash
    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    /// Stable key for pooling
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.base_url.as_bytes());
        hasher.update(b"|");
        hasher.update(self.api_key.as_bytes());
        hasher.update(b"|");
        hasher.update(self.timeout.as_millis().to_string().as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Pool of HTTP clients shared across requests
#[derive(Debug)]
pub struct ClientPool {
    clients: Mutex<HashMap<String, Client>>,
    max_idle_per_host: usize,
}

impl Default for ClientPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientPool {
    pub fn new() -> Self {
        Self::with_max_idle(DEFAULT_MAX_IDLE_PER_HOST)
    }

    pub fn with_max_idle(max_idle_per_host: usize) -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
            max_idle_per_host,
        }
    }

    /// Get the pooled client for an endpoint, creating it on first use
    pub fn client_for(&self, endpoint: &Endpoint) -> Result<Client, LlmError> {
        let key = endpoint.fingerprint();
        let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(client) = clients.get(&key) {
            return Ok(client.clone());
        }

        let client = Client::builder()
            .connect_timeout(endpoint.timeout.min(MAX_CONNECT_TIMEOUT))
            .pool_max_idle_per_host(self.max_idle_per_host)
            .build()?;

        log::debug!("Created pooled HTTP client for {}", endpoint.base_url);
        clients.insert(key, client.clone());
        Ok(client)
    }

    /// Number of distinct endpoints with a pooled client
    pub fn len(&self) -> usize {
        self.clients.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every pooled client; open connections close once in-flight calls finish
    pub fn clear(&self) {
        self.clients.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}
