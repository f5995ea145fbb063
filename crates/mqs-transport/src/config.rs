//! Configuration surface for the transport adapter.

use serde::{Deserialize, Serialize};

/// Options recognized by the transport layer.
///
/// All fields have defaults so a config document only needs to name the
/// options it overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Prepended to every logical queue name before remote-name translation
    pub queue_name_prefix: String,
    /// Visibility timeout in seconds, passed at queue creation
    pub visibility_timeout: u32,
    /// Informational routing hint for the remote endpoint
    pub region: String,
    /// Long-poll duration hint passed on each receive call
    pub wait_time_seconds: u32,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            queue_name_prefix: String::new(),
            visibility_timeout: 1800, // 30 minutes
            region: "cn-hangzhou".to_string(),
            wait_time_seconds: 10,
        }
    }
}

/// Connection settings for the HTTP queue service provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpServiceConfig {
    /// Base endpoint, e.g. `https://account.mqs.example.com`
    pub endpoint: String,
    pub access_key_id: String,
    pub access_key_secret: String,
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
