//! Configuration for the tool proxy guards.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Limits and access lists applied to every proxied tool call.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ToolProxyConfig {
    /// Max tool calls within a single request
    #[serde(default = "default_max_calls_per_request")]
    pub max_calls_per_request: usize,

    /// Max tool calls per session in any 60s window
    #[serde(default = "default_rate_limit_per_min")]
    pub rate_limit_per_min: usize,

    /// Identical (tool, args) calls tolerated per session before rejecting
    #[serde(default = "default_loop_breaker_threshold")]
    pub loop_breaker_threshold: u32,

    /// Per-call execution timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// If non-empty, only these tools may run
    #[serde(default)]
    pub allowlist: Vec<String>,

    /// Tools that never run; wins over the allowlist
    #[serde(default = "default_denylist")]
    pub denylist: Vec<String>,

    /// Verdict when the allowlist is empty and the tool is not denied
    #[serde(default = "default_true")]
    pub default_allow: bool,
}

fn default_max_calls_per_request() -> usize {
    10
}

fn default_rate_limit_per_min() -> usize {
    30
}

fn default_loop_breaker_threshold() -> u32 {
    3
}

fn default_timeout_secs() -> u64 {
    15
}

fn default_denylist() -> Vec<String> {
    vec![
        "execute_system_command".to_string(),
        "delete_database".to_string(),
        "unrestricted_http_request".to_string(),
    ]
}

fn default_true() -> bool {
    true
}

impl ToolProxyConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ToolProxyConfig {
    fn default() -> Self {
        Self {
            max_calls_per_request: default_max_calls_per_request(),
            rate_limit_per_min: default_rate_limit_per_min(),
            loop_breaker_threshold: default_loop_breaker_threshold(),
            timeout_secs: default_timeout_secs(),
            allowlist: vec![],
            denylist: default_denylist(),
            default_allow: default_true(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: ToolProxyConfig = toml::from_str("rate_limit_per_min = 5").unwrap();
        assert_eq!(config.rate_limit_per_min, 5);
        assert_eq!(config.max_calls_per_request, 10);
        assert_eq!(config.loop_breaker_threshold, 3);
        assert_eq!(config.timeout(), Duration::from_secs(15));
        assert!(config.denylist.contains(&"delete_database".to_string()));
        assert!(config.default_allow);
    }
}
