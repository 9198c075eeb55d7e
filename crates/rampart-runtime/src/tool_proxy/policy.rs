//! Allow/deny list policy for tool calls.

use std::collections::BTreeSet;
use std::sync::RwLock;

use serde::Serialize;
use serde_json::Value;

use super::config::ToolProxyConfig;

/// Outcome of a policy evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyDecision {
    /// Allow the tool call to proceed
    Allow,
    /// Deny the tool call with a reason
    Deny(String),
}

/// Current contents of both lists, for display.
#[derive(Debug, Clone, Serialize)]
pub struct PolicySnapshot {
    pub allowlist: Vec<String>,
    pub denylist: Vec<String>,
    pub default_allow: bool,
}

/// Allow/deny lists consulted before any other guard.
/// Deny always wins; a non-empty allowlist is exclusive.
pub struct PolicyEngine {
    allowlist: RwLock<BTreeSet<String>>,
    denylist: RwLock<BTreeSet<String>>,
    default_allow: bool,
}

impl PolicyEngine {
    pub fn new(allowlist: Vec<String>, denylist: Vec<String>, default_allow: bool) -> Self {
        Self {
            allowlist: RwLock::new(allowlist.into_iter().collect()),
            denylist: RwLock::new(denylist.into_iter().collect()),
            default_allow,
        }
    }

    pub fn from_config(config: &ToolProxyConfig) -> Self {
        Self::new(
            config.allowlist.clone(),
            config.denylist.clone(),
            config.default_allow,
        )
    }

    /// Evaluate a call; `context` is only used for logging.
    pub fn decide(&self, tool_name: &str, context: Option<&Value>) -> PolicyDecision {
        let denylist = self.denylist.read().unwrap_or_else(|e| e.into_inner());
        if denylist.contains(tool_name) {
            tracing::warn!(tool = tool_name, context = ?context, "Tool is denylisted");
            return PolicyDecision::Deny(format!("tool '{}' is denylisted", tool_name));
        }
        drop(denylist);

        let allowlist = self.allowlist.read().unwrap_or_else(|e| e.into_inner());
        if !allowlist.is_empty() {
            if allowlist.contains(tool_name) {
                return PolicyDecision::Allow;
            }
            tracing::warn!(tool = tool_name, context = ?context, "Tool not in allowlist");
            return PolicyDecision::Deny(format!("tool '{}' is not in the allowlist", tool_name));
        }

        if self.default_allow {
            PolicyDecision::Allow
        } else {
            PolicyDecision::Deny(format!("tool '{}' is not allowed by default", tool_name))
        }
    }

    pub fn is_allowed(&self, tool_name: &str, context: Option<&Value>) -> bool {
        self.decide(tool_name, context) == PolicyDecision::Allow
    }

    pub fn add_allow(&self, tool_name: &str) {
        self.allowlist
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(tool_name.to_string());
    }

    pub fn remove_allow(&self, tool_name: &str) {
        self.allowlist
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(tool_name);
    }

    pub fn add_deny(&self, tool_name: &str) {
        self.denylist
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(tool_name.to_string());
    }

    pub fn remove_deny(&self, tool_name: &str) {
        self.denylist
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(tool_name);
    }

    pub fn snapshot(&self) -> PolicySnapshot {
        PolicySnapshot {
            allowlist: self
                .allowlist
                .read()
                .unwrap_or_else(|e| e.into_inner())
                .iter()
                .cloned()
                .collect(),
            denylist: self
                .denylist
                .read()
                .unwrap_or_else(|e| e.into_inner())
                .iter()
                .cloned()
                .collect(),
            default_allow: self.default_allow,
        }
    }
}

impl Default for PolicyEngine {
    fn default() -> Self {
        Self::from_config(&ToolProxyConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_denylist() {
        let policy = PolicyEngine::default();
        assert!(!policy.is_allowed("execute_system_command", None));
        assert!(!policy.is_allowed("delete_database", None));
        assert!(policy.is_allowed("calculate", None));
    }

    #[test]
    fn test_deny_wins_over_allow() {
        let policy = PolicyEngine::new(vec!["x".into()], vec!["x".into()], true);
        assert!(!policy.is_allowed("x", None));
    }

    #[test]
    fn test_allowlist_is_exclusive() {
        let policy = PolicyEngine::new(vec!["calculate".into()], vec![], true);
        assert!(policy.is_allowed("calculate", None));
        match policy.decide("read_file", None) {
            PolicyDecision::Deny(reason) => assert!(reason.contains("allowlist")),
            PolicyDecision::Allow => panic!("read_file should be denied"),
        }
    }

    #[test]
    fn test_default_deny() {
        let policy = PolicyEngine::new(vec![], vec![], false);
        assert!(!policy.is_allowed("calculate", None));
    }

    #[test]
    fn test_mutations() {
        let policy = PolicyEngine::new(vec![], vec![], true);
        policy.add_deny("write_file");
        assert!(!policy.is_allowed("write_file", None));
        policy.remove_deny("write_file");
        assert!(policy.is_allowed("write_file", None));

        policy.add_allow("calculate");
        assert!(!policy.is_allowed("write_file", None));
        policy.remove_allow("calculate");
        assert!(policy.is_allowed("write_file", None));

        let snapshot = policy.snapshot();
        assert!(snapshot.allowlist.is_empty());
        assert!(snapshot.denylist.is_empty());
    }
}
