//! Pluggable checking backends that screen user input and agent output.

pub mod flow;
pub mod judge;
pub mod noop;

pub use flow::FlowBackend;
pub use judge::JudgeBackend;
pub use noop::NoopBackend;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::flow::DEFAULT_FLOW_DOCUMENT;
use crate::llm::LLMProvider;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    #[default]
    Block,
    Warn,
    RequireDisclaimer,
    RestrictTool,
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Block => "block",
            Self::Warn => "warn",
            Self::RequireDisclaimer => "require_disclaimer",
            Self::RestrictTool => "restrict_tool",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleSeverity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl fmt::Display for RuleSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        };
        f.write_str(name)
    }
}

/// A guardrail rule activated for a session. Identity is `rule_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicRule {
    pub rule_id: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default, rename = "rule_type")]
    pub kind: RuleKind,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub severity: RuleSeverity,
    /// When the rule applies
    #[serde(default)]
    pub condition: String,
    /// What to do when it does
    #[serde(default)]
    pub action: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultSeverity {
    #[default]
    Info,
    Warn,
    Block,
}

/// Verdict of one input or output check.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GuardrailsResult {
    pub blocked: bool,
    pub reason: Option<String>,
    pub severity: ResultSeverity,
    pub rule_id: Option<String>,
    #[serde(default)]
    pub details: Map<String, Value>,
}

impl GuardrailsResult {
    pub fn pass() -> Self {
        Self::default()
    }

    pub fn warn(reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
            severity: ResultSeverity::Warn,
            ..Default::default()
        }
    }

    pub fn block(reason: impl Into<String>) -> Self {
        Self {
            blocked: true,
            reason: Some(reason.into()),
            severity: ResultSeverity::Block,
            ..Default::default()
        }
    }

    pub fn with_detail(mut self, key: &str, value: Value) -> Self {
        self.details.insert(key.to_string(), value);
        self
    }
}

/// Request context handed to backends alongside the text under check.
#[derive(Debug, Clone, Default)]
pub struct CheckContext {
    pub session_id: String,
    pub request_id: String,
    pub agent_profile: Option<String>,
    /// The user message, set when checking agent output
    pub user_message: Option<String>,
}

/// A checking backend. One instance serves every session; injected
/// rules are held per session and checks only see the rules of
/// `CheckContext::session_id`.
#[async_trait]
pub trait CheckingBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Load models/programs. Called once before the backend serves traffic.
    async fn initialize(&self) -> Result<()>;

    async fn check_input(&self, message: &str, ctx: &CheckContext) -> Result<GuardrailsResult>;

    async fn check_output(&self, message: &str, ctx: &CheckContext) -> Result<GuardrailsResult>;

    /// Replace the session's active rule set. An empty set releases
    /// whatever the backend holds for the session.
    async fn inject_rules(&self, session_id: &str, rules: &[DynamicRule]) -> Result<()>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Flow,
    #[default]
    Judge,
    None,
}

impl FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "flow" | "nemo" => Ok(Self::Flow),
            "judge" | "langchain" => Ok(Self::Judge),
            "none" | "noop" => Ok(Self::None),
            other => bail!("unknown guardrails backend '{}' (expected flow, judge or none)", other),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Flow => "flow",
            Self::Judge => "judge",
            Self::None => "none",
        };
        f.write_str(name)
    }
}

/// Shared ingredients for constructing any backend.
#[derive(Clone)]
pub struct BackendDeps {
    /// Small model for judging and intent checks; `None` disables LLM checks
    pub judge_provider: Option<Arc<dyn LLMProvider>>,
    /// Base flow program the flow backend starts from
    pub flow_document: String,
}

impl Default for BackendDeps {
    fn default() -> Self {
        Self {
            judge_provider: None,
            flow_document: DEFAULT_FLOW_DOCUMENT.to_string(),
        }
    }
}

/// Construct an uninitialized backend of the given kind.
pub fn create_backend(kind: BackendKind, deps: &BackendDeps) -> Arc<dyn CheckingBackend> {
    match kind {
        BackendKind::Flow => Arc::new(FlowBackend::new(
            deps.flow_document.clone(),
            deps.judge_provider.clone(),
        )),
        BackendKind::Judge => Arc::new(JudgeBackend::new(deps.judge_provider.clone())),
        BackendKind::None => Arc::new(NoopBackend),
    }
}
