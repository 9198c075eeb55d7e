use rampart_runtime::{BackendKind, DynamicRule, OrchestratorStatus, ToolCallRecord, TurnOutcome, TurnStatus};
use serde::{Deserialize, Serialize};

/// Chat request
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    /// Generated when absent
    pub session_id: Option<String>,
    pub agent_profile: Option<String>,
}

/// Chat response
#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub message: String,
    pub status: TurnStatus,
    pub tool_call_ids: Vec<String>,
    pub session_id: String,
    pub request_id: String,
    /// Ids of every rule active for the session after this turn
    pub active_rules: Vec<String>,
    pub new_rules: Vec<DynamicRule>,
    pub domains: Vec<String>,
}

impl ChatResponse {
    pub fn from_outcome(session_id: String, outcome: TurnOutcome) -> Self {
        let active_rules = outcome.active_rule_ids();
        Self {
            message: outcome.message,
            status: outcome.status,
            tool_call_ids: outcome.tool_call_ids,
            session_id,
            request_id: outcome.request_id,
            active_rules,
            new_rules: outcome.new_rules,
            domains: outcome.domains,
        }
    }
}

/// Runtime reconfiguration request; absent fields are left unchanged
#[derive(Debug, Default, Deserialize)]
pub struct ConfigUpdate {
    pub guardrails_backend: Option<String>,
    pub llm_provider: Option<String>,
    pub llm_model: Option<String>,
}

/// Current runtime configuration
#[derive(Debug, Serialize)]
pub struct ConfigResponse {
    #[serde(flatten)]
    pub status: OrchestratorStatus,
    pub available_backends: Vec<BackendKind>,
    pub available_providers: Vec<&'static str>,
}

impl From<OrchestratorStatus> for ConfigResponse {
    fn from(status: OrchestratorStatus) -> Self {
        Self {
            status,
            available_backends: vec![BackendKind::Flow, BackendKind::Judge, BackendKind::None],
            available_providers: vec!["openai", "anthropic", "ollama", "vllm"],
        }
    }
}

/// Audit trail for one request
#[derive(Debug, Serialize)]
pub struct AuditResponse {
    pub session_id: String,
    pub request_id: String,
    pub calls: Vec<ToolCallRecord>,
}

/// API error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub guardrails_backend: BackendKind,
    pub llm_provider: String,
    pub llm_model: String,
    pub dynamic_rules: bool,
}
