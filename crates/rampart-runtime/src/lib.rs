pub mod agent;
pub mod dynamic_rules;
pub mod fingerprint;
pub mod flow;
pub mod guardrails;
pub mod llm;
pub mod orchestrator;
pub mod session;
pub mod storage;
#[cfg(test)]
pub(crate) mod test_support;
pub mod tool;
pub mod tool_proxy;

pub use agent::{AgentConfig, AgentReply, AgentRuntime, AgentStatus};
pub use dynamic_rules::{DynamicRuleEngine, DynamicRulesConfig, TurnRules};
pub use guardrails::{
    create_backend, BackendDeps, BackendKind, CheckContext, CheckingBackend, DynamicRule,
    GuardrailsResult, ResultSeverity, RuleKind, RuleSeverity,
};
pub use llm::{
    AnthropicClient, Content, GenerateConfig, GenerateResponse, LLMProvider, Message,
    OpenAIClient, ProviderFactory, ProviderKind, Role, StopReason, ToolCall, ToolResult,
    ToolSchema, Usage,
};
pub use orchestrator::{
    GuardrailsOrchestrator, OrchestratorParts, OrchestratorStatus, PipelineStage, TurnOutcome,
    TurnStatus,
};
pub use session::{HistoryEntry, MemorySessionStore, SessionState, SessionStore};
pub use storage::RedbSessionStore;
pub use tool::Tool;
pub use tool_proxy::{
    AuditLog, CallOutcome, CallStatus, PolicyEngine, ToolCallRecord, ToolError, ToolProxy,
    ToolProxyConfig, ToolRegistry,
};

/// Initialize structured JSON logging
pub fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    fmt()
        .json()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
}
