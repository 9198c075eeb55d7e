//! Per-turn guardrails pipeline and runtime reconfiguration.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, error, info, warn};

use crate::agent::{AgentConfig, AgentRuntime, AgentStatus};
use crate::dynamic_rules::{DynamicRuleEngine, TurnRules};
use crate::guardrails::{create_backend, BackendDeps, BackendKind, CheckContext, CheckingBackend, DynamicRule};
use crate::llm::{LLMProvider, ProviderFactory};
use crate::session::{SessionState, SessionStore};
use crate::tool_proxy::ToolProxy;

pub const INPUT_REFUSAL_MESSAGE: &str = "I can't help with that request.";
pub const OUTPUT_REFUSAL_MESSAGE: &str =
    "I'm unable to share that response because it conflicts with the safety rules for this conversation.";
pub const ESCALATION_MESSAGE: &str =
    "I'm sorry, I couldn't process that request. It has been flagged for review.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    CheckingInput,
    RunningAgent,
    CheckingOutput,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnStatus {
    Ok,
    Refused,
    Escalated,
}

/// Result of one user turn
#[derive(Debug, Clone, Serialize)]
pub struct TurnOutcome {
    pub message: String,
    pub status: TurnStatus,
    pub tool_call_ids: Vec<String>,
    pub session_state: SessionState,
    pub request_id: String,
    /// Rules first activated this turn
    pub new_rules: Vec<DynamicRule>,
    pub domains: Vec<String>,
}

impl TurnOutcome {
    pub fn active_rule_ids(&self) -> Vec<String> {
        self.session_state
            .dynamic_rules
            .iter()
            .map(|r| r.rule_id.clone())
            .collect()
    }
}

/// Snapshot for the config endpoint and CLI
#[derive(Debug, Clone, Serialize)]
pub struct OrchestratorStatus {
    pub guardrails_backend: BackendKind,
    pub llm_provider: String,
    pub llm_model: String,
    pub tools: Vec<String>,
    pub dynamic_rules_enabled: bool,
}

/// Everything the orchestrator is assembled from
pub struct OrchestratorParts {
    pub backend_kind: BackendKind,
    pub backend_deps: BackendDeps,
    /// `None` disables dynamic rules
    pub rule_engine: Option<Arc<DynamicRuleEngine>>,
    pub proxy: Arc<ToolProxy>,
    pub agent_provider: Arc<dyn LLMProvider>,
    pub providers: Arc<dyn ProviderFactory>,
    pub agent_config: AgentConfig,
    pub temperature: f32,
    pub sessions: Arc<dyn SessionStore>,
    pub session_ttl: Duration,
}

/// Exclusive right to run a turn for one session
struct TurnPermit<'a> {
    locks: &'a DashMap<String, Arc<Mutex<()>>>,
    session_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for TurnPermit<'_> {
    fn drop(&mut self) {
        self.guard.take();
        // Last holder out removes the entry
        self.locks
            .remove_if(&self.session_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

pub struct GuardrailsOrchestrator {
    backend: RwLock<Arc<dyn CheckingBackend>>,
    agent: RwLock<Arc<AgentRuntime>>,
    backend_deps: BackendDeps,
    rule_engine: Option<Arc<DynamicRuleEngine>>,
    proxy: Arc<ToolProxy>,
    providers: Arc<dyn ProviderFactory>,
    agent_config: AgentConfig,
    temperature: f32,
    sessions: Arc<dyn SessionStore>,
    session_ttl: Duration,
    /// Serializes turns of one session; entries live while a turn holds or awaits them
    turn_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl GuardrailsOrchestrator {
    /// Build and initialize the configured backend.
    pub async fn new(parts: OrchestratorParts) -> Result<Self> {
        let backend = create_backend(parts.backend_kind, &parts.backend_deps);
        backend
            .initialize()
            .await
            .with_context(|| format!("Failed to initialize {} backend", parts.backend_kind))?;

        let agent = AgentRuntime::new(parts.agent_config.clone(), parts.agent_provider, parts.proxy.clone())
            .with_temperature(parts.temperature);

        info!(
            backend = %parts.backend_kind,
            provider = agent.provider_name(),
            model = agent.model_name(),
            dynamic_rules = parts.rule_engine.is_some(),
            "Guardrails orchestrator ready"
        );

        Ok(Self {
            backend: RwLock::new(backend),
            agent: RwLock::new(Arc::new(agent)),
            backend_deps: parts.backend_deps,
            rule_engine: parts.rule_engine,
            proxy: parts.proxy,
            providers: parts.providers,
            agent_config: parts.agent_config,
            temperature: parts.temperature,
            sessions: parts.sessions,
            session_ttl: parts.session_ttl,
            turn_locks: DashMap::new(),
        })
    }

    pub fn proxy(&self) -> &Arc<ToolProxy> {
        &self.proxy
    }

    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.sessions
    }

    /// Load the session, run one turn, save the session. Turns of the
    /// same session run one at a time, so none overwrites another's rules.
    pub async fn handle_turn(&self, session_id: &str, message: &str, agent_profile: Option<&str>) -> TurnOutcome {
        let _turn = self.lock_session(session_id).await;
        let state = match self.sessions.get(session_id).await {
            Ok(state) => state,
            Err(e) => {
                warn!(session_id, error = %e, "Session load failed, starting fresh");
                SessionState::new(session_id)
            }
        };

        let request_id = uuid::Uuid::new_v4().to_string();
        let outcome = self.execute_turn(message, state, &request_id, agent_profile).await;

        if let Err(e) = self.sessions.set(&outcome.session_state, self.session_ttl).await {
            error!(session_id, request_id = %request_id, error = %e, "Session save failed");
        }
        outcome
    }

    /// Run the pipeline against a caller-held session state.
    ///
    /// Never fails: internal errors collapse to `Escalated` and hand back
    /// the state unchanged.
    pub async fn run_turn(
        &self,
        message: &str,
        state: SessionState,
        request_id: &str,
        agent_profile: Option<&str>,
    ) -> TurnOutcome {
        let _turn = self.lock_session(&state.session_id).await;
        self.execute_turn(message, state, request_id, agent_profile).await
    }

    async fn lock_session(&self, session_id: &str) -> TurnPermit<'_> {
        let lock = self
            .turn_locks
            .entry(session_id.to_string())
            .or_default()
            .clone();
        TurnPermit {
            locks: &self.turn_locks,
            session_id: session_id.to_string(),
            guard: Some(lock.lock_owned().await),
        }
    }

    async fn execute_turn(
        &self,
        message: &str,
        state: SessionState,
        request_id: &str,
        agent_profile: Option<&str>,
    ) -> TurnOutcome {
        // Captured once; a concurrent swap only affects later turns
        let backend = self.backend.read().await.clone();
        let agent = self.agent.read().await.clone();

        let result = self
            .pipeline(backend.as_ref(), agent.as_ref(), message, &state, request_id, agent_profile)
            .await;

        // Session rules live in the session store; the backend holds them for one turn
        if let Err(e) = backend.inject_rules(&state.session_id, &[]).await {
            warn!(session_id = %state.session_id, request_id, error = %e, "Rule release failed");
        }

        match result {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(
                    session_id = %state.session_id,
                    request_id,
                    error = %e,
                    "Turn escalated"
                );
                TurnOutcome {
                    message: ESCALATION_MESSAGE.to_string(),
                    status: TurnStatus::Escalated,
                    tool_call_ids: Vec::new(),
                    session_state: state,
                    request_id: request_id.to_string(),
                    new_rules: Vec::new(),
                    domains: Vec::new(),
                }
            }
        }
    }

    async fn pipeline(
        &self,
        backend: &dyn CheckingBackend,
        agent: &AgentRuntime,
        message: &str,
        state: &SessionState,
        request_id: &str,
        agent_profile: Option<&str>,
    ) -> Result<TurnOutcome> {
        let session_id = state.session_id.as_str();
        let mut ctx = CheckContext {
            session_id: session_id.to_string(),
            request_id: request_id.to_string(),
            agent_profile: agent_profile.map(str::to_string),
            user_message: None,
        };

        // Input is screened against this session's rules from earlier turns
        if !state.dynamic_rules.is_empty() {
            if let Err(e) = backend.inject_rules(session_id, &state.dynamic_rules).await {
                error!(session_id, request_id, error = %e, "Rule injection failed");
            }
        }

        debug!(session_id, request_id, stage = ?PipelineStage::CheckingInput, "Pipeline stage");
        let (input_check, turn_rules) = tokio::join!(backend.check_input(message, &ctx), async {
            match &self.rule_engine {
                Some(engine) => Some(engine.process_turn(message, state, &state.history).await),
                None => None,
            }
        });
        let input_check = input_check.context("input check failed")?;

        if input_check.blocked {
            warn!(
                session_id,
                request_id,
                backend = %backend.kind(),
                reason = ?input_check.reason,
                "Input blocked"
            );
            return Ok(TurnOutcome {
                message: input_check
                    .reason
                    .unwrap_or_else(|| INPUT_REFUSAL_MESSAGE.to_string()),
                status: TurnStatus::Refused,
                tool_call_ids: Vec::new(),
                session_state: state.clone(),
                request_id: request_id.to_string(),
                new_rules: Vec::new(),
                domains: Vec::new(),
            });
        }

        let TurnRules {
            new_rules,
            all_active_rules,
            domains,
            ..
        } = turn_rules.unwrap_or_default();
        let mut next_state = state.clone();
        if self.rule_engine.is_some() {
            if all_active_rules != state.dynamic_rules {
                if let Err(e) = backend.inject_rules(session_id, &all_active_rules).await {
                    error!(session_id, request_id, error = %e, "Rule injection failed");
                }
            }
            next_state.dynamic_rules = all_active_rules;
        }

        debug!(session_id, request_id, stage = ?PipelineStage::RunningAgent, "Pipeline stage");
        let reply = agent
            .run(message, &state.history, session_id, request_id, None)
            .await;
        let tool_call_ids = self.proxy.get_call_ids(session_id, request_id);

        debug!(session_id, request_id, stage = ?PipelineStage::CheckingOutput, "Pipeline stage");
        ctx.user_message = Some(message.to_string());
        let output_check = backend
            .check_output(&reply.message, &ctx)
            .await
            .context("output check failed")?;

        let (final_message, status) = if output_check.blocked {
            warn!(
                session_id,
                request_id,
                backend = %backend.kind(),
                reason = ?output_check.reason,
                "Output blocked"
            );
            (OUTPUT_REFUSAL_MESSAGE.to_string(), TurnStatus::Refused)
        } else {
            next_state.record_exchange(message, &reply.message);
            let status = match reply.status {
                AgentStatus::Success => TurnStatus::Ok,
                AgentStatus::Error => TurnStatus::Escalated,
            };
            (reply.message, status)
        };

        debug!(session_id, request_id, stage = ?PipelineStage::Done, status = ?status, "Pipeline stage");
        Ok(TurnOutcome {
            message: final_message,
            status,
            tool_call_ids,
            session_state: next_state,
            request_id: request_id.to_string(),
            new_rules,
            domains,
        })
    }

    /// Replace the checking backend. The new instance starts without
    /// injected rules; each session's next turn loads its stored rules
    /// before the input check.
    pub async fn switch_backend(&self, kind: BackendKind) -> Result<()> {
        let backend = create_backend(kind, &self.backend_deps);
        backend
            .initialize()
            .await
            .with_context(|| format!("Failed to initialize {} backend", kind))?;

        let previous = {
            let mut slot = self.backend.write().await;
            std::mem::replace(&mut *slot, backend).kind()
        };
        info!(from = %previous, to = %kind, "Guardrails backend switched");
        Ok(())
    }

    /// Replace the agent's model; tools and proxy state are kept.
    pub async fn switch_model(&self, provider: &str, model: &str) -> Result<()> {
        let llm = self
            .providers
            .build(provider, model)
            .with_context(|| format!("Failed to build {} provider for model '{}'", provider, model))?;
        let agent = AgentRuntime::new(self.agent_config.clone(), llm, self.proxy.clone())
            .with_temperature(self.temperature);

        *self.agent.write().await = Arc::new(agent);
        info!(provider, model, "Agent model switched");
        Ok(())
    }

    pub async fn backend_kind(&self) -> BackendKind {
        self.backend.read().await.kind()
    }

    pub async fn status(&self) -> OrchestratorStatus {
        let backend = self.backend.read().await.clone();
        let agent = self.agent.read().await.clone();
        OrchestratorStatus {
            guardrails_backend: backend.kind(),
            llm_provider: agent.provider_name().to_string(),
            llm_model: agent.model_name().to_string(),
            tools: self.proxy.registry().names(),
            dynamic_rules_enabled: self.rule_engine.is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamic_rules::DynamicRulesConfig;
    use crate::guardrails::GuardrailsResult;
    use crate::session::MemorySessionStore;
    use crate::test_support::ScriptedLLM;
    use crate::tool_proxy::{PolicyEngine, ToolProxyConfig, ToolRegistry};
    use anyhow::bail;
    use async_trait::async_trait;

    struct FixedFactory;

    impl ProviderFactory for FixedFactory {
        fn build(&self, provider: &str, _model: &str) -> Result<Arc<dyn LLMProvider>> {
            if provider != "scripted" {
                bail!("unsupported LLM provider '{}'", provider);
            }
            Ok(Arc::new(ScriptedLLM::text(&["from the new model"])))
        }
    }

    /// Blocks any input containing "forbidden" and any output containing "secret"
    struct PhraseBackend;

    #[async_trait]
    impl CheckingBackend for PhraseBackend {
        fn kind(&self) -> BackendKind {
            BackendKind::Judge
        }
        async fn initialize(&self) -> Result<()> {
            Ok(())
        }
        async fn check_input(&self, message: &str, _ctx: &CheckContext) -> Result<GuardrailsResult> {
            Ok(if message.contains("forbidden") {
                GuardrailsResult::block("Blocked by rule [phrase]: forbidden")
            } else {
                GuardrailsResult::pass()
            })
        }
        async fn check_output(&self, message: &str, _ctx: &CheckContext) -> Result<GuardrailsResult> {
            Ok(if message.contains("secret") {
                GuardrailsResult::block("leak")
            } else {
                GuardrailsResult::pass()
            })
        }
        async fn inject_rules(&self, _session_id: &str, _rules: &[DynamicRule]) -> Result<()> {
            Ok(())
        }
    }

    async fn orchestrator(agent: Arc<ScriptedLLM>, classifier: Arc<ScriptedLLM>) -> GuardrailsOrchestrator {
        let proxy = Arc::new(ToolProxy::new(
            Arc::new(ToolRegistry::new()),
            Arc::new(PolicyEngine::default()),
            &ToolProxyConfig::default(),
        ));
        GuardrailsOrchestrator::new(OrchestratorParts {
            backend_kind: BackendKind::None,
            backend_deps: BackendDeps::default(),
            rule_engine: Some(Arc::new(DynamicRuleEngine::new(
                Some(classifier),
                &DynamicRulesConfig::default(),
            ))),
            proxy,
            agent_provider: agent,
            providers: Arc::new(FixedFactory),
            agent_config: AgentConfig::default(),
            temperature: 0.0,
            sessions: Arc::new(MemorySessionStore::new()),
            session_ttl: Duration::from_secs(60),
        })
        .await
        .unwrap()
    }

    async fn install(orch: &GuardrailsOrchestrator, backend: Arc<dyn CheckingBackend>) {
        *orch.backend.write().await = backend;
    }

    const MEDICAL: &str = r#"{"domains": ["medical"], "risks": [], "suggested_rules": [], "reasoning": "health"}"#;
    const FINANCIAL: &str = r#"{"domains": ["financial"], "risks": [], "suggested_rules": [], "reasoning": "money"}"#;

    #[tokio::test]
    async fn test_ok_turn_persists_rules_and_history() {
        let agent = Arc::new(ScriptedLLM::text(&["Rest and fluids."]));
        let orch = orchestrator(agent, Arc::new(ScriptedLLM::text(&[MEDICAL]))).await;

        let outcome = orch.handle_turn("s1", "I have a cold", None).await;
        assert_eq!(outcome.status, TurnStatus::Ok);
        assert_eq!(outcome.message, "Rest and fluids.");
        assert_eq!(outcome.domains, vec!["medical".to_string()]);
        assert!(!outcome.new_rules.is_empty());
        assert_eq!(outcome.session_state.history.len(), 2);

        let stored = orch.sessions().get("s1").await.unwrap();
        assert_eq!(stored, outcome.session_state);
    }

    #[tokio::test]
    async fn test_blocked_input_skips_agent_and_discards_rules() {
        let agent = Arc::new(ScriptedLLM::text(&["never"]));
        let orch = orchestrator(agent.clone(), Arc::new(ScriptedLLM::text(&[MEDICAL]))).await;
        install(&orch, Arc::new(PhraseBackend)).await;

        let outcome = orch
            .run_turn("forbidden medical question", SessionState::new("s1"), "r1", None)
            .await;
        assert_eq!(outcome.status, TurnStatus::Refused);
        assert!(outcome.message.contains("Blocked by rule"));
        assert!(outcome.tool_call_ids.is_empty());
        assert!(outcome.session_state.dynamic_rules.is_empty());
        assert_eq!(agent.calls(), 0);
    }

    #[tokio::test]
    async fn test_blocked_output_keeps_rules() {
        let agent = Arc::new(ScriptedLLM::text(&["the secret dose is"]));
        let orch = orchestrator(agent, Arc::new(ScriptedLLM::text(&[MEDICAL]))).await;
        install(&orch, Arc::new(PhraseBackend)).await;

        let outcome = orch
            .run_turn("what dose?", SessionState::new("s1"), "r1", None)
            .await;
        assert_eq!(outcome.status, TurnStatus::Refused);
        assert_eq!(outcome.message, OUTPUT_REFUSAL_MESSAGE);
        assert!(!outcome.session_state.dynamic_rules.is_empty());
        assert!(outcome.session_state.history.is_empty());
    }

    #[tokio::test]
    async fn test_classifier_failure_does_not_block() {
        let agent = Arc::new(ScriptedLLM::text(&["hello"]));
        let orch = orchestrator(agent, Arc::new(ScriptedLLM::text(&["not json"]))).await;

        let outcome = orch.run_turn("hi", SessionState::new("s1"), "r1", None).await;
        assert_eq!(outcome.status, TurnStatus::Ok);
        assert!(outcome.session_state.dynamic_rules.is_empty());
    }

    #[tokio::test]
    async fn test_agent_error_escalates() {
        let orch = orchestrator(
            Arc::new(ScriptedLLM::new(vec![])),
            Arc::new(ScriptedLLM::text(&[MEDICAL])),
        )
        .await;
        let outcome = orch.run_turn("hi", SessionState::new("s1"), "r1", None).await;
        assert_eq!(outcome.status, TurnStatus::Escalated);
    }

    #[tokio::test]
    async fn test_switch_backend_and_model() {
        let orch = orchestrator(
            Arc::new(ScriptedLLM::text(&["old"])),
            Arc::new(ScriptedLLM::text(&[MEDICAL, MEDICAL])),
        )
        .await;

        orch.switch_backend(BackendKind::Judge).await.unwrap();
        assert_eq!(orch.backend_kind().await, BackendKind::Judge);

        assert!(orch.switch_model("nope", "m").await.is_err());
        orch.switch_model("scripted", "m").await.unwrap();

        let outcome = orch.run_turn("hi", SessionState::new("s1"), "r1", None).await;
        assert_eq!(outcome.message, "from the new model");
        assert_eq!(orch.status().await.llm_model, "scripted");
    }

    #[tokio::test]
    async fn test_concurrent_turns_of_one_session_keep_all_rules() {
        let agent = Arc::new(ScriptedLLM::text(&["one", "two"]));
        let classifier = Arc::new(ScriptedLLM::text(&[MEDICAL, FINANCIAL]));
        let orch = orchestrator(agent, classifier).await;

        let (a, b) = tokio::join!(
            orch.handle_turn("s1", "first question", None),
            orch.handle_turn("s1", "second question", None)
        );
        assert_eq!(a.status, TurnStatus::Ok);
        assert_eq!(b.status, TurnStatus::Ok);

        let stored = orch.sessions().get("s1").await.unwrap();
        let domains: Vec<&str> = stored.dynamic_rules.iter().map(|r| r.domain.as_str()).collect();
        assert!(domains.contains(&"medical"));
        assert!(domains.contains(&"financial"));
        assert_eq!(stored.history.len(), 4);
        assert!(orch.turn_locks.is_empty());
    }

    /// Records what the orchestrator injects, per session
    #[derive(Default)]
    struct RecordingBackend {
        injected: std::sync::Mutex<Vec<(String, usize)>>,
    }

    #[async_trait]
    impl CheckingBackend for RecordingBackend {
        fn kind(&self) -> BackendKind {
            BackendKind::Judge
        }
        async fn initialize(&self) -> Result<()> {
            Ok(())
        }
        async fn check_input(&self, _message: &str, _ctx: &CheckContext) -> Result<GuardrailsResult> {
            Ok(GuardrailsResult::pass())
        }
        async fn check_output(&self, _message: &str, _ctx: &CheckContext) -> Result<GuardrailsResult> {
            Ok(GuardrailsResult::pass())
        }
        async fn inject_rules(&self, session_id: &str, rules: &[DynamicRule]) -> Result<()> {
            self.injected
                .lock()
                .unwrap()
                .push((session_id.to_string(), rules.len()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_stored_rules_loaded_before_input_and_released_after() {
        let agent = Arc::new(ScriptedLLM::text(&["one", "two"]));
        let classifier = Arc::new(ScriptedLLM::text(&[MEDICAL, MEDICAL]));
        let orch = orchestrator(agent, classifier).await;
        let backend = Arc::new(RecordingBackend::default());
        install(&orch, backend.clone()).await;

        let first = orch.handle_turn("s1", "I have a cold", None).await;
        let count = first.session_state.dynamic_rules.len();
        assert!(count > 0);
        orch.handle_turn("s1", "still coughing", None).await;

        let injected = backend.injected.lock().unwrap().clone();
        let s1 = |n: usize| ("s1".to_string(), n);
        // Turn one: new rules, release. Turn two: stored rules, no change, release.
        assert_eq!(injected, vec![s1(count), s1(0), s1(count), s1(0)]);
    }
}
