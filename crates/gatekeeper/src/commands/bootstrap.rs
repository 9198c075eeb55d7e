//! Assemble the runtime from configuration.

use anyhow::{Context, Result};
use rampart_runtime::flow::DEFAULT_FLOW_DOCUMENT;
use rampart_runtime::llm::ConfiguredProviders;
use rampart_runtime::{
    BackendDeps, DynamicRuleEngine, GuardrailsOrchestrator, MemorySessionStore,
    OrchestratorParts, PolicyEngine, RedbSessionStore, SessionStore, ToolProxy, ToolRegistry,
};
use rampart_tools::register_default_tools;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::{expand_path, AppConfig, SessionStoreKind};

/// Registry with the built-in tools behind the configured policy
pub fn build_tool_proxy(config: &AppConfig) -> Result<Arc<ToolProxy>> {
    let registry = Arc::new(ToolRegistry::new());
    register_default_tools(&registry, expand_path(&config.agent.workspace))
        .context("Failed to register built-in tools")?;
    let policy = Arc::new(PolicyEngine::from_config(&config.tool_proxy));
    Ok(Arc::new(ToolProxy::new(registry, policy, &config.tool_proxy)))
}

fn build_session_store(config: &AppConfig) -> Result<Arc<dyn SessionStore>> {
    match config.session.store {
        SessionStoreKind::Memory => Ok(Arc::new(MemorySessionStore::new())),
        SessionStoreKind::Redb => {
            let path = expand_path(&config.session.path);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create session directory {:?}", parent))?;
            }
            info!(path = %path.display(), "Using redb session store");
            Ok(Arc::new(RedbSessionStore::open(&path)?))
        }
    }
}

fn load_flow_document(config: &AppConfig) -> Result<String> {
    match &config.guardrails.flow_document {
        Some(path) => {
            let path = expand_path(path);
            std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read flow document {:?}", path))
        }
        None => Ok(DEFAULT_FLOW_DOCUMENT.to_string()),
    }
}

pub async fn build_orchestrator(config: &AppConfig) -> Result<Arc<GuardrailsOrchestrator>> {
    let proxy = build_tool_proxy(config)?;

    let providers = Arc::new(ConfiguredProviders::new(config.llm.clone()));
    let agent_provider = providers
        .agent_provider()
        .context("Failed to build agent LLM provider")?;
    let classifier = providers
        .classifier_provider()
        .context("Failed to build classifier LLM provider")?;

    let rule_engine = config
        .dynamic_rules
        .enabled
        .then(|| Arc::new(DynamicRuleEngine::new(Some(classifier.clone()), &config.dynamic_rules)));

    let orchestrator = GuardrailsOrchestrator::new(OrchestratorParts {
        backend_kind: config.guardrails.backend,
        backend_deps: BackendDeps {
            judge_provider: Some(classifier),
            flow_document: load_flow_document(config)?,
        },
        rule_engine,
        proxy,
        agent_provider,
        providers,
        agent_config: config.agent.clone(),
        temperature: config.llm.temperature,
        sessions: build_session_store(config)?,
        session_ttl: Duration::from_secs(config.session.ttl_secs),
    })
    .await?;

    Ok(Arc::new(orchestrator))
}
