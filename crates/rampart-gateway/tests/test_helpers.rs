//! Shared test helpers: mock LLM provider, test AppState factory.
#![allow(dead_code)] // helpers used across multiple test crates

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use rampart_runtime::llm::ProviderFactory;
use rampart_runtime::{
    AgentConfig, BackendDeps, BackendKind, Content, GenerateConfig, GenerateResponse,
    GuardrailsOrchestrator, LLMProvider, MemorySessionStore, Message, OrchestratorParts,
    PolicyEngine, StopReason, ToolCall, ToolProxy, ToolProxyConfig, ToolRegistry, ToolSchema,
    Usage,
};
use serde_json::{json, Value};

use rampart_gateway::{create_router, AppState};

/// Mock LLM provider that returns canned responses (no network).
/// Asks for the `echo` tool once when the user says "use the tool".
pub struct MockLLMProvider {
    model: String,
}

impl MockLLMProvider {
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl LLMProvider for MockLLMProvider {
    async fn generate(
        &self,
        messages: &[Message],
        _tools: &[ToolSchema],
        _config: &GenerateConfig,
    ) -> Result<GenerateResponse> {
        let last = messages.last().map(|m| m.content.clone());
        let content = match last {
            Some(Content::Text { text }) if text.contains("use the tool") => {
                Content::ToolCall(ToolCall {
                    id: "call-1".into(),
                    name: "echo".into(),
                    input: json!({"text": "ping"}),
                })
            }
            _ => Content::text("mock response"),
        };
        let stop_reason = match content {
            Content::ToolCall(_) => StopReason::ToolUse,
            _ => StopReason::EndTurn,
        };
        Ok(GenerateResponse {
            content,
            stop_reason,
            usage: Usage {
                input_tokens: 10,
                output_tokens: 5,
            },
            model: self.model.clone(),
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn provider_name(&self) -> &str {
        "mock"
    }
}

struct MockFactory;

impl ProviderFactory for MockFactory {
    fn build(&self, provider: &str, model: &str) -> Result<Arc<dyn LLMProvider>> {
        if provider != "mock" {
            bail!("unsupported LLM provider '{}'", provider);
        }
        Ok(Arc::new(MockLLMProvider::new(model)))
    }
}

struct EchoTool;

#[async_trait]
impl rampart_runtime::Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo text"
    }

    fn parameters(&self) -> Value {
        json!({"type": "object", "properties": {"text": {"type": "string"}}, "required": ["text"]})
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        Ok(input)
    }
}

/// Build a test AppState over an in-memory orchestrator with the flow backend.
pub async fn make_test_state() -> AppState {
    let registry = Arc::new(ToolRegistry::new());
    registry.register(Arc::new(EchoTool)).unwrap();
    let proxy = Arc::new(ToolProxy::new(
        registry,
        Arc::new(PolicyEngine::default()),
        &ToolProxyConfig::default(),
    ));

    let orchestrator = GuardrailsOrchestrator::new(OrchestratorParts {
        backend_kind: BackendKind::Flow,
        backend_deps: BackendDeps::default(),
        rule_engine: None,
        proxy,
        agent_provider: Arc::new(MockLLMProvider::new("mock-1")),
        providers: Arc::new(MockFactory),
        agent_config: AgentConfig::default(),
        temperature: 0.0,
        sessions: Arc::new(MemorySessionStore::new()),
        session_ttl: Duration::from_secs(60),
    })
    .await
    .unwrap();

    AppState {
        orchestrator: Arc::new(orchestrator),
        allowed_origins: vec![],
    }
}

/// Send one request through the router, return (status, parsed JSON body).
pub async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let req = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let resp = tower::ServiceExt::oneshot(app.clone(), req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

pub async fn test_app() -> Router {
    create_router(make_test_state().await)
}
