//! Bounded tool-calling agent loop. Every tool call goes through the proxy.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::llm::provider::LLMProvider;
use crate::llm::types::*;
use crate::session::HistoryEntry;
use crate::tool_proxy::ToolProxy;

/// Returned when the loop hits `max_iterations` without a final answer
pub const ITERATION_LIMIT_MESSAGE: &str =
    "I reached the processing limit for this request. Please try rephrasing or narrowing the question.";
/// Returned when the model call fails
pub const AGENT_ERROR_MESSAGE: &str = "Sorry, I ran into a problem while working on your request.";

/// `[agent]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// System prompt for LLM
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    /// Max model round-trips per user turn
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// Max tokens for LLM response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Tool names to expose to LLM (empty = all registered)
    #[serde(default)]
    pub tools: Vec<String>,
    /// Directory file tools are confined to
    #[serde(default = "default_workspace")]
    pub workspace: String,
}

fn default_system_prompt() -> String {
    "You are a helpful assistant. Use the available tools when they help answer the question. \
     When you rely on a tool result, say which tool produced it."
        .to_string()
}

fn default_max_iterations() -> usize {
    10
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_workspace() -> String {
    "./workspace".to_string()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            max_iterations: default_max_iterations(),
            max_tokens: default_max_tokens(),
            tools: Vec::new(),
            workspace: default_workspace(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentReply {
    pub message: String,
    pub status: AgentStatus,
    /// Tokens spent across every model call of the turn
    pub usage: Usage,
}

/// Prompt → model → proxied tool calls → observe → repeat
pub struct AgentRuntime {
    config: AgentConfig,
    provider: Arc<dyn LLMProvider>,
    proxy: Arc<ToolProxy>,
    temperature: f32,
}

impl AgentRuntime {
    pub fn new(config: AgentConfig, provider: Arc<dyn LLMProvider>, proxy: Arc<ToolProxy>) -> Self {
        Self {
            config,
            provider,
            proxy,
            temperature: 0.0,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn provider_name(&self) -> &str {
        self.provider.provider_name()
    }

    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    /// Run one user turn. Model failures become an error reply, never a panic or `Err`.
    pub async fn run(
        &self,
        user_message: &str,
        history: &[HistoryEntry],
        session_id: &str,
        request_id: &str,
        context: Option<&Value>,
    ) -> AgentReply {
        let mut usage = Usage::default();
        let result = self
            .run_loop(user_message, history, session_id, request_id, context, &mut usage)
            .await;
        info!(
            session_id,
            request_id,
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            "Agent turn finished"
        );

        match result {
            Ok(message) => AgentReply {
                message,
                status: AgentStatus::Success,
                usage,
            },
            Err(e) => {
                warn!(session_id, request_id, error = %e, "Agent run failed");
                AgentReply {
                    message: AGENT_ERROR_MESSAGE.to_string(),
                    status: AgentStatus::Error,
                    usage,
                }
            }
        }
    }

    async fn run_loop(
        &self,
        user_message: &str,
        history: &[HistoryEntry],
        session_id: &str,
        request_id: &str,
        context: Option<&Value>,
        usage: &mut Usage,
    ) -> Result<String> {
        let mut messages: Vec<Message> = history
            .iter()
            .filter_map(|h| match h.role.as_str() {
                "user" => Some(Message::user(&h.content)),
                "assistant" => Some(Message::assistant(Content::text(&h.content))),
                _ => None,
            })
            .collect();
        messages.push(Message::user(user_message));

        let gen_config = GenerateConfig {
            model: String::new(),
            max_tokens: self.config.max_tokens,
            temperature: self.temperature,
            system_prompt: Some(self.config.system_prompt.clone()),
        };
        let tools = self.available_tool_schemas();

        for iteration in 0..self.config.max_iterations {
            let response = self.provider.generate(&messages, &tools, &gen_config).await?;

            info!(
                session_id,
                request_id,
                iteration,
                model = %response.model,
                stop_reason = ?response.stop_reason,
                input_tokens = response.usage.input_tokens,
                output_tokens = response.usage.output_tokens,
                "LLM response received"
            );
            *usage += response.usage.clone();

            let calls = response.content.extract_tool_calls();
            if calls.is_empty() {
                let text = response.content.extract_text();
                if response.stop_reason == StopReason::MaxTokens && text.is_empty() {
                    return Err(anyhow!("max_tokens reached before any answer"));
                }
                return Ok(text);
            }

            let mut results = Vec::with_capacity(calls.len());
            for call in calls {
                let outcome = self
                    .proxy
                    .call(&call.name, call.input.clone(), session_id, request_id, context)
                    .await;
                let (output, is_error) = match (outcome.result, outcome.error) {
                    (Some(value), _) => (value.to_string(), false),
                    (None, error) => (format!("Error: {}", error.unwrap_or_default()), true),
                };
                results.push(Message::tool_result(&call.id, &output, is_error));
            }

            messages.push(Message::assistant(response.content.clone()));
            messages.extend(results);
        }

        warn!(
            session_id,
            request_id,
            max = self.config.max_iterations,
            "Max iterations reached, stopping agent loop"
        );
        Ok(ITERATION_LIMIT_MESSAGE.to_string())
    }

    fn available_tool_schemas(&self) -> Vec<ToolSchema> {
        let schemas = self.proxy.registry().schemas();
        if self.config.tools.is_empty() {
            schemas
        } else {
            schemas
                .into_iter()
                .filter(|s| self.config.tools.contains(&s.name))
                .collect()
        }
    }
}
