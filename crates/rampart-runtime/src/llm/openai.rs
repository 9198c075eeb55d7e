use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use super::provider::LLMProvider;
use super::types::*;

pub const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Chat Completions client. Also talks to Ollama and vLLM, which expose
/// the same wire format.
pub struct OpenAIClient {
    client: Client,
    /// Local servers run without a key
    api_key: Option<String>,
    model: String,
    base_url: Option<String>,
    label: String,
}

impl OpenAIClient {
    pub fn new(api_key: Option<&str>) -> Result<Self> {
        let client = ClientBuilder::new()
            .timeout(Duration::from_secs(120))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            api_key: api_key.map(str::to_string),
            model: DEFAULT_MODEL.to_string(),
            base_url: None,
            label: "openai".to_string(),
        })
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = Some(url.to_string());
        self
    }

    /// Provider label reported by `provider_name`
    pub fn with_label(mut self, label: &str) -> Self {
        self.label = label.to_string();
        self
    }

    fn api_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(OPENAI_API_URL)
    }

    fn build_request_body(
        &self,
        messages: &[Message],
        tools: &[ToolSchema],
        config: &GenerateConfig,
    ) -> Value {
        let model = if config.model.is_empty() {
            &self.model
        } else {
            &config.model
        };

        let mut body = json!({
            "model": model,
            "max_tokens": config.max_tokens,
            "temperature": config.temperature,
            "messages": self.build_messages(messages, config),
        });

        if !tools.is_empty() {
            let api_tools: Vec<Value> = tools.iter().map(tool_to_api).collect();
            body["tools"] = json!(api_tools);
        }

        body
    }

    /// System prompt first, then the conversation
    fn build_messages(&self, messages: &[Message], config: &GenerateConfig) -> Vec<Value> {
        let mut api_msgs = Vec::new();

        if let Some(ref sys) = config.system_prompt {
            api_msgs.push(json!({"role": "system", "content": sys}));
        }

        for msg in messages {
            match (&msg.role, &msg.content) {
                (Role::System, Content::Text { text }) => {
                    api_msgs.push(json!({"role": "system", "content": text}));
                }
                (Role::User, Content::Text { text }) => {
                    api_msgs.push(json!({"role": "user", "content": text}));
                }
                (Role::User, Content::ToolResult(tr)) => {
                    api_msgs.push(json!({
                        "role": "tool",
                        "tool_call_id": tr.tool_use_id,
                        "content": tr.output,
                    }));
                }
                (Role::Assistant, content) => {
                    let text = content.extract_text();
                    let calls: Vec<Value> = content
                        .extract_tool_calls()
                        .into_iter()
                        .map(|tc| {
                            json!({
                                "id": tc.id,
                                "type": "function",
                                "function": {
                                    "name": tc.name,
                                    "arguments": tc.input.to_string(),
                                }
                            })
                        })
                        .collect();

                    let mut msg_json = json!({"role": "assistant"});
                    if !text.is_empty() || calls.is_empty() {
                        msg_json["content"] = json!(text);
                    }
                    if !calls.is_empty() {
                        msg_json["tool_calls"] = json!(calls);
                    }
                    api_msgs.push(msg_json);
                }
                _ => {}
            }
        }

        api_msgs
    }

    fn parse_response(&self, body: ApiResponse) -> Result<GenerateResponse> {
        let choice = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("No choices in chat completion response"))?;

        let mut parts = Vec::new();

        if let Some(text) = choice.message.content {
            if !text.is_empty() {
                parts.push(Content::Text { text });
            }
        }

        for tc in choice.message.tool_calls.unwrap_or_default() {
            // Models occasionally emit malformed argument JSON; validation rejects it later
            let input: Value = serde_json::from_str(&tc.function.arguments).unwrap_or(Value::Null);
            parts.push(Content::ToolCall(ToolCall {
                id: tc.id,
                name: tc.function.name,
                input,
            }));
        }

        let stop_reason = match choice.finish_reason.as_deref() {
            Some("tool_calls") => StopReason::ToolUse,
            Some("length") => StopReason::MaxTokens,
            _ => StopReason::EndTurn,
        };

        let usage = body
            .usage
            .map(|u| Usage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        Ok(GenerateResponse {
            content: Content::from_parts(parts),
            stop_reason,
            usage,
            model: body.model,
        })
    }
}

fn tool_to_api(tool: &ToolSchema) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.input_schema,
        }
    })
}

#[async_trait]
impl LLMProvider for OpenAIClient {
    async fn generate(
        &self,
        messages: &[Message],
        tools: &[ToolSchema],
        config: &GenerateConfig,
    ) -> Result<GenerateResponse> {
        let body = self.build_request_body(messages, tools, config);

        let mut request = self
            .client
            .post(self.api_url())
            .header("Content-Type", "application/json")
            .json(&body);
        if let Some(ref key) = self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(anyhow!("{} API error ({}): {}", self.label, status, error_body));
        }

        let api_response: ApiResponse = response.json().await?;
        self.parse_response(api_response)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn provider_name(&self) -> &str {
        &self.label
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    model: String,
    choices: Vec<Choice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ApiMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    content: Option<String>,
    tool_calls: Option<Vec<ApiToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ApiToolCall {
    id: String,
    function: ApiFunction,
}

#[derive(Debug, Deserialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}
