use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Message role in conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Content within a message: text, tool call, or tool result
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Content {
    Text {
        text: String,
    },
    ToolCall(ToolCall),
    ToolResult(ToolResult),
    /// Assistant turns can carry text and tool calls together
    Mixed {
        parts: Vec<Content>,
    },
}

/// Tool invocation requested by the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub input: Value,
}

/// Proxied tool outcome fed back to the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_use_id: String,
    pub output: String,
    pub is_error: bool,
}

/// Conversation message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Content,
}

impl Message {
    pub fn user(text: &str) -> Self {
        Self {
            role: Role::User,
            content: Content::text(text),
        }
    }

    pub fn assistant(content: Content) -> Self {
        Self {
            role: Role::Assistant,
            content,
        }
    }

    pub fn tool_result(tool_use_id: &str, output: &str, is_error: bool) -> Self {
        Self {
            role: Role::User,
            content: Content::ToolResult(ToolResult {
                tool_use_id: tool_use_id.to_string(),
                output: output.to_string(),
                is_error,
            }),
        }
    }
}

/// Tool schema for LLM function calling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON Schema for tool parameters
    pub input_schema: Value,
}

/// Why the model stopped generating
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
}

/// Token usage info
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl std::ops::AddAssign for Usage {
    fn add_assign(&mut self, rhs: Self) {
        self.input_tokens += rhs.input_tokens;
        self.output_tokens += rhs.output_tokens;
    }
}

/// LLM generation response
#[derive(Debug, Clone)]
pub struct GenerateResponse {
    pub content: Content,
    pub stop_reason: StopReason,
    pub usage: Usage,
    pub model: String,
}

/// Config for LLM generation request
#[derive(Debug, Clone)]
pub struct GenerateConfig {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub system_prompt: Option<String>,
}

impl GenerateConfig {
    /// Deterministic settings used by the judge and classifier calls
    pub fn deterministic(max_tokens: u32) -> Self {
        Self {
            max_tokens,
            temperature: 0.0,
            ..Default::default()
        }
    }
}

impl Default for GenerateConfig {
    fn default() -> Self {
        Self {
            model: String::new(),
            max_tokens: 4096,
            temperature: 0.7,
            system_prompt: None,
        }
    }
}

impl Content {
    pub fn text(text: &str) -> Self {
        Content::Text {
            text: text.to_string(),
        }
    }

    /// Collapse parsed parts into the narrowest variant
    pub fn from_parts(mut parts: Vec<Content>) -> Self {
        match parts.len() {
            0 => Content::text(""),
            1 => parts.remove(0),
            _ => Content::Mixed { parts },
        }
    }

    /// Extract all tool calls from content
    pub fn extract_tool_calls(&self) -> Vec<&ToolCall> {
        match self {
            Content::ToolCall(tc) => vec![tc],
            Content::Mixed { parts } => parts
                .iter()
                .filter_map(|p| match p {
                    Content::ToolCall(tc) => Some(tc),
                    _ => None,
                })
                .collect(),
            _ => vec![],
        }
    }

    /// Extract text from content
    pub fn extract_text(&self) -> String {
        match self {
            Content::Text { text } => text.clone(),
            Content::Mixed { parts } => parts
                .iter()
                .filter_map(|p| match p {
                    Content::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join(""),
            _ => String::new(),
        }
    }
}
