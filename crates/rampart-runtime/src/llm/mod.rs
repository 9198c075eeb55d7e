pub mod anthropic;
pub mod factory;
pub mod openai;
pub mod provider;
pub mod structured;
pub mod types;

pub use anthropic::AnthropicClient;
pub use factory::{build_provider, ConfiguredProviders, LlmConfig, ProviderFactory, ProviderKind};
pub use openai::OpenAIClient;
pub use provider::LLMProvider;
pub use types::{
    Content, GenerateConfig, GenerateResponse, Message, Role, StopReason, ToolCall, ToolResult,
    ToolSchema, Usage,
};
