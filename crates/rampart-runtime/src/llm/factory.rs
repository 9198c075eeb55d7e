//! Provider construction from configuration.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use super::anthropic::AnthropicClient;
use super::openai::OpenAIClient;
use super::provider::LLMProvider;

const OLLAMA_API_URL: &str = "http://localhost:11434/v1/chat/completions";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAI,
    Anthropic,
    Ollama,
    Vllm,
}

impl FromStr for ProviderKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "anthropic" => Ok(Self::Anthropic),
            "ollama" => Ok(Self::Ollama),
            "vllm" => Ok(Self::Vllm),
            other => bail!("unsupported LLM provider '{}'", other),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::OpenAI => "openai",
            Self::Anthropic => "anthropic",
            Self::Ollama => "ollama",
            Self::Vllm => "vllm",
        };
        f.write_str(name)
    }
}

/// `[llm]` section
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Model the agent runs on
    #[serde(default = "default_model")]
    pub model: String,

    /// Model used by the rule classifier, judge and flow intent checks
    #[serde(default = "default_model")]
    pub classifier_model: String,

    /// Sampling temperature for the agent model
    #[serde(default)]
    pub temperature: f32,

    /// Falls back to OPENAI_API_KEY / ANTHROPIC_API_KEY, then LLM_API_KEY
    #[serde(default)]
    pub api_key: String,

    /// Endpoint for ollama / vllm / self-hosted OpenAI-compatible servers
    #[serde(default)]
    pub base_url: String,
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            classifier_model: default_model(),
            temperature: 0.0,
            api_key: String::new(),
            base_url: String::new(),
        }
    }
}

fn key_or_env(configured: &str, env: &str) -> Option<String> {
    if !configured.is_empty() {
        return Some(configured.to_string());
    }
    [env, "LLM_API_KEY"]
        .iter()
        .find_map(|name| std::env::var(name).ok().filter(|k| !k.is_empty()))
}

/// Build one provider client for `kind` running `model`
pub fn build_provider(config: &LlmConfig, kind: ProviderKind, model: &str) -> Result<Arc<dyn LLMProvider>> {
    let base_url = (!config.base_url.is_empty()).then(|| config.base_url.clone());

    let provider: Arc<dyn LLMProvider> = match kind {
        ProviderKind::OpenAI => {
            let key = key_or_env(&config.api_key, "OPENAI_API_KEY")
                .context("OpenAI provider requires api_key or OPENAI_API_KEY")?;
            let mut client = OpenAIClient::new(Some(&key))?.with_model(model);
            if let Some(url) = &base_url {
                client = client.with_base_url(url);
            }
            Arc::new(client)
        }
        ProviderKind::Anthropic => {
            let key = key_or_env(&config.api_key, "ANTHROPIC_API_KEY")
                .context("Anthropic provider requires api_key or ANTHROPIC_API_KEY")?;
            Arc::new(AnthropicClient::new(&key)?.with_model(model))
        }
        ProviderKind::Ollama => {
            let url = base_url.as_deref().unwrap_or(OLLAMA_API_URL);
            Arc::new(
                OpenAIClient::new(None)?
                    .with_model(model)
                    .with_base_url(url)
                    .with_label("ollama"),
            )
        }
        ProviderKind::Vllm => {
            let url = base_url
                .or_else(|| std::env::var("VLLM_BASE_URL").ok())
                .context("vllm provider requires base_url or VLLM_BASE_URL")?;
            let key = key_or_env(&config.api_key, "VLLM_API_KEY");
            Arc::new(
                OpenAIClient::new(key.as_deref())?
                    .with_model(model)
                    .with_base_url(&url)
                    .with_label("vllm"),
            )
        }
    };

    tracing::info!(provider = %kind, model, "LLM provider ready");
    Ok(provider)
}

/// Builds providers on demand, used for runtime model switches.
pub trait ProviderFactory: Send + Sync {
    fn build(&self, provider: &str, model: &str) -> Result<Arc<dyn LLMProvider>>;
}

/// Factory backed by the `[llm]` configuration section
pub struct ConfiguredProviders {
    config: LlmConfig,
}

impl ConfiguredProviders {
    pub fn new(config: LlmConfig) -> Self {
        Self { config }
    }

    /// The agent model named in config
    pub fn agent_provider(&self) -> Result<Arc<dyn LLMProvider>> {
        self.build(&self.config.provider, &self.config.model)
    }

    /// The classifier model on the configured provider
    pub fn classifier_provider(&self) -> Result<Arc<dyn LLMProvider>> {
        self.build(&self.config.provider, &self.config.classifier_model)
    }
}

impl ProviderFactory for ConfiguredProviders {
    fn build(&self, provider: &str, model: &str) -> Result<Arc<dyn LLMProvider>> {
        let kind: ProviderKind = provider.parse()?;
        if model.trim().is_empty() {
            bail!("model name must not be empty");
        }
        build_provider(&self.config, kind, model)
    }
}
