use anyhow::{Context, Result};
use rampart_runtime::llm::LlmConfig;
use rampart_runtime::{AgentConfig, BackendKind, DynamicRulesConfig, ToolProxyConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Looked up in the working directory when `--config` is not given
pub const DEFAULT_CONFIG_FILE: &str = "gatekeeper.toml";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub tool_proxy: ToolProxyConfig,

    #[serde(default)]
    pub guardrails: GuardrailsConfig,

    #[serde(default)]
    pub dynamic_rules: DynamicRulesConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub agent: AgentConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct GuardrailsConfig {
    #[serde(default)]
    pub backend: BackendKind,

    /// Base flow document for the flow backend; built-in rails when unset
    #[serde(default)]
    pub flow_document: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStoreKind {
    #[default]
    Memory,
    Redb,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub store: SessionStoreKind,

    #[serde(default = "default_session_path")]
    pub path: String,

    #[serde(default = "default_ttl")]
    pub ttl_secs: u64,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// CORS origins; empty allows any
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

fn default_session_path() -> String {
    "~/.gatekeeper/sessions.redb".to_string()
}

fn default_ttl() -> u64 {
    3600
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            store: SessionStoreKind::default(),
            path: default_session_path(),
            ttl_secs: default_ttl(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            allowed_origins: Vec::new(),
        }
    }
}

/// Expand `~` in a configured path
pub fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).as_ref())
}

/// Load config from file, `./gatekeeper.toml`, or use defaults
pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let local = PathBuf::from(DEFAULT_CONFIG_FILE);
            if !local.exists() {
                return Ok(AppConfig::default());
            }
            local
        }
    };

    let content = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;
    let config: AppConfig = toml::from_str(&content).context("Failed to parse TOML config")?;
    Ok(config)
}
