use anyhow::{bail, Context, Result};
use std::path::Path;

const DEFAULT_CONFIG: &str = r#"# Gatekeeper configuration

[tool_proxy]
max_calls_per_request = 10
rate_limit_per_min = 30
# Identical calls (same tool, same arguments) allowed per session
loop_breaker_threshold = 3
timeout_secs = 15
# Non-empty allowlist: only these tools may run
allowlist = []
# Denylist always wins
denylist = ["execute_system_command", "delete_database", "unrestricted_http_request"]
default_allow = true

[guardrails]
# flow | judge | none
backend = "judge"
# flow_document = "./rails.flow"

[dynamic_rules]
enabled = true
max_rules_per_session = 50
history_window = 5

[llm]
# openai | anthropic | ollama | vllm
provider = "openai"
model = "gpt-4o-mini"
classifier_model = "gpt-4o-mini"
temperature = 0.0
# Falls back to OPENAI_API_KEY / ANTHROPIC_API_KEY / LLM_API_KEY
api_key = ""
base_url = ""

[session]
# memory | redb
store = "memory"
path = "~/.gatekeeper/sessions.redb"
ttl_secs = 3600

[agent]
max_iterations = 10
workspace = "./workspace"

[server]
host = "127.0.0.1"
port = 8080
"#;

/// Initialize a new config file
pub fn run_init(path: &Path) -> Result<()> {
    if path.exists() {
        bail!("Config already exists at {:?}", path);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, DEFAULT_CONFIG)
        .with_context(|| format!("Failed to write config to {:?}", path))?;
    println!("Created config at {:?}", path);
    Ok(())
}
