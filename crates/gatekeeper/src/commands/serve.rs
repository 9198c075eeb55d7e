use crate::commands::bootstrap::build_orchestrator;
use crate::config::AppConfig;
use anyhow::Result;
use rampart_gateway::{start_server, AppState};
use tracing::info;

pub async fn execute(host: Option<String>, port: Option<u16>, config: &AppConfig) -> Result<()> {
    let host = host.unwrap_or_else(|| config.server.host.clone());
    let port = port.unwrap_or(config.server.port);

    let orchestrator = build_orchestrator(config).await?;
    info!(
        host = %host,
        port,
        backend = %config.guardrails.backend,
        provider = %config.llm.provider,
        "Starting gateway server"
    );

    let state = AppState {
        orchestrator,
        allowed_origins: config.server.allowed_origins.clone(),
    };
    start_server(state, &host, port).await
}
