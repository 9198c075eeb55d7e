use anyhow::Result;
use async_trait::async_trait;

use super::{BackendKind, CheckContext, CheckingBackend, DynamicRule, GuardrailsResult};

/// Passes everything and ignores injected rules.
pub struct NoopBackend;

#[async_trait]
impl CheckingBackend for NoopBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::None
    }

    async fn initialize(&self) -> Result<()> {
        tracing::info!("Guardrails disabled, all checks pass");
        Ok(())
    }

    async fn check_input(&self, _message: &str, _ctx: &CheckContext) -> Result<GuardrailsResult> {
        Ok(GuardrailsResult::pass())
    }

    async fn check_output(&self, _message: &str, _ctx: &CheckContext) -> Result<GuardrailsResult> {
        Ok(GuardrailsResult::pass())
    }

    async fn inject_rules(&self, _session_id: &str, _rules: &[DynamicRule]) -> Result<()> {
        Ok(())
    }
}
