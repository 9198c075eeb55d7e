//! LLM-as-judge backend: a small model grades text against the active rules.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;
use serde_json::Value;

use super::{BackendKind, CheckContext, CheckingBackend, DynamicRule, GuardrailsResult};
use crate::llm::structured::{complete_text, parse_json_reply};
use crate::llm::LLMProvider;

const JUDGE_SYSTEM_PROMPT: &str = "You are a safety evaluator for an AI assistant. \
You check text against a list of active safety rules and answer only with JSON.";

const VERDICT_FORMAT: &str = r#"For each rule decide: PASS (no violation), WARN (possible violation), BLOCK (clear violation).

Answer STRICTLY in this JSON format:
{
  "overall": "PASS" | "WARN" | "BLOCK",
  "reason": "short explanation (1-2 sentences)",
  "checks": [
    {"rule_id": "...", "verdict": "PASS|WARN|BLOCK", "reason": "..."}
  ]
}"#;

#[derive(Debug, Deserialize)]
struct JudgeVerdict {
    #[serde(default)]
    overall: String,
    #[serde(default)]
    reason: String,
    #[serde(default)]
    checks: Vec<Value>,
}

pub struct JudgeBackend {
    provider: Option<Arc<dyn LLMProvider>>,
    /// Active rules keyed by session id
    active_rules: DashMap<String, Vec<DynamicRule>>,
}

impl JudgeBackend {
    pub fn new(provider: Option<Arc<dyn LLMProvider>>) -> Self {
        Self {
            provider,
            active_rules: DashMap::new(),
        }
    }

    pub fn active_rules(&self, session_id: &str) -> Vec<DynamicRule> {
        self.active_rules
            .get(session_id)
            .map(|rules| rules.clone())
            .unwrap_or_default()
    }

    fn format_rules(rules: &[DynamicRule]) -> String {
        rules
            .iter()
            .map(|r| format!("- [{}] ({}) {}: {}", r.rule_id, r.severity, r.kind, r.description))
            .collect::<Vec<_>>()
            .join("\n")
    }

    async fn evaluate(&self, message: &str, subject: &str, session_id: &str) -> GuardrailsResult {
        let Some(provider) = &self.provider else {
            return GuardrailsResult::pass();
        };

        let rules = self.active_rules(session_id);
        if rules.is_empty() {
            return GuardrailsResult::pass();
        }

        let prompt = format!(
            "Active rules:\n{}\n\n{}:\n{}\n\n{}",
            Self::format_rules(&rules),
            subject,
            message,
            VERDICT_FORMAT
        );

        let reply = match complete_text(provider.as_ref(), JUDGE_SYSTEM_PROMPT, &prompt, 512).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!(session_id, error = %e, "Judge evaluation failed, passing");
                return GuardrailsResult::pass();
            }
        };

        let verdict: JudgeVerdict = match parse_json_reply(&reply) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(session_id, error = %e, "Judge returned non-JSON verdict, passing");
                return GuardrailsResult::pass();
            }
        };

        let checks = Value::Array(verdict.checks);
        match verdict.overall.trim().to_ascii_uppercase().as_str() {
            "BLOCK" => GuardrailsResult::block(verdict.reason).with_detail("checks", checks),
            "WARN" => GuardrailsResult::warn(verdict.reason).with_detail("checks", checks),
            _ => GuardrailsResult::pass(),
        }
    }
}

#[async_trait]
impl CheckingBackend for JudgeBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Judge
    }

    async fn initialize(&self) -> Result<()> {
        match &self.provider {
            Some(p) => tracing::info!(model = p.model_name(), "Judge backend initialized"),
            None => tracing::warn!("Judge backend has no model, checks will pass"),
        }
        Ok(())
    }

    async fn check_input(&self, message: &str, ctx: &CheckContext) -> Result<GuardrailsResult> {
        Ok(self.evaluate(message, "User message", &ctx.session_id).await)
    }

    async fn check_output(&self, message: &str, ctx: &CheckContext) -> Result<GuardrailsResult> {
        Ok(self.evaluate(message, "Assistant response", &ctx.session_id).await)
    }

    async fn inject_rules(&self, session_id: &str, rules: &[DynamicRule]) -> Result<()> {
        if rules.is_empty() {
            self.active_rules.remove(session_id);
        } else {
            self.active_rules.insert(session_id.to_string(), rules.to_vec());
        }
        tracing::debug!(session_id, count = rules.len(), "Judge rules updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guardrails::{ResultSeverity, RuleKind, RuleSeverity};
    use crate::test_support::ScriptedLLM;

    fn ctx(session_id: &str) -> CheckContext {
        CheckContext {
            session_id: session_id.into(),
            ..Default::default()
        }
    }

    fn rule(id: &str) -> DynamicRule {
        DynamicRule {
            rule_id: id.into(),
            domain: "medical".into(),
            kind: RuleKind::Block,
            description: "No dosage recommendations".into(),
            severity: RuleSeverity::Critical,
            condition: String::new(),
            action: String::new(),
        }
    }

    #[tokio::test]
    async fn test_no_rules_skips_model() {
        let llm = Arc::new(ScriptedLLM::text(&[]));
        let backend = JudgeBackend::new(Some(llm.clone()));
        let result = backend.check_input("hi", &CheckContext::default()).await.unwrap();
        assert!(!result.blocked);
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn test_block_verdict_in_code_fence() {
        let llm = Arc::new(ScriptedLLM::text(&[
            "```json\n{\"overall\": \"BLOCK\", \"reason\": \"asks for dosage\", \"checks\": [{\"rule_id\": \"med_no_dosage\", \"verdict\": \"BLOCK\"}]}\n```",
        ]));
        let backend = JudgeBackend::new(Some(llm.clone()));
        backend.inject_rules("s1", &[rule("med_no_dosage")]).await.unwrap();

        let result = backend
            .check_input("how much ibuprofen", &ctx("s1"))
            .await
            .unwrap();
        assert!(result.blocked);
        assert_eq!(result.severity, ResultSeverity::Block);
        assert_eq!(result.reason.as_deref(), Some("asks for dosage"));
        assert_eq!(result.details["checks"][0]["rule_id"], "med_no_dosage");

        let prompt = llm.prompts.lock().unwrap()[0].clone();
        assert!(prompt.contains("[med_no_dosage] (critical) block"));
    }

    #[tokio::test]
    async fn test_warn_verdict_does_not_block() {
        let llm = Arc::new(ScriptedLLM::text(&[r#"{"overall": "WARN", "reason": "borderline"}"#]));
        let backend = JudgeBackend::new(Some(llm));
        backend.inject_rules("s1", &[rule("r")]).await.unwrap();
        let result = backend.check_output("text", &ctx("s1")).await.unwrap();
        assert!(!result.blocked);
        assert_eq!(result.severity, ResultSeverity::Warn);
    }

    #[tokio::test]
    async fn test_garbage_and_failures_pass() {
        let llm = Arc::new(ScriptedLLM::text(&["I think it's fine"]));
        let backend = JudgeBackend::new(Some(llm));
        backend.inject_rules("s1", &[rule("r")]).await.unwrap();
        // First call: non-JSON; second call: scripted model exhausted (error)
        for _ in 0..2 {
            let result = backend.check_input("text", &ctx("s1")).await.unwrap();
            assert_eq!(result, GuardrailsResult::pass());
        }
    }

    #[tokio::test]
    async fn test_inject_replaces_wholesale() {
        let backend = JudgeBackend::new(None);
        backend.inject_rules("s1", &[rule("a"), rule("b")]).await.unwrap();
        backend.inject_rules("s1", &[rule("c")]).await.unwrap();
        let ids: Vec<String> = backend.active_rules("s1").into_iter().map(|r| r.rule_id).collect();
        assert_eq!(ids, vec!["c"]);

        backend.inject_rules("s1", &[]).await.unwrap();
        assert!(backend.active_rules("s1").is_empty());
    }

    #[tokio::test]
    async fn test_rules_do_not_leak_across_sessions() {
        let llm = Arc::new(ScriptedLLM::text(&[r#"{"overall": "BLOCK", "reason": "dosage"}"#]));
        let backend = JudgeBackend::new(Some(llm.clone()));
        backend.inject_rules("alice", &[rule("med_no_dosage")]).await.unwrap();

        // bob has no rules: passes without consulting the model
        let result = backend.check_input("how much ibuprofen", &ctx("bob")).await.unwrap();
        assert_eq!(result, GuardrailsResult::pass());
        assert_eq!(llm.calls(), 0);
        assert!(backend.active_rules("bob").is_empty());

        let result = backend.check_input("how much ibuprofen", &ctx("alice")).await.unwrap();
        assert!(result.blocked);
    }
}
