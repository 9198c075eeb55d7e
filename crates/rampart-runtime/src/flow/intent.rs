use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::llm::structured::complete_text;
use crate::llm::LLMProvider;

/// Decides whether a message violates a described rule.
#[async_trait]
pub trait IntentJudge: Send + Sync {
    async fn violates(&self, message: &str, description: &str) -> Result<bool>;
}

/// Used when no judge model is configured; nothing ever violates.
pub struct NoIntentJudge;

#[async_trait]
impl IntentJudge for NoIntentJudge {
    async fn violates(&self, _message: &str, _description: &str) -> Result<bool> {
        Ok(false)
    }
}

const INTENT_SYSTEM_PROMPT: &str = "You classify whether a message violates a safety rule. \
Answer with exactly one word: YES or NO.";

pub struct LlmIntentJudge {
    provider: Arc<dyn LLMProvider>,
}

impl LlmIntentJudge {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl IntentJudge for LlmIntentJudge {
    async fn violates(&self, message: &str, description: &str) -> Result<bool> {
        let prompt = format!("Rule: {}\n\nMessage:\n{}\n\nDoes the message violate the rule?", description, message);
        let reply = complete_text(self.provider.as_ref(), INTENT_SYSTEM_PROMPT, &prompt, 4).await?;
        Ok(reply.trim().to_ascii_uppercase().starts_with("YES"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedLLM;

    #[tokio::test]
    async fn test_llm_intent_answers() {
        let judge = LlmIntentJudge::new(Arc::new(ScriptedLLM::text(&["YES.", "no"])));
        assert!(judge.violates("m", "d").await.unwrap());
        assert!(!judge.violates("m", "d").await.unwrap());
        // Exhausted script surfaces as an error for the engine to absorb
        assert!(judge.violates("m", "d").await.is_err());
    }
}
