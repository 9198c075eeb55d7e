//! LLM topic classifier: detects domains and risks, suggests rules.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::guardrails::DynamicRule;
use crate::llm::structured::{complete_text, parse_json_reply};
use crate::llm::LLMProvider;
use crate::session::HistoryEntry;

const HISTORY_ENTRY_CHARS: usize = 200;

const CLASSIFIER_SYSTEM_PROMPT: &str = "You are a topic and risk classifier for an AI guardrails system. \
You answer only with JSON.";

const CLASSIFIER_FORMAT: &str = r#"Determine:
1. The domains (topics) of the conversation
2. Potential risks
3. Recommended safety rules

Answer STRICTLY in this JSON format:
{
  "domains": ["medical", "financial", "legal", "code_security", "data_privacy", "tool_restrictions", "general"],
  "risks": [
    {"risk": "risk description", "severity": "low|medium|high|critical"}
  ],
  "suggested_rules": [
    {
      "rule_id": "unique_id",
      "domain": "domain",
      "rule_type": "block|warn|require_disclaimer|restrict_tool",
      "description": "what the rule does",
      "severity": "low|medium|high|critical",
      "condition": "when it applies",
      "action": "what to do"
    }
  ],
  "reasoning": "why these rules were suggested (1-2 sentences)"
}

If the message needs no special rules, return empty risks and suggested_rules.
Do not suggest rules that already exist."#;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Risk {
    #[serde(default)]
    pub risk: String,
    #[serde(default)]
    pub severity: String,
}

/// Parsed classifier answer. Empty when the model fails.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Classification {
    pub domains: Vec<String>,
    pub risks: Vec<Risk>,
    pub suggested_rules: Vec<DynamicRule>,
    pub reasoning: String,
}

/// Wire shape; entries are validated one by one so a single bad
/// suggestion does not discard the whole answer.
#[derive(Deserialize)]
struct RawClassification {
    #[serde(default)]
    domains: Vec<Value>,
    #[serde(default)]
    risks: Vec<Value>,
    #[serde(default)]
    suggested_rules: Vec<Value>,
    #[serde(default)]
    reasoning: String,
}

impl From<RawClassification> for Classification {
    fn from(raw: RawClassification) -> Self {
        let suggested_rules = raw
            .suggested_rules
            .into_iter()
            .filter_map(|value| match serde_json::from_value::<DynamicRule>(value) {
                Ok(rule) => Some(rule),
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping malformed suggested rule");
                    None
                }
            })
            .collect();

        Self {
            domains: raw
                .domains
                .into_iter()
                .filter_map(|d| d.as_str().map(str::to_string))
                .collect(),
            risks: raw
                .risks
                .into_iter()
                .filter_map(|r| serde_json::from_value(r).ok())
                .collect(),
            suggested_rules,
            reasoning: raw.reasoning,
        }
    }
}

pub struct TopicClassifier {
    provider: Option<Arc<dyn LLMProvider>>,
    history_window: usize,
}

impl TopicClassifier {
    pub fn new(provider: Option<Arc<dyn LLMProvider>>, history_window: usize) -> Self {
        Self {
            provider,
            history_window,
        }
    }

    fn build_prompt(&self, message: &str, history: &[HistoryEntry], existing: &[DynamicRule]) -> String {
        let existing_text = if existing.is_empty() {
            "No existing rules.".to_string()
        } else {
            existing
                .iter()
                .map(|r| format!("- [{}] {}", r.rule_id, r.description))
                .collect::<Vec<_>>()
                .join("\n")
        };

        let start = history.len().saturating_sub(self.history_window);
        let history_text = if history[start..].is_empty() {
            "No history.".to_string()
        } else {
            history[start..]
                .iter()
                .map(|h| {
                    let content: String = h.content.chars().take(HISTORY_ENTRY_CHARS).collect();
                    format!("{}: {}", h.role, content)
                })
                .collect::<Vec<_>>()
                .join("\n")
        };

        format!(
            "Existing session rules (do not duplicate them):\n{}\n\n\
             Conversation history (most recent messages):\n{}\n\n\
             Current user message:\n{}\n\n{}",
            existing_text, history_text, message, CLASSIFIER_FORMAT
        )
    }

    /// Never fails: any model or parse error yields an empty classification.
    pub async fn classify(
        &self,
        message: &str,
        history: &[HistoryEntry],
        existing: &[DynamicRule],
    ) -> Classification {
        let Some(provider) = &self.provider else {
            return Classification::default();
        };

        let prompt = self.build_prompt(message, history, existing);
        let reply = match complete_text(provider.as_ref(), CLASSIFIER_SYSTEM_PROMPT, &prompt, 1024).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!(error = %e, "Classification failed");
                return Classification::default();
            }
        };

        match parse_json_reply::<RawClassification>(&reply) {
            Ok(raw) => {
                let classification = Classification::from(raw);
                tracing::info!(
                    domains = ?classification.domains,
                    suggested = classification.suggested_rules.len(),
                    "Classification complete"
                );
                classification
            }
            Err(e) => {
                tracing::warn!(error = %e, "Classifier returned non-JSON");
                Classification::default()
            }
        }
    }
}
