//! Dynamic rule engine: per-turn rule discovery for a session.
//!
//! Rules accumulate across a session; a rule activated by a medical
//! question stays active when the next message is about the weather.

pub mod classifier;
pub mod templates;

pub use classifier::{Classification, Risk, TopicClassifier};
pub use templates::RuleTemplates;

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::guardrails::DynamicRule;
use crate::llm::LLMProvider;
use crate::session::{HistoryEntry, SessionState};

/// `[dynamic_rules]` section
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DynamicRulesConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_max_rules")]
    pub max_rules_per_session: usize,

    /// History entries shown to the classifier
    #[serde(default = "default_history_window")]
    pub history_window: usize,
}

fn default_true() -> bool {
    true
}

fn default_max_rules() -> usize {
    50
}

fn default_history_window() -> usize {
    5
}

impl Default for DynamicRulesConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            max_rules_per_session: default_max_rules(),
            history_window: default_history_window(),
        }
    }
}

/// Result of processing one user turn
#[derive(Debug, Clone, Default, Serialize)]
pub struct TurnRules {
    /// Rules first activated this turn
    pub new_rules: Vec<DynamicRule>,
    /// Full active set, oldest first, capped
    pub all_active_rules: Vec<DynamicRule>,
    pub classification: Classification,
    pub domains: Vec<String>,
}

pub struct DynamicRuleEngine {
    classifier: TopicClassifier,
    templates: RuleTemplates,
    max_rules: usize,
}

impl DynamicRuleEngine {
    pub fn new(classifier_provider: Option<Arc<dyn LLMProvider>>, config: &DynamicRulesConfig) -> Self {
        Self {
            classifier: TopicClassifier::new(classifier_provider, config.history_window),
            templates: RuleTemplates::builtin(),
            max_rules: config.max_rules_per_session,
        }
    }

    pub fn templates(&self) -> &RuleTemplates {
        &self.templates
    }

    pub async fn process_turn(
        &self,
        user_message: &str,
        state: &SessionState,
        history: &[HistoryEntry],
    ) -> TurnRules {
        let classification = self
            .classifier
            .classify(user_message, history, &state.dynamic_rules)
            .await;

        let (new_rules, all_active_rules) = self.merge(&state.dynamic_rules, &classification);

        tracing::info!(
            session_id = %state.session_id,
            new_count = new_rules.len(),
            total_count = all_active_rules.len(),
            domains = ?classification.domains,
            "Dynamic rules processed"
        );

        TurnRules {
            new_rules,
            all_active_rules,
            domains: classification.domains.clone(),
            classification,
        }
    }

    /// Templates for detected domains first, then model suggestions.
    /// Deduplicated by rule id; the oldest rules fall off past the cap.
    pub fn merge(
        &self,
        existing: &[DynamicRule],
        classification: &Classification,
    ) -> (Vec<DynamicRule>, Vec<DynamicRule>) {
        let mut seen: HashSet<String> = existing.iter().map(|r| r.rule_id.clone()).collect();
        let mut new_rules = Vec::new();

        for domain in &classification.domains {
            for template in self.templates.for_domain(domain) {
                if seen.insert(template.rule_id.clone()) {
                    new_rules.push(template.clone());
                }
            }
        }

        for rule in &classification.suggested_rules {
            if rule.rule_id.is_empty() {
                continue;
            }
            if seen.insert(rule.rule_id.clone()) {
                new_rules.push(rule.clone());
            }
        }

        let mut all: Vec<DynamicRule> = existing.iter().chain(new_rules.iter()).cloned().collect();
        if all.len() > self.max_rules {
            let excess = all.len() - self.max_rules;
            all.drain(..excess);
            tracing::warn!(max = self.max_rules, dropped = excess, "Rule limit reached, trimming oldest rules");
        }

        (new_rules, all)
    }
}
