//! Compiles dynamic rules into flow definitions.

use std::collections::HashSet;

use anyhow::{bail, Result};
use serde_json::Value;

use crate::fingerprint::fingerprint;
use crate::guardrails::{DynamicRule, RuleKind};

/// Flow-safe form of a rule id. Ids that needed rewriting get a digest
/// of the raw id appended so `a-b` and `a.b` stay distinct.
fn flow_id(rule_id: &str) -> String {
    let safe: String = rule_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if safe == rule_id {
        safe
    } else {
        let digest = fingerprint(&Value::String(rule_id.to_string()));
        format!("{safe}_{}", &digest[..8])
    }
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace(['\n', '\r'], " ")
}

/// One named check flow per rule. Block and warn rules guard both rails
/// behind a `violates` condition; disclaimer rules annotate every
/// response. Tool restrictions are enforced by the tool proxy and
/// produce no flow.
pub fn compile_rules(rules: &[DynamicRule]) -> Result<String> {
    let mut blocks = Vec::new();
    let mut seen = HashSet::new();

    for rule in rules {
        if rule.rule_id.trim().is_empty() {
            bail!("cannot compile a rule without an id");
        }
        let id = flow_id(&rule.rule_id);
        if !seen.insert(id.clone()) {
            tracing::warn!(rule_id = %rule.rule_id, "Duplicate rule id skipped");
            continue;
        }
        let desc = escape(&rule.description);
        let header = format!(
            "  # domain: {} | severity: {}",
            escape(&rule.domain),
            rule.severity
        );

        match rule.kind {
            RuleKind::Block => blocks.push(format!(
                "define bot refuse rule {id}\n  \"Blocked by rule [{rid}]: {desc}\"\n\n\
                 define flow check dynamic {id}\n{header}\n  if violates \"{desc}\"\n    bot refuse rule {id}\n    stop\n",
                rid = escape(&rule.rule_id),
            )),
            RuleKind::Warn => blocks.push(format!(
                "define bot warn rule {id}\n  \"Warning [{rid}]: {desc}\"\n\n\
                 define flow check dynamic {id}\n{header}\n  if violates \"{desc}\"\n    bot warn rule {id}\n",
                rid = escape(&rule.rule_id),
            )),
            RuleKind::RequireDisclaimer => blocks.push(format!(
                "define bot disclaimer rule {id}\n  \"Please note: {desc}\"\n\n\
                 define output flow check dynamic {id}\n{header}\n  bot disclaimer rule {id}\n"
            )),
            RuleKind::RestrictTool => {
                tracing::debug!(rule_id = %rule.rule_id, "Tool restriction has no flow form");
            }
        }
    }

    Ok(blocks.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::{FlowProgram, NoIntentJudge, Rail, DEFAULT_FLOW_DOCUMENT};
    use crate::guardrails::RuleSeverity;

    fn rule(id: &str, kind: RuleKind, description: &str) -> DynamicRule {
        DynamicRule {
            rule_id: id.into(),
            domain: "financial".into(),
            kind,
            description: description.into(),
            severity: RuleSeverity::High,
            condition: String::new(),
            action: String::new(),
        }
    }

    #[test]
    fn test_compiled_rules_parse_with_base() {
        let rules = vec![
            rule("fin-no.advice", RuleKind::Block, "No \"specific\" picks"),
            rule("fin_warn", RuleKind::Warn, "Risky"),
            rule("fin_disclaimer", RuleKind::RequireDisclaimer, "Not financial advice"),
            rule("tool_no_send", RuleKind::RestrictTool, "No external send"),
        ];
        let compiled = compile_rules(&rules).unwrap();
        let program = FlowProgram::parse(&format!("{}\n{}", DEFAULT_FLOW_DOCUMENT, compiled)).unwrap();
        let names = program.flow_names();
        assert!(names.iter().any(|n| n.starts_with("check dynamic fin_no_advice_")));
        assert!(names.contains(&"check dynamic fin_disclaimer"));
        assert!(!names.iter().any(|n| n.contains("tool_no_send")));
    }

    #[tokio::test]
    async fn test_disclaimer_only_on_output() {
        let compiled = compile_rules(&[rule("d", RuleKind::RequireDisclaimer, "Not advice")]).unwrap();
        let program = FlowProgram::parse(&compiled).unwrap();
        assert_eq!(program.run(Rail::Input, "hi", &NoIntentJudge).await, "hi");
        assert_eq!(
            program.run(Rail::Output, "hi", &NoIntentJudge).await,
            "Please note: Not advice"
        );
    }

    #[test]
    fn test_ids_that_sanitize_alike_stay_distinct() {
        let rules = vec![
            rule("no-advice", RuleKind::Block, "No advice"),
            rule("no.advice", RuleKind::Block, "No tips"),
            rule("no_advice", RuleKind::Warn, "Careful"),
        ];
        let program = FlowProgram::parse(&compile_rules(&rules).unwrap()).unwrap();
        let names = program.flow_names();
        assert_eq!(names.len(), 3);
        let unique: HashSet<&str> = names.iter().copied().collect();
        assert_eq!(unique.len(), 3);
    }

    #[test]
    fn test_rule_named_like_base_bot_parses() {
        let compiled = compile_rules(&[rule("jailbreak", RuleKind::Block, "x")]).unwrap();
        assert!(FlowProgram::parse(&format!("{}\n{}", DEFAULT_FLOW_DOCUMENT, compiled)).is_ok());
    }

    #[test]
    fn test_repeated_id_compiles_once() {
        let rules = vec![rule("r", RuleKind::Block, "x"), rule("r", RuleKind::Block, "x")];
        let program = FlowProgram::parse(&compile_rules(&rules).unwrap()).unwrap();
        assert_eq!(program.flow_names(), vec!["check dynamic r"]);
    }

    #[test]
    fn test_newline_in_domain_stays_in_comment() {
        let mut r = rule("r", RuleKind::Warn, "x");
        r.domain = "medical\ndefine nonsense".into();
        assert!(FlowProgram::parse(&compile_rules(&[r]).unwrap()).is_ok());
    }

    #[test]
    fn test_empty_id_rejected() {
        assert!(compile_rules(&[rule("", RuleKind::Block, "x")]).is_err());
    }
}
