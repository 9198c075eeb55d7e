//! Helpers for prompting a model and reading back a JSON answer.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;

use super::provider::LLMProvider;
use super::types::{GenerateConfig, Message};

/// Strip a surrounding markdown code fence (```json ... ```) if present.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json") on the opening line
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Parse a model reply as JSON, tolerating a code fence around it.
pub fn parse_json_reply<T: DeserializeOwned>(text: &str) -> Result<T> {
    serde_json::from_str(strip_code_fence(text)).context("model reply is not the expected JSON")
}

/// Single-shot completion with a system prompt; returns the reply text.
pub async fn complete_text(
    provider: &dyn LLMProvider,
    system_prompt: &str,
    prompt: &str,
    max_tokens: u32,
) -> Result<String> {
    let config = GenerateConfig {
        system_prompt: Some(system_prompt.to_string()),
        ..GenerateConfig::deterministic(max_tokens)
    };
    let response = provider
        .generate(&[Message::user(prompt)], &[], &config)
        .await?;
    Ok(response.content.extract_text())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_strip_fence_with_language() {
        let text = "```json\n{\"overall\": \"PASS\"}\n```";
        assert_eq!(strip_code_fence(text), "{\"overall\": \"PASS\"}");
    }

    #[test]
    fn test_strip_fence_plain() {
        assert_eq!(strip_code_fence("  {\"a\":1} "), "{\"a\":1}");
        assert_eq!(strip_code_fence("```\n[1]\n```"), "[1]");
    }

    #[test]
    fn test_parse_json_reply() {
        let value: Value = parse_json_reply("```json\n{\"a\": 1}\n```").unwrap();
        assert_eq!(value["a"], 1);
        assert!(parse_json_reply::<Value>("not json").is_err());
    }
}
