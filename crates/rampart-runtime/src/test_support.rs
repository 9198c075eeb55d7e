//! Scripted LLM used by unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::llm::{Content, GenerateConfig, GenerateResponse, LLMProvider, Message, StopReason, ToolSchema, Usage};

/// Returns canned responses in order and records every prompt it saw.
pub struct ScriptedLLM {
    responses: Vec<GenerateResponse>,
    index: AtomicUsize,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedLLM {
    pub fn new(responses: Vec<GenerateResponse>) -> Self {
        Self {
            responses,
            index: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn text(replies: &[&str]) -> Self {
        Self::new(replies.iter().map(|r| text_response(r)).collect())
    }

    pub fn calls(&self) -> usize {
        self.index.load(Ordering::SeqCst)
    }
}

pub fn text_response(text: &str) -> GenerateResponse {
    GenerateResponse {
        content: Content::text(text),
        stop_reason: StopReason::EndTurn,
        usage: Usage::default(),
        model: "scripted".into(),
    }
}

#[async_trait]
impl LLMProvider for ScriptedLLM {
    async fn generate(
        &self,
        messages: &[Message],
        _tools: &[ToolSchema],
        _config: &GenerateConfig,
    ) -> Result<GenerateResponse> {
        if let Some(last) = messages.last() {
            self.prompts.lock().unwrap().push(last.content.extract_text());
        }
        let idx = self.index.fetch_add(1, Ordering::SeqCst);
        self.responses
            .get(idx)
            .cloned()
            .ok_or_else(|| anyhow!("scripted LLM exhausted after {} calls", idx))
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}
