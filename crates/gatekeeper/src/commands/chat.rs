use crate::commands::bootstrap::build_orchestrator;
use crate::config::AppConfig;
use anyhow::Result;
use rampart_runtime::TurnStatus;
use std::io::{self, BufRead, Write};
use tracing::info;

/// REPL over the guardrails pipeline
pub async fn execute(session_id: Option<String>, profile: Option<String>, config: &AppConfig) -> Result<()> {
    let orchestrator = build_orchestrator(config).await?;
    let session_id = session_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    info!(session_id = %session_id, "Starting chat session");

    let status = orchestrator.status().await;
    println!(
        "Gatekeeper [{} / {} / {}] - Type 'exit' to quit",
        status.guardrails_backend, status.llm_provider, status.llm_model
    );
    println!("Session: {}", session_id);
    println!("---");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("> ");
        stdout.flush()?;

        let mut input = String::new();
        if stdin.lock().read_line(&mut input)? == 0 {
            break;
        }
        let input = input.trim();

        if input.is_empty() {
            continue;
        }
        if input == "exit" || input == "quit" {
            break;
        }

        let outcome = orchestrator
            .handle_turn(&session_id, input, profile.as_deref())
            .await;

        match outcome.status {
            TurnStatus::Ok => println!("\nAssistant: {}", outcome.message),
            TurnStatus::Refused => println!("\n[refused] {}", outcome.message),
            TurnStatus::Escalated => println!("\n[escalated] {}", outcome.message),
        }
        if !outcome.new_rules.is_empty() {
            let ids: Vec<&str> = outcome.new_rules.iter().map(|r| r.rule_id.as_str()).collect();
            println!("  new rules: {}", ids.join(", "));
        }
        if !outcome.tool_call_ids.is_empty() {
            println!("  tool calls: {}", outcome.tool_call_ids.len());
        }
        println!();
    }

    println!("Session: {}", session_id);
    Ok(())
}
