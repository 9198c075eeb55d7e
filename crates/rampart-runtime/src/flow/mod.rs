//! A small indentation-based flow language for input/output rails.
//!
//! ```text
//! define bot refuse jailbreak
//!   "Blocked by rule [jailbreak]: prompt injection attempt"
//!
//! define input flow check jailbreak
//!   if contains "ignore previous" "developer mode"
//!     bot refuse jailbreak
//!     stop
//! ```
//!
//! Flows are `define flow` (both rails), `define input flow` or
//! `define output flow`. A body is a list of `bot <name>`, `stop`, or
//! a single-level `if <condition>` block. Conditions are
//! `length > N`, `contains "a" "b" ...` (case-insensitive, any match)
//! and `violates "<description>"` (decided by an [`IntentJudge`]).

pub mod compiler;
pub mod intent;

pub use compiler::compile_rules;
pub use intent::{IntentJudge, LlmIntentJudge, NoIntentJudge};

use std::collections::HashMap;

use anyhow::{anyhow, bail, Result};

/// Utterance prefix that marks a refusal
pub const BLOCK_MARKER: &str = "Blocked by rule";
/// Utterance prefixes that mark a warning or disclaimer
pub const WARN_MARKERS: [&str; 2] = ["Warning [", "Please note:"];

/// Base program loaded when no flow document is configured
pub const DEFAULT_FLOW_DOCUMENT: &str = r#"# Base rails

define bot refuse input length
  "Blocked by rule [input_length]: message exceeds 10000 characters"

define bot refuse jailbreak
  "Blocked by rule [jailbreak]: prompt injection attempt detected"

define input flow check input length
  if length > 10000
    bot refuse input length
    stop

define input flow check jailbreak
  if contains "ignore previous" "system:" "developer mode"
    bot refuse jailbreak
    stop
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rail {
    Input,
    Output,
}

#[derive(Debug, Clone, PartialEq)]
enum Condition {
    LengthAbove(usize),
    Contains(Vec<String>),
    Violates(String),
}

#[derive(Debug, Clone, PartialEq)]
enum Action {
    Bot(String),
    Stop,
}

#[derive(Debug, Clone, PartialEq)]
enum Statement {
    Do(Action),
    If {
        condition: Condition,
        actions: Vec<Action>,
    },
}

#[derive(Debug, Clone)]
struct Flow {
    name: String,
    input: bool,
    output: bool,
    body: Vec<Statement>,
}

impl Flow {
    fn applies_to(&self, rail: Rail) -> bool {
        match rail {
            Rail::Input => self.input,
            Rail::Output => self.output,
        }
    }
}

struct Line<'a> {
    no: usize,
    indent: usize,
    text: &'a str,
}

/// A parsed, validated flow document.
#[derive(Debug, Clone, Default)]
pub struct FlowProgram {
    bots: HashMap<String, String>,
    flows: Vec<Flow>,
}

impl FlowProgram {
    pub fn parse(source: &str) -> Result<Self> {
        let lines: Vec<Line> = source
            .lines()
            .enumerate()
            .filter_map(|(idx, raw)| {
                let text = raw.trim();
                if text.is_empty() || text.starts_with('#') {
                    return None;
                }
                Some(Line {
                    no: idx + 1,
                    indent: raw.len() - raw.trim_start().len(),
                    text,
                })
            })
            .collect();

        let mut program = FlowProgram::default();
        let mut i = 0;
        while i < lines.len() {
            let line = &lines[i];
            if line.indent != 0 {
                bail!("line {}: unexpected indentation", line.no);
            }
            let rest = line
                .text
                .strip_prefix("define ")
                .ok_or_else(|| anyhow!("line {}: expected a 'define' block", line.no))?
                .trim();

            let end = lines[i + 1..]
                .iter()
                .position(|l| l.indent == 0)
                .map_or(lines.len(), |p| i + 1 + p);
            let body = &lines[i + 1..end];

            if rest == "bot" || rest.starts_with("bot ") {
                let name = rest["bot".len()..].trim();
                if name.is_empty() {
                    bail!("line {}: bot definition without a name", line.no);
                }
                let [utterance] = body else {
                    bail!("line {}: bot '{}' needs exactly one quoted utterance", line.no, name);
                };
                let mut literals = quoted_literals(utterance.text, utterance.no)?;
                if literals.len() != 1 {
                    bail!("line {}: expected a single quoted utterance", utterance.no);
                }
                if program.bots.insert(name.to_string(), literals.remove(0)).is_some() {
                    bail!("line {}: bot '{}' defined twice", line.no, name);
                }
            } else {
                let (input, output, name) = if let Some(name) = rest.strip_prefix("input flow ") {
                    (true, false, name)
                } else if let Some(name) = rest.strip_prefix("output flow ") {
                    (false, true, name)
                } else if let Some(name) = rest.strip_prefix("flow ") {
                    (true, true, name)
                } else {
                    bail!("line {}: unknown definition '{}'", line.no, rest);
                };
                let name = name.trim();
                if name.is_empty() {
                    bail!("line {}: flow definition without a name", line.no);
                }
                if body.is_empty() {
                    bail!("line {}: flow '{}' has no body", line.no, name);
                }
                program.flows.push(Flow {
                    name: name.to_string(),
                    input,
                    output,
                    body: parse_statements(body)?,
                });
            }

            i = end;
        }

        program.check_references()?;
        Ok(program)
    }

    fn check_references(&self) -> Result<()> {
        for flow in &self.flows {
            for statement in &flow.body {
                let actions = match statement {
                    Statement::Do(action) => std::slice::from_ref(action),
                    Statement::If { actions, .. } => actions.as_slice(),
                };
                for action in actions {
                    if let Action::Bot(name) = action {
                        if !self.bots.contains_key(name) {
                            bail!("flow '{}' references undefined bot '{}'", flow.name, name);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    pub fn flow_names(&self) -> Vec<&str> {
        self.flows.iter().map(|f| f.name.as_str()).collect()
    }

    /// Run every flow on `rail` in document order. Returns the bot
    /// utterances joined by newlines, or `message` unchanged when no flow
    /// said anything. `stop` ends the whole run.
    pub async fn run(&self, rail: Rail, message: &str, intents: &dyn IntentJudge) -> String {
        let mut said: Vec<&str> = Vec::new();

        'flows: for flow in self.flows.iter().filter(|f| f.applies_to(rail)) {
            for statement in &flow.body {
                let actions = match statement {
                    Statement::Do(action) => std::slice::from_ref(action),
                    Statement::If { condition, actions } => {
                        if !holds(condition, message, intents).await {
                            continue;
                        }
                        actions.as_slice()
                    }
                };
                for action in actions {
                    match action {
                        Action::Bot(name) => {
                            if let Some(text) = self.bots.get(name) {
                                said.push(text);
                            }
                        }
                        Action::Stop => {
                            tracing::debug!(flow = %flow.name, "Flow stopped the rail");
                            break 'flows;
                        }
                    }
                }
            }
        }

        if said.is_empty() {
            message.to_string()
        } else {
            said.join("\n")
        }
    }
}

async fn holds(condition: &Condition, message: &str, intents: &dyn IntentJudge) -> bool {
    match condition {
        Condition::LengthAbove(limit) => message.chars().count() > *limit,
        Condition::Contains(needles) => {
            let haystack = message.to_lowercase();
            needles.iter().any(|n| haystack.contains(&n.to_lowercase()))
        }
        Condition::Violates(description) => match intents.violates(message, description).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "Intent check failed, treating as no violation");
                false
            }
        },
    }
}

fn parse_statements(body: &[Line]) -> Result<Vec<Statement>> {
    let base = body[0].indent;
    let mut statements = Vec::new();
    let mut j = 0;

    while j < body.len() {
        let line = &body[j];
        if line.indent != base {
            bail!("line {}: inconsistent indentation", line.no);
        }

        if let Some(cond) = line.text.strip_prefix("if ") {
            let condition = parse_condition(cond.trim(), line.no)?;
            let end = body[j + 1..]
                .iter()
                .position(|l| l.indent <= base)
                .map_or(body.len(), |p| j + 1 + p);
            let nested = &body[j + 1..end];
            if nested.is_empty() {
                bail!("line {}: 'if' without a body", line.no);
            }
            let actions = nested
                .iter()
                .map(|l| {
                    if l.indent != nested[0].indent {
                        bail!("line {}: inconsistent indentation", l.no);
                    }
                    parse_action(l)
                })
                .collect::<Result<Vec<_>>>()?;
            statements.push(Statement::If { condition, actions });
            j = end;
        } else {
            statements.push(Statement::Do(parse_action(line)?));
            j += 1;
        }
    }

    Ok(statements)
}

fn parse_action(line: &Line) -> Result<Action> {
    if line.text == "stop" {
        return Ok(Action::Stop);
    }
    if let Some(name) = line.text.strip_prefix("bot ") {
        return Ok(Action::Bot(name.trim().to_string()));
    }
    if line.text.starts_with("if ") {
        bail!("line {}: nested conditions are not supported", line.no);
    }
    bail!("line {}: unknown statement '{}'", line.no, line.text)
}

fn parse_condition(text: &str, no: usize) -> Result<Condition> {
    if let Some(rest) = text.strip_prefix("length") {
        let limit = rest
            .trim()
            .strip_prefix('>')
            .ok_or_else(|| anyhow!("line {}: expected 'length > N'", no))?
            .trim()
            .parse::<usize>()
            .map_err(|e| anyhow!("line {}: invalid length limit: {}", no, e))?;
        return Ok(Condition::LengthAbove(limit));
    }
    if let Some(rest) = text.strip_prefix("contains ") {
        let needles = quoted_literals(rest, no)?;
        if needles.is_empty() {
            bail!("line {}: 'contains' needs at least one quoted pattern", no);
        }
        return Ok(Condition::Contains(needles));
    }
    if let Some(rest) = text.strip_prefix("violates ") {
        let mut literals = quoted_literals(rest, no)?;
        if literals.len() != 1 {
            bail!("line {}: 'violates' takes one quoted description", no);
        }
        return Ok(Condition::Violates(literals.remove(0)));
    }
    bail!("line {}: unknown condition '{}'", no, text)
}

/// Whitespace-separated double-quoted literals with `\"` and `\\` escapes.
fn quoted_literals(text: &str, no: usize) -> Result<Vec<String>> {
    let mut out = Vec::new();
    let mut chars = text.chars().peekable();

    loop {
        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        match chars.next() {
            None => break,
            Some('"') => {}
            Some(c) => bail!("line {}: expected '\"', found '{}'", no, c),
        }

        let mut literal = String::new();
        loop {
            match chars.next() {
                None => bail!("line {}: unterminated string", no),
                Some('"') => break,
                Some('\\') => match chars.next() {
                    Some(escaped) => literal.push(escaped),
                    None => bail!("line {}: unterminated string", no),
                },
                Some(c) => literal.push(c),
            }
        }
        out.push(literal);
    }

    Ok(out)
}
