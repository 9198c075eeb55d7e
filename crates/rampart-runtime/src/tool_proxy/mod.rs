//! Tool proxy: every tool call the agent makes passes through here.
//!
//! Pipeline per call: policy → session rate → per-request cap → loop
//! breaker → registry lookup → argument validation → bounded execution.
//! Each call produces exactly one audit record.

pub mod audit;
pub mod config;
pub mod error;
pub mod guard;
pub mod policy;
pub mod registry;
pub mod validate;

pub use audit::{AuditLog, CallStatus, ToolCallRecord};
pub use config::ToolProxyConfig;
pub use error::ToolError;
pub use guard::{LoopDetector, RateLimiter};
pub use policy::{PolicyDecision, PolicyEngine, PolicySnapshot};
pub use registry::{ToolInfo, ToolRegistry};

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::fingerprint::fingerprint;
use audit::PendingCall;

/// What the caller gets back from one proxied call
#[derive(Debug, Clone, Serialize)]
pub struct CallOutcome {
    pub call_id: String,
    pub status: CallStatus,
    pub result: Option<Value>,
    pub error: Option<String>,
}

impl CallOutcome {
    pub fn is_success(&self) -> bool {
        self.status == CallStatus::Success
    }
}

pub struct ToolProxy {
    registry: Arc<ToolRegistry>,
    policy: Arc<PolicyEngine>,
    rate_limiter: RateLimiter,
    loop_detector: LoopDetector,
    audit: AuditLog,
    max_calls_per_request: usize,
    timeout: Duration,
}

impl ToolProxy {
    pub fn new(registry: Arc<ToolRegistry>, policy: Arc<PolicyEngine>, config: &ToolProxyConfig) -> Self {
        Self {
            registry,
            policy,
            rate_limiter: RateLimiter::new(config.rate_limit_per_min),
            loop_detector: LoopDetector::new(config.loop_breaker_threshold),
            audit: AuditLog::new(),
            max_calls_per_request: config.max_calls_per_request,
            timeout: config.timeout(),
        }
    }

    /// Override the per-call execution timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn policy(&self) -> &Arc<PolicyEngine> {
        &self.policy
    }

    pub fn audit_log(&self) -> &AuditLog {
        &self.audit
    }

    /// Run one tool call through every guard. Never returns an error;
    /// failures are reported in the outcome and the audit record.
    pub async fn call(
        &self,
        tool_name: &str,
        args: Value,
        session_id: &str,
        request_id: &str,
        context: Option<&Value>,
    ) -> CallOutcome {
        let call_id = Uuid::new_v4().to_string();
        let pending = PendingCall::start(
            &self.audit,
            ToolCallRecord::new(call_id.clone(), tool_name, args.clone(), session_id, request_id),
        );

        tracing::info!(
            call_id = %call_id,
            tool = tool_name,
            session_id,
            request_id,
            "Tool call started"
        );

        match self.dispatch(tool_name, args, session_id, request_id, context).await {
            Ok(result) => {
                pending.succeed(fingerprint(&result));
                tracing::info!(call_id = %call_id, tool = tool_name, "Tool call succeeded");
                CallOutcome {
                    call_id,
                    status: CallStatus::Success,
                    result: Some(result),
                    error: None,
                }
            }
            Err(err) => {
                let message = err.to_record_string();
                tracing::warn!(
                    call_id = %call_id,
                    tool = tool_name,
                    kind = err.kind(),
                    error = %err,
                    "Tool call failed"
                );
                pending.fail(&err);
                CallOutcome {
                    call_id,
                    status: CallStatus::Error,
                    result: None,
                    error: Some(message),
                }
            }
        }
    }

    async fn dispatch(
        &self,
        tool_name: &str,
        args: Value,
        session_id: &str,
        request_id: &str,
        context: Option<&Value>,
    ) -> Result<Value, ToolError> {
        if let PolicyDecision::Deny(reason) = self.policy.decide(tool_name, context) {
            tracing::debug!(tool = tool_name, reason = %reason, "Policy denied");
            return Err(ToolError::PermissionDenied(tool_name.to_string()));
        }

        if !self.rate_limiter.check(session_id) {
            return Err(ToolError::RateLimited {
                session: session_id.to_string(),
                limit: self.rate_limiter.limit(),
            });
        }

        // The in-flight record is not appended yet, so this counts prior calls only
        let made = self.audit.count_for(session_id, request_id);
        if made >= self.max_calls_per_request {
            return Err(ToolError::CallLimitExceeded {
                made,
                limit: self.max_calls_per_request,
            });
        }

        if let Err(count) = self
            .loop_detector
            .check(session_id, tool_name, &fingerprint(&args))
        {
            return Err(ToolError::LoopDetected {
                tool: tool_name.to_string(),
                count,
            });
        }

        let tool = self
            .registry
            .get(tool_name)
            .ok_or_else(|| ToolError::UnknownTool(tool_name.to_string()))?;

        let validated = validate::validate_args(&tool.parameters(), &args).map_err(ToolError::Validation)?;

        // Detached task: on timeout the handle is dropped and the tool keeps
        // running in the background, but its result is discarded.
        let handle = tokio::spawn(async move { tool.execute(validated).await });
        match tokio::time::timeout(self.timeout, handle).await {
            Err(_) => Err(ToolError::Timeout(self.timeout)),
            Ok(Err(join_err)) => Err(ToolError::Execution(format!("tool task failed: {}", join_err))),
            Ok(Ok(Err(e))) => Err(ToolError::Execution(format!("{:#}", e))),
            Ok(Ok(Ok(value))) => Ok(value),
        }
    }

    /// Full audit trail for one request
    pub fn get_audit_trail(&self, session_id: &str, request_id: &str) -> Vec<ToolCallRecord> {
        self.audit.trail(session_id, request_id)
    }

    /// Ids of the successful calls made during one request
    pub fn get_call_ids(&self, session_id: &str, request_id: &str) -> Vec<String> {
        self.audit.call_ids(session_id, request_id)
    }
}
