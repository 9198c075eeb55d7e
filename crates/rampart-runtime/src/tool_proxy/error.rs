use std::time::Duration;

/// Failure raised by one stage of the tool proxy pipeline.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("tool '{0}' is not permitted by policy")]
    PermissionDenied(String),

    #[error("session '{session}' exceeded {limit} tool calls per minute")]
    RateLimited { session: String, limit: usize },

    #[error("request already made {made} tool calls (limit {limit})")]
    CallLimitExceeded { made: usize, limit: usize },

    #[error("'{tool}' called with identical arguments {count} times")]
    LoopDetected { tool: String, count: u32 },

    #[error("no tool registered under '{0}'")]
    UnknownTool(String),

    #[error("{0}")]
    Validation(String),

    #[error("tool did not finish within {}s", .0.as_secs_f64())]
    Timeout(Duration),

    #[error("{0}")]
    Execution(String),
}

impl ToolError {
    /// Stable classification string recorded in the audit log
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PermissionDenied(_) => "permission_denied",
            Self::RateLimited { .. } => "rate_limited",
            Self::CallLimitExceeded { .. } => "call_limit_exceeded",
            Self::LoopDetected { .. } => "loop_detected",
            Self::UnknownTool(_) => "unknown_tool",
            Self::Validation(_) => "validation_error",
            Self::Timeout(_) => "timeout",
            Self::Execution(_) => "execution_error",
        }
    }

    /// `"{kind}: {message}"` form returned to callers
    pub fn to_record_string(&self) -> String {
        format!("{}: {}", self.kind(), self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_string_prefix() {
        let err = ToolError::Validation("missing required field 'path'".into());
        assert_eq!(
            err.to_record_string(),
            "validation_error: missing required field 'path'"
        );

        let err = ToolError::Timeout(Duration::from_millis(1500));
        assert_eq!(err.to_record_string(), "timeout: tool did not finish within 1.5s");
    }

    #[test]
    fn test_kinds_are_distinct() {
        let kinds = [
            ToolError::PermissionDenied("x".into()).kind(),
            ToolError::RateLimited { session: "s".into(), limit: 1 }.kind(),
            ToolError::CallLimitExceeded { made: 1, limit: 1 }.kind(),
            ToolError::LoopDetected { tool: "x".into(), count: 4 }.kind(),
            ToolError::UnknownTool("x".into()).kind(),
            ToolError::Validation("x".into()).kind(),
            ToolError::Timeout(Duration::from_secs(1)).kind(),
            ToolError::Execution("x".into()).kind(),
        ];
        let unique: std::collections::HashSet<_> = kinds.iter().collect();
        assert_eq!(unique.len(), kinds.len());
    }
}
