//! Append-only audit trail of proxied tool calls.

use std::sync::Mutex;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use super::error::ToolError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    Pending,
    Success,
    Error,
}

/// One tool call as seen by the proxy.
#[derive(Debug, Clone, Serialize)]
pub struct ToolCallRecord {
    pub call_id: String,
    pub tool_name: String,
    pub args: Value,
    pub session_id: String,
    pub request_id: String,
    pub created_at: DateTime<Utc>,
    pub status: CallStatus,
    pub result_fingerprint: Option<String>,
    /// `"{kind}: {message}"`
    pub error: Option<String>,
    pub error_kind: Option<String>,
    pub duration_ms: u64,
}

impl ToolCallRecord {
    pub fn new(
        call_id: String,
        tool_name: &str,
        args: Value,
        session_id: &str,
        request_id: &str,
    ) -> Self {
        Self {
            call_id,
            tool_name: tool_name.to_string(),
            args,
            session_id: session_id.to_string(),
            request_id: request_id.to_string(),
            created_at: Utc::now(),
            status: CallStatus::Pending,
            result_fingerprint: None,
            error: None,
            error_kind: None,
            duration_ms: 0,
        }
    }
}

/// Process-wide call log. Records are only handed out as clones.
#[derive(Default)]
pub struct AuditLog {
    records: Mutex<Vec<ToolCallRecord>>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn append(&self, record: ToolCallRecord) {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(record);
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Calls already recorded for a (session, request) pair, any status
    pub fn count_for(&self, session_id: &str, request_id: &str) -> usize {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|r| r.session_id == session_id && r.request_id == request_id)
            .count()
    }

    /// All records for a (session, request) pair in append order
    pub fn trail(&self, session_id: &str, request_id: &str) -> Vec<ToolCallRecord> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|r| r.session_id == session_id && r.request_id == request_id)
            .cloned()
            .collect()
    }

    /// Ids of successful calls for a (session, request) pair
    pub fn call_ids(&self, session_id: &str, request_id: &str) -> Vec<String> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|r| {
                r.session_id == session_id
                    && r.request_id == request_id
                    && r.status == CallStatus::Success
            })
            .map(|r| r.call_id.clone())
            .collect()
    }
}

/// A call in flight. The record is appended to the log exactly once,
/// when the guard is dropped, whatever path the call took.
pub(crate) struct PendingCall<'a> {
    log: &'a AuditLog,
    record: Option<ToolCallRecord>,
    started: Instant,
}

impl<'a> PendingCall<'a> {
    pub(crate) fn start(log: &'a AuditLog, record: ToolCallRecord) -> Self {
        Self {
            log,
            record: Some(record),
            started: Instant::now(),
        }
    }

    pub(crate) fn succeed(mut self, result_fingerprint: String) {
        if let Some(record) = self.record.as_mut() {
            record.status = CallStatus::Success;
            record.result_fingerprint = Some(result_fingerprint);
        }
    }

    pub(crate) fn fail(mut self, err: &ToolError) {
        if let Some(record) = self.record.as_mut() {
            record.status = CallStatus::Error;
            record.error = Some(err.to_record_string());
            record.error_kind = Some(err.kind().to_string());
        }
    }
}

impl Drop for PendingCall<'_> {
    fn drop(&mut self) {
        if let Some(mut record) = self.record.take() {
            if record.status == CallStatus::Pending {
                record.status = CallStatus::Error;
                record.error = Some("execution_error: call abandoned before completion".into());
                record.error_kind = Some("execution_error".into());
            }
            record.duration_ms = self.started.elapsed().as_millis() as u64;
            self.log.append(record);
        }
    }
}
