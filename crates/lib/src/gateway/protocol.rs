//! Gateway HTTP wire types (execution result, callback acknowledgement).

use serde::{Deserialize, Serialize};

use crate::exec::Execution;

/// Result of one request: `{ "request_id", "output", "error", "status" }`.
/// Returned as the response body in synchronous mode, POSTed to the callback URL otherwise.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecResult {
    pub request_id: String,
    pub output: String,
    pub error: String,
    pub status: u16,
}

impl ExecResult {
    /// Handled execution; status is 200 even when the command itself failed.
    pub fn executed(request_id: impl Into<String>, execution: &Execution) -> Self {
        Self {
            request_id: request_id.into(),
            output: execution.output_lossy(),
            error: execution.error_message().to_string(),
            status: 200,
        }
    }

    /// Request rejected before anything ran.
    pub fn rejected(request_id: impl Into<String>, error: impl Into<String>, status: u16) -> Self {
        Self {
            request_id: request_id.into(),
            output: String::new(),
            error: error.into(),
            status,
        }
    }
}

/// Immediate acknowledgement in callback mode: `{ "request_id", "url" }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackAck {
    pub request_id: String,
    pub url: String,
}
