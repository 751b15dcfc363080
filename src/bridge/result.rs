// src/bridge/result.rs

use std::{path::PathBuf, time::Duration};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::ScriptFailure;

/// Outcome of one bridge execution.
#[derive(Debug, Clone)]
pub struct ScriptResult {
    /// Sanitized job label.
    pub label: String,
    /// Where the scratch file was written. Normally gone by the time the
    /// caller sees this.
    pub scratch_path: PathBuf,
    /// Captured stdout, trimmed. Truncated if the run was cut short.
    pub stdout: String,
    /// Captured stderr, trimmed.
    pub stderr: String,
    pub exit_code: Option<i32>,
    /// `None` on success.
    pub failure: Option<ScriptFailure>,
    /// Scratch file could not be deleted and is left for the sweep. Has no
    /// bearing on `succeeded()`.
    pub scratch_retained: bool,
    /// When the job was created, before the sweep and the scratch write.
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
}

impl ScriptResult {
    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }

    /// Text for the `error` field of a response: stderr on success, the
    /// failure reason (followed by stderr when there is any) otherwise.
    pub fn error_text(&self) -> String {
        match &self.failure {
            None => self.stderr.clone(),
            Some(failure) if self.stderr.is_empty() => failure.to_string(),
            Some(failure) => format!("{}: {}", failure, self.stderr),
        }
    }

    pub fn to_response(&self) -> ScriptResponse {
        ScriptResponse {
            success: self.succeeded(),
            output: self.stdout.clone(),
            error: self.error_text(),
        }
    }
}

/// Wire shape of a script result as seen by the UI layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptResponse {
    pub success: bool,
    pub output: String,
    pub error: String,
}
