// src/bridge/job.rs

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::constants::DEFAULT_SCRIPT_LABEL;

/// One request to run a script body.
#[derive(Debug, Clone)]
pub struct ScriptJob {
    /// Sanitized, human readable label. Not unique on its own.
    pub label: String,
    /// Script text, passed through to the interpreter untouched.
    pub body: String,
    /// Carried into [`ScriptResult::started_at`](super::ScriptResult::started_at).
    pub created_at: DateTime<Utc>,
    /// Time ordered unique suffix (UUIDv7) that keeps concurrent jobs with
    /// the same label apart.
    pub suffix: Uuid,
}

impl ScriptJob {
    pub fn new(name: &str, body: &str) -> Self {
        Self {
            label: sanitize_label(name),
            body: body.to_string(),
            created_at: Utc::now(),
            suffix: Uuid::now_v7(),
        }
    }

    /// Scratch file name for this job, e.g. `check-flag-<uuid>.ps1`.
    pub fn file_name(&self, extension: &str) -> String {
        format!("{}-{}.{}", self.label, self.suffix.simple(), extension)
    }
}

/// Strips everything outside `[A-Za-z0-9_-]`. An empty result becomes the
/// default label.
pub fn sanitize_label(name: &str) -> String {
    let label: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect();

    if label.is_empty() {
        DEFAULT_SCRIPT_LABEL.to_string()
    } else {
        label
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_strips_path_tricks() {
        assert_eq!(sanitize_label("../../evil name.ps1"), "evilnameps1");
        assert_eq!(sanitize_label("Install-Mozilla.Firefox"), "Install-MozillaFirefox");
        assert_eq!(sanitize_label("check_flag-2"), "check_flag-2");
    }

    #[test]
    fn test_sanitize_falls_back_to_default() {
        assert_eq!(sanitize_label(""), DEFAULT_SCRIPT_LABEL);
        assert_eq!(sanitize_label("/\\:*?"), DEFAULT_SCRIPT_LABEL);
        assert_eq!(sanitize_label("ação"), "ao");
    }

    #[test]
    fn test_same_label_gets_distinct_file_names() {
        let a = ScriptJob::new("check-flag", "");
        let b = ScriptJob::new("check-flag", "");
        assert_eq!(a.label, b.label);
        assert_ne!(a.file_name("ps1"), b.file_name("ps1"));
        assert!(a.file_name("ps1").starts_with("check-flag-"));
        assert!(a.file_name("ps1").ends_with(".ps1"));
    }
}
