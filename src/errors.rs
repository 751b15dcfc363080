// src/errors.rs

use std::time::Duration;

use thiserror::Error;

use crate::tweaks::TweakId;

/// Why a script execution did not succeed. Carried inside a `ScriptResult`,
/// never returned as an `Err` from the bridge.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScriptFailure {
    #[error("Failed to write scratch file {path}: {reason}")]
    ScratchWrite { path: String, reason: String },

    #[error("Failed to launch interpreter '{program}': {reason}")]
    Launch { program: String, reason: String },

    #[error("Script exited with {}", exit_description(.code))]
    NonZeroExit { code: Option<i32> },

    #[error("Script timed out after {}ms", .after.as_millis())]
    Timeout { after: Duration },

    #[error("Script output exceeded {limit} bytes")]
    OutputOverflow { limit: usize },

    #[error("Script execution was cancelled")]
    Cancelled,
}

fn exit_description(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => "no status (terminated by signal)".to_string(),
    }
}

#[derive(Error, Debug)]
pub enum TweakError {
    #[error("Unknown tweak id: {0}")]
    Unknown(String),

    #[error("{id} -> {action} script failed: {reason}")]
    ScriptFailed {
        id: TweakId,
        action: &'static str,
        reason: String,
    },

    #[error("{0} has no check script")]
    NotReadable(TweakId),

    #[error("{0} is not a cleanup entry")]
    NotCleanup(TweakId),

    #[error("{0} is not safe for unattended cleaning")]
    NotSafeForAuto(TweakId),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {var}: '{value}' is not a positive number")]
    InvalidNumber { var: &'static str, value: String },

    #[error("Unknown interpreter '{0}' (expected powershell, pwsh or sh)")]
    UnknownInterpreter(String),
}

#[derive(Error, Debug)]
pub enum RouterError {
    #[error("Unknown channel: {0}")]
    UnknownChannel(String),

    #[error("{0} is not supported by this host")]
    Unsupported(String),

    #[error("Invalid payload for {channel}")]
    InvalidPayload {
        channel: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid app id '{0}'")]
    InvalidAppId(String),

    #[error("Failed to list installed apps: {0}")]
    ListFailed(String),
}
