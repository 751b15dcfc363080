// src/apps.rs

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use tracing::{error, info};

use crate::{
    bridge::{ExecOptions, ScriptBridge},
    constants::APP_INSTALL_TIMEOUT,
    errors::AppError,
    events::{emit, Event, EventSink},
};

/// winget package ids. Anything else would be spliced into a script verbatim.
static APP_ID_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9._+-]+$").expect("app id regex must compile")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum AppAction {
    Install,
    Uninstall,
    CheckInstalled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppFailure {
    pub app_id: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppBatchReport {
    pub action: AppAction,
    pub succeeded: Vec<String>,
    pub failed: Vec<AppFailure>,
}

pub fn validate_app_id(id: &str) -> Result<(), AppError> {
    if APP_ID_PATTERN.is_match(id) {
        Ok(())
    } else {
        Err(AppError::InvalidAppId(id.to_string()))
    }
}

fn validate_all(apps: &[String]) -> Result<(), AppError> {
    apps.iter().try_for_each(|app| validate_app_id(app))
}

pub fn install_command(app_id: &str) -> String {
    format!(
        "winget install {} --silent --accept-package-agreements --accept-source-agreements",
        app_id
    )
}

pub fn uninstall_command(app_id: &str) -> String {
    format!("winget uninstall {} --silent", app_id)
}

/// Which of `apps` appear in a `winget list` listing, matched as whole words
/// and ignoring case.
pub fn installed_among(listing: &str, apps: &[String]) -> Vec<String> {
    apps.iter()
        .filter(|app| {
            Regex::new(&format!(r"(?i)\b{}\b", regex::escape(app)))
                .map(|pattern| pattern.is_match(listing))
                .unwrap_or(false)
        })
        .cloned()
        .collect()
}

/// Installs and removes packages through winget, one at a time.
pub struct AppManager {
    bridge: Arc<ScriptBridge>,
    events: EventSink,
}

impl AppManager {
    pub fn new(bridge: Arc<ScriptBridge>, events: EventSink) -> Self {
        Self { bridge, events }
    }

    pub fn install(&self, apps: &[String]) -> Result<AppBatchReport, AppError> {
        self.run_batch(AppAction::Install, apps)
    }

    pub fn uninstall(&self, apps: &[String]) -> Result<AppBatchReport, AppError> {
        self.run_batch(AppAction::Uninstall, apps)
    }

    /// Runs `winget list` once and reports which of `apps` it mentions.
    pub fn check_installed(&self, apps: &[String]) -> Result<Vec<String>, AppError> {
        validate_all(apps)?;
        let result = self.bridge.execute("check-installed", "winget list");
        if !result.succeeded() {
            return Err(AppError::ListFailed(result.error_text()));
        }
        Ok(installed_among(&result.stdout, apps))
    }

    /// Every id is validated before anything runs. Individual failures are
    /// reported through events and the returned report; they do not stop the
    /// batch.
    fn run_batch(&self, action: AppAction, apps: &[String]) -> Result<AppBatchReport, AppError> {
        validate_all(apps)?;
        let options = ExecOptions::default().timeout(APP_INSTALL_TIMEOUT);
        let mut report = AppBatchReport {
            action,
            succeeded: Vec::new(),
            failed: Vec::new(),
        };

        for (index, app) in apps.iter().enumerate() {
            emit(
                &self.events,
                Event::InstallProgress {
                    app_id: app.clone(),
                    action: action.to_string(),
                    index,
                    total: apps.len(),
                },
            );

            let script = match action {
                AppAction::Uninstall => uninstall_command(app),
                _ => install_command(app),
            };
            let result = self
                .bridge
                .execute_with(&format!("{}-{}", action, app), &script, &options);

            if result.succeeded() {
                info!("{} -> {} succeeded", app, action);
                report.succeeded.push(app.clone());
            } else {
                let error = result.error_text();
                error!("{} -> {} failed: {}", app, action, error);
                emit(
                    &self.events,
                    Event::InstallError {
                        app_id: app.clone(),
                        error: error.clone(),
                    },
                );
                report.failed.push(AppFailure {
                    app_id: app.clone(),
                    error,
                });
            }
        }

        emit(
            &self.events,
            Event::InstallComplete {
                action: action.to_string(),
                succeeded: report.succeeded.len(),
                failed: report.failed.len(),
            },
        );
        Ok(report)
    }
}
