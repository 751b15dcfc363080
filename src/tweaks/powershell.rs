// src/tweaks/powershell.rs

use anyhow::Context;
use tracing::{debug, info, warn};

use crate::{
    bridge::ScriptBridge,
    errors::TweakError,
    tweaks::{TweakId, TweakMethod},
};

/// A script-based tweak: scripts to read, apply, and undo the tweak.
#[derive(Clone, Debug)]
pub struct PowershellTweak {
    /// The unique ID of the tweak
    pub id: TweakId,
    /// Script printing the current state of the tweak.
    pub check_script: Option<&'static str>,
    /// Script applying the tweak.
    pub apply_script: &'static str,
    /// Script undoing the tweak.
    pub restore_script: Option<&'static str>,
    /// Line the check script prints when the tweak is enabled (compared
    /// case-insensitively).
    pub target_state: Option<&'static str>,
}

impl PowershellTweak {
    /// Runs one of the tweak's scripts through the bridge. The job label is
    /// `<action>-<id>`, e.g. `check-fast-startup`.
    fn run(&self, bridge: &ScriptBridge, action: &'static str, script: &str) -> Result<String, TweakError> {
        let result = bridge.execute(&format!("{}-{}", action, self.id), script);
        if result.succeeded() {
            Ok(result.stdout)
        } else {
            Err(TweakError::ScriptFailed {
                id: self.id,
                action,
                reason: result.error_text(),
            })
        }
    }

    /// Reads the current state by running the check script.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(String))` with the script output if a check script is defined.
    /// - `Ok(None)` if no check script is defined.
    /// - `Err(TweakError)` if the script fails.
    pub fn read_current_state(&self, bridge: &ScriptBridge) -> Result<Option<String>, TweakError> {
        match self.check_script {
            Some(script) => {
                info!("{} -> Reading current state.", self.id);
                let output = self.run(bridge, "check", script)?;
                debug!("{} -> Check script output: {}", self.id, output);
                Ok(Some(output))
            }
            None => {
                debug!("{} -> No check script defined. Skipping read.", self.id);
                Ok(None)
            }
        }
    }
}

/// Whether any output line equals `target`, ignoring case and surrounding
/// whitespace. Whole-line matching keeps `"enabled"` from matching
/// `"disabled"`.
pub fn output_matches(output: &str, target: &str) -> bool {
    let target = target.trim();
    output
        .lines()
        .any(|line| line.trim().eq_ignore_ascii_case(target))
}

impl TweakMethod for PowershellTweak {
    /// Checks if the tweak is currently enabled by comparing the check
    /// script output with `target_state`.
    ///
    /// # Returns
    /// - `Ok(true)` if the check succeeds and the tweak is enabled.
    /// - `Ok(false)` if it is disabled, or the tweak cannot be read.
    /// - `Err(anyhow::Error)` if the check script fails.
    fn initial_state(&self, bridge: &ScriptBridge) -> anyhow::Result<bool> {
        let Some(target_state) = self.target_state else {
            warn!("{} -> No target state defined. Assuming disabled.", self.id);
            return Ok(false);
        };

        match self.read_current_state(bridge)? {
            Some(current_state) => {
                let is_enabled = output_matches(&current_state, target_state);
                debug!(
                    "{} -> Current state: '{}', Target state: '{}', Enabled: {}",
                    self.id, current_state, target_state, is_enabled
                );
                Ok(is_enabled)
            }
            None => {
                warn!("{} -> No check script defined. Assuming disabled.", self.id);
                Ok(false)
            }
        }
    }

    fn apply(&self, bridge: &ScriptBridge) -> anyhow::Result<String> {
        info!("{} -> Applying tweak.", self.id);
        let output = self
            .run(bridge, "apply", self.apply_script)
            .with_context(|| format!("{} -> Failed to apply tweak", self.id))?;
        debug!("{} -> Apply script output: {}", self.id, output);
        Ok(output)
    }

    fn revert(&self, bridge: &ScriptBridge) -> anyhow::Result<()> {
        let Some(script) = self.restore_script else {
            warn!("{} -> No restore script defined. Skipping revert.", self.id);
            return Ok(());
        };

        info!("{} -> Reverting tweak.", self.id);
        let output = self
            .run(bridge, "restore", script)
            .with_context(|| format!("{} -> Failed to revert tweak", self.id))?;
        debug!("{} -> Restore script output: {}", self.id, output);
        Ok(())
    }

    fn readable(&self) -> bool {
        self.check_script.is_some() && self.target_state.is_some()
    }

    fn reversible(&self) -> bool {
        self.restore_script.is_some()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::bridge::{bridge_at, Interpreter};

    fn sh_bridge() -> (TempDir, ScriptBridge) {
        let tmp = TempDir::new().unwrap();
        let bridge = bridge_at(tmp.path(), Interpreter::posix_shell());
        (tmp, bridge)
    }

    fn toggle(check: &'static str) -> PowershellTweak {
        PowershellTweak {
            id: TweakId::FastStartup,
            check_script: Some(check),
            apply_script: "echo applied",
            restore_script: Some("echo restored"),
            target_state: Some("Enabled"),
        }
    }

    #[test]
    fn test_output_matches_whole_lines() {
        assert!(output_matches("enabled", "Enabled"));
        assert!(output_matches("noise\n  ENABLED  \n", "enabled"));
        assert!(!output_matches("disabled", "enabled"));
        assert!(!output_matches("", "enabled"));
    }

    #[test]
    fn test_initial_state_reads_check_output() {
        let (_tmp, bridge) = sh_bridge();
        assert!(toggle("echo enabled").initial_state(&bridge).unwrap());
        assert!(!toggle("echo disabled").initial_state(&bridge).unwrap());
    }

    #[test]
    fn test_initial_state_propagates_check_failure() {
        let (_tmp, bridge) = sh_bridge();
        let err = toggle("echo broken >&2; exit 3").initial_state(&bridge).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("check"), "{}", message);
        assert!(message.contains("broken"), "{}", message);
    }

    #[test]
    fn test_apply_and_revert_run_scripts() {
        let (_tmp, bridge) = sh_bridge();
        let tweak = toggle("echo enabled");
        assert_eq!(tweak.apply(&bridge).unwrap(), "applied");
        assert!(tweak.revert(&bridge).is_ok());
    }

    #[test]
    fn test_action_only_tweak() {
        let (_tmp, bridge) = sh_bridge();
        let action = PowershellTweak {
            id: TweakId::FlushDnsCache,
            check_script: None,
            apply_script: "exit 1",
            restore_script: None,
            target_state: None,
        };
        assert!(!action.readable());
        assert!(!action.reversible());
        assert!(!action.initial_state(&bridge).unwrap());
        assert!(action.revert(&bridge).is_ok());
        assert!(action.apply(&bridge).is_err());
    }
}
