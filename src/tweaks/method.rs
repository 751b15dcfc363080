// src/tweaks/method.rs

use anyhow::Error;

use crate::bridge::ScriptBridge;

/// Trait defining the behavior for all tweak methods.
pub trait TweakMethod: Send + Sync {
    /// Checks if the tweak is currently enabled.
    fn initial_state(&self, bridge: &ScriptBridge) -> Result<bool, Error>;

    /// Applies the tweak, returning whatever the script printed.
    fn apply(&self, bridge: &ScriptBridge) -> Result<String, Error>;

    /// Reverts the tweak.
    fn revert(&self, bridge: &ScriptBridge) -> Result<(), Error>;

    /// Whether `initial_state` can actually observe the system.
    fn readable(&self) -> bool;

    /// Whether `revert` does anything.
    fn reversible(&self) -> bool;
}
