// src/tweaks/mod.rs

pub mod definitions;
pub mod method;
pub mod powershell;

use std::{fmt, str::FromStr, sync::Arc};

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

pub use method::TweakMethod;
pub use powershell::PowershellTweak;

use crate::errors::TweakError;

/// Stable identifier of a catalog entry. The kebab-case form (`fast-startup`)
/// is what travels over the wire and what job labels are built from.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum TweakId {
    StorageSense,
    FastStartup,
    UltimatePerformancePlan,
    WindowsUpdateManual,
    FlushDnsCache,
    RestartAudioService,
    ResetNetworkStack,
    TempFiles,
    Prefetch,
    RecycleBin,
    WindowsUpdateCache,
    ThumbnailCache,
    BrowserCache,
    OldLogs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum TweakCategory {
    System,
    Power,
    Network,
    Services,
    Cleanup,
}

/// Represents a single catalog entry that can be applied to the system.
#[derive(Clone)]
pub struct Tweak {
    /// Unique identifier for the tweak.
    pub id: TweakId,
    pub name: &'static str,
    pub description: &'static str,
    pub category: TweakCategory,
    pub method: Arc<dyn TweakMethod>,
    /// Whether the tweak requires restarting the system to take effect.
    pub requires_reboot: bool,
    /// Cleanup entries only: may be run by the scheduled auto-clean.
    pub safe_for_auto: bool,
}

impl fmt::Debug for Tweak {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tweak")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("category", &self.category)
            .field("requires_reboot", &self.requires_reboot)
            .field("safe_for_auto", &self.safe_for_auto)
            .finish_non_exhaustive()
    }
}

impl Tweak {
    /// A toggle backed by check, apply and restore scripts.
    pub fn powershell_tweak(
        name: &'static str,
        description: &'static str,
        category: TweakCategory,
        method: PowershellTweak,
        requires_reboot: bool,
    ) -> Self {
        Self {
            id: method.id,
            name,
            description,
            category,
            method: Arc::new(method),
            requires_reboot,
            safe_for_auto: false,
        }
    }

    /// A one-shot action with nothing to read back or undo.
    pub fn action(
        id: TweakId,
        name: &'static str,
        description: &'static str,
        category: TweakCategory,
        script: &'static str,
    ) -> Self {
        Self::powershell_tweak(
            name,
            description,
            category,
            Self::apply_only(id, script),
            false,
        )
    }

    /// A cleanup entry. The script must print the number of bytes it freed.
    pub fn cleanup(
        id: TweakId,
        name: &'static str,
        description: &'static str,
        script: &'static str,
        safe_for_auto: bool,
    ) -> Self {
        let mut tweak = Self::powershell_tweak(
            name,
            description,
            TweakCategory::Cleanup,
            Self::apply_only(id, script),
            false,
        );
        tweak.safe_for_auto = safe_for_auto;
        tweak
    }

    fn apply_only(id: TweakId, script: &'static str) -> PowershellTweak {
        PowershellTweak {
            id,
            check_script: None,
            apply_script: script,
            restore_script: None,
            target_state: None,
        }
    }

    pub fn is_readable(&self) -> bool {
        self.method.readable()
    }

    pub fn is_reversible(&self) -> bool {
        self.method.reversible()
    }

    pub fn is_cleanup(&self) -> bool {
        self.category == TweakCategory::Cleanup
    }

    pub fn info(&self) -> TweakInfo {
        TweakInfo {
            id: self.id,
            name: self.name,
            description: self.description,
            category: self.category,
            requires_reboot: self.requires_reboot,
            readable: self.is_readable(),
            reversible: self.is_reversible(),
            safe_for_auto: self.safe_for_auto,
        }
    }
}

/// Serializable summary of a catalog entry, as listed to the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TweakInfo {
    pub id: TweakId,
    pub name: &'static str,
    pub description: &'static str,
    pub category: TweakCategory,
    pub requires_reboot: bool,
    pub readable: bool,
    pub reversible: bool,
    pub safe_for_auto: bool,
}

static CATALOG: Lazy<IndexMap<TweakId, Tweak>> = Lazy::new(|| {
    definitions::all_definitions()
        .into_iter()
        .map(|tweak| (tweak.id, tweak))
        .collect()
});

/// Every known entry, in definition order.
pub fn catalog() -> &'static IndexMap<TweakId, Tweak> {
    &CATALOG
}

pub fn get(id: TweakId) -> Result<&'static Tweak, TweakError> {
    CATALOG
        .get(&id)
        .ok_or_else(|| TweakError::Unknown(id.to_string()))
}

/// Looks an entry up by its wire id, e.g. `"flush-dns-cache"`.
pub fn find(id: &str) -> Result<&'static Tweak, TweakError> {
    let parsed = TweakId::from_str(id.trim()).map_err(|_| TweakError::Unknown(id.to_string()))?;
    get(parsed)
}

pub fn cleanups() -> impl Iterator<Item = &'static Tweak> {
    CATALOG.values().filter(|tweak| tweak.is_cleanup())
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn test_every_id_has_exactly_one_entry() {
        assert_eq!(catalog().len(), TweakId::iter().count());
        for id in TweakId::iter() {
            assert_eq!(get(id).unwrap().id, id);
        }
    }

    #[test]
    fn test_find_by_wire_id() {
        assert_eq!(find("flush-dns-cache").unwrap().id, TweakId::FlushDnsCache);
        assert_eq!(find(" fast-startup ").unwrap().id, TweakId::FastStartup);
        assert!(matches!(find("FlushDnsCache"), Err(TweakError::Unknown(_))));
        assert!(matches!(find("nope"), Err(TweakError::Unknown(_))));
    }

    #[test]
    fn test_kinds_of_entries() {
        let toggle = get(TweakId::StorageSense).unwrap();
        assert!(toggle.is_readable() && toggle.is_reversible() && !toggle.is_cleanup());

        let action = get(TweakId::RestartAudioService).unwrap();
        assert!(!action.is_readable() && !action.is_reversible());

        assert!(get(TweakId::ResetNetworkStack).unwrap().requires_reboot);
    }

    #[test]
    fn test_cleanup_auto_safety() {
        let unsafe_ids: Vec<TweakId> = cleanups()
            .filter(|tweak| !tweak.safe_for_auto)
            .map(|tweak| tweak.id)
            .collect();
        assert_eq!(unsafe_ids, vec![TweakId::RecycleBin]);
        assert!(cleanups().any(|tweak| tweak.id == TweakId::TempFiles));
        assert!(catalog()
            .values()
            .filter(|tweak| !tweak.is_cleanup())
            .all(|tweak| !tweak.safe_for_auto));
    }

    #[test]
    fn test_info_json_shape() {
        let json = serde_json::to_value(get(TweakId::FastStartup).unwrap().info()).unwrap();
        assert_eq!(json["id"], "fast-startup");
        assert_eq!(json["category"], "power");
        assert_eq!(json["requiresReboot"], true);
        assert_eq!(json["readable"], true);
        assert_eq!(json["safeForAuto"], false);
    }
}
