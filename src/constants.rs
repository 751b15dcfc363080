// src/constants.rs

use std::time::Duration;

/// Directory name under the platform data dir holding everything the app owns.
pub const APP_DIR_NAME: &str = "maxify";
/// Scratch directory (relative to the app dir) for temporary script files.
pub const SCRATCH_DIR_NAME: &str = "scripts";

// Bridge defaults.
pub const DEFAULT_SCRIPT_TIMEOUT: Duration = Duration::from_millis(30_000);
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024;
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(5 * 60);

/// Label used when a caller supplies nothing usable.
pub const DEFAULT_SCRIPT_LABEL: &str = "script";
/// Size of a single pipe read.
pub const PIPE_READ_CHUNK: usize = 8 * 1024;
/// How often the bridge polls for exit once both pipes are closed.
pub const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

// Auto-clean.
pub const DEFAULT_AUTO_CLEAN_INTERVAL: Duration = Duration::from_secs(60 * 60);
pub const MAX_AUTO_CLEAN_HISTORY: usize = 50;

// Telemetry.
pub const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_millis(2_000);
pub const MIN_MONITOR_INTERVAL: Duration = Duration::from_millis(250);
pub const MAX_GAME_PROCESSES: usize = 5;
pub const GAME_PROCESS_KEYWORDS: &[&str] =
    &["cs2", "valorant", "fortnite", "overwatch", "steam", "game"];

// App management.
/// winget installs can take far longer than a tweak script.
pub const APP_INSTALL_TIMEOUT: Duration = Duration::from_secs(10 * 60);
