// src/utils.rs

#[cfg(windows)]
pub mod windows;

/// Whether the process runs with administrator rights. Always `false` off
/// Windows, where nothing here needs elevation.
pub fn is_elevated() -> bool {
    #[cfg(windows)]
    {
        self::windows::is_elevated()
    }
    #[cfg(not(windows))]
    {
        false
    }
}
