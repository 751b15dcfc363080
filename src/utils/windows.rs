// src/utils/windows.rs

use windows::Win32::{
    Foundation::{CloseHandle, HANDLE},
    Security::{GetTokenInformation, TokenElevation, TOKEN_ELEVATION, TOKEN_QUERY},
    System::Threading::{GetCurrentProcess, OpenProcessToken},
};

/// Closes a process token when dropped.
struct TokenGuard {
    handle: HANDLE,
}

impl Drop for TokenGuard {
    fn drop(&mut self) {
        if !self.handle.is_invalid() {
            if let Err(e) = unsafe { CloseHandle(self.handle) } {
                tracing::warn!("CloseHandle failed on process token: {}", e);
            }
        }
    }
}

/// Checks if the current process is running with elevated (administrator) privileges.
///
/// # Returns
///
/// - `true` if the process is elevated.
/// - `false` otherwise, or if the token cannot be queried.
pub fn is_elevated() -> bool {
    let mut handle = HANDLE::default();
    if unsafe { OpenProcessToken(GetCurrentProcess(), TOKEN_QUERY, &mut handle) }.is_err() {
        return false;
    }
    let token = TokenGuard { handle };

    let mut elevation = TOKEN_ELEVATION::default();
    let size = std::mem::size_of::<TOKEN_ELEVATION>() as u32;
    let mut returned = 0u32;
    let queried = unsafe {
        GetTokenInformation(
            token.handle,
            TokenElevation,
            Some(&mut elevation as *mut _ as *mut _),
            size,
            &mut returned,
        )
    };
    queried.is_ok() && elevation.TokenIsElevated != 0
}
