//! wintrack Platform Win32
//!
//! Windows implementation of the wintrack window primitives.
//!
//! This crate handles:
//! - Window queries (owner process, visibility, DWM cloaking, hang state, styles)
//! - Process executable lookup via QueryFullProcessImageNameW
//! - Window enumeration via EnumWindows / EnumChildWindows
//! - WinEvent hooks running on dedicated message-loop threads
//! - Cursor confinement via ClipCursor
//! - Package manifest metadata, with `ms-resource:` strings loaded via SHLoadIndirectString
//! - File descriptions from executable version resources
//!
//! Everything except the manifest reader is only available on Windows.

use thiserror::Error;
use wintrack_core::PlatformError;

#[cfg(windows)]
pub mod hook;
pub mod manifest;
#[cfg(windows)]
pub mod platform;

#[cfg(windows)]
pub use platform::Win32Platform;

/// Errors that can occur during Win32 operations.
#[derive(Debug, Error)]
pub enum Win32Error {
    #[error("Failed to install event hook: {0}")]
    HookInstallFailed(String),

    #[error("Failed to spawn hook thread: {0}")]
    ThreadSpawnFailed(#[source] std::io::Error),
}

impl From<Win32Error> for PlatformError {
    fn from(err: Win32Error) -> Self {
        match err {
            Win32Error::HookInstallFailed(reason) => PlatformError::HookInstallFailed(reason),
            Win32Error::ThreadSpawnFailed(e) => PlatformError::ThreadSpawnFailed(e),
        }
    }
}
