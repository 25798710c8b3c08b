//! wintrack Core
//!
//! Platform-agnostic window tracking for wintrack.
//!
//! This crate implements:
//! - Classification of top-level windows into task-switcher candidates
//! - One-shot enumeration of classified windows
//! - A foreground tracker that turns noisy OS notifications into
//!   de-duplicated "active program changed" events
//! - A cursor-confinement tracker that keeps the cursor clipped to a
//!   window while it moves
//!
//! All OS access goes through the [`WindowPrimitives`] trait, so the logic
//! here runs unchanged against the Win32 backend or an in-memory fake.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::BitOr;
use thiserror::Error;

pub mod classifier;
pub mod confinement;
pub mod enumerator;
pub mod foreground;
pub mod platform;
pub mod program;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use classifier::{classify, ClassificationOutcome, Classifier, OutcomeStatus};
pub use confinement::{ConfinementConfig, ConfinementState, ConfinementTracker, TargetChange};
pub use enumerator::{collect_outcomes, enumerate, enumerate_with, switchable_programs};
pub use foreground::{
    default_shell_executable, ActiveProgramChanged, ForegroundConfig, ForegroundState, ForegroundTracker,
};
pub use platform::{EventCallback, EventFilter, PackageMetadata, WinEvent, WinEventKind, WindowPrimitives};
pub use program::ProgramDescriptor;

/// Process identifier. Zero means unknown.
pub type ProcessId = u32;

/// Sentinel for an unresolvable process.
pub const UNKNOWN_PROCESS: ProcessId = 0;

/// Opaque identifier for a window.
///
/// On Windows this is the HWND value. A handle is never owned by wintrack
/// and may refer to a destroyed window at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WindowHandle(u64);

impl WindowHandle {
    /// The null handle.
    pub const NULL: WindowHandle = WindowHandle(0);

    /// Wrap a raw handle value.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw handle value.
    pub const fn as_raw(self) -> u64 {
        self.0
    }

    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:X}", self.0)
    }
}

impl From<u64> for WindowHandle {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

/// A rectangle in screen coordinates (pixels), stored as edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    /// Create a new rectangle from its edges.
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    /// Shrink the rectangle by the given padding on each side.
    ///
    /// Negative padding grows the rectangle. The result is not normalized.
    pub fn inset(&self, padding: ConfinementPadding) -> Rect {
        Rect {
            left: self.left + padding.left,
            top: self.top + padding.top,
            right: self.right - padding.right,
            bottom: self.bottom - padding.bottom,
        }
    }
}

/// Insets applied to a target window's rectangle to compute the
/// cursor confinement rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfinementPadding {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl ConfinementPadding {
    pub const ZERO: ConfinementPadding = ConfinementPadding::new(0, 0, 0, 0);

    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Same inset on every side.
    pub const fn uniform(value: i32) -> Self {
        Self::new(value, value, value, value)
    }
}

/// Extended window style flags relevant to classification.
///
/// Bit values match the Win32 `WS_EX_*` constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct ExtendedStyle(u32);

impl ExtendedStyle {
    /// Window is excluded from the taskbar and Alt-Tab.
    pub const TOOL_WINDOW: ExtendedStyle = ExtendedStyle(0x0000_0080);
    /// Window is forced onto the taskbar.
    pub const APP_WINDOW: ExtendedStyle = ExtendedStyle(0x0004_0000);
    /// Window does not become foreground when clicked.
    pub const NO_ACTIVATE: ExtendedStyle = ExtendedStyle(0x0800_0000);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    /// All bits of `other` are set.
    pub const fn contains(self, other: ExtendedStyle) -> bool {
        self.0 & other.0 == other.0
    }

    /// Any bit of `other` is set.
    pub const fn intersects(self, other: ExtendedStyle) -> bool {
        self.0 & other.0 != 0
    }
}

impl BitOr for ExtendedStyle {
    type Output = ExtendedStyle;

    fn bitor(self, rhs: Self) -> Self::Output {
        ExtendedStyle(self.0 | rhs.0)
    }
}

/// Errors raised by a platform backend.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("Failed to install event hook: {0}")]
    HookInstallFailed(String),

    #[error("Failed to spawn platform thread: {0}")]
    ThreadSpawnFailed(#[source] std::io::Error),
}

/// Errors that can occur when starting a tracker.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("Failed to subscribe to window events: {0}")]
    Subscribe(#[from] PlatformError),

    #[error("Window {0} has no resolvable owning process")]
    TargetUnresolved(WindowHandle),

    #[error("Failed to spawn tracker thread: {0}")]
    Spawn(#[source] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_handle_display() {
        assert_eq!(WindowHandle::from_raw(0x1A2B).to_string(), "0x1A2B");
        assert_eq!(WindowHandle::NULL.to_string(), "0x0");
        assert!(WindowHandle::NULL.is_null());
        assert!(!WindowHandle::from(7).is_null());
    }

    #[test]
    fn test_rect_dimensions() {
        let rect = Rect::new(100, 50, 900, 650);
        assert_eq!(rect.width(), 800);
        assert_eq!(rect.height(), 600);
    }

    #[test]
    fn test_rect_inset_applies_each_side() {
        let rect = Rect::new(100, 100, 500, 400);
        let padded = rect.inset(ConfinementPadding::new(1, 2, 3, 4));
        assert_eq!(padded, Rect::new(101, 102, 497, 396));
    }

    #[test]
    fn test_rect_inset_negative_padding_grows() {
        let rect = Rect::new(0, 0, 10, 10);
        assert_eq!(rect.inset(ConfinementPadding::uniform(-5)), Rect::new(-5, -5, 15, 15));
        assert_eq!(rect.inset(ConfinementPadding::ZERO), rect);
    }

    #[test]
    fn test_extended_style_flags() {
        let style = ExtendedStyle::TOOL_WINDOW | ExtendedStyle::APP_WINDOW;
        assert!(style.contains(ExtendedStyle::TOOL_WINDOW));
        assert!(style.contains(ExtendedStyle::APP_WINDOW));
        assert!(!style.contains(ExtendedStyle::NO_ACTIVATE));
        assert!(style.intersects(ExtendedStyle::NO_ACTIVATE | ExtendedStyle::TOOL_WINDOW));
        assert!(!ExtendedStyle::empty().intersects(ExtendedStyle::TOOL_WINDOW));
        assert_eq!(ExtendedStyle::from_bits(0x80), ExtendedStyle::TOOL_WINDOW);
    }

    #[test]
    fn test_padding_serde_defaults_missing_sides() {
        let padding: ConfinementPadding = serde_json::from_str(r#"{"left": 4}"#).unwrap();
        assert_eq!(padding, ConfinementPadding::new(4, 0, 0, 0));
    }
}
