//! The contract a platform backend must fulfil.
//!
//! Every query here is infallible from the caller's point of view: a dead
//! handle, a denied process or any other OS failure yields an empty or
//! default value. Window state changes faster than error handling could
//! react, so partial information is always preferred over aborting.

use crate::{ExtendedStyle, PlatformError, ProcessId, Rect, WindowHandle};
use std::ops::ControlFlow;
use std::path::Path;

/// `EVENT_SYSTEM_FOREGROUND`
pub const EVENT_SYSTEM_FOREGROUND: u32 = 0x0003;
/// `EVENT_SYSTEM_MINIMIZEEND`
pub const EVENT_SYSTEM_MINIMIZEEND: u32 = 0x0017;
/// `EVENT_OBJECT_DESTROY`
pub const EVENT_OBJECT_DESTROY: u32 = 0x8001;
/// `EVENT_OBJECT_LOCATIONCHANGE`
pub const EVENT_OBJECT_LOCATIONCHANGE: u32 = 0x800B;

/// Object id identifying the window itself rather than one of its parts.
pub const OBJID_WINDOW: i32 = 0;

/// Kind of an OS window notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WinEventKind {
    /// The foreground window changed.
    Foreground,
    /// A window was restored from minimized state.
    MinimizeEnd,
    /// A window (or one of its objects) was destroyed.
    ObjectDestroy,
    /// A window moved or was resized.
    LocationChange,
    /// Any other event code inside a subscribed range.
    Other(u32),
}

impl WinEventKind {
    pub fn from_raw(code: u32) -> Self {
        match code {
            EVENT_SYSTEM_FOREGROUND => Self::Foreground,
            EVENT_SYSTEM_MINIMIZEEND => Self::MinimizeEnd,
            EVENT_OBJECT_DESTROY => Self::ObjectDestroy,
            EVENT_OBJECT_LOCATIONCHANGE => Self::LocationChange,
            other => Self::Other(other),
        }
    }

    pub fn as_raw(self) -> u32 {
        match self {
            Self::Foreground => EVENT_SYSTEM_FOREGROUND,
            Self::MinimizeEnd => EVENT_SYSTEM_MINIMIZEEND,
            Self::ObjectDestroy => EVENT_OBJECT_DESTROY,
            Self::LocationChange => EVENT_OBJECT_LOCATIONCHANGE,
            Self::Other(code) => code,
        }
    }
}

/// A window notification delivered by a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WinEvent {
    pub kind: WinEventKind,
    pub handle: WindowHandle,
    /// Zero when the event concerns the window itself.
    pub object_id: i32,
    pub child_id: i32,
    /// OS timestamp of the event in milliseconds. Wraps around.
    pub timestamp_ms: u32,
}

impl WinEvent {
    /// A window-level event (object id zero).
    pub fn window(kind: WinEventKind, handle: WindowHandle, timestamp_ms: u32) -> Self {
        Self {
            kind,
            handle,
            object_id: OBJID_WINDOW,
            child_id: 0,
            timestamp_ms,
        }
    }

    /// Whether the event concerns a whole, non-null window.
    pub fn is_window_event(&self) -> bool {
        self.object_id == OBJID_WINDOW && !self.handle.is_null()
    }
}

/// Which notifications a subscription receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventFilter {
    /// Lowest raw event code, inclusive.
    pub min: u32,
    /// Highest raw event code, inclusive.
    pub max: u32,
    /// Restrict to windows of one process. `None` means every process.
    pub process: Option<ProcessId>,
}

impl EventFilter {
    pub fn range(min: WinEventKind, max: WinEventKind) -> Self {
        Self {
            min: min.as_raw(),
            max: max.as_raw(),
            process: None,
        }
    }

    pub fn for_process(mut self, process_id: ProcessId) -> Self {
        self.process = Some(process_id);
        self
    }

    /// Whether a raw event code falls inside the range.
    pub fn covers(&self, code: u32) -> bool {
        (self.min..=self.max).contains(&code)
    }
}

/// Callback invoked by a subscription, possibly on a foreign thread.
pub type EventCallback = Box<dyn Fn(WinEvent) + Send + Sync + 'static>;

/// Display metadata of an installed application package.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageMetadata {
    pub display_name: String,
    pub executable: String,
    pub logo: Option<String>,
}

/// OS window primitives consumed by the core.
pub trait WindowPrimitives: Send + Sync + 'static {
    /// Handle for an active event subscription. Dropping it unsubscribes.
    type Subscription: Send + 'static;

    /// Process id of the calling process.
    fn current_process_id(&self) -> ProcessId {
        std::process::id()
    }

    /// Process owning the window, or zero.
    fn owning_process_id(&self, handle: WindowHandle) -> ProcessId;

    /// Whether the window has the visible style.
    fn is_visible(&self, handle: WindowHandle) -> bool;

    /// Whether the compositor hides the window (e.g. another virtual desktop).
    fn is_cloaked(&self, handle: WindowHandle) -> bool;

    /// Whether the OS considers the window not responding.
    fn is_hung(&self, handle: WindowHandle) -> bool;

    fn extended_style(&self, handle: WindowHandle) -> ExtendedStyle;

    /// Screen rectangle of the window.
    fn screen_rect(&self, handle: WindowHandle) -> Option<Rect>;

    /// The window currently receiving user input, if any.
    fn foreground_window(&self) -> Option<WindowHandle>;

    fn window_title(&self, handle: WindowHandle) -> String;

    fn class_name(&self, handle: WindowHandle) -> String;

    /// Full path of the process executable, or an empty string.
    fn executable_path(&self, process_id: ProcessId) -> String;

    /// Visit the descendants of `parent` until the visitor breaks.
    fn visit_child_windows(
        &self,
        parent: WindowHandle,
        visitor: &mut dyn FnMut(WindowHandle) -> ControlFlow<()>,
    );

    /// Visit top-level windows in OS order until the visitor breaks.
    fn visit_top_level_windows(&self, visitor: &mut dyn FnMut(WindowHandle) -> ControlFlow<()>);

    /// Deliver notifications matching `filter` to `callback`.
    fn subscribe(
        &self,
        filter: EventFilter,
        callback: EventCallback,
    ) -> Result<Self::Subscription, PlatformError>;

    /// Confine the cursor to `rect`, or release it with `None`.
    fn apply_cursor_clip(&self, rect: Option<Rect>);

    fn executable_exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    /// Package metadata for an install directory, if it holds a package.
    fn package_metadata(&self, _install_dir: &Path) -> Option<PackageMetadata> {
        None
    }

    /// Human-readable description embedded in an executable.
    fn file_description(&self, _path: &Path) -> Option<String> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_raw_mapping() {
        for kind in [
            WinEventKind::Foreground,
            WinEventKind::MinimizeEnd,
            WinEventKind::ObjectDestroy,
            WinEventKind::LocationChange,
        ] {
            assert_eq!(WinEventKind::from_raw(kind.as_raw()), kind);
        }
        assert_eq!(WinEventKind::from_raw(0x8002), WinEventKind::Other(0x8002));
    }

    #[test]
    fn test_event_filter_range() {
        let filter = EventFilter::range(WinEventKind::ObjectDestroy, WinEventKind::LocationChange)
            .for_process(42);
        assert!(filter.covers(EVENT_OBJECT_DESTROY));
        assert!(filter.covers(EVENT_OBJECT_LOCATIONCHANGE));
        assert!(filter.covers(0x8005));
        assert!(!filter.covers(EVENT_SYSTEM_FOREGROUND));
        assert_eq!(filter.process, Some(42));
    }

    #[test]
    fn test_window_event_requires_object_zero_and_handle() {
        let handle = WindowHandle::from_raw(10);
        let event = WinEvent::window(WinEventKind::Foreground, handle, 0);
        assert!(event.is_window_event());

        let part = WinEvent {
            object_id: -4,
            ..event
        };
        assert!(!part.is_window_event());

        let null = WinEvent::window(WinEventKind::Foreground, WindowHandle::NULL, 0);
        assert!(!null.is_window_event());
    }
}
