//! Test utilities: an in-memory platform backend.
//!
//! Only compiled in test builds, or for other crates' tests through the
//! `test-utils` feature.

use crate::platform::{EventCallback, EventFilter, PackageMetadata, WinEvent, WindowPrimitives};
use crate::{ExtendedStyle, PlatformError, ProcessId, Rect, WindowHandle};
use std::collections::{HashMap, HashSet};
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// State of a fake window.
#[derive(Debug, Clone, Default)]
pub struct FakeWindow {
    pub process_id: ProcessId,
    pub visible: bool,
    pub cloaked: bool,
    pub hung: bool,
    pub style: ExtendedStyle,
    pub rect: Option<Rect>,
    pub title: String,
    pub class_name: String,
}

impl FakeWindow {
    /// A visible, uncloaked, responsive window owned by `process_id`.
    pub fn app(process_id: ProcessId) -> Self {
        Self {
            process_id,
            visible: true,
            ..Self::default()
        }
    }

    pub fn invisible(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn cloaked(mut self) -> Self {
        self.cloaked = true;
        self
    }

    pub fn hung(mut self) -> Self {
        self.hung = true;
        self
    }

    pub fn with_style(mut self, style: ExtendedStyle) -> Self {
        self.style = style;
        self
    }

    pub fn with_rect(mut self, rect: Rect) -> Self {
        self.rect = Some(rect);
        self
    }

    pub fn with_title(mut self, title: &str) -> Self {
        self.title = title.to_string();
        self
    }
}

struct FakeSubscriptionEntry {
    filter: EventFilter,
    callback: Arc<EventCallback>,
    active: Arc<AtomicBool>,
}

#[derive(Default)]
struct FakeState {
    windows: HashMap<WindowHandle, FakeWindow>,
    top_level: Vec<WindowHandle>,
    children: HashMap<WindowHandle, Vec<WindowHandle>>,
    processes: HashMap<ProcessId, String>,
    missing_files: HashSet<PathBuf>,
    descriptions: HashMap<PathBuf, String>,
    packages: HashMap<PathBuf, PackageMetadata>,
    foreground: Option<WindowHandle>,
    clip_calls: Vec<Option<Rect>>,
    subscriptions: Vec<FakeSubscriptionEntry>,
    fail_subscribe: bool,
}

/// In-memory implementation of [`WindowPrimitives`].
///
/// Unknown handles behave like destroyed windows: every query returns its
/// default value.
pub struct FakePlatform {
    self_pid: ProcessId,
    state: Mutex<FakeState>,
}

/// Subscription handle returned by [`FakePlatform::subscribe`].
pub struct FakeSubscription {
    active: Arc<AtomicBool>,
}

impl Drop for FakeSubscription {
    fn drop(&mut self) {
        self.active.store(false, Ordering::SeqCst);
    }
}

impl FakePlatform {
    pub fn new(self_pid: ProcessId) -> Self {
        Self {
            self_pid,
            state: Mutex::new(FakeState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add_process(&self, process_id: ProcessId, path: &str) {
        self.state().processes.insert(process_id, path.to_string());
    }

    /// Add a top-level window, appended to the enumeration order.
    pub fn add_window(&self, handle: WindowHandle, window: FakeWindow) {
        let mut state = self.state();
        state.windows.insert(handle, window);
        state.top_level.push(handle);
    }

    pub fn add_child(&self, parent: WindowHandle, child: WindowHandle, window: FakeWindow) {
        let mut state = self.state();
        state.windows.insert(child, window);
        state.children.entry(parent).or_default().push(child);
    }

    /// Forget a window, as if it was destroyed.
    pub fn remove_window(&self, handle: WindowHandle) {
        let mut state = self.state();
        state.windows.remove(&handle);
        state.top_level.retain(|h| *h != handle);
    }

    pub fn mark_missing(&self, path: &str) {
        self.state().missing_files.insert(PathBuf::from(path));
    }

    pub fn set_file_description(&self, path: &str, description: &str) {
        self.state()
            .descriptions
            .insert(PathBuf::from(path), description.to_string());
    }

    pub fn add_package(&self, install_dir: &str, metadata: PackageMetadata) {
        self.state().packages.insert(PathBuf::from(install_dir), metadata);
    }

    pub fn set_foreground(&self, handle: Option<WindowHandle>) {
        self.state().foreground = handle;
    }

    pub fn set_rect(&self, handle: WindowHandle, rect: Option<Rect>) {
        if let Some(window) = self.state().windows.get_mut(&handle) {
            window.rect = rect;
        }
    }

    pub fn set_hung(&self, handle: WindowHandle, hung: bool) {
        if let Some(window) = self.state().windows.get_mut(&handle) {
            window.hung = hung;
        }
    }

    /// Make every following `subscribe` call fail.
    pub fn fail_subscriptions(&self) {
        self.state().fail_subscribe = true;
    }

    /// Every cursor clip applied so far, in order.
    pub fn clip_calls(&self) -> Vec<Option<Rect>> {
        self.state().clip_calls.clone()
    }

    pub fn last_clip(&self) -> Option<Option<Rect>> {
        self.state().clip_calls.last().copied()
    }

    pub fn active_subscriptions(&self) -> usize {
        self.state()
            .subscriptions
            .iter()
            .filter(|s| s.active.load(Ordering::SeqCst))
            .count()
    }

    /// Filters of the subscriptions that are still active.
    pub fn active_filters(&self) -> Vec<EventFilter> {
        self.state()
            .subscriptions
            .iter()
            .filter(|s| s.active.load(Ordering::SeqCst))
            .map(|s| s.filter)
            .collect()
    }

    /// Deliver an event to every active subscription whose filter matches.
    pub fn emit(&self, event: WinEvent) {
        let targets = self.matching_callbacks(&event, false);
        for callback in targets {
            callback(event);
        }
    }

    /// Deliver an event even to unsubscribed callbacks, simulating a
    /// notification that was already in flight when unsubscribing.
    pub fn emit_stale(&self, event: WinEvent) {
        let targets = self.matching_callbacks(&event, true);
        for callback in targets {
            callback(event);
        }
    }

    fn matching_callbacks(&self, event: &WinEvent, include_inactive: bool) -> Vec<Arc<EventCallback>> {
        let state = self.state();
        let owner = state.windows.get(&event.handle).map(|w| w.process_id);
        state
            .subscriptions
            .iter()
            .filter(|s| include_inactive || s.active.load(Ordering::SeqCst))
            .filter(|s| s.filter.covers(event.kind.as_raw()))
            .filter(|s| s.filter.process.is_none() || s.filter.process == owner)
            .map(|s| Arc::clone(&s.callback))
            .collect()
    }

    fn window<T: Default>(&self, handle: WindowHandle, f: impl FnOnce(&FakeWindow) -> T) -> T {
        self.state().windows.get(&handle).map(f).unwrap_or_default()
    }

    fn descendants(&self, parent: WindowHandle) -> Vec<WindowHandle> {
        let state = self.state();
        let mut result = Vec::new();
        let mut stack: Vec<WindowHandle> = state
            .children
            .get(&parent)
            .map(|c| c.iter().rev().copied().collect())
            .unwrap_or_default();
        while let Some(handle) = stack.pop() {
            result.push(handle);
            if let Some(children) = state.children.get(&handle) {
                stack.extend(children.iter().rev().copied());
            }
        }
        result
    }
}

impl WindowPrimitives for FakePlatform {
    type Subscription = FakeSubscription;

    fn current_process_id(&self) -> ProcessId {
        self.self_pid
    }

    fn owning_process_id(&self, handle: WindowHandle) -> ProcessId {
        self.window(handle, |w| w.process_id)
    }

    fn is_visible(&self, handle: WindowHandle) -> bool {
        self.window(handle, |w| w.visible)
    }

    fn is_cloaked(&self, handle: WindowHandle) -> bool {
        self.window(handle, |w| w.cloaked)
    }

    fn is_hung(&self, handle: WindowHandle) -> bool {
        self.window(handle, |w| w.hung)
    }

    fn extended_style(&self, handle: WindowHandle) -> ExtendedStyle {
        self.window(handle, |w| w.style)
    }

    fn screen_rect(&self, handle: WindowHandle) -> Option<Rect> {
        self.window(handle, |w| w.rect)
    }

    fn foreground_window(&self) -> Option<WindowHandle> {
        self.state().foreground
    }

    fn window_title(&self, handle: WindowHandle) -> String {
        self.window(handle, |w| w.title.clone())
    }

    fn class_name(&self, handle: WindowHandle) -> String {
        self.window(handle, |w| w.class_name.clone())
    }

    fn executable_path(&self, process_id: ProcessId) -> String {
        self.state().processes.get(&process_id).cloned().unwrap_or_default()
    }

    fn visit_child_windows(
        &self,
        parent: WindowHandle,
        visitor: &mut dyn FnMut(WindowHandle) -> ControlFlow<()>,
    ) {
        for child in self.descendants(parent) {
            if visitor(child).is_break() {
                break;
            }
        }
    }

    fn visit_top_level_windows(&self, visitor: &mut dyn FnMut(WindowHandle) -> ControlFlow<()>) {
        let handles = self.state().top_level.clone();
        for handle in handles {
            if visitor(handle).is_break() {
                break;
            }
        }
    }

    fn subscribe(
        &self,
        filter: EventFilter,
        callback: EventCallback,
    ) -> Result<FakeSubscription, PlatformError> {
        let mut state = self.state();
        if state.fail_subscribe {
            return Err(PlatformError::HookInstallFailed("fake subscription failure".to_string()));
        }
        let active = Arc::new(AtomicBool::new(true));
        state.subscriptions.push(FakeSubscriptionEntry {
            filter,
            callback: Arc::new(callback),
            active: Arc::clone(&active),
        });
        Ok(FakeSubscription { active })
    }

    fn apply_cursor_clip(&self, rect: Option<Rect>) {
        self.state().clip_calls.push(rect);
    }

    fn executable_exists(&self, path: &Path) -> bool {
        !self.state().missing_files.contains(path)
    }

    fn package_metadata(&self, install_dir: &Path) -> Option<PackageMetadata> {
        self.state().packages.get(install_dir).cloned()
    }

    fn file_description(&self, path: &Path) -> Option<String> {
        self.state().descriptions.get(path).cloned()
    }
}

/// Poll `condition` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}
