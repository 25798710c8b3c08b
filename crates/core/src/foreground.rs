//! Foreground tracking.
//!
//! Raw OS notifications about foreground changes are noisy: the same window
//! can trigger several events in a row, frozen applications are replaced by
//! ghost windows, and the shell raises its own overlays during Alt-Tab. The
//! [`ForegroundTracker`] turns that stream into one [`ActiveProgramChanged`]
//! per real switch, with a periodic poll covering notification gaps.
//!
//! The tracker runs a dedicated worker thread that exclusively owns the
//! [`ForegroundState`] and the OS subscription. Notifications are forwarded
//! to the worker through a channel; the poll is the worker's receive
//! timeout. No state is shared with the calling thread.

use crate::platform::{EventFilter, WinEvent, WinEventKind, WindowPrimitives};
use crate::program::{find_hosted_executable, is_host_shell, DEFAULT_HOST_SHELL};
use crate::{ExtendedStyle, ProcessId, TrackerError, WindowHandle};
use std::path::Path;
use std::sync::mpsc::{self, RecvTimeoutError, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Default interval of the fallback poll.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Path of the OS shell executable, `%SystemRoot%\explorer.exe`.
pub fn default_shell_executable() -> String {
    let root = std::env::var("SystemRoot").unwrap_or_else(|_| r"C:\Windows".to_string());
    Path::new(&root).join("explorer.exe").to_string_lossy().into_owned()
}

/// Foreground tracker settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForegroundConfig {
    /// Time without notifications after which the foreground is polled.
    pub poll_interval: Duration,
    /// Executable stem of the host shell whose children carry the real UI.
    pub host_shell_name: String,
    /// Executables whose tool windows are never reported (Alt-Tab overlays).
    pub suppressed_tool_window_owners: Vec<String>,
}

impl Default for ForegroundConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            host_shell_name: DEFAULT_HOST_SHELL.to_string(),
            suppressed_tool_window_owners: vec![default_shell_executable()],
        }
    }
}

/// A new window became the active program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveProgramChanged {
    pub handle: WindowHandle,
    /// Owner of `handle`. Zero when it could not be resolved.
    pub process_id: ProcessId,
    /// Executable of the program, after host-shell substitution. May be empty.
    pub path: String,
    /// Whether the change was found by the fallback poll.
    pub from_timer: bool,
    /// Time since the previous qualifying notification. Zero for polls.
    pub elapsed: Duration,
}

/// De-duplication and filtering state of a foreground tracker.
#[derive(Debug)]
pub struct ForegroundState {
    config: ForegroundConfig,
    last_handle: Option<WindowHandle>,
    last_event_ms: Option<u32>,
}

impl ForegroundState {
    pub fn new(config: ForegroundConfig) -> Self {
        Self {
            config,
            last_handle: None,
            last_event_ms: None,
        }
    }

    pub fn last_handle(&self) -> Option<WindowHandle> {
        self.last_handle
    }

    /// Forget the last-seen handle and event time.
    pub fn reset(&mut self) {
        self.last_handle = None;
        self.last_event_ms = None;
    }

    /// Whether a notification concerns a foreground switch of a whole window.
    pub fn qualifies(event: &WinEvent) -> bool {
        matches!(event.kind, WinEventKind::Foreground | WinEventKind::MinimizeEnd)
            && event.is_window_event()
    }

    /// Handle an OS notification.
    pub fn on_notification<P: WindowPrimitives + ?Sized>(
        &mut self,
        platform: &P,
        event: &WinEvent,
    ) -> Option<ActiveProgramChanged> {
        if !Self::qualifies(event) {
            return None;
        }

        // Event timestamps wrap around after ~49 days
        let elapsed = match self.last_event_ms.replace(event.timestamp_ms) {
            Some(previous) => Duration::from_millis(u64::from(event.timestamp_ms.wrapping_sub(previous))),
            None => Duration::ZERO,
        };

        self.process_window(platform, event.handle, false, elapsed)
    }

    /// Handle a poll tick by querying the current foreground window.
    pub fn on_tick<P: WindowPrimitives + ?Sized>(&mut self, platform: &P) -> Option<ActiveProgramChanged> {
        let handle = platform.foreground_window().filter(|h| !h.is_null())?;
        self.process_window(platform, handle, true, Duration::ZERO)
    }

    /// Resolve a candidate foreground window into a change event.
    ///
    /// Returns `None` when the handle repeats the last one or the window
    /// must not be surfaced.
    pub fn process_window<P: WindowPrimitives + ?Sized>(
        &mut self,
        platform: &P,
        handle: WindowHandle,
        from_timer: bool,
        elapsed: Duration,
    ) -> Option<ActiveProgramChanged> {
        if self.last_handle == Some(handle) {
            return None;
        }
        self.last_handle = Some(handle);

        if platform.is_hung(handle) {
            debug!("Ignoring hung window {}", handle);
            return None;
        }

        let style = platform.extended_style(handle);
        if style.contains(ExtendedStyle::NO_ACTIVATE) {
            debug!("Ignoring no-activate window {}", handle);
            return None;
        }

        let process_id = platform.owning_process_id(handle);
        let mut path = platform.executable_path(process_id);

        if style.contains(ExtendedStyle::TOOL_WINDOW) && self.is_suppressed_owner(&path) {
            debug!("Ignoring shell tool window {}", handle);
            return None;
        }

        if is_host_shell(&path, &self.config.host_shell_name) {
            if let Some(hosted) = find_hosted_executable(platform, handle, &self.config.host_shell_name) {
                path = hosted;
            }
        }

        Some(ActiveProgramChanged {
            handle,
            process_id,
            path,
            from_timer,
            elapsed,
        })
    }

    fn is_suppressed_owner(&self, path: &str) -> bool {
        !path.is_empty()
            && self
                .config
                .suppressed_tool_window_owners
                .iter()
                .any(|owner| owner.eq_ignore_ascii_case(path))
    }
}

enum WorkerMessage {
    Event(WinEvent),
    Stop,
}

struct Worker {
    control: Sender<WorkerMessage>,
    thread: JoinHandle<()>,
}

/// Tracks the foreground window and reports program switches.
///
/// Dropping the tracker stops it.
pub struct ForegroundTracker<P: WindowPrimitives> {
    platform: Arc<P>,
    config: ForegroundConfig,
    worker: Option<Worker>,
}

impl<P: WindowPrimitives> ForegroundTracker<P> {
    pub fn new(platform: Arc<P>, config: ForegroundConfig) -> Self {
        Self {
            platform,
            config,
            worker: None,
        }
    }

    pub fn config(&self) -> &ForegroundConfig {
        &self.config
    }

    /// Replace the settings. Takes effect on the next `start`.
    pub fn set_config(&mut self, config: ForegroundConfig) {
        self.config = config;
    }

    pub fn is_active(&self) -> bool {
        self.worker.is_some()
    }

    /// Subscribe to foreground notifications and start polling.
    ///
    /// Changes are sent to `sink`. Does nothing when already active.
    pub fn start(&mut self, sink: Sender<ActiveProgramChanged>) -> Result<(), TrackerError> {
        if self.worker.is_some() {
            return Ok(());
        }

        let (control, messages) = mpsc::channel();
        let events = control.clone();
        let filter = EventFilter::range(WinEventKind::Foreground, WinEventKind::MinimizeEnd);
        let subscription = self.platform.subscribe(
            filter,
            Box::new(move |event| {
                // Fails only once the worker is gone
                let _ = events.send(WorkerMessage::Event(event));
            }),
        )?;

        let platform = Arc::clone(&self.platform);
        let state = ForegroundState::new(self.config.clone());
        let poll_interval = self.config.poll_interval;
        let thread = thread::Builder::new()
            .name("foreground-tracker".to_string())
            .spawn(move || {
                run_worker(&*platform, state, messages, sink, poll_interval);
                drop(subscription);
                debug!("Foreground tracker worker exited");
            })
            .map_err(TrackerError::Spawn)?;

        self.worker = Some(Worker { control, thread });
        info!("Foreground tracker started (poll interval {:?})", poll_interval);
        Ok(())
    }

    /// Unsubscribe and stop polling.
    ///
    /// Blocks until the worker has exited, so no change is reported after
    /// this returns. Does nothing when idle.
    pub fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        let _ = worker.control.send(WorkerMessage::Stop);
        if worker.thread.join().is_err() {
            warn!("Foreground tracker worker panicked");
        }
        info!("Foreground tracker stopped");
    }
}

impl<P: WindowPrimitives> Drop for ForegroundTracker<P> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_worker<P: WindowPrimitives + ?Sized>(
    platform: &P,
    mut state: ForegroundState,
    messages: Receiver<WorkerMessage>,
    sink: Sender<ActiveProgramChanged>,
    poll_interval: Duration,
) {
    let mut deadline = Instant::now() + poll_interval;

    loop {
        let timeout = deadline.saturating_duration_since(Instant::now());
        let change = match messages.recv_timeout(timeout) {
            Ok(WorkerMessage::Event(event)) => {
                // Notifications are fresher than polling
                deadline = Instant::now() + poll_interval;
                state.on_notification(platform, &event)
            }
            Ok(WorkerMessage::Stop) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {
                deadline = Instant::now() + poll_interval;
                state.on_tick(platform)
            }
        };

        if let Some(change) = change {
            debug!(
                "Foreground changed to {} (pid {}, {:?}, timer: {})",
                change.handle, change.process_id, change.path, change.from_timer
            );
            if sink.send(change).is_err() {
                debug!("Foreground change receiver dropped");
            }
        }
    }

    state.reset();
}
