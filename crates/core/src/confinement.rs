//! Cursor confinement that follows a target window.
//!
//! While active, the cursor is clipped to the target's screen rectangle
//! shrunk by a [`ConfinementPadding`]. Move and resize notifications only
//! recompute the stored rectangle; a fast tick applies it, so bursts of
//! notifications during a drag do not each touch the global clip. The clip
//! is released for any tick where the target is not responding.

use crate::platform::{EventFilter, WinEvent, WinEventKind, WindowPrimitives};
use crate::{ConfinementPadding, Rect, TrackerError, WindowHandle, UNKNOWN_PROCESS};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// One refresh period of a 60 Hz display.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(17);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfinementConfig {
    /// Interval at which the stored rectangle is re-applied.
    pub tick_interval: Duration,
}

impl Default for ConfinementConfig {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
        }
    }
}

/// How a notification affected the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetChange {
    /// Not about the target window itself.
    Ignored,
    /// The target moved or was resized; the stored rectangle was updated.
    Moved,
    /// The target was destroyed.
    Destroyed,
}

/// Target, padding and last computed rectangle of a confinement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfinementState {
    target: WindowHandle,
    padding: ConfinementPadding,
    rect: Option<Rect>,
}

impl ConfinementState {
    pub fn new(target: WindowHandle, padding: ConfinementPadding) -> Self {
        Self {
            target,
            padding,
            rect: None,
        }
    }

    pub fn target(&self) -> WindowHandle {
        self.target
    }

    pub fn padding(&self) -> ConfinementPadding {
        self.padding
    }

    /// Last computed confinement rectangle.
    pub fn rect(&self) -> Option<Rect> {
        self.rect
    }

    /// Recompute the rectangle from the target's current position.
    ///
    /// A failed query keeps the last known rectangle.
    pub fn refresh<P: WindowPrimitives + ?Sized>(&mut self, platform: &P) -> Option<Rect> {
        match platform.screen_rect(self.target) {
            Some(window) => self.rect = Some(window.inset(self.padding)),
            None => debug!("No rectangle for {}, keeping {:?}", self.target, self.rect),
        }
        self.rect
    }

    /// Handle a notification for the target's process.
    pub fn on_notification<P: WindowPrimitives + ?Sized>(
        &mut self,
        platform: &P,
        event: &WinEvent,
    ) -> TargetChange {
        if !event.is_window_event() || event.handle != self.target {
            return TargetChange::Ignored;
        }
        match event.kind {
            WinEventKind::ObjectDestroy => TargetChange::Destroyed,
            WinEventKind::LocationChange => {
                self.refresh(platform);
                TargetChange::Moved
            }
            _ => TargetChange::Ignored,
        }
    }

    /// Apply the stored rectangle, or release the clip while the target
    /// is hung. Does nothing until a rectangle is known.
    pub fn on_tick<P: WindowPrimitives + ?Sized>(&self, platform: &P) {
        if platform.is_hung(self.target) {
            platform.apply_cursor_clip(None);
        } else if let Some(rect) = self.rect {
            platform.apply_cursor_clip(Some(rect));
        }
    }
}

enum WorkerMessage {
    Event(WinEvent),
    Stop,
}

struct Worker {
    target: WindowHandle,
    control: Sender<WorkerMessage>,
    active: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

/// Keeps the cursor confined to one window.
///
/// Only one tracker should be active per process: the cursor clip is a
/// single system-wide resource.
pub struct ConfinementTracker<P: WindowPrimitives> {
    platform: Arc<P>,
    config: ConfinementConfig,
    worker: Option<Worker>,
}

impl<P: WindowPrimitives> ConfinementTracker<P> {
    pub fn new(platform: Arc<P>, config: ConfinementConfig) -> Self {
        Self {
            platform,
            config,
            worker: None,
        }
    }

    pub fn config(&self) -> ConfinementConfig {
        self.config
    }

    /// Replace the settings. Takes effect on the next `start`.
    pub fn set_config(&mut self, config: ConfinementConfig) {
        self.config = config;
    }

    /// Whether a confinement is in effect. Becomes false on its own when
    /// the target is destroyed.
    pub fn is_active(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|worker| worker.active.load(Ordering::SeqCst))
    }

    /// The confined window, while active.
    pub fn target(&self) -> Option<WindowHandle> {
        self.worker
            .as_ref()
            .filter(|worker| worker.active.load(Ordering::SeqCst))
            .map(|worker| worker.target)
    }

    /// Confine the cursor to `target` shrunk by `padding`.
    ///
    /// Any previous confinement is stopped first. The clip is applied
    /// before this returns.
    pub fn start(&mut self, target: WindowHandle, padding: ConfinementPadding) -> Result<(), TrackerError> {
        self.stop();

        let process_id = self.platform.owning_process_id(target);
        if target.is_null() || process_id == UNKNOWN_PROCESS {
            debug!("Cannot confine cursor to {}: no owning process", target);
            return Err(TrackerError::TargetUnresolved(target));
        }

        let (control, messages) = mpsc::channel();
        let events = control.clone();
        let filter = EventFilter::range(WinEventKind::ObjectDestroy, WinEventKind::LocationChange)
            .for_process(process_id);
        let subscription = self.platform.subscribe(
            filter,
            Box::new(move |event| {
                let _ = events.send(WorkerMessage::Event(event));
            }),
        )?;

        let mut state = ConfinementState::new(target, padding);
        if let Some(rect) = state.refresh(&*self.platform) {
            self.platform.apply_cursor_clip(Some(rect));
        }

        let active = Arc::new(AtomicBool::new(true));
        let worker_active = Arc::clone(&active);
        let platform = Arc::clone(&self.platform);
        let tick_interval = self.config.tick_interval;
        let spawned = thread::Builder::new()
            .name("cursor-confinement".to_string())
            .spawn(move || {
                run_worker(&*platform, state, messages, tick_interval);
                platform.apply_cursor_clip(None);
                drop(subscription);
                worker_active.store(false, Ordering::SeqCst);
                debug!("Cursor confinement worker exited");
            });

        let thread = match spawned {
            Ok(thread) => thread,
            Err(e) => {
                self.platform.apply_cursor_clip(None);
                return Err(TrackerError::Spawn(e));
            }
        };

        self.worker = Some(Worker {
            target,
            control,
            active,
            thread,
        });
        info!("Confining cursor to {} (pid {}, padding {:?})", target, process_id, padding);
        Ok(())
    }

    /// Release the cursor and unsubscribe.
    ///
    /// Blocks until the worker has exited. Safe to call in any state.
    pub fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        // The worker may already have exited after its target was destroyed
        let _ = worker.control.send(WorkerMessage::Stop);
        if worker.thread.join().is_err() {
            warn!("Cursor confinement worker panicked");
            self.platform.apply_cursor_clip(None);
        }
        info!("Cursor confinement of {} stopped", worker.target);
    }
}

impl<P: WindowPrimitives> Drop for ConfinementTracker<P> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_worker<P: WindowPrimitives + ?Sized>(
    platform: &P,
    mut state: ConfinementState,
    messages: Receiver<WorkerMessage>,
    tick_interval: Duration,
) {
    let mut deadline = Instant::now();

    loop {
        let timeout = deadline.saturating_duration_since(Instant::now());
        match messages.recv_timeout(timeout) {
            Ok(WorkerMessage::Event(event)) => {
                if state.on_notification(platform, &event) == TargetChange::Destroyed {
                    info!("Confined window {} was destroyed", state.target());
                    break;
                }
            }
            Ok(WorkerMessage::Stop) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {
                state.on_tick(platform);
                deadline += tick_interval;
                let now = Instant::now();
                if deadline < now {
                    deadline = now + tick_interval;
                }
            }
        }
    }
}
