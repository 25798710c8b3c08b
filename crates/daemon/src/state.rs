//! Daemon state and IPC command handling.
//!
//! Generic over the platform so the command logic runs against the
//! in-memory fake in tests.

use crate::config::Config;
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use wintrack_core::{
    enumerate_with, switchable_programs, ActiveProgramChanged, ClassificationOutcome, Classifier,
    ConfinementPadding, ConfinementTracker, ForegroundState, ForegroundTracker, ProgramDescriptor,
    TrackerError, WindowHandle, WindowPrimitives,
};
use wintrack_ipc::{ForegroundInfo, IpcCommand, IpcPadding, IpcResponse, WindowEntry};

/// Application state owned by the daemon event loop.
pub struct AppState<P: WindowPrimitives> {
    platform: Arc<P>,
    /// User configuration.
    pub config: Config,
    foreground: ForegroundTracker<P>,
    confinement: ConfinementTracker<P>,
    /// Where the foreground tracker reports changes.
    changes: Sender<ActiveProgramChanged>,
    /// Most recent foreground change.
    latest: Option<ActiveProgramChanged>,
    /// Daemon start time for uptime reporting.
    start_time: Instant,
}

fn to_confinement_padding(padding: IpcPadding) -> ConfinementPadding {
    ConfinementPadding::new(padding.left, padding.top, padding.right, padding.bottom)
}

impl<P: WindowPrimitives> AppState<P> {
    /// Create the state. No tracker runs until [`AppState::start`].
    pub fn new(platform: Arc<P>, config: Config, changes: Sender<ActiveProgramChanged>) -> Self {
        let foreground = ForegroundTracker::new(Arc::clone(&platform), config.foreground_config());
        let confinement = ConfinementTracker::new(Arc::clone(&platform), config.confinement_config());
        Self {
            platform,
            config,
            foreground,
            confinement,
            changes,
            latest: None,
            start_time: Instant::now(),
        }
    }

    /// Start the foreground tracker if enabled in config.
    pub fn start(&mut self) -> Result<(), TrackerError> {
        if self.config.behavior.track_foreground {
            self.foreground.start(self.changes.clone())?;
        } else {
            info!("Foreground tracking disabled by config (track_foreground = false)");
        }
        Ok(())
    }

    pub fn is_tracking_foreground(&self) -> bool {
        self.foreground.is_active()
    }

    /// The window the cursor is confined to, if any.
    pub fn confined_window(&self) -> Option<WindowHandle> {
        self.confinement.target()
    }

    /// Record a change reported by the foreground tracker.
    pub fn record_foreground(&mut self, change: ActiveProgramChanged) {
        info!(
            "Active program: {} (window {}, pid {}{})",
            if change.path.is_empty() { "<unknown>" } else { change.path.as_str() },
            change.handle,
            change.process_id,
            if change.from_timer { ", polled" } else { "" }
        );
        self.latest = Some(change);
    }

    pub fn latest_foreground(&self) -> Option<&ActiveProgramChanged> {
        self.latest.as_ref()
    }

    /// Replace the configuration, restarting the foreground tracker so the
    /// new settings take effect.
    pub fn apply_config(&mut self, mut config: Config) -> Result<(), TrackerError> {
        for w in config.validate() {
            warn!("Config: {} - {}", w.field, w.message);
        }

        let was_tracking = self.foreground.is_active();
        self.foreground.stop();
        self.foreground.set_config(config.foreground_config());
        self.confinement.set_config(config.confinement_config());
        self.config = config;

        if !self.config.behavior.track_foreground {
            if was_tracking {
                info!("Foreground tracking disabled by reloaded config");
            }
            return Ok(());
        }
        self.foreground.start(self.changes.clone())
    }

    /// Stop both trackers, releasing any cursor clip.
    pub fn shutdown(&mut self) {
        self.confinement.stop();
        self.foreground.stop();
    }

    /// Handle an IPC command and return a response.
    pub fn handle_command(&mut self, cmd: IpcCommand) -> IpcResponse {
        match cmd {
            IpcCommand::QueryForeground => {
                let program = self.current_foreground().map(|change| self.foreground_info(&change));
                IpcResponse::Foreground { program }
            }
            IpcCommand::ListWindows { include_filtered } => IpcResponse::WindowList {
                windows: self.list_windows(include_filtered),
            },
            IpcCommand::ConfineCursor { window_id, padding } => {
                self.confine(WindowHandle::from_raw(window_id), padding)
            }
            IpcCommand::ConfineForeground { padding } => match self.platform.foreground_window() {
                Some(handle) => self.confine(handle, padding),
                None => IpcResponse::error("No foreground window"),
            },
            IpcCommand::ReleaseCursor => {
                self.confinement.stop();
                IpcResponse::Ok
            }
            IpcCommand::QueryStatus => IpcResponse::Status {
                tracking_foreground: self.foreground.is_active(),
                confined_window: self.confinement.target().map(WindowHandle::as_raw),
                uptime_secs: self.start_time.elapsed().as_secs(),
            },
            IpcCommand::Reload => match Config::load() {
                Ok(new_config) => match self.apply_config(new_config) {
                    Ok(()) => IpcResponse::Ok,
                    Err(e) => IpcResponse::error(format!("Failed to restart foreground tracker: {}", e)),
                },
                Err(e) => IpcResponse::error(format!("Failed to reload config: {:#}", e)),
            },
            IpcCommand::Stop => {
                // This is handled specially in the event loop
                IpcResponse::Ok
            }
        }
    }

    /// Last reported change, or a fresh look at the foreground window
    /// before the tracker has reported anything.
    fn current_foreground(&self) -> Option<ActiveProgramChanged> {
        if let Some(latest) = &self.latest {
            return Some(latest.clone());
        }
        let handle = self.platform.foreground_window()?;
        ForegroundState::new(self.config.foreground_config()).process_window(
            &*self.platform,
            handle,
            true,
            Duration::ZERO,
        )
    }

    fn foreground_info(&self, change: &ActiveProgramChanged) -> ForegroundInfo {
        ForegroundInfo {
            window_id: change.handle.as_raw(),
            process_id: change.process_id,
            path: change.path.clone(),
            description: ProgramDescriptor::resolve(&*self.platform, &change.path).map(|p| p.description),
            from_timer: change.from_timer,
            elapsed_ms: change.elapsed.as_millis().try_into().unwrap_or(u64::MAX),
        }
    }

    fn list_windows(&self, include_filtered: bool) -> Vec<WindowEntry> {
        let platform = &*self.platform;
        let classifier = Classifier::new(self.config.foreground.host_shell_name.clone());

        let windows: Vec<WindowEntry> = if include_filtered {
            let mut windows = Vec::new();
            enumerate_with(platform, &classifier, |outcome| {
                windows.push(self.window_entry(&outcome));
                true
            });
            windows
        } else {
            switchable_programs(platform, &classifier)
                .into_iter()
                .map(|(handle, program)| {
                    self.window_entry(&ClassificationOutcome::Successful { handle, program })
                })
                .collect()
        };

        debug!("Listed {} windows (include_filtered = {})", windows.len(), include_filtered);
        windows
    }

    fn window_entry(&self, outcome: &ClassificationOutcome) -> WindowEntry {
        let handle = outcome.handle();
        let program = outcome.program();
        WindowEntry {
            window_id: handle.as_raw(),
            status: outcome.status().as_str().to_string(),
            title: self.platform.window_title(handle),
            class_name: self.platform.class_name(handle),
            process_id: self.platform.owning_process_id(handle),
            executable: program.map(|p| p.executable.clone()),
            description: program.map(|p| p.description.clone()),
            context: outcome.context().map(str::to_string),
        }
    }

    fn confine(&mut self, target: WindowHandle, padding: Option<IpcPadding>) -> IpcResponse {
        let padding = padding
            .map(to_confinement_padding)
            .unwrap_or(self.config.cursor.padding);

        match self.confinement.start(target, padding) {
            Ok(()) => IpcResponse::Ok,
            Err(e) => IpcResponse::error(format!("Failed to confine cursor: {}", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::{self, Receiver};
    use wintrack_core::test_utils::{wait_until, FakePlatform, FakeWindow};
    use wintrack_core::{ExtendedStyle, Rect, WinEvent, WinEventKind};

    const SELF_PID: u32 = 1;
    const EDITOR: WindowHandle = WindowHandle::from_raw(0x100);
    const PALETTE: WindowHandle = WindowHandle::from_raw(0x200);
    const OWN: WindowHandle = WindowHandle::from_raw(0x300);

    fn test_platform() -> Arc<FakePlatform> {
        let platform = FakePlatform::new(SELF_PID);
        platform.add_process(10, "/apps/editor/editor.exe");
        platform.add_process(20, "/apps/paint/paint.exe");
        platform.set_file_description("/apps/editor/editor.exe", "Text Editor");
        platform.add_window(
            EDITOR,
            FakeWindow {
                class_name: "EditorMain".to_string(),
                ..FakeWindow::app(10)
                    .with_title("notes.txt - Editor")
                    .with_rect(Rect::new(100, 100, 900, 700))
            },
        );
        platform.add_window(
            PALETTE,
            FakeWindow::app(20)
                .with_title("Palette")
                .with_style(ExtendedStyle::TOOL_WINDOW),
        );
        platform.add_window(OWN, FakeWindow::app(SELF_PID));
        Arc::new(platform)
    }

    fn test_state(
        platform: &Arc<FakePlatform>,
        config: Config,
    ) -> (AppState<FakePlatform>, Receiver<ActiveProgramChanged>) {
        let (tx, rx) = mpsc::channel();
        (AppState::new(Arc::clone(platform), config, tx), rx)
    }

    fn status(state: &mut AppState<FakePlatform>) -> (bool, Option<u64>) {
        match state.handle_command(IpcCommand::QueryStatus) {
            IpcResponse::Status {
                tracking_foreground,
                confined_window,
                ..
            } => (tracking_foreground, confined_window),
            other => panic!("Expected Status response, got {:?}", other),
        }
    }

    #[test]
    fn test_app_state_new_is_idle() {
        let platform = test_platform();
        let (mut state, _rx) = test_state(&platform, Config::default());
        assert_eq!(status(&mut state), (false, None));
        assert_eq!(platform.active_subscriptions(), 0);
        assert!(state.latest_foreground().is_none());
    }

    #[test]
    fn test_start_respects_track_foreground() {
        let platform = test_platform();
        let (mut state, _rx) = test_state(&platform, Config::default());
        state.start().unwrap();
        assert!(state.is_tracking_foreground());
        assert_eq!(platform.active_subscriptions(), 1);

        let mut config = Config::default();
        config.behavior.track_foreground = false;
        let (mut disabled, _rx) = test_state(&platform, config);
        disabled.start().unwrap();
        assert!(!disabled.is_tracking_foreground());
    }

    #[test]
    fn test_list_windows_only_switchable_by_default() {
        let platform = test_platform();
        let (mut state, _rx) = test_state(&platform, Config::default());

        let IpcResponse::WindowList { windows } = state.handle_command(IpcCommand::ListWindows {
            include_filtered: false,
        }) else {
            panic!("Expected WindowList response");
        };

        assert_eq!(windows.len(), 1);
        let entry = &windows[0];
        assert_eq!(entry.window_id, EDITOR.as_raw());
        assert_eq!(entry.status, "successful");
        assert_eq!(entry.title, "notes.txt - Editor");
        assert_eq!(entry.class_name, "EditorMain");
        assert_eq!(entry.process_id, 10);
        assert_eq!(entry.executable.as_deref(), Some("editor.exe"));
        assert_eq!(entry.description.as_deref(), Some("Text Editor"));
        assert!(entry.context.is_none());
    }

    #[test]
    fn test_list_windows_include_filtered_reports_reasons() {
        let platform = test_platform();
        let (mut state, _rx) = test_state(&platform, Config::default());

        let IpcResponse::WindowList { windows } = state.handle_command(IpcCommand::ListWindows {
            include_filtered: true,
        }) else {
            panic!("Expected WindowList response");
        };

        let statuses: Vec<&str> = windows.iter().map(|w| w.status.as_str()).collect();
        assert_eq!(statuses, vec!["successful", "tool_window", "excluded"]);
        assert_eq!(windows[1].context.as_deref(), Some("0x200"));
        assert!(windows[1].executable.is_none());
    }

    #[test]
    fn test_list_windows_drops_destroyed_window() {
        let platform = test_platform();
        let (mut state, _rx) = test_state(&platform, Config::default());
        platform.remove_window(EDITOR);

        let IpcResponse::WindowList { windows } = state.handle_command(IpcCommand::ListWindows {
            include_filtered: true,
        }) else {
            panic!("Expected WindowList response");
        };

        let ids: Vec<u64> = windows.iter().map(|w| w.window_id).collect();
        assert_eq!(ids, vec![PALETTE.as_raw(), OWN.as_raw()]);
    }

    #[test]
    fn test_confine_uses_configured_padding() {
        let platform = test_platform();
        let mut config = Config::default();
        config.cursor.padding = ConfinementPadding::uniform(10);
        let (mut state, _rx) = test_state(&platform, config);

        let resp = state.handle_command(IpcCommand::ConfineCursor {
            window_id: EDITOR.as_raw(),
            padding: None,
        });
        assert_eq!(resp, IpcResponse::Ok);
        assert_eq!(platform.last_clip(), Some(Some(Rect::new(110, 110, 890, 690))));
        assert_eq!(status(&mut state), (false, Some(EDITOR.as_raw())));

        assert_eq!(state.handle_command(IpcCommand::ReleaseCursor), IpcResponse::Ok);
        assert_eq!(platform.last_clip(), Some(None));
        assert_eq!(status(&mut state), (false, None));
        assert_eq!(platform.active_subscriptions(), 0);
    }

    #[test]
    fn test_confine_padding_override() {
        let platform = test_platform();
        let (mut state, _rx) = test_state(&platform, Config::default());

        let resp = state.handle_command(IpcCommand::ConfineCursor {
            window_id: EDITOR.as_raw(),
            padding: Some(IpcPadding {
                top: 30,
                ..IpcPadding::default()
            }),
        });
        assert_eq!(resp, IpcResponse::Ok);
        assert_eq!(platform.last_clip(), Some(Some(Rect::new(100, 130, 900, 700))));
        state.shutdown();
    }

    #[test]
    fn test_confine_unknown_window_fails() {
        let platform = test_platform();
        let (mut state, _rx) = test_state(&platform, Config::default());

        let resp = state.handle_command(IpcCommand::ConfineCursor {
            window_id: 0xDEAD,
            padding: None,
        });
        let IpcResponse::Error { message } = resp else {
            panic!("Expected Error response");
        };
        assert!(message.contains("0xDEAD"));
        assert!(platform.clip_calls().is_empty());
        assert_eq!(status(&mut state), (false, None));
    }

    #[test]
    fn test_confine_foreground() {
        let platform = test_platform();
        let (mut state, _rx) = test_state(&platform, Config::default());

        let resp = state.handle_command(IpcCommand::ConfineForeground { padding: None });
        assert_eq!(resp, IpcResponse::error("No foreground window"));

        platform.set_foreground(Some(EDITOR));
        let resp = state.handle_command(IpcCommand::ConfineForeground { padding: None });
        assert_eq!(resp, IpcResponse::Ok);
        assert_eq!(state.confined_window(), Some(EDITOR));
        state.shutdown();
    }

    #[test]
    fn test_query_foreground_before_any_change() {
        let platform = test_platform();
        let (mut state, _rx) = test_state(&platform, Config::default());

        assert_eq!(
            state.handle_command(IpcCommand::QueryForeground),
            IpcResponse::Foreground { program: None }
        );

        platform.set_foreground(Some(EDITOR));
        let IpcResponse::Foreground { program: Some(info) } = state.handle_command(IpcCommand::QueryForeground)
        else {
            panic!("Expected Foreground response with a program");
        };
        assert_eq!(info.window_id, EDITOR.as_raw());
        assert_eq!(info.process_id, 10);
        assert_eq!(info.path, "/apps/editor/editor.exe");
        assert_eq!(info.description.as_deref(), Some("Text Editor"));
        assert!(info.from_timer);
    }

    #[test]
    fn test_query_foreground_returns_recorded_change() {
        let platform = test_platform();
        let (mut state, _rx) = test_state(&platform, Config::default());
        platform.set_foreground(Some(PALETTE));

        state.record_foreground(ActiveProgramChanged {
            handle: EDITOR,
            process_id: 10,
            path: "/apps/editor/editor.exe".to_string(),
            from_timer: false,
            elapsed: Duration::from_millis(250),
        });

        let IpcResponse::Foreground { program: Some(info) } = state.handle_command(IpcCommand::QueryForeground)
        else {
            panic!("Expected Foreground response with a program");
        };
        assert_eq!(info.window_id, EDITOR.as_raw());
        assert!(!info.from_timer);
        assert_eq!(info.elapsed_ms, 250);
    }

    #[test]
    fn test_foreground_changes_reach_channel() {
        let platform = test_platform();
        let (mut state, rx) = test_state(&platform, Config::default());
        state.start().unwrap();

        platform.emit(WinEvent::window(WinEventKind::Foreground, EDITOR, 1_000));
        let change = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(change.handle, EDITOR);
        assert_eq!(change.path, "/apps/editor/editor.exe");

        state.record_foreground(change);
        assert_eq!(state.latest_foreground().map(|c| c.handle), Some(EDITOR));
        state.shutdown();
    }

    #[test]
    fn test_apply_config_can_disable_tracking() {
        let platform = test_platform();
        let (mut state, _rx) = test_state(&platform, Config::default());
        state.start().unwrap();
        assert!(state.is_tracking_foreground());

        let mut config = Config::default();
        config.behavior.track_foreground = false;
        config.cursor.tick_interval_ms = 0;
        state.apply_config(config).unwrap();

        assert!(!state.is_tracking_foreground());
        assert!(wait_until(Duration::from_secs(1), || platform.active_subscriptions() == 0));
        // Out-of-range values are clamped on apply
        assert_eq!(state.config.cursor.tick_interval_ms, 1);
    }

    #[test]
    fn test_apply_config_restarts_tracking() {
        let platform = test_platform();
        let mut config = Config::default();
        config.behavior.track_foreground = false;
        let (mut state, _rx) = test_state(&platform, config);
        state.start().unwrap();
        assert!(!state.is_tracking_foreground());

        let mut config = Config::default();
        config.foreground.poll_interval_ms = 250;
        state.apply_config(config).unwrap();
        assert!(state.is_tracking_foreground());
        assert_eq!(platform.active_subscriptions(), 1);
        state.shutdown();
        assert_eq!(platform.active_subscriptions(), 0);
    }

    #[test]
    fn test_shutdown_releases_cursor() {
        let platform = test_platform();
        let (mut state, _rx) = test_state(&platform, Config::default());
        state.start().unwrap();
        state.handle_command(IpcCommand::ConfineCursor {
            window_id: EDITOR.as_raw(),
            padding: None,
        });

        state.shutdown();
        assert_eq!(platform.last_clip(), Some(None));
        assert_eq!(status(&mut state), (false, None));
        assert_eq!(platform.active_subscriptions(), 0);
    }

    #[test]
    fn test_stop_command_acknowledged() {
        let platform = test_platform();
        let (mut state, _rx) = test_state(&platform, Config::default());
        assert_eq!(state.handle_command(IpcCommand::Stop), IpcResponse::Ok);
    }
}
