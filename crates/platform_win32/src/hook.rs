//! WinEvent hooks.
//!
//! # Architecture
//!
//! Out-of-context WinEvent callbacks are delivered through the message queue
//! of the thread that installed the hook. Each subscription therefore runs a
//! dedicated thread that installs the hook, pumps messages and removes the
//! hook again before exiting. The callback for a thread lives in a
//! thread-local slot, since the raw hook procedure carries no user data.

use crate::Win32Error;
use std::cell::RefCell;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use windows::Win32::Foundation::{HWND, LPARAM, WPARAM};
use windows::Win32::System::Threading::GetCurrentThreadId;
use windows::Win32::UI::Accessibility::{SetWinEventHook, UnhookWinEvent, HWINEVENTHOOK};
use windows::Win32::UI::WindowsAndMessaging::{
    DispatchMessageW, GetMessageW, PeekMessageW, PostThreadMessageW, TranslateMessage, MSG,
    PM_NOREMOVE, WINEVENT_OUTOFCONTEXT, WM_QUIT,
};
use wintrack_core::platform::{EventCallback, EventFilter, WinEvent, WinEventKind};
use wintrack_core::WindowHandle;

thread_local! {
    static HOOK_CALLBACK: RefCell<Option<EventCallback>> = const { RefCell::new(None) };
}

/// An installed WinEvent hook. Dropping it removes the hook.
pub struct HookSubscription {
    thread_id: u32,
    thread: Option<JoinHandle<()>>,
}

impl HookSubscription {
    /// Install a hook for `filter` on a new thread.
    ///
    /// Returns once the hook is installed, or with the reason it failed.
    pub fn install(filter: EventFilter, callback: EventCallback) -> Result<Self, Win32Error> {
        let (init_tx, init_rx) = mpsc::channel::<Result<u32, Win32Error>>();

        let thread = thread::Builder::new()
            .name("winevent-hook".to_string())
            .spawn(move || run_hook_thread(filter, callback, init_tx))
            .map_err(Win32Error::ThreadSpawnFailed)?;

        let init = init_rx
            .recv()
            .map_err(|_| Win32Error::HookInstallFailed("Hook thread exited during setup".to_string()));

        match init {
            Ok(Ok(thread_id)) => {
                tracing::debug!(
                    "WinEvent hook installed for {:#06X}..={:#06X} (process {:?})",
                    filter.min,
                    filter.max,
                    filter.process
                );
                Ok(Self {
                    thread_id,
                    thread: Some(thread),
                })
            }
            Ok(Err(e)) | Err(e) => {
                let _ = thread.join();
                Err(e)
            }
        }
    }
}

impl Drop for HookSubscription {
    fn drop(&mut self) {
        // Signal thread to quit
        unsafe {
            if let Err(e) = PostThreadMessageW(self.thread_id, WM_QUIT, WPARAM(0), LPARAM(0)) {
                tracing::warn!("Failed to signal hook thread {}: {}", self.thread_id, e);
            }
        }

        // Wait for the hook to be removed
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::warn!("Hook thread panicked");
            }
        }
    }
}

fn run_hook_thread(
    filter: EventFilter,
    callback: EventCallback,
    init_tx: mpsc::Sender<Result<u32, Win32Error>>,
) {
    HOOK_CALLBACK.with(|slot| *slot.borrow_mut() = Some(callback));

    let mut msg = MSG::default();
    unsafe {
        // Create the message queue before anyone can post WM_QUIT to it
        let _ = PeekMessageW(&mut msg, None, 0, 0, PM_NOREMOVE);

        let hook = SetWinEventHook(
            filter.min,
            filter.max,
            None,
            Some(win_event_proc),
            filter.process.unwrap_or(0),
            0,
            WINEVENT_OUTOFCONTEXT,
        );

        if hook.0.is_null() {
            let _ = init_tx.send(Err(Win32Error::HookInstallFailed(format!(
                "SetWinEventHook({:#06X}, {:#06X}) returned null",
                filter.min, filter.max
            ))));
            HOOK_CALLBACK.with(|slot| slot.borrow_mut().take());
            return;
        }

        let _ = init_tx.send(Ok(GetCurrentThreadId()));

        // Message loop; exits on WM_QUIT (0) or error (-1)
        while GetMessageW(&mut msg, None, 0, 0).0 > 0 {
            let _ = TranslateMessage(&msg);
            DispatchMessageW(&msg);
        }

        if !UnhookWinEvent(hook).as_bool() {
            tracing::warn!("Failed to unhook WinEvent hook");
        }
    }

    HOOK_CALLBACK.with(|slot| slot.borrow_mut().take());
}

/// Hook procedure shared by every hook thread.
///
/// Wrapped with catch_unwind so a panicking callback cannot unwind into
/// the OS.
unsafe extern "system" fn win_event_proc(
    _hook: HWINEVENTHOOK,
    event: u32,
    hwnd: HWND,
    id_object: i32,
    id_child: i32,
    _event_thread: u32,
    event_time: u32,
) {
    let event = WinEvent {
        kind: WinEventKind::from_raw(event),
        handle: WindowHandle::from_raw(hwnd.0 as usize as u64),
        object_id: id_object,
        child_id: id_child,
        timestamp_ms: event_time,
    };

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        HOOK_CALLBACK.with(|slot| {
            if let Some(callback) = slot.borrow().as_ref() {
                callback(event);
            }
        })
    }));

    if let Err(e) = result {
        tracing::error!("Panic in WinEvent callback: {:?}", e);
    }
}
