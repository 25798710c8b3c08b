//! [`WindowPrimitives`] on top of the Win32 API.

use crate::hook::HookSubscription;
use crate::manifest;
use std::ffi::c_void;
use std::ops::ControlFlow;
use std::path::Path;
use windows::core::{HSTRING, PWSTR};
use windows::Win32::Foundation::{CloseHandle, BOOL, HWND, LPARAM, RECT};
use windows::Win32::Graphics::Dwm::{DwmGetWindowAttribute, DWMWA_CLOAKED};
use windows::Win32::Storage::FileSystem::{GetFileVersionInfoSizeW, GetFileVersionInfoW, VerQueryValueW};
use windows::Win32::System::Threading::{
    OpenProcess, QueryFullProcessImageNameW, PROCESS_NAME_WIN32, PROCESS_QUERY_LIMITED_INFORMATION,
};
use windows::Win32::UI::Shell::SHLoadIndirectString;
use windows::Win32::UI::WindowsAndMessaging::{
    ClipCursor, EnumChildWindows, EnumWindows, GetClassNameW, GetForegroundWindow, GetWindowLongW,
    GetWindowRect, GetWindowTextLengthW, GetWindowTextW, GetWindowThreadProcessId, IsHungAppWindow,
    IsWindowVisible, GWL_EXSTYLE,
};
use wintrack_core::platform::{EventCallback, EventFilter, PackageMetadata, WindowPrimitives};
use wintrack_core::{ExtendedStyle, PlatformError, ProcessId, Rect, WindowHandle, UNKNOWN_PROCESS};

/// Longest executable path accepted from the OS.
const MAX_PATH_CHARS: usize = 4096;

/// Longest class name the OS allows.
const MAX_CLASS_NAME_CHARS: usize = 256;

/// Longest string an indirect resource can resolve to.
const MAX_INDIRECT_STRING_CHARS: usize = 32767;

/// US English, Unicode. Used when a version resource lists no translation.
const DEFAULT_TRANSLATION: (u16, u16) = (0x0409, 0x04B0);

type Visitor<'a> = &'a mut dyn FnMut(WindowHandle) -> ControlFlow<()>;

/// The live Win32 desktop.
#[derive(Debug, Default, Clone, Copy)]
pub struct Win32Platform;

impl Win32Platform {
    pub fn new() -> Self {
        Self
    }
}

fn to_hwnd(handle: WindowHandle) -> HWND {
    HWND(handle.as_raw() as usize as *mut c_void)
}

fn from_hwnd(hwnd: HWND) -> WindowHandle {
    WindowHandle::from_raw(hwnd.0 as usize as u64)
}

impl WindowPrimitives for Win32Platform {
    type Subscription = HookSubscription;

    fn owning_process_id(&self, handle: WindowHandle) -> ProcessId {
        let mut process_id = UNKNOWN_PROCESS;
        unsafe {
            GetWindowThreadProcessId(to_hwnd(handle), Some(&mut process_id as *mut u32));
        }
        process_id
    }

    fn is_visible(&self, handle: WindowHandle) -> bool {
        unsafe { IsWindowVisible(to_hwnd(handle)).as_bool() }
    }

    fn is_cloaked(&self, handle: WindowHandle) -> bool {
        let mut cloaked: u32 = 0;
        let result = unsafe {
            DwmGetWindowAttribute(
                to_hwnd(handle),
                DWMWA_CLOAKED,
                &mut cloaked as *mut u32 as *mut c_void,
                std::mem::size_of::<u32>() as u32,
            )
        };
        result.is_ok() && cloaked != 0
    }

    fn is_hung(&self, handle: WindowHandle) -> bool {
        unsafe { IsHungAppWindow(to_hwnd(handle)).as_bool() }
    }

    fn extended_style(&self, handle: WindowHandle) -> ExtendedStyle {
        let bits = unsafe { GetWindowLongW(to_hwnd(handle), GWL_EXSTYLE) };
        ExtendedStyle::from_bits(bits as u32)
    }

    fn screen_rect(&self, handle: WindowHandle) -> Option<Rect> {
        let mut rect = RECT::default();
        unsafe { GetWindowRect(to_hwnd(handle), &mut rect) }.ok()?;
        Some(Rect::new(rect.left, rect.top, rect.right, rect.bottom))
    }

    fn foreground_window(&self) -> Option<WindowHandle> {
        let handle = from_hwnd(unsafe { GetForegroundWindow() });
        (!handle.is_null()).then_some(handle)
    }

    fn window_title(&self, handle: WindowHandle) -> String {
        let hwnd = to_hwnd(handle);
        let len = unsafe { GetWindowTextLengthW(hwnd) };
        if len <= 0 {
            return String::new();
        }
        let mut buf: Vec<u16> = vec![0; len as usize + 1];
        let copied = unsafe { GetWindowTextW(hwnd, &mut buf) };
        String::from_utf16_lossy(&buf[..copied.max(0) as usize])
    }

    fn class_name(&self, handle: WindowHandle) -> String {
        let mut buf = [0u16; MAX_CLASS_NAME_CHARS];
        let copied = unsafe { GetClassNameW(to_hwnd(handle), &mut buf) };
        String::from_utf16_lossy(&buf[..copied.max(0) as usize])
    }

    fn executable_path(&self, process_id: ProcessId) -> String {
        if process_id == UNKNOWN_PROCESS {
            return String::new();
        }
        unsafe {
            let Ok(process) = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, false, process_id) else {
                return String::new();
            };

            let mut buf: Vec<u16> = vec![0; MAX_PATH_CHARS];
            let mut size = buf.len() as u32;
            let ok = QueryFullProcessImageNameW(process, PROCESS_NAME_WIN32, PWSTR(buf.as_mut_ptr()), &mut size)
                .is_ok();

            let _ = CloseHandle(process);

            if !ok {
                return String::new();
            }
            String::from_utf16_lossy(&buf[..size as usize])
        }
    }

    fn visit_child_windows(&self, parent: WindowHandle, visitor: Visitor<'_>) {
        let mut visitor = visitor;
        unsafe {
            // The return value only reports whether the visitor stopped early
            let _ = EnumChildWindows(
                Some(to_hwnd(parent)),
                Some(enum_proc),
                LPARAM(&mut visitor as *mut Visitor<'_> as isize),
            );
        }
    }

    fn visit_top_level_windows(&self, visitor: Visitor<'_>) {
        let mut visitor = visitor;
        unsafe {
            let _ = EnumWindows(Some(enum_proc), LPARAM(&mut visitor as *mut Visitor<'_> as isize));
        }
    }

    fn subscribe(&self, filter: EventFilter, callback: EventCallback) -> Result<HookSubscription, PlatformError> {
        Ok(HookSubscription::install(filter, callback)?)
    }

    fn apply_cursor_clip(&self, rect: Option<Rect>) {
        let result = match rect {
            Some(rect) => {
                let rect = RECT {
                    left: rect.left,
                    top: rect.top,
                    right: rect.right,
                    bottom: rect.bottom,
                };
                unsafe { ClipCursor(Some(&rect as *const RECT)) }
            }
            None => unsafe { ClipCursor(None) },
        };
        if let Err(e) = result {
            tracing::debug!("ClipCursor failed: {}", e);
        }
    }

    fn package_metadata(&self, install_dir: &Path) -> Option<PackageMetadata> {
        manifest::read_package_metadata(install_dir, &load_indirect_string)
    }

    fn file_description(&self, path: &Path) -> Option<String> {
        let data = read_version_info(path)?;
        let (language, codepage) = version_translation(&data).unwrap_or(DEFAULT_TRANSLATION);
        let key = format!("\\StringFileInfo\\{:04x}{:04x}\\FileDescription", language, codepage);
        let description = version_string(&data, &key)?;
        (!description.is_empty()).then_some(description)
    }
}

/// Resolve an `@{...}` indirect string source.
fn load_indirect_string(source: &str) -> Option<String> {
    let mut buf: Vec<u16> = vec![0; MAX_INDIRECT_STRING_CHARS];
    if let Err(e) = unsafe { SHLoadIndirectString(&HSTRING::from(source), &mut buf, None) } {
        tracing::debug!("SHLoadIndirectString failed for {}: {}", source, e);
        return None;
    }
    let len = buf.iter().position(|c| *c == 0).unwrap_or(buf.len());
    Some(String::from_utf16_lossy(&buf[..len]))
}

/// Raw version resource of an executable.
fn read_version_info(path: &Path) -> Option<Vec<u8>> {
    let path = HSTRING::from(path.as_os_str());
    let size = unsafe { GetFileVersionInfoSizeW(&path, None) };
    if size == 0 {
        return None;
    }
    let mut data: Vec<u8> = vec![0; size as usize];
    unsafe { GetFileVersionInfoW(&path, Default::default(), size, data.as_mut_ptr() as *mut c_void) }.ok()?;
    Some(data)
}

/// Pointer to a version resource value and its reported length.
///
/// The pointer targets the inside of `data`.
fn version_value(data: &[u8], key: &str) -> Option<(*const c_void, usize)> {
    let mut value: *mut c_void = std::ptr::null_mut();
    let mut len: u32 = 0;
    let found = unsafe {
        VerQueryValueW(
            data.as_ptr() as *const c_void,
            &HSTRING::from(key),
            &mut value,
            &mut len,
        )
    };
    (found.as_bool() && !value.is_null()).then_some((value as *const c_void, len as usize))
}

/// First language and code page listed in the resource.
fn version_translation(data: &[u8]) -> Option<(u16, u16)> {
    let (value, len) = version_value(data, "\\VarFileInfo\\Translation")?;
    if len < 4 {
        return None;
    }
    // Safety: the translation table holds `len` bytes inside `data`.
    let raw = unsafe { std::slice::from_raw_parts(value as *const u8, 4) };
    Some((
        u16::from_le_bytes([raw[0], raw[1]]),
        u16::from_le_bytes([raw[2], raw[3]]),
    ))
}

/// A string value. The reported length counts UTF-16 units.
fn version_string(data: &[u8], key: &str) -> Option<String> {
    let (value, len) = version_value(data, key)?;
    // Safety: string values are `len` UTF-16 units inside `data`.
    let units = unsafe { std::slice::from_raw_parts(value as *const u16, len) };
    let end = units.iter().position(|c| *c == 0).unwrap_or(units.len());
    Some(String::from_utf16_lossy(&units[..end]).trim().to_string())
}

/// Enumeration callback forwarding to the visitor passed through `lparam`.
unsafe extern "system" fn enum_proc(hwnd: HWND, lparam: LPARAM) -> BOOL {
    // Safety: the visit_* methods pass a live visitor reference and do not
    // return before enumeration ends.
    let visitor = unsafe { &mut *(lparam.0 as *mut Visitor<'_>) };

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| visitor(from_hwnd(hwnd))));

    match result {
        Ok(ControlFlow::Continue(())) => BOOL(1),
        Ok(ControlFlow::Break(())) => BOOL(0),
        Err(e) => {
            tracing::error!("Panic in window enumeration visitor: {:?}", e);
            BOOL(0)
        }
    }
}
