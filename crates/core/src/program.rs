//! Resolution of executables into program descriptors, including the
//! host-shell indirection used by packaged applications.

use crate::platform::WindowPrimitives;
use crate::{WindowHandle, UNKNOWN_PROCESS};
use serde::{Deserialize, Serialize};
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};

/// Executable stem of the generic host that frames packaged applications.
pub const DEFAULT_HOST_SHELL: &str = "ApplicationFrameHost";

/// Identity of the application that visually owns a window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramDescriptor {
    /// Directory the executable (or package) is installed in.
    pub install_dir: PathBuf,
    /// Executable file name, e.g. `notepad.exe`.
    pub executable: String,
    /// Human-readable name.
    pub description: String,
    /// Icon or logo reference, when the package declares one.
    pub image: Option<String>,
}

impl ProgramDescriptor {
    /// Build a descriptor for an executable path.
    ///
    /// Returns `None` when the path is empty or the file does not exist,
    /// typically because the process could not be queried.
    pub fn resolve<P: WindowPrimitives + ?Sized>(platform: &P, executable_path: &str) -> Option<Self> {
        if executable_path.is_empty() {
            return None;
        }
        let path = Path::new(executable_path);
        if !platform.executable_exists(path) {
            return None;
        }

        let install_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();

        let (executable, description, image) = match platform.package_metadata(&install_dir) {
            Some(package) => (package.executable, package.display_name, package.logo),
            None => (
                file_name(path),
                platform.file_description(path).unwrap_or_default(),
                None,
            ),
        };

        let description = if description.is_empty() {
            file_stem(Path::new(&executable))
        } else {
            description
        };

        Some(Self {
            install_dir,
            executable,
            description,
            image,
        })
    }
}

/// Whether an executable path or file name belongs to the host shell.
///
/// Compares the file stem case-insensitively.
pub fn is_host_shell(executable: &str, host_shell_name: &str) -> bool {
    !executable.is_empty() && file_stem(Path::new(executable)).eq_ignore_ascii_case(host_shell_name)
}

/// Visit child windows of `parent` and return the first value `f` produces.
pub fn find_child<P, T>(
    platform: &P,
    parent: WindowHandle,
    mut f: impl FnMut(WindowHandle) -> Option<T>,
) -> Option<T>
where
    P: WindowPrimitives + ?Sized,
{
    let mut found = None;
    platform.visit_child_windows(parent, &mut |child| match f(child) {
        Some(value) => {
            found = Some(value);
            ControlFlow::Break(())
        }
        None => ControlFlow::Continue(()),
    });
    found
}

/// Executable path of the first child window not owned by the host shell.
///
/// Children whose process cannot be resolved are skipped.
pub fn find_hosted_executable<P: WindowPrimitives + ?Sized>(
    platform: &P,
    host: WindowHandle,
    host_shell_name: &str,
) -> Option<String> {
    find_child(platform, host, |child| {
        let process_id = platform.owning_process_id(child);
        if process_id == UNKNOWN_PROCESS {
            return None;
        }
        let path = platform.executable_path(process_id);
        if path.is_empty() || is_host_shell(&path, host_shell_name) {
            None
        } else {
            Some(path)
        }
    })
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
