//! Window classification.
//!
//! Decides whether a top-level window is something a user would recognise
//! as an application window, and if so which program owns it.

use crate::platform::WindowPrimitives;
use crate::program::{find_hosted_executable, is_host_shell, ProgramDescriptor, DEFAULT_HOST_SHELL};
use crate::{ExtendedStyle, WindowHandle};
use tracing::debug;

/// Result of classifying one window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassificationOutcome {
    /// The window belongs to the calling process.
    Excluded { handle: WindowHandle, context: String },
    /// The window lacks the visible style.
    Invisible { handle: WindowHandle, context: String },
    /// The window is hidden by the compositor.
    Cloaked { handle: WindowHandle, context: String },
    /// A tool or non-activating window without the app-window style.
    ToolWindow { handle: WindowHandle, context: String },
    /// The owning program could not be resolved.
    NoDetails { handle: WindowHandle, context: String },
    /// A real application window.
    Successful {
        handle: WindowHandle,
        program: ProgramDescriptor,
    },
}

/// Fieldless tag of a [`ClassificationOutcome`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutcomeStatus {
    Excluded,
    Invisible,
    Cloaked,
    ToolWindow,
    NoDetails,
    Successful,
}

impl OutcomeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Excluded => "excluded",
            Self::Invisible => "invisible",
            Self::Cloaked => "cloaked",
            Self::ToolWindow => "tool_window",
            Self::NoDetails => "no_details",
            Self::Successful => "successful",
        }
    }
}

impl ClassificationOutcome {
    pub fn status(&self) -> OutcomeStatus {
        match self {
            Self::Excluded { .. } => OutcomeStatus::Excluded,
            Self::Invisible { .. } => OutcomeStatus::Invisible,
            Self::Cloaked { .. } => OutcomeStatus::Cloaked,
            Self::ToolWindow { .. } => OutcomeStatus::ToolWindow,
            Self::NoDetails { .. } => OutcomeStatus::NoDetails,
            Self::Successful { .. } => OutcomeStatus::Successful,
        }
    }

    /// The classified window.
    pub fn handle(&self) -> WindowHandle {
        match self {
            Self::Excluded { handle, .. }
            | Self::Invisible { handle, .. }
            | Self::Cloaked { handle, .. }
            | Self::ToolWindow { handle, .. }
            | Self::NoDetails { handle, .. }
            | Self::Successful { handle, .. } => *handle,
        }
    }

    pub fn is_successful(&self) -> bool {
        matches!(self, Self::Successful { .. })
    }

    /// Diagnostic context of an unsuccessful outcome.
    pub fn context(&self) -> Option<&str> {
        match self {
            Self::Excluded { context, .. }
            | Self::Invisible { context, .. }
            | Self::Cloaked { context, .. }
            | Self::ToolWindow { context, .. }
            | Self::NoDetails { context, .. } => Some(context),
            Self::Successful { .. } => None,
        }
    }

    pub fn program(&self) -> Option<&ProgramDescriptor> {
        match self {
            Self::Successful { program, .. } => Some(program),
            _ => None,
        }
    }
}

/// Classifies windows, resolving host-shell indirection.
#[derive(Debug, Clone)]
pub struct Classifier {
    host_shell_name: String,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(DEFAULT_HOST_SHELL)
    }
}

impl Classifier {
    pub fn new(host_shell_name: impl Into<String>) -> Self {
        Self {
            host_shell_name: host_shell_name.into(),
        }
    }

    pub fn host_shell_name(&self) -> &str {
        &self.host_shell_name
    }

    /// Classify a window. The first failing check decides the outcome.
    pub fn classify<P: WindowPrimitives + ?Sized>(
        &self,
        platform: &P,
        handle: WindowHandle,
    ) -> ClassificationOutcome {
        let context = || handle.to_string();

        let process_id = platform.owning_process_id(handle);
        if process_id == platform.current_process_id() {
            return ClassificationOutcome::Excluded {
                handle,
                context: context(),
            };
        }

        if !platform.is_visible(handle) {
            return ClassificationOutcome::Invisible {
                handle,
                context: context(),
            };
        }

        if platform.is_cloaked(handle) {
            return ClassificationOutcome::Cloaked {
                handle,
                context: context(),
            };
        }

        // App windows are promoted regardless of the tool/no-activate bits
        let style = platform.extended_style(handle);
        if !style.contains(ExtendedStyle::APP_WINDOW)
            && style.intersects(ExtendedStyle::TOOL_WINDOW | ExtendedStyle::NO_ACTIVATE)
        {
            return ClassificationOutcome::ToolWindow {
                handle,
                context: context(),
            };
        }

        let path = platform.executable_path(process_id);
        let Some(mut program) = ProgramDescriptor::resolve(platform, &path) else {
            debug!("No program details for window {} (path: {:?})", handle, path);
            let context = if path.is_empty() { context() } else { path };
            return ClassificationOutcome::NoDetails { handle, context };
        };

        if is_host_shell(&program.executable, &self.host_shell_name) {
            match find_hosted_executable(platform, handle, &self.host_shell_name)
                .and_then(|hosted| ProgramDescriptor::resolve(platform, &hosted))
            {
                Some(hosted) => {
                    debug!("Window {} hosts {}", handle, hosted.executable);
                    program = hosted;
                }
                None => debug!("Host window {} has no resolvable hosted program", handle),
            }
        }

        ClassificationOutcome::Successful { handle, program }
    }
}

/// Classify a window with the default host shell name.
pub fn classify<P: WindowPrimitives + ?Sized>(platform: &P, handle: WindowHandle) -> ClassificationOutcome {
    Classifier::default().classify(platform, handle)
}
