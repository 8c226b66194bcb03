use thiserror::Error;

/// Errors raised while building a [`WindowPlan`](crate::plan::WindowPlan)
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    /// The plan has no windows at all
    #[error("window plan is empty")]
    Empty,

    /// Window indices start at 1
    #[error("window index must be between 1 and {max}: {index}")]
    IndexOutOfRange { index: u32, max: u32 },

    /// Two windows share an index
    #[error("duplicate window index: {index}")]
    DuplicateIndex { index: u32 },

    /// Two windows share a hotkey
    #[error("hotkey F{hotkey} is assigned to more than one window")]
    DuplicateHotkey { hotkey: u8 },

    /// Only F1..F9 select windows; F10 and F12 are reserved
    #[error("hotkey must be F1..F9: F{hotkey}")]
    InvalidHotkey { hotkey: u8 },

    /// Window names are shown in the status bar and must not be blank
    #[error("window {index} has an empty name")]
    EmptyName { index: u32 },

    /// A program window without a program
    #[error("window {index} has an empty program")]
    EmptyProgram { index: u32 },
}

/// Errors that abort a launch
///
/// Every variant is raised before any key is bound, so a failed launch never
/// leaves bindings behind.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// A required external program is not on `PATH`
    #[error("required program not found: {tool}")]
    ExternalToolMissing { tool: String },

    /// The session name is already registered and may not be reused
    #[error("session already exists: {name}")]
    SessionCreate { name: String },

    /// tmux rejects `:` and `.` in session names
    #[error("invalid session name: {name:?}")]
    InvalidSessionName { name: String },

    /// The window plan failed validation
    #[error("invalid window plan: {0}")]
    InvalidPlan(#[from] PlanError),

    /// A multiplexer command that must succeed failed
    #[error(transparent)]
    Multiplexer(#[from] anyhow::Error),
}
