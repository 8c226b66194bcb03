//! tmux command lines.
//!
//! Both the real client and [`MemoryMultiplexer`](crate::memory::MemoryMultiplexer)
//! build their commands here, so `tide plan` prints exactly what a launch runs.

use std::fmt;
use std::path::Path;

use crate::bindings::{KeyAction, KeyTable};
use crate::multiplexer::OptionScope;
use crate::naming::LIST_SESSIONS_FORMAT;
use crate::quote::join_args;

/// Arguments of one `tmux` invocation (without the `tmux` itself)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TmuxCommand {
    args: Vec<String>,
}

/// One row of a `display-menu`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuItem {
    /// Selectable row running a tmux command
    Entry {
        label: String,
        key: String,
        command: String,
    },
    /// Greyed-out row
    Disabled { label: String },
    Separator,
}

impl MenuItem {
    fn args(&self) -> Vec<String> {
        match self {
            MenuItem::Entry {
                label,
                key,
                command,
            } => vec![label.clone(), key.clone(), command.clone()],
            // A leading `-` disables the row
            MenuItem::Disabled { label } => vec![format!("-{}", label), String::new(), String::new()],
            MenuItem::Separator => vec![String::new()],
        }
    }
}

fn target(session: &str, index: u32) -> String {
    format!("{}:{}", session, index)
}

impl TmuxCommand {
    fn from_args<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// tmux subcommand name (`bind-key`)
    pub fn name(&self) -> &str {
        self.args.first().map(String::as_str).unwrap_or_default()
    }

    pub fn has_session(name: &str) -> Self {
        // `=` forces an exact match instead of a prefix match
        Self::from_args(["has-session".to_string(), "-t".to_string(), format!("={}", name)])
    }

    /// Detached session whose first window is `window_name`; prints the window index
    pub fn new_session(name: &str, window_name: &str, cwd: &Path) -> Self {
        Self::from_args([
            "new-session".to_string(),
            "-d".to_string(),
            "-s".to_string(),
            name.to_string(),
            "-n".to_string(),
            window_name.to_string(),
            "-c".to_string(),
            cwd.display().to_string(),
            "-P".to_string(),
            "-F".to_string(),
            "#{window_index}".to_string(),
        ])
    }

    pub fn move_window(session: &str, from: u32, to: u32) -> Self {
        Self::from_args([
            "move-window".to_string(),
            "-s".to_string(),
            target(session, from),
            "-t".to_string(),
            target(session, to),
        ])
    }

    pub fn new_window(session: &str, index: u32, name: &str, cwd: &Path) -> Self {
        Self::from_args([
            "new-window".to_string(),
            "-d".to_string(),
            "-t".to_string(),
            target(session, index),
            "-n".to_string(),
            name.to_string(),
            "-c".to_string(),
            cwd.display().to_string(),
        ])
    }

    /// Type `text` verbatim (`-l` disables key-name lookup)
    pub fn send_literal(session: &str, index: u32, text: &str) -> Self {
        Self::from_args([
            "send-keys".to_string(),
            "-t".to_string(),
            target(session, index),
            "-l".to_string(),
            text.to_string(),
        ])
    }

    pub fn send_enter(session: &str, index: u32) -> Self {
        Self::from_args([
            "send-keys".to_string(),
            "-t".to_string(),
            target(session, index),
            "Enter".to_string(),
        ])
    }

    pub fn set_option(scope: OptionScope, target: &str, option: &str, value: &str) -> Self {
        let mut args = vec!["set-option".to_string()];
        if scope == OptionScope::Window {
            args.push("-w".to_string());
        }
        args.extend([
            "-t".to_string(),
            target.to_string(),
            option.to_string(),
            value.to_string(),
        ]);
        Self { args }
    }

    pub fn select_window(session: &str, index: u32) -> Self {
        Self::from_args(["select-window".to_string(), "-t".to_string(), target(session, index)])
    }

    pub fn bind_key(table: KeyTable, key: &str, action: &KeyAction) -> Self {
        let mut args = vec!["bind-key".to_string()];
        args.extend(table.flag_args().iter().map(|s| s.to_string()));
        args.push(key.to_string());
        args.extend(action.to_args());
        Self { args }
    }

    pub fn unbind_key(table: KeyTable, key: &str) -> Self {
        let mut args = vec!["unbind-key".to_string()];
        args.extend(table.flag_args().iter().map(|s| s.to_string()));
        args.push(key.to_string());
        Self { args }
    }

    pub fn kill_session(name: &str) -> Self {
        Self::from_args(["kill-session".to_string(), "-t".to_string(), format!("={}", name)])
    }

    pub fn attach_session(name: &str) -> Self {
        Self::from_args(["attach-session".to_string(), "-t".to_string(), format!("={}", name)])
    }

    pub fn switch_client(name: &str) -> Self {
        Self::from_args(["switch-client".to_string(), "-t".to_string(), format!("={}", name)])
    }

    pub fn list_sessions() -> Self {
        Self::from_args(["list-sessions", "-F", LIST_SESSIONS_FORMAT])
    }

    pub fn set_hook(session: &str, hook: &str, command: &str) -> Self {
        Self::from_args(["set-hook", "-t", session, hook, command])
    }

    /// Menu centered on `client`; tmux picks the calling client when `None`
    pub fn display_menu(client: Option<&str>, title: &str, items: &[MenuItem]) -> Self {
        let mut args = vec!["display-menu".to_string()];
        if let Some(client) = client {
            args.extend(["-c".to_string(), client.to_string()]);
        }
        args.extend(["-T", title, "-x", "C", "-y", "C"].map(String::from));
        args.extend(items.iter().flat_map(MenuItem::args));
        Self { args }
    }

    pub fn current_session() -> Self {
        Self::from_args(["display-message", "-p", "#{session_name}"])
    }
}

impl fmt::Display for TmuxCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tmux {}", join_args(&self.args))
    }
}
