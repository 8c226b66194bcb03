//! Session manager: list, switch to and kill sessions.
//!
//! Backs `tide sessions` and the Ctrl+S chooser. Listing shows tide's
//! auto-named sessions newest first (every session with `--all`) and marks
//! the one this client is attached to with `*`.

use anyhow::{Context, Result};
use chrono::{Local, TimeZone};
use std::fmt::Display;

use tide_core::quote::{escape_format, join_args, quote_single};
use tide_core::{MenuItem, Multiplexer, SessionInfo, TmuxCommand};

use crate::config::SessionsAction;

/// Timestamp format of the listing
const CREATED_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Shorter timestamp for menu rows
const MENU_CREATED_FORMAT: &str = "%m-%d %H:%M";

/// Options of `tide sessions`
#[derive(Debug, Clone, Default)]
pub struct SessionsRequest {
    pub action: Option<SessionsAction>,
    pub json: bool,
    pub all: bool,
}

/// Execute a session manager request; returns the text to print.
///
/// `program` is the tide executable, re-run by the chooser's kill entry.
pub fn run<M: Multiplexer>(
    mux: &M,
    prefix: &str,
    program: &str,
    request: &SessionsRequest,
) -> Result<String> {
    match &request.action {
        None | Some(SessionsAction::List) => {
            let sessions = list(mux, prefix, request.all)?;
            if request.json {
                serde_json::to_string_pretty(&sessions).context("Failed to serialize sessions")
            } else {
                let current = mux.current_session();
                Ok(render(&sessions, current.as_deref(), &Local))
            }
        }
        Some(SessionsAction::Switch { name }) => {
            switch(mux, name)?;
            Ok(format!("switched to {}", name))
        }
        Some(SessionsAction::Kill { name }) => {
            kill(mux, name)?;
            Ok(format!("killed {}", name))
        }
        // Output of a run-shell job would cover the pane, so print nothing
        Some(SessionsAction::Menu { client, kill }) => {
            menu(mux, prefix, program, client.as_deref(), *kill)?;
            Ok(String::new())
        }
    }
}

/// Sessions newest first
pub fn list<M: Multiplexer>(mux: &M, prefix: &str, all: bool) -> Result<Vec<SessionInfo>> {
    let sessions = mux.list_sessions()?;
    if !all {
        return Ok(SessionInfo::managed(sessions, prefix));
    }
    let mut sessions = sessions;
    sessions.sort_by(|a, b| b.created.cmp(&a.created).then_with(|| a.name.cmp(&b.name)));
    Ok(sessions)
}

/// One line per session: marker, name, creation time, attachment
pub fn render<Tz>(sessions: &[SessionInfo], current: Option<&str>, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    if sessions.is_empty() {
        return "no sessions".to_string();
    }

    let width = sessions.iter().map(|s| s.name.len()).max().unwrap_or(0);
    sessions
        .iter()
        .map(|s| {
            let marker = if current == Some(s.name.as_str()) { '*' } else { ' ' };
            let created = s.created.with_timezone(tz).format(CREATED_FORMAT);
            let attached = if s.attached { "  (attached)" } else { "" };
            format!("{} {:<width$}  {}{}", marker, s.name, created, attached)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Show the session chooser on `client`
pub fn menu<M: Multiplexer>(
    mux: &M,
    prefix: &str,
    program: &str,
    client: Option<&str>,
    kill: bool,
) -> Result<()> {
    let sessions = list(mux, prefix, false)?;
    let current = mux.current_session();
    let chooser = Chooser {
        program,
        client,
        kill,
    };
    let items = chooser.items(&sessions, current.as_deref(), &Local);
    let title = if kill { " Kill session " } else { " Sessions " };
    mux.display_menu(client, title, &items)
}

/// Rows of the Ctrl+S menu.
///
/// tmux expands formats in menu labels and commands, so every piece of
/// session data is escaped with [`escape_format`].
struct Chooser<'a> {
    program: &'a str,
    client: Option<&'a str>,
    kill: bool,
}

impl Chooser<'_> {
    fn items<Tz>(&self, sessions: &[SessionInfo], current: Option<&str>, tz: &Tz) -> Vec<MenuItem>
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        if sessions.is_empty() {
            return vec![MenuItem::Disabled {
                label: "no sessions".to_string(),
            }];
        }

        let width = sessions.iter().map(|s| s.name.len()).max().unwrap_or(0);
        let mut items = Vec::with_capacity(sessions.len() + 2);
        let mut keys = (1..=9).map(|n| n.to_string());
        for s in sessions {
            let created = s.created.with_timezone(tz).format(MENU_CREATED_FORMAT);
            let label = escape_format(&format!("{:<width$}  {}", s.name, created));
            if current == Some(s.name.as_str()) {
                items.push(MenuItem::Disabled {
                    label: format!("{} (current)", label),
                });
                continue;
            }
            items.push(MenuItem::Entry {
                label,
                key: keys.next().unwrap_or_default(),
                command: escape_format(&self.command_for(&s.name)),
            });
        }

        let others = sessions
            .iter()
            .any(|s| current != Some(s.name.as_str()));
        if !self.kill && others {
            let script = self.kill_script();
            items.push(MenuItem::Separator);
            items.push(MenuItem::Entry {
                label: "Kill a session...".to_string(),
                key: "k".to_string(),
                command: escape_format(&join_args(&["run-shell", script.as_str()])),
            });
        }
        items
    }

    /// Switch to `name`, or ask before killing it
    fn command_for(&self, name: &str) -> String {
        if !self.kill {
            return join_args(TmuxCommand::switch_client(name).args());
        }
        format!(
            "confirm-before -p {} {}",
            quote_single(&format!("Kill {}? (y/n)", name)),
            quote_single(&join_args(TmuxCommand::kill_session(name).args())),
        )
    }

    /// Re-run the chooser in kill mode on the same client
    fn kill_script(&self) -> String {
        let mut words = vec![self.program, "sessions", "menu", "--kill"];
        if let Some(client) = self.client {
            words.extend(["--client", client]);
        }
        escape_format(&join_args(&words))
    }
}

pub fn switch<M: Multiplexer>(mux: &M, name: &str) -> Result<()> {
    if !mux.has_session(name) {
        anyhow::bail!("no such session: {}", name);
    }
    mux.switch_client(name)
}

/// Kill a session; the one this client is attached to is refused
pub fn kill<M: Multiplexer>(mux: &M, name: &str) -> Result<()> {
    if mux.current_session().as_deref() == Some(name) {
        anyhow::bail!("refusing to kill the current session: {}", name);
    }
    if !mux.has_session(name) {
        anyhow::bail!("no such session: {}", name);
    }
    tracing::info!(session = name, "killing session");
    mux.kill_session(name)
}
