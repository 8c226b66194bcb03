//! In-memory multiplexer.
//!
//! Models the parts of a tmux server the lifecycle touches: one shared key
//! table, the session namespace, windows and the keystrokes typed into them.
//! Clones share one server, so several controllers can run against it the way
//! several tide processes share one tmux server. Every command is recorded in
//! tmux syntax; `tide plan` prints that log.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use parking_lot::{Condvar, Mutex};

use crate::bindings::{KeyAction, KeyTable, ManagedKey};
use crate::command::{MenuItem, TmuxCommand};
use crate::multiplexer::{Multiplexer, OptionScope, SessionCreate};
use crate::naming::SessionInfo;

#[derive(Debug, Default)]
struct MemoryWindow {
    name: String,
    typed: Vec<String>,
}

#[derive(Debug)]
struct MemorySession {
    created: DateTime<Utc>,
    windows: BTreeMap<u32, MemoryWindow>,
    options: BTreeMap<String, String>,
}

#[derive(Debug, Default)]
struct MemoryServer {
    sessions: BTreeMap<String, MemorySession>,
    bindings: BTreeMap<ManagedKey, KeyAction>,
    log: Vec<TmuxCommand>,
    failing: HashSet<String>,
    current: Option<String>,
    clock: i64,
    /// attach_session blocks instead of returning at once
    hold_attach: bool,
    /// Session a blocked attach_session is waiting on
    attached: Option<String>,
}

impl MemoryServer {
    /// Record a command; errors if its name was marked failing
    fn record(&mut self, command: TmuxCommand) -> Result<()> {
        let failing = self.failing.contains(command.name());
        let name = command.name().to_string();
        self.log.push(command);
        if failing {
            bail!("tmux {} failed: injected failure", name);
        }
        Ok(())
    }

    /// End a blocked attach if it is waiting on `name` (any session when `None`)
    fn end_attach(&mut self, name: Option<&str>) -> bool {
        let ends = match (&self.attached, name) {
            (Some(_), None) => true,
            (Some(attached), Some(name)) => attached == name,
            (None, _) => false,
        };
        if ends {
            self.attached = None;
        }
        ends
    }

    fn session_mut(&mut self, name: &str) -> Result<&mut MemorySession> {
        match self.sessions.get_mut(name) {
            Some(session) => Ok(session),
            None => bail!("can't find session: {}", name),
        }
    }
}

/// Multiplexer backed by process memory
#[derive(Debug, Clone, Default)]
pub struct MemoryMultiplexer {
    server: Arc<Mutex<MemoryServer>>,
    detached: Arc<Condvar>,
}

impl MemoryMultiplexer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later command with this name fail (`"unbind-key"`)
    pub fn fail_command(&self, name: &str) {
        self.server.lock().failing.insert(name.to_string());
    }

    /// Destroy a session behind the controller's back (crash, external kill)
    pub fn remove_session(&self, name: &str) {
        let mut server = self.server.lock();
        server.sessions.remove(name);
        if server.end_attach(Some(name)) {
            self.detached.notify_all();
        }
    }

    /// Make later attaches block like a real client: until
    /// `detach_client` or until the attached session is killed
    pub fn hold_attach(&self) {
        self.server.lock().hold_attach = true;
    }

    /// Pretend this process runs inside `name`
    pub fn set_current_session(&self, name: Option<&str>) {
        self.server.lock().current = name.map(str::to_string);
    }

    pub fn binding(&self, table: KeyTable, key: &str) -> Option<KeyAction> {
        let key = ManagedKey {
            table,
            key: key.to_string(),
        };
        self.server.lock().bindings.get(&key).cloned()
    }

    /// Every currently bound key, sorted
    pub fn bound_keys(&self) -> Vec<ManagedKey> {
        self.server.lock().bindings.keys().cloned().collect()
    }

    /// `(index, name)` of each window, by index
    pub fn windows(&self, session: &str) -> Vec<(u32, String)> {
        self.server
            .lock()
            .sessions
            .get(session)
            .map(|s| {
                s.windows
                    .iter()
                    .map(|(index, w)| (*index, w.name.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Text typed into a window; a confirmed line ends in `\n`
    pub fn typed(&self, session: &str, index: u32) -> Vec<String> {
        self.server
            .lock()
            .sessions
            .get(session)
            .and_then(|s| s.windows.get(&index))
            .map(|w| w.typed.clone())
            .unwrap_or_default()
    }

    pub fn option(&self, target: &str, option: &str) -> Option<String> {
        let session = target.split(':').next().unwrap_or(target);
        self.server
            .lock()
            .sessions
            .get(session)
            .and_then(|s| s.options.get(&format!("{}|{}", target, option)))
            .cloned()
    }

    /// Commands issued so far, in order
    pub fn commands(&self) -> Vec<TmuxCommand> {
        self.server.lock().log.clone()
    }

    pub fn count_commands(&self, name: &str) -> usize {
        self.server
            .lock()
            .log
            .iter()
            .filter(|c| c.name() == name)
            .count()
    }
}

impl Multiplexer for MemoryMultiplexer {
    fn has_session(&self, name: &str) -> bool {
        let mut server = self.server.lock();
        server.log.push(TmuxCommand::has_session(name));
        server.sessions.contains_key(name)
    }

    fn new_session(
        &self,
        name: &str,
        first_index: u32,
        first_name: &str,
        cwd: &Path,
    ) -> Result<SessionCreate> {
        let mut server = self.server.lock();
        server.record(TmuxCommand::new_session(name, first_name, cwd))?;
        if server.sessions.contains_key(name) {
            return Ok(SessionCreate::AlreadyExists);
        }

        server.clock += 1;
        let created = DateTime::from_timestamp(1_700_000_000 + server.clock, 0).unwrap_or_default();
        let mut windows = BTreeMap::new();
        windows.insert(
            first_index,
            MemoryWindow {
                name: first_name.to_string(),
                typed: Vec::new(),
            },
        );
        server.sessions.insert(
            name.to_string(),
            MemorySession {
                created,
                windows,
                options: BTreeMap::new(),
            },
        );
        Ok(SessionCreate::Created)
    }

    fn new_window(&self, session: &str, index: u32, name: &str, cwd: &Path) -> Result<()> {
        let mut server = self.server.lock();
        server.record(TmuxCommand::new_window(session, index, name, cwd))?;
        let entry = server.session_mut(session)?;
        if entry.windows.contains_key(&index) {
            bail!("index {} in use", index);
        }
        entry.windows.insert(
            index,
            MemoryWindow {
                name: name.to_string(),
                typed: Vec::new(),
            },
        );
        Ok(())
    }

    fn send_keys(&self, session: &str, index: u32, text: &str, confirm: bool) -> Result<()> {
        let mut server = self.server.lock();
        server.record(TmuxCommand::send_literal(session, index, text))?;
        if confirm {
            server.record(TmuxCommand::send_enter(session, index))?;
        }
        let window = match server.session_mut(session)?.windows.get_mut(&index) {
            Some(window) => window,
            None => bail!("can't find window: {}:{}", session, index),
        };
        let mut line = text.to_string();
        if confirm {
            line.push('\n');
        }
        window.typed.push(line);
        Ok(())
    }

    fn set_option(
        &self,
        scope: OptionScope,
        target: &str,
        option: &str,
        value: &str,
    ) -> Result<()> {
        let mut server = self.server.lock();
        server.record(TmuxCommand::set_option(scope, target, option, value))?;
        let session = target.split(':').next().unwrap_or(target);
        server
            .session_mut(session)?
            .options
            .insert(format!("{}|{}", target, option), value.to_string());
        Ok(())
    }

    fn select_window(&self, session: &str, index: u32) -> Result<()> {
        let mut server = self.server.lock();
        server.record(TmuxCommand::select_window(session, index))?;
        if !server.session_mut(session)?.windows.contains_key(&index) {
            bail!("can't find window: {}:{}", session, index);
        }
        Ok(())
    }

    fn set_hook(&self, session: &str, hook: &str, command: &str) -> Result<()> {
        let mut server = self.server.lock();
        server.record(TmuxCommand::set_hook(session, hook, command))?;
        server
            .session_mut(session)?
            .options
            .insert(format!("{}|{}", session, hook), command.to_string());
        Ok(())
    }

    fn bind_key(&self, table: KeyTable, key: &str, action: &KeyAction) -> Result<()> {
        let mut server = self.server.lock();
        server.record(TmuxCommand::bind_key(table, key, action))?;
        server.bindings.insert(
            ManagedKey {
                table,
                key: key.to_string(),
            },
            action.clone(),
        );
        Ok(())
    }

    fn unbind_key(&self, table: KeyTable, key: &str) -> Result<()> {
        let mut server = self.server.lock();
        server.record(TmuxCommand::unbind_key(table, key))?;
        server.bindings.remove(&ManagedKey {
            table,
            key: key.to_string(),
        });
        Ok(())
    }

    fn kill_session(&self, name: &str) -> Result<()> {
        let mut server = self.server.lock();
        server.record(TmuxCommand::kill_session(name))?;
        if server.sessions.remove(name).is_none() {
            bail!("can't find session: {}", name);
        }
        if server.end_attach(Some(name)) {
            self.detached.notify_all();
        }
        Ok(())
    }

    /// Returns immediately, as if the operator detached at once, unless
    /// [`hold_attach`](MemoryMultiplexer::hold_attach) was called
    fn attach_session(&self, name: &str) -> Result<()> {
        let mut server = self.server.lock();
        server.record(TmuxCommand::attach_session(name))?;
        if !server.sessions.contains_key(name) {
            bail!("can't find session: {}", name);
        }
        if server.hold_attach {
            server.attached = Some(name.to_string());
            while server.attached.is_some() {
                self.detached.wait(&mut server);
            }
        }
        Ok(())
    }

    fn detach_client(&self) -> Result<()> {
        if self.server.lock().end_attach(None) {
            self.detached.notify_all();
        }
        Ok(())
    }

    fn list_sessions(&self) -> Result<Vec<SessionInfo>> {
        let mut server = self.server.lock();
        server.record(TmuxCommand::list_sessions())?;
        let current = server.current.clone();
        Ok(server
            .sessions
            .iter()
            .map(|(name, s)| SessionInfo {
                name: name.clone(),
                created: s.created,
                attached: current.as_deref() == Some(name.as_str()),
            })
            .collect())
    }

    fn current_session(&self) -> Option<String> {
        self.server.lock().current.clone()
    }

    fn switch_client(&self, name: &str) -> Result<()> {
        let mut server = self.server.lock();
        server.record(TmuxCommand::switch_client(name))?;
        if !server.sessions.contains_key(name) {
            bail!("can't find session: {}", name);
        }
        server.current = Some(name.to_string());
        Ok(())
    }

    fn display_menu(&self, client: Option<&str>, title: &str, items: &[MenuItem]) -> Result<()> {
        self.server
            .lock()
            .record(TmuxCommand::display_menu(client, title, items))
    }
}
