//! Boundary with the terminal multiplexer server.

use anyhow::Result;
use std::path::Path;

use crate::bindings::{KeyAction, KeyTable};
use crate::command::MenuItem;
use crate::naming::SessionInfo;

/// Result of `new-session`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCreate {
    Created,
    /// A session with that name is already registered
    AlreadyExists,
}

/// Whether `set-option` targets a session or a window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionScope {
    Session,
    Window,
}

/// Commands the lifecycle issues against the multiplexer server.
///
/// The key table and session namespace belong to the server and are shared
/// with every other client; nothing here can lock them.
pub trait Multiplexer {
    /// Whether a session with exactly this name exists
    fn has_session(&self, name: &str) -> bool;

    /// Create a detached session whose first window gets `first_index`
    fn new_session(
        &self,
        name: &str,
        first_index: u32,
        first_name: &str,
        cwd: &Path,
    ) -> Result<SessionCreate>;

    fn new_window(&self, session: &str, index: u32, name: &str, cwd: &Path) -> Result<()>;

    /// Type `text` literally into a window, then press Enter if `confirm`
    fn send_keys(&self, session: &str, index: u32, text: &str, confirm: bool) -> Result<()>;

    fn set_option(&self, scope: OptionScope, target: &str, option: &str, value: &str)
        -> Result<()>;

    fn select_window(&self, session: &str, index: u32) -> Result<()>;

    /// Install a session hook, replacing the previous command
    fn set_hook(&self, session: &str, hook: &str, command: &str) -> Result<()>;

    /// Bind `key`, silently replacing whatever was bound before
    fn bind_key(&self, table: KeyTable, key: &str, action: &KeyAction) -> Result<()>;

    /// Remove a binding; succeeds when the key was not bound
    fn unbind_key(&self, table: KeyTable, key: &str) -> Result<()>;

    fn kill_session(&self, name: &str) -> Result<()>;

    /// Attach the calling terminal; blocks until detach or session end
    fn attach_session(&self, name: &str) -> Result<()>;

    /// End an [`attach_session`](Self::attach_session) running in this
    /// process; no-op when nothing is attached
    fn detach_client(&self) -> Result<()>;

    fn list_sessions(&self) -> Result<Vec<SessionInfo>>;

    /// Session of the client this process runs in, if any
    fn current_session(&self) -> Option<String>;

    fn switch_client(&self, name: &str) -> Result<()>;

    /// Show a menu on `client` (the calling client when `None`)
    fn display_menu(&self, client: Option<&str>, title: &str, items: &[MenuItem]) -> Result<()>;
}

impl<M: Multiplexer + ?Sized> Multiplexer for &M {
    fn has_session(&self, name: &str) -> bool {
        (**self).has_session(name)
    }

    fn new_session(
        &self,
        name: &str,
        first_index: u32,
        first_name: &str,
        cwd: &Path,
    ) -> Result<SessionCreate> {
        (**self).new_session(name, first_index, first_name, cwd)
    }

    fn new_window(&self, session: &str, index: u32, name: &str, cwd: &Path) -> Result<()> {
        (**self).new_window(session, index, name, cwd)
    }

    fn send_keys(&self, session: &str, index: u32, text: &str, confirm: bool) -> Result<()> {
        (**self).send_keys(session, index, text, confirm)
    }

    fn set_option(
        &self,
        scope: OptionScope,
        target: &str,
        option: &str,
        value: &str,
    ) -> Result<()> {
        (**self).set_option(scope, target, option, value)
    }

    fn select_window(&self, session: &str, index: u32) -> Result<()> {
        (**self).select_window(session, index)
    }

    fn set_hook(&self, session: &str, hook: &str, command: &str) -> Result<()> {
        (**self).set_hook(session, hook, command)
    }

    fn bind_key(&self, table: KeyTable, key: &str, action: &KeyAction) -> Result<()> {
        (**self).bind_key(table, key, action)
    }

    fn unbind_key(&self, table: KeyTable, key: &str) -> Result<()> {
        (**self).unbind_key(table, key)
    }

    fn kill_session(&self, name: &str) -> Result<()> {
        (**self).kill_session(name)
    }

    fn attach_session(&self, name: &str) -> Result<()> {
        (**self).attach_session(name)
    }

    fn detach_client(&self) -> Result<()> {
        (**self).detach_client()
    }

    fn list_sessions(&self) -> Result<Vec<SessionInfo>> {
        (**self).list_sessions()
    }

    fn current_session(&self) -> Option<String> {
        (**self).current_session()
    }

    fn switch_client(&self, name: &str) -> Result<()> {
        (**self).switch_client(name)
    }

    fn display_menu(&self, client: Option<&str>, title: &str, items: &[MenuItem]) -> Result<()> {
        (**self).display_menu(client, title, items)
    }
}
