use anyhow::{Context, Result};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use parking_lot::Mutex;
use std::path::Path;
use std::process::{Command, Output};

use tide_core::naming::SessionInfo;
use tide_core::{
    KeyAction, KeyTable, MenuItem, Multiplexer, OptionScope, SessionCreate, TmuxCommand,
};

/// Client for interacting with tmux
pub struct TmuxClient {
    /// Executable to run (normally `tmux`)
    program: String,
    /// Pid of the running `attach-session` client, if any
    attach_pid: Mutex<Option<u32>>,
}

impl TmuxClient {
    /// Creates a new TmuxClient running `tmux` from PATH
    pub fn new() -> Self {
        Self::with_program("tmux")
    }

    /// Creates a new TmuxClient running a custom executable
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            attach_pid: Mutex::new(None),
        }
    }

    fn output(&self, command: &TmuxCommand) -> Result<Output> {
        tracing::debug!(%command, "tmux");
        Command::new(&self.program)
            .args(command.args())
            .output()
            .with_context(|| format!("Failed to execute tmux {}", command.name()))
    }

    /// Run a command that must succeed; returns its stdout
    fn run(&self, command: &TmuxCommand) -> Result<String> {
        let output = self.output(command)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("tmux {} failed: {}", command.name(), stderr.trim());
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Default for TmuxClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether `new-session` failed because the name is taken
fn is_duplicate_session(stderr: &str) -> bool {
    stderr.contains("duplicate session")
}

/// Index printed by `new-session -P -F '#{window_index}'`
fn parse_window_index(stdout: &str) -> Option<u32> {
    stdout.trim().parse().ok()
}

impl Multiplexer for TmuxClient {
    fn has_session(&self, name: &str) -> bool {
        self.output(&TmuxCommand::has_session(name))
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn new_session(
        &self,
        name: &str,
        first_index: u32,
        first_name: &str,
        cwd: &Path,
    ) -> Result<SessionCreate> {
        let output = self.output(&TmuxCommand::new_session(name, first_name, cwd))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if is_duplicate_session(&stderr) {
                return Ok(SessionCreate::AlreadyExists);
            }
            anyhow::bail!("tmux new-session failed: {}", stderr.trim());
        }

        // The operator's base-index decides where the first window lands
        let stdout = String::from_utf8_lossy(&output.stdout);
        match parse_window_index(&stdout) {
            Some(index) if index != first_index => {
                self.run(&TmuxCommand::move_window(name, index, first_index))?;
            }
            Some(_) => {}
            None => tracing::warn!(output = %stdout.trim(), "unexpected new-session output"),
        }
        Ok(SessionCreate::Created)
    }

    fn new_window(&self, session: &str, index: u32, name: &str, cwd: &Path) -> Result<()> {
        self.run(&TmuxCommand::new_window(session, index, name, cwd))
            .map(drop)
    }

    fn send_keys(&self, session: &str, index: u32, text: &str, confirm: bool) -> Result<()> {
        self.run(&TmuxCommand::send_literal(session, index, text))?;
        if confirm {
            self.run(&TmuxCommand::send_enter(session, index))?;
        }
        Ok(())
    }

    fn set_option(
        &self,
        scope: OptionScope,
        target: &str,
        option: &str,
        value: &str,
    ) -> Result<()> {
        self.run(&TmuxCommand::set_option(scope, target, option, value))
            .map(drop)
    }

    fn select_window(&self, session: &str, index: u32) -> Result<()> {
        self.run(&TmuxCommand::select_window(session, index))
            .map(drop)
    }

    fn set_hook(&self, session: &str, hook: &str, command: &str) -> Result<()> {
        self.run(&TmuxCommand::set_hook(session, hook, command))
            .map(drop)
    }

    fn bind_key(&self, table: KeyTable, key: &str, action: &KeyAction) -> Result<()> {
        self.run(&TmuxCommand::bind_key(table, key, action))
            .map(drop)
    }

    /// tmux exits non-zero for keys that are not bound; that still counts as unbound
    fn unbind_key(&self, table: KeyTable, key: &str) -> Result<()> {
        let output = self.output(&TmuxCommand::unbind_key(table, key))?;
        if !output.status.success() {
            tracing::debug!(
                key,
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "unbind-key reported failure"
            );
        }
        Ok(())
    }

    fn kill_session(&self, name: &str) -> Result<()> {
        self.run(&TmuxCommand::kill_session(name)).map(drop)
    }

    fn attach_session(&self, name: &str) -> Result<()> {
        let command = TmuxCommand::attach_session(name);
        tracing::debug!(%command, "tmux");
        // Nested attach is refused while $TMUX is set
        let mut child = Command::new(&self.program)
            .args(command.args())
            .env_remove("TMUX")
            .spawn()
            .context("Failed to execute tmux attach-session")?;
        *self.attach_pid.lock() = Some(child.id());

        let status = child.wait();
        // `detach_client` takes the pid when it ends the client
        let detached = self.attach_pid.lock().take().is_none();
        let status = status.context("Failed to wait for tmux attach-session")?;
        if !status.success() && !detached {
            anyhow::bail!("tmux attach-session exited with {}", status);
        }
        Ok(())
    }

    /// SIGTERM makes the attach client restore the terminal and exit
    fn detach_client(&self) -> Result<()> {
        if let Some(pid) = self.attach_pid.lock().take() {
            tracing::debug!(pid, "terminating attach client");
            signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM)
                .context("Failed to signal tmux attach-session")?;
        }
        Ok(())
    }

    fn list_sessions(&self) -> Result<Vec<SessionInfo>> {
        let output = self.output(&TmuxCommand::list_sessions())?;
        // No server running means no sessions
        if !output.status.success() {
            return Ok(Vec::new());
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(SessionInfo::parse_list(&stdout))
    }

    fn current_session(&self) -> Option<String> {
        std::env::var_os("TMUX")?;
        let stdout = self.run(&TmuxCommand::current_session()).ok()?;
        let name = stdout.trim();
        (!name.is_empty()).then(|| name.to_string())
    }

    fn switch_client(&self, name: &str) -> Result<()> {
        self.run(&TmuxCommand::switch_client(name)).map(drop)
    }

    fn display_menu(&self, client: Option<&str>, title: &str, items: &[MenuItem]) -> Result<()> {
        self.run(&TmuxCommand::display_menu(client, title, items))
            .map(drop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = TmuxClient::new();
        assert_eq!(client.program, "tmux");
        assert!(client.attach_pid.lock().is_none());
        // Nothing attached: nothing to signal
        assert!(client.detach_client().is_ok());

        let custom = TmuxClient::with_program("/opt/tmux/bin/tmux");
        assert_eq!(custom.program, "/opt/tmux/bin/tmux");
    }

    #[test]
    fn test_duplicate_session_detection() {
        assert!(is_duplicate_session("duplicate session: ide-42\n"));
        assert!(!is_duplicate_session("no server running on /tmp/tmux-0/default"));
        assert!(!is_duplicate_session(""));
    }

    #[test]
    fn test_parse_window_index() {
        assert_eq!(parse_window_index("1\n"), Some(1));
        assert_eq!(parse_window_index("0"), Some(0));
        assert_eq!(parse_window_index(""), None);
        assert_eq!(parse_window_index("ide-42:0"), None);
    }

    #[test]
    fn test_missing_program_reports_error() {
        let client = TmuxClient::with_program("/nonexistent/tide-test-tmux");
        assert!(!client.has_session("ide-1"));
        let err = client
            .kill_session("ide-1")
            .expect_err("spawn must fail");
        assert!(err.to_string().contains("Failed to execute tmux kill-session"));
        // Unbinding is still an error when tmux cannot be started at all
        assert!(client.unbind_key(KeyTable::NoPrefix, "F1").is_err());
        assert!(client.attach_session("ide-1").is_err());
        assert!(client.attach_pid.lock().is_none());
    }

    #[test]
    fn test_detach_ends_attach_client() {
        use std::os::unix::fs::PermissionsExt;
        use std::sync::Arc;
        use std::time::{Duration, Instant};

        // Stands in for a tmux client that stays attached
        let dir = tempfile::tempdir().expect("tempdir");
        let fake = dir.path().join("tmux");
        std::fs::write(&fake, "#!/bin/sh\nexec sleep 30\n").expect("write script");
        std::fs::set_permissions(&fake, std::fs::Permissions::from_mode(0o755))
            .expect("chmod script");

        let client = Arc::new(TmuxClient::with_program(fake.display().to_string()));
        let attached = Arc::clone(&client);
        let handle = std::thread::spawn(move || attached.attach_session("work"));

        let deadline = Instant::now() + Duration::from_secs(5);
        while client.attach_pid.lock().is_none() {
            assert!(Instant::now() < deadline, "attach client never started");
            std::thread::sleep(Duration::from_millis(5));
        }

        let begun = Instant::now();
        client.detach_client().expect("detach");
        assert!(handle.join().expect("join").is_ok());
        assert!(begun.elapsed() < Duration::from_secs(5));
        assert!(client.attach_pid.lock().is_none());
    }
}
