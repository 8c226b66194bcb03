//! Session lifecycle: startup and shutdown of one tide session.
//!
//! ```text
//! Absent -> Starting -> Running -> Stopping -> Absent
//! ```
//!
//! Startup clears every managed key before binding anything, which erases
//! whatever a crashed or externally killed session left behind. Shutdown
//! checks liveness, retracts every managed key and kills the session if it is
//! still there. Each unbind / kill is best-effort; shutdown never fails.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::bindings::{
    session_bindings, status_shortcuts, BindingContext, BindingRegistry, FOCUS_OPTION,
    PASSTHROUGH_OPTION, TERM_COUNT_OPTION,
};
use crate::command::TmuxCommand;
use crate::error::LaunchError;
use crate::multiplexer::{Multiplexer, OptionScope, SessionCreate};
use crate::naming::validate_session_name;
use crate::plan::WindowPlan;
use crate::quote::join_args;

/// Where the status line is drawn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusPosition {
    Top,
    #[default]
    Bottom,
}

impl StatusPosition {
    pub fn as_str(self) -> &'static str {
        match self {
            StatusPosition::Top => "top",
            StatusPosition::Bottom => "bottom",
        }
    }
}

/// Colors and status line placement applied to the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Appearance {
    pub bg: String,
    pub fg: String,
    pub status_position: StatusPosition,
}

impl Default for Appearance {
    fn default() -> Self {
        Self {
            bg: "#1e1e2e".to_string(),
            fg: "#cdd6f4".to_string(),
            status_position: StatusPosition::Bottom,
        }
    }
}

impl Appearance {
    /// tmux style string (`bg=...,fg=...`)
    pub fn style(&self) -> String {
        format!("bg={},fg={}", self.bg, self.fg)
    }
}

/// Everything needed to launch one session
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    /// Session name
    pub session: String,
    /// Explicitly named sessions survive detach and signals
    pub persistent: bool,
    /// Working directory for every window
    pub cwd: PathBuf,
    /// Command used inside popups to call back into tide
    pub program: String,
    pub appearance: Appearance,
}

/// Lifecycle state of a controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LifecycleState {
    #[default]
    Absent,
    Starting,
    Running,
    Stopping,
}

/// How startup obtained its session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A new session was created and populated
    Created,
    /// A persistent session already existed; only its hotkeys were rebound
    Reattached,
}

/// What shutdown found and did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Keys retracted, session killed
    Killed,
    /// Session was already gone; keys retracted, nothing killed
    AlreadyGone,
    /// Persistent session still alive; left untouched with its bindings
    LeftRunning,
    /// Shutdown had already run (or startup never claimed the session)
    AlreadyDone,
}

/// Drives one session through startup and shutdown
pub struct LifecycleController<M: Multiplexer> {
    mux: M,
    spec: LaunchSpec,
    plan: WindowPlan,
    registry: BindingRegistry,
    state: Mutex<LifecycleState>,
    shut_down: AtomicBool,
}

impl<M: Multiplexer> LifecycleController<M> {
    /// Create a controller; fails on a session name tmux would rewrite
    pub fn new(mux: M, spec: LaunchSpec, plan: WindowPlan) -> Result<Self, LaunchError> {
        validate_session_name(&spec.session)?;
        let registry = BindingRegistry::from_plan(&plan);

        Ok(Self {
            mux,
            spec,
            plan,
            registry,
            state: Mutex::new(LifecycleState::Absent),
            shut_down: AtomicBool::new(false),
        })
    }

    pub fn session_name(&self) -> &str {
        &self.spec.session
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.lock()
    }

    pub fn registry(&self) -> &BindingRegistry {
        &self.registry
    }

    fn set_state(&self, next: LifecycleState) {
        let mut state = self.state.lock();
        tracing::debug!(session = %self.spec.session, from = ?*state, to = ?next, "lifecycle transition");
        *state = next;
    }

    /// Unbind every managed key, ignoring failures; returns how many failed
    pub fn clear_managed_keys(&self) -> usize {
        let mut failures = 0;
        for key in self.registry.all_managed_keys() {
            if let Err(e) = self.mux.unbind_key(key.table, &key.key) {
                tracing::debug!(key = %key, "unbind failed: {:#}", e);
                failures += 1;
            }
        }
        failures
    }

    /// Run the startup protocol
    ///
    /// On error the caller should still call [`shutdown`](Self::shutdown):
    /// it is a no-op when nothing was claimed and cleans up a half-built
    /// session otherwise.
    pub fn start(&self) -> Result<StartOutcome, LaunchError> {
        let name = self.spec.session.as_str();
        self.set_state(LifecycleState::Starting);

        let failures = self.clear_managed_keys();
        tracing::debug!(
            session = name,
            keys = self.registry.len(),
            failures,
            "cleared managed keys"
        );

        let first = self.plan.first();
        let outcome = match self
            .mux
            .new_session(name, first.index, &first.name, &self.spec.cwd)?
        {
            SessionCreate::Created => {
                self.populate()?;
                StartOutcome::Created
            }
            SessionCreate::AlreadyExists if self.spec.persistent => {
                tracing::info!(session = name, "session exists, reattaching");
                StartOutcome::Reattached
            }
            SessionCreate::AlreadyExists => {
                // The session belongs to someone else; never tear it down
                self.shut_down.store(true, Ordering::SeqCst);
                self.set_state(LifecycleState::Absent);
                return Err(LaunchError::SessionCreate {
                    name: name.to_string(),
                });
            }
        };

        self.bind_hotkeys()?;
        self.set_state(LifecycleState::Running);
        tracing::info!(session = name, ?outcome, "session ready");
        Ok(outcome)
    }

    /// Create the remaining windows, start their programs, apply options
    fn populate(&self) -> Result<()> {
        let name = self.spec.session.as_str();
        let first_index = self.plan.first().index;

        for window in self.plan.windows() {
            if window.index != first_index {
                self.mux
                    .new_window(name, window.index, &window.name, &self.spec.cwd)?;
            }
            if let Some(line) = window.launch.command_line() {
                self.mux.send_keys(name, window.index, &line, true)?;
            }
        }

        self.apply_options();

        if let Err(e) = self.mux.select_window(name, self.plan.home_window()) {
            tracing::warn!(session = name, "select-window failed: {:#}", e);
        }
        Ok(())
    }

    /// Cosmetic session options; a failure here never aborts a launch
    fn apply_options(&self) {
        let name = self.spec.session.as_str();
        let appearance = &self.spec.appearance;
        let style = appearance.style();
        let start_dir = self.spec.cwd.display().to_string();

        let session_options = [
            ("base-index", "1"),
            ("mouse", "on"),
            ("status", "on"),
            ("status-position", appearance.status_position.as_str()),
            ("status-style", style.as_str()),
            ("status-left", "#{@focus}#{@passthrough}[#S] "),
            ("status-right", status_shortcuts()),
            ("@start_dir", start_dir.as_str()),
            ("@theme_bg", appearance.bg.as_str()),
            ("@theme_fg", appearance.fg.as_str()),
            (PASSTHROUGH_OPTION, ""),
            // Ctrl+T names terminals T2, T3, ...; the home window is T1
            (TERM_COUNT_OPTION, "1"),
            ("focus-events", "on"),
            (FOCUS_OPTION, ""),
        ];
        for (option, value) in session_options {
            if let Err(e) = self
                .mux
                .set_option(OptionScope::Session, name, option, value)
            {
                tracing::warn!(session = name, option, "set-option failed: {:#}", e);
            }
        }

        let focus_hooks = [
            ("client-focus-in", ""),
            ("client-focus-out", "UNFOCUSED "),
        ];
        for (hook, value) in focus_hooks {
            let command = TmuxCommand::set_option(OptionScope::Session, name, FOCUS_OPTION, value);
            if let Err(e) = self.mux.set_hook(name, hook, &join_args(command.args())) {
                tracing::warn!(session = name, hook, "set-hook failed: {:#}", e);
            }
        }

        let home = format!("{}:{}", name, self.plan.home_window());
        for option in ["window-style", "window-active-style"] {
            if let Err(e) = self
                .mux
                .set_option(OptionScope::Window, &home, option, &style)
            {
                tracing::warn!(window = %home, option, "set-option failed: {:#}", e);
            }
        }
    }

    /// Bind window hotkeys, then auxiliary keys, all targeting this session
    fn bind_hotkeys(&self) -> Result<()> {
        let ctx = BindingContext {
            session: &self.spec.session,
            plan: &self.plan,
            program: &self.spec.program,
        };
        for binding in session_bindings(&ctx) {
            debug_assert!(self.registry.contains(&binding.key));
            self.mux
                .bind_key(binding.key.table, &binding.key.key, &binding.action)?;
        }
        Ok(())
    }

    /// Attach the operator's terminal; blocks until detach or session end
    pub fn attach(&self) -> Result<()> {
        tracing::debug!(session = %self.spec.session, "attaching");
        self.mux.attach_session(&self.spec.session)
    }

    /// End a running [`attach`](Self::attach) from another thread
    pub fn detach(&self) {
        if let Err(e) = self.mux.detach_client() {
            tracing::warn!(session = %self.spec.session, "detach failed: {:#}", e);
        }
    }

    /// Run the shutdown protocol; safe to call from every termination path
    pub fn shutdown(&self) -> ShutdownOutcome {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return ShutdownOutcome::AlreadyDone;
        }

        let name = self.spec.session.as_str();
        self.set_state(LifecycleState::Stopping);

        let outcome = if !self.mux.has_session(name) {
            // Killed by F10 or from outside: the bindings now dangle
            self.clear_managed_keys();
            ShutdownOutcome::AlreadyGone
        } else if self.spec.persistent {
            ShutdownOutcome::LeftRunning
        } else {
            self.clear_managed_keys();
            if let Err(e) = self.mux.kill_session(name) {
                tracing::warn!(session = name, "kill-session failed: {:#}", e);
            }
            ShutdownOutcome::Killed
        };

        self.set_state(LifecycleState::Absent);
        tracing::info!(session = name, ?outcome, "session shut down");
        outcome
    }
}
