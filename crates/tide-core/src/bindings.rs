//! Managed key bindings.
//!
//! tmux keeps one key table per server, shared by every session. A key bound
//! by one session stays bound after that session dies and then points at a
//! name that no longer resolves. [`BindingRegistry`] is the single list of
//! keys tide ever binds; startup clears it and shutdown retracts it. Window
//! hotkeys are derived from the [`WindowPlan`] and every auxiliary key comes
//! from [`Auxiliary::all`], so a key cannot be bound without also being
//! cleaned up.

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;

use crate::command::TmuxCommand;
use crate::multiplexer::OptionScope;
use crate::plan::{Hotkey, WindowPlan};
use crate::quote::{escape_format, join_args, quote_single};

/// Keys bound by earlier releases; still cleared so their stale bindings go away
pub const RETIRED_KEYS: &[&str] = &["C-p", "C-w"];

/// Terminal opened with Shift+F<n> lives at window `TERMINAL_BASE + n`
pub const TERMINAL_BASE: u32 = 10;

/// Window option marking windows opened by Ctrl+T / Shift+F<n>
pub const TERMINAL_MARKER: &str = "@tide_terminal";

/// Session option holding the passthrough indicator (empty when off)
pub const PASSTHROUGH_OPTION: &str = "@passthrough";

/// Session option counting terminals opened with Ctrl+T
pub const TERM_COUNT_OPTION: &str = "@term_count";

/// Session option holding the focus indicator, set by the client focus hooks
pub const FOCUS_OPTION: &str = "@focus";

const EXIT_PROMPT: &str = "Exit session? (y/n)";

/// Key table a binding lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum KeyTable {
    /// Keys active without the prefix (`bind-key -n`)
    NoPrefix,
    /// The `root` table, addressed explicitly (mouse events)
    Root,
}

impl KeyTable {
    pub fn flag_args(self) -> &'static [&'static str] {
        match self {
            KeyTable::NoPrefix => &["-n"],
            KeyTable::Root => &["-T", "root"],
        }
    }
}

/// A key tide owns in the server-global table
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ManagedKey {
    pub table: KeyTable,
    pub key: String,
}

impl ManagedKey {
    pub fn no_prefix(key: impl Into<String>) -> Self {
        Self {
            table: KeyTable::NoPrefix,
            key: key.into(),
        }
    }

    pub fn root(key: impl Into<String>) -> Self {
        Self {
            table: KeyTable::Root,
            key: key.into(),
        }
    }
}

impl fmt::Display for ManagedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.table {
            KeyTable::NoPrefix => write!(f, "{}", self.key),
            KeyTable::Root => write!(f, "root:{}", self.key),
        }
    }
}

/// What a bound key does
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum KeyAction {
    /// `select-window -t <session>:<index>`
    SelectWindow { session: String, index: u32 },
    /// Any other tmux command; `session` names the session it refers to
    Run {
        session: Option<String>,
        args: Vec<String>,
    },
}

impl KeyAction {
    fn run(session: Option<&str>, args: Vec<String>) -> Self {
        KeyAction::Run {
            session: session.map(str::to_string),
            args,
        }
    }

    /// Session this action refers to, if any
    pub fn session(&self) -> Option<&str> {
        match self {
            KeyAction::SelectWindow { session, .. } => Some(session),
            KeyAction::Run { session, .. } => session.as_deref(),
        }
    }

    /// Command arguments appended after `bind-key <key>`
    pub fn to_args(&self) -> Vec<String> {
        match self {
            KeyAction::SelectWindow { session, index } => {
                TmuxCommand::select_window(session, *index).args().to_vec()
            }
            KeyAction::Run { args, .. } => args.clone(),
        }
    }
}

impl fmt::Display for KeyAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", join_args(&self.to_args()))
    }
}

/// A key together with the action bound to it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub key: ManagedKey,
    pub action: KeyAction,
}

/// Inputs needed to render session-specific actions
#[derive(Debug, Clone, Copy)]
pub struct BindingContext<'a> {
    /// Session every action targets
    pub session: &'a str,
    pub plan: &'a WindowPlan,
    /// Command used for popups (`tide keys`, `tide sessions`)
    pub program: &'a str,
}

/// Keys bound in addition to the window hotkeys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Auxiliary {
    /// F10: confirm, then kill this session
    Exit,
    /// F12: toggle passthrough (window hotkeys and F10 reach the application)
    Passthrough,
    /// Shift+F<n>: select or create terminal n (n = 1 is the home window)
    TerminalSlot(u8),
    /// Ctrl+T: open a terminal in the current directory
    NewTerminal,
    /// Ctrl+X: close the current window if it is a terminal
    CloseTerminal,
    /// Ctrl+H: hotkey layout popup
    Help,
    /// Ctrl+S: session list popup
    SessionManager,
    /// Shift+Left
    PreviousWindow,
    /// Shift+Right
    NextWindow,
    /// Mouse click on the status line
    StatusClick,
}

impl Auxiliary {
    /// Every auxiliary key, in binding order
    pub fn all() -> Vec<Auxiliary> {
        let mut all = vec![Auxiliary::Exit, Auxiliary::Passthrough];
        all.extend((1..=9).map(Auxiliary::TerminalSlot));
        all.extend([
            Auxiliary::NewTerminal,
            Auxiliary::CloseTerminal,
            Auxiliary::Help,
            Auxiliary::SessionManager,
            Auxiliary::PreviousWindow,
            Auxiliary::NextWindow,
            Auxiliary::StatusClick,
        ]);
        all
    }

    pub fn key(self) -> ManagedKey {
        match self {
            Auxiliary::Exit => ManagedKey::no_prefix("F10"),
            Auxiliary::Passthrough => ManagedKey::no_prefix("F12"),
            Auxiliary::TerminalSlot(n) => ManagedKey::no_prefix(format!("S-F{}", n)),
            Auxiliary::NewTerminal => ManagedKey::no_prefix("C-t"),
            Auxiliary::CloseTerminal => ManagedKey::no_prefix("C-x"),
            Auxiliary::Help => ManagedKey::no_prefix("C-h"),
            Auxiliary::SessionManager => ManagedKey::no_prefix("C-s"),
            Auxiliary::PreviousWindow => ManagedKey::no_prefix("S-Left"),
            Auxiliary::NextWindow => ManagedKey::no_prefix("S-Right"),
            Auxiliary::StatusClick => ManagedKey::root("MouseUp1Status"),
        }
    }

    /// Label shown in `tide keys` and the help popup
    pub fn label(self) -> (String, String) {
        let (key, what) = match self {
            Auxiliary::Exit => ("F10", "Exit session".to_string()),
            Auxiliary::Passthrough => ("F12", "Toggle key passthrough".to_string()),
            Auxiliary::TerminalSlot(1) => ("Shift+F1", "Home window".to_string()),
            Auxiliary::TerminalSlot(n) => {
                return (format!("Shift+F{}", n), format!("Terminal T{}", n));
            }
            Auxiliary::NewTerminal => ("Ctrl+T", "New terminal".to_string()),
            Auxiliary::CloseTerminal => ("Ctrl+X", "Close terminal".to_string()),
            Auxiliary::Help => ("Ctrl+H", "This help".to_string()),
            Auxiliary::SessionManager => ("Ctrl+S", "Sessions".to_string()),
            Auxiliary::PreviousWindow => ("Shift+Left", "Previous window".to_string()),
            Auxiliary::NextWindow => ("Shift+Right", "Next window".to_string()),
            Auxiliary::StatusClick => ("Click", "Status bar shortcuts".to_string()),
        };
        (key.to_string(), what)
    }

    /// Action bound to this key for the session in `ctx`
    pub fn action(self, ctx: &BindingContext<'_>) -> KeyAction {
        let session = ctx.session;
        match self {
            Auxiliary::Exit => exit_action(session),
            Auxiliary::Passthrough => passthrough_action(session, ctx.plan),
            Auxiliary::TerminalSlot(1) => KeyAction::SelectWindow {
                session: session.to_string(),
                index: ctx.plan.home_window(),
            },
            Auxiliary::TerminalSlot(n) => {
                let target = format!("{}:{}", session, TERMINAL_BASE + u32::from(n));
                let script = format!(
                    "tmux select-window -t {t} 2>/dev/null || tmux new-window -t {t} -n T{n} -c {cwd} \\; set-option -w -t {t} {marker} 1",
                    t = quote_single(&target),
                    n = n,
                    cwd = quote_single("#{pane_current_path}"),
                    marker = TERMINAL_MARKER,
                );
                KeyAction::run(Some(session), vec!["run-shell".to_string(), script])
            }
            Auxiliary::NewTerminal => {
                KeyAction::run(Some(session), vec!["run-shell".to_string(), new_terminal_script(session)])
            }
            Auxiliary::CloseTerminal => KeyAction::run(
                None,
                vec![
                    "if-shell".to_string(),
                    "-F".to_string(),
                    format!("#{{{}}}", TERMINAL_MARKER),
                    "kill-window".to_string(),
                    "display-message 'Cannot close this window'".to_string(),
                ],
            ),
            Auxiliary::Help => help_action(ctx),
            Auxiliary::SessionManager => KeyAction::run(
                None,
                vec!["run-shell".to_string(), sessions_menu_command(ctx.program, false)],
            ),
            Auxiliary::PreviousWindow => KeyAction::run(None, vec!["previous-window".to_string()]),
            Auxiliary::NextWindow => KeyAction::run(None, vec!["next-window".to_string()]),
            Auxiliary::StatusClick => status_click_action(ctx),
        }
    }
}

/// Ctrl+T: the counter and theme are read when the key is pressed, so
/// terminals are numbered T2, T3, ... and follow theme changes
fn new_terminal_script(session: &str) -> String {
    let s = quote_single(session);
    format!(
        "n=$(( $(tmux show-option -t {s} -v {count}) + 1 )) && \
         tmux set-option -t {s} {count} \"$n\" && \
         bg=$(tmux show-option -t {s} -v @theme_bg) && \
         fg=$(tmux show-option -t {s} -v @theme_fg) && \
         tmux new-window -t {w} -n \"T$n\" -c {cwd} \\; \
         set-option -w {marker} 1 \\; \
         set-option -w window-style \"bg=$bg,fg=$fg\" \\; \
         set-option -w window-active-style \"bg=$bg,fg=$fg\"",
        s = s,
        count = TERM_COUNT_OPTION,
        w = quote_single(&format!("{}:", session)),
        cwd = quote_single("#{pane_current_path}"),
        marker = TERMINAL_MARKER,
    )
}

/// `run-shell` script opening the session chooser on the invoking client.
///
/// The program path is escaped so tmux does not expand `#` in it; the
/// client name is left for tmux to fill in.
pub fn sessions_menu_command(program: &str, kill: bool) -> String {
    let mut words = vec![program, "sessions", "menu"];
    if kill {
        words.push("--kill");
    }
    format!(
        "{} --client '#{{client_name}}'",
        escape_format(&join_args(&words))
    )
}

fn exit_action(session: &str) -> KeyAction {
    KeyAction::run(
        Some(session),
        vec![
            "confirm-before".to_string(),
            "-p".to_string(),
            EXIT_PROMPT.to_string(),
            TmuxCommand::kill_session(session).args().join(" "),
        ],
    )
}

fn help_action(ctx: &BindingContext<'_>) -> KeyAction {
    let height = hotkey_layout(ctx.plan).lines().count() + 2;
    KeyAction::run(
        None,
        vec![
            "display-popup".to_string(),
            "-w".to_string(),
            "52".to_string(),
            "-h".to_string(),
            height.to_string(),
            "-T".to_string(),
            " Keys ".to_string(),
            join_args(&[ctx.program, "keys"]),
        ],
    )
}

/// F12 flips `@passthrough` and removes / restores the window hotkeys and F10
fn passthrough_action(session: &str, plan: &WindowPlan) -> KeyAction {
    let mut restore = vec![TmuxCommand::set_option(
        OptionScope::Session,
        session,
        PASSTHROUGH_OPTION,
        "",
    )];
    let mut suspend = vec![TmuxCommand::set_option(
        OptionScope::Session,
        session,
        PASSTHROUGH_OPTION,
        "PASSTHROUGH ",
    )];

    let mut toggled = window_bindings(session, plan);
    toggled.push(Binding {
        key: Auxiliary::Exit.key(),
        action: exit_action(session),
    });
    for binding in &toggled {
        restore.push(TmuxCommand::bind_key(
            binding.key.table,
            &binding.key.key,
            &binding.action,
        ));
        suspend.push(TmuxCommand::unbind_key(binding.key.table, &binding.key.key));
    }

    let chain = |commands: &[TmuxCommand]| {
        commands
            .iter()
            .map(|c| join_args(c.args()))
            .collect::<Vec<_>>()
            .join(" ; ")
    };

    KeyAction::run(
        Some(session),
        vec![
            "if-shell".to_string(),
            "-F".to_string(),
            format!("#{{{}}}", PASSTHROUGH_OPTION),
            chain(&restore),
            chain(&suspend),
        ],
    )
}

/// Dispatch clicks on the `#[range=user|...]` areas of the status line
fn status_click_action(ctx: &BindingContext<'_>) -> KeyAction {
    let session = ctx.session;
    let tmux = |action: KeyAction| format!("tmux {}", join_args(&action.to_args()));
    let script = format!(
        "case '#{{mouse_status_range}}' in \
         help) {help} ;; \
         f10) {exit} ;; \
         f12) {passthrough} ;; \
         sessions) {sessions} ;; \
         *) tmux select-window -t {window} 2>/dev/null || true ;; \
         esac",
        help = tmux(help_action(ctx)),
        exit = tmux(exit_action(session)),
        passthrough = tmux(passthrough_action(session, ctx.plan)),
        sessions = sessions_menu_command(ctx.program, false),
        window = quote_single(&format!("{}:#{{mouse_window}}", session)),
    );
    KeyAction::run(Some(session), vec!["run-shell".to_string(), script])
}

/// Clickable shortcuts appended to the status line
pub fn status_shortcuts() -> &'static str {
    "#[range=user|sessions]^S:Sess#[norange] \
     #[range=user|help]^H:Help#[norange] \
     #[range=user|f12]F12:Keys#[norange] \
     #[range=user|f10]F10:Exit#[norange]"
}

/// One `select-window` binding per planned window
pub fn window_bindings(session: &str, plan: &WindowPlan) -> Vec<Binding> {
    plan.windows()
        .iter()
        .map(|w| Binding {
            key: ManagedKey::no_prefix(w.hotkey.key_name()),
            action: KeyAction::SelectWindow {
                session: session.to_string(),
                index: w.index,
            },
        })
        .collect()
}

/// Everything bound for one session: window hotkeys, then auxiliary keys
pub fn session_bindings(ctx: &BindingContext<'_>) -> Vec<Binding> {
    let mut bindings = window_bindings(ctx.session, ctx.plan);
    bindings.extend(Auxiliary::all().into_iter().map(|aux| Binding {
        key: aux.key(),
        action: aux.action(ctx),
    }));
    bindings
}

/// Human readable hotkey layout
pub fn hotkey_layout(plan: &WindowPlan) -> String {
    let mut rows: Vec<(String, String)> = plan
        .windows()
        .iter()
        .map(|w| (w.hotkey.key_name(), w.name.clone()))
        .collect();
    rows.extend(
        Auxiliary::all()
            .into_iter()
            .filter(|aux| !matches!(aux, Auxiliary::TerminalSlot(n) if *n > 2))
            .map(|aux| match aux {
                Auxiliary::TerminalSlot(2) => ("Shift+F2..F9".to_string(), "Terminals T2..T9".to_string()),
                other => other.label(),
            }),
    );

    rows.iter()
        .map(|(key, what)| format!("  {:<14}{}", key, what))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Every key tide manages, in a stable order without duplicates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingRegistry {
    keys: Vec<ManagedKey>,
}

impl BindingRegistry {
    /// Plan hotkeys first, then the rest of F1..F9 (a previous plan may have
    /// bound them), then the auxiliary keys, then retired keys
    pub fn from_plan(plan: &WindowPlan) -> Self {
        let candidates = plan
            .windows()
            .iter()
            .map(|w| ManagedKey::no_prefix(w.hotkey.key_name()))
            .chain(Hotkey::all().map(|h| ManagedKey::no_prefix(h.key_name())))
            .chain(Auxiliary::all().into_iter().map(Auxiliary::key))
            .chain(RETIRED_KEYS.iter().map(|k| ManagedKey::no_prefix(*k)));

        let mut seen = HashSet::new();
        let keys = candidates.filter(|k| seen.insert(k.clone())).collect();
        Self { keys }
    }

    pub fn all_managed_keys(&self) -> &[ManagedKey] {
        &self.keys
    }

    pub fn contains(&self, key: &ManagedKey) -> bool {
        self.keys.contains(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
