use anyhow::{Context, Result};
use clap::{CommandFactory, FromArgMatches, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tide_core::bindings::hotkey_layout;
use tide_core::lifecycle::StatusPosition;
use tide_core::naming::validate_session_name;
use tide_core::{
    Appearance, Hotkey, Launch, PlanDefaults, PlanError, WindowPlan, WindowSpec, DEFAULT_PREFIX,
};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about = "Terminal IDE - full-screen tools in one tmux session")]
pub struct Config {
    /// Working directory for the session (default: current directory)
    pub dir: Option<PathBuf>,

    /// Name of a persistent, reattachable session (default: auto-named, killed on exit)
    #[arg(short, long)]
    pub session: Option<String>,

    /// Create the session and return without attaching
    #[arg(long)]
    pub no_attach: bool,

    /// Program to start in the first window (e.g. "claude")
    #[arg(long)]
    pub shell: Option<String>,

    /// Enable debug mode
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// List, switch to or kill tide sessions
    Sessions {
        #[command(subcommand)]
        action: Option<SessionsAction>,

        /// Print the session list as JSON
        #[arg(long)]
        json: bool,

        /// Include sessions not auto-named by tide
        #[arg(short, long)]
        all: bool,
    },
    /// Print the hotkey layout
    Keys,
    /// Print the tmux commands a launch would run without running them
    Plan {
        /// Print the window plan as JSON instead
        #[arg(long)]
        json: bool,
    },
    /// Retract tide's hotkeys and kill a session left behind
    Cleanup {
        /// Session to kill; only the hotkeys are retracted when omitted
        #[arg(short, long)]
        session: Option<String>,
    },
}

/// Session manager actions
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum SessionsAction {
    /// List sessions, newest first (default)
    List,
    /// Switch this client to another session
    Switch { name: String },
    /// Kill a session other than the current one
    Kill { name: String },
    /// Open the session chooser on a tmux client (Ctrl+S)
    Menu {
        /// Client to show the menu on (default: the most recent one)
        #[arg(long)]
        client: Option<String>,

        /// Choose a session to kill instead of one to switch to
        #[arg(long)]
        kill: bool,
    },
}

impl Config {
    /// Parse command line arguments; `--help` lists the configured hotkeys
    pub fn parse_args() -> Self {
        let args: Vec<OsString> = std::env::args_os().collect();
        // An unreadable config is reported after parsing, by the real load
        let settings = Settings::load(config_path_arg(&args).as_ref()).unwrap_or_default();
        let matches = Self::command()
            .after_help(format!("Hotkeys:\n{}", settings.hotkey_help()))
            .get_matches_from(args);
        Self::from_arg_matches(&matches).unwrap_or_else(|e| e.exit())
    }

    /// Working directory, resolved to an absolute path
    pub fn start_dir(&self) -> Result<PathBuf> {
        let dir = match &self.dir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir().context("Failed to read current directory")?,
        };
        dir.canonicalize()
            .with_context(|| format!("Invalid working directory: {:?}", dir))
    }
}

/// `-c PATH` / `--config PATH` / `--config=PATH`, found before clap runs
fn config_path_arg(args: &[OsString]) -> Option<PathBuf> {
    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        let arg = arg.to_string_lossy();
        if arg == "--" {
            break;
        }
        if arg == "-c" || arg == "--config" {
            return iter.next().map(PathBuf::from);
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return Some(PathBuf::from(path));
        }
    }
    None
}

/// Application settings (from config file)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Prefix of auto-named sessions (`<prefix>-<pid>`)
    #[serde(default = "default_session_prefix")]
    pub session_prefix: String,

    /// Program started in the first window; plain shell when unset
    #[serde(default)]
    pub shell_command: Option<String>,

    /// Tree browser started in window 2
    #[serde(default = "default_tree_command")]
    pub tree_command: String,

    /// Markdown viewer started in window 3
    #[serde(default = "default_docs_command")]
    pub docs_command: String,

    /// Colors
    #[serde(default)]
    pub theme: ThemeSettings,

    /// Status line
    #[serde(default)]
    pub status: StatusSettings,

    /// Extra windows; one with an existing index replaces that window
    #[serde(default)]
    pub windows: Vec<WindowSettings>,
}

fn default_session_prefix() -> String {
    DEFAULT_PREFIX.to_string()
}

fn default_tree_command() -> String {
    PlanDefaults::default().tree_command
}

fn default_docs_command() -> String {
    PlanDefaults::default().docs_command
}

/// Theme colors
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThemeSettings {
    #[serde(default = "default_bg")]
    pub bg: String,

    #[serde(default = "default_fg")]
    pub fg: String,
}

fn default_bg() -> String {
    Appearance::default().bg
}

fn default_fg() -> String {
    Appearance::default().fg
}

impl Default for ThemeSettings {
    fn default() -> Self {
        Self {
            bg: default_bg(),
            fg: default_fg(),
        }
    }
}

/// Status line settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSettings {
    /// "top" or "bottom"
    #[serde(default = "default_status_position")]
    pub position: String,
}

fn default_status_position() -> String {
    StatusPosition::default().as_str().to_string()
}

impl Default for StatusSettings {
    fn default() -> Self {
        Self {
            position: default_status_position(),
        }
    }
}

impl StatusSettings {
    fn parsed_position(&self) -> Option<StatusPosition> {
        match self.position.as_str() {
            "top" => Some(StatusPosition::Top),
            "bottom" => Some(StatusPosition::Bottom),
            _ => None,
        }
    }
}

/// One extra window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowSettings {
    /// Window index (1..9)
    pub index: u32,

    /// Display name
    pub name: String,

    /// Program to run; plain shell when unset
    #[serde(default)]
    pub program: Option<String>,

    /// Program arguments; `{dir}` is replaced by the working directory
    #[serde(default)]
    pub args: Vec<String>,

    /// Function key number (defaults to the index)
    #[serde(default)]
    pub hotkey: Option<u8>,
}

impl WindowSettings {
    fn to_spec(&self, cwd: &Path) -> Result<WindowSpec, PlanError> {
        let number = match self.hotkey {
            Some(n) => n,
            None => u8::try_from(self.index)
                .map_err(|_| PlanError::InvalidHotkey { hotkey: u8::MAX })?,
        };
        let launch = match &self.program {
            Some(program) => Launch::program_in(program, &self.args, cwd),
            None => Launch::Shell,
        };
        Ok(WindowSpec::new(
            self.index,
            &self.name,
            launch,
            Hotkey::new(number)?,
        ))
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            session_prefix: default_session_prefix(),
            shell_command: None,
            tree_command: default_tree_command(),
            docs_command: default_docs_command(),
            theme: ThemeSettings::default(),
            status: StatusSettings::default(),
            windows: Vec::new(),
        }
    }
}

impl Settings {
    /// Load settings from config file or use defaults
    pub fn load(path: Option<&PathBuf>) -> Result<Self> {
        // Try custom path first
        if let Some(p) = path {
            if p.exists() {
                let content = std::fs::read_to_string(p)
                    .with_context(|| format!("Failed to read config file: {:?}", p))?;
                return toml::from_str(&content)
                    .with_context(|| format!("Failed to parse config file: {:?}", p));
            }
        }

        // Try default config locations
        let default_paths = [
            dirs::config_dir().map(|p| p.join("tide/config.toml")),
            dirs::home_dir().map(|p| p.join(".config/tide/config.toml")),
            dirs::home_dir().map(|p| p.join(".tide.toml")),
        ];

        for path in default_paths.iter().flatten() {
            if path.exists() {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file: {:?}", path))?;
                return toml::from_str(&content)
                    .with_context(|| format!("Failed to parse config file: {:?}", path));
            }
        }

        // Return defaults if no config file found
        Ok(Self::default())
    }

    /// Merge CLI config into settings (CLI takes precedence)
    pub fn merge_cli(&mut self, cli: &Config) {
        if let Some(shell) = &cli.shell {
            self.shell_command = Some(shell.clone());
        }
    }

    /// Validate and normalize settings values
    ///
    /// The prefix becomes part of a tmux session name, so it falls back to
    /// the default when tmux would rewrite it. A blank shell command means
    /// a plain shell.
    pub fn validate(&mut self) {
        if self.status.parsed_position().is_none() {
            tracing::warn!(position = %self.status.position, "unknown status position, using bottom");
            self.status.position = default_status_position();
        }
        if validate_session_name(&self.session_prefix).is_err() {
            tracing::warn!(
                prefix = %self.session_prefix,
                "invalid session_prefix, using {}",
                DEFAULT_PREFIX
            );
            self.session_prefix = default_session_prefix();
        }
        if self
            .shell_command
            .as_deref()
            .is_some_and(|c| c.trim().is_empty())
        {
            self.shell_command = None;
        }
    }

    pub fn plan_defaults(&self) -> PlanDefaults {
        PlanDefaults {
            shell_command: self.shell_command.clone(),
            tree_command: self.tree_command.clone(),
            docs_command: self.docs_command.clone(),
        }
    }

    /// Default windows plus the configured extra windows
    pub fn window_plan(&self, cwd: &Path) -> Result<WindowPlan, PlanError> {
        let extra = self
            .windows
            .iter()
            .map(|w| w.to_spec(cwd))
            .collect::<Result<Vec<_>, _>>()?;
        WindowPlan::default_for(cwd, &self.plan_defaults())?.with_windows(extra)
    }

    /// Hotkey layout for `--help`, including the configured extra windows
    pub fn hotkey_help(&self) -> String {
        let cwd = Path::new(".");
        let plan = match self.window_plan(cwd) {
            Ok(plan) => plan,
            Err(e) => {
                tracing::debug!("configured windows rejected: {}", e);
                match WindowPlan::default_for(cwd, &self.plan_defaults()) {
                    Ok(plan) => plan,
                    Err(_) => return String::new(),
                }
            }
        };
        hotkey_layout(&plan)
    }

    pub fn appearance(&self) -> Appearance {
        Appearance {
            bg: self.theme.bg.clone(),
            fg: self.theme.fg.clone(),
            status_position: self.status.parsed_position().unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.session_prefix, "ide");
        assert_eq!(settings.tree_command, "tide-tree");
        assert_eq!(settings.docs_command, "glow");
        assert_eq!(settings.status.position, "bottom");
        assert_eq!(settings.appearance().status_position, StatusPosition::Bottom);
        assert!(settings.windows.is_empty());
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
            session_prefix = "dev"
            shell_command = "claude"

            [theme]
            bg = "black"

            [status]
            position = "top"

            [[windows]]
            index = 4
            name = "Git"
            program = "lazygit"

            [[windows]]
            index = 5
            name = "Favs"
            program = "tide-favs"
            args = ["--root", "{dir}"]
            hotkey = 9
        "#;

        let settings: Settings = toml::from_str(toml).expect("Should parse TOML");
        assert_eq!(settings.session_prefix, "dev");
        assert_eq!(settings.shell_command.as_deref(), Some("claude"));
        assert_eq!(settings.theme.bg, "black");
        assert_eq!(settings.theme.fg, "#cdd6f4");
        assert_eq!(settings.appearance().status_position, StatusPosition::Top);
        assert_eq!(settings.windows.len(), 2);

        let plan = settings
            .window_plan(Path::new("/src/app"))
            .expect("valid plan");
        let layout: Vec<(u32, String, u8)> = plan
            .windows()
            .iter()
            .map(|w| (w.index, w.name.clone(), w.hotkey.number()))
            .collect();
        assert_eq!(
            layout,
            vec![
                (1, "❯".to_string(), 1),
                (2, "Tree".to_string(), 2),
                (3, "Docs".to_string(), 3),
                (4, "Git".to_string(), 4),
                (5, "Favs".to_string(), 9),
            ]
        );
        assert_eq!(
            plan.windows()[4].launch.command_line().as_deref(),
            Some(" 'tide-favs' '--root' '/src/app'")
        );
        assert_eq!(
            plan.first().launch.command_line().as_deref(),
            Some(" 'claude'")
        );
    }

    #[test]
    fn test_unknown_status_position_falls_back() {
        let mut settings: Settings =
            toml::from_str("[status]\nposition = \"left\"").expect("Should parse TOML");
        settings.validate();
        assert_eq!(settings.status.position, "bottom");
        assert_eq!(settings.appearance().status_position, StatusPosition::Bottom);
    }

    #[test]
    fn test_window_hotkey_conflict() {
        let mut settings = Settings::default();
        settings.windows.push(WindowSettings {
            index: 4,
            name: "Git".to_string(),
            program: Some("lazygit".to_string()),
            args: Vec::new(),
            hotkey: Some(2),
        });
        assert_eq!(
            settings.window_plan(Path::new("/")),
            Err(PlanError::DuplicateHotkey { hotkey: 2 })
        );
    }

    #[test]
    fn test_window_reserved_hotkey() {
        let mut settings = Settings::default();
        settings.windows.push(WindowSettings {
            index: 4,
            name: "Git".to_string(),
            program: None,
            args: Vec::new(),
            hotkey: Some(10),
        });
        assert_eq!(
            settings.window_plan(Path::new("/")),
            Err(PlanError::InvalidHotkey { hotkey: 10 })
        );
    }

    #[test]
    fn test_merge_cli() {
        let cli = Config::parse_from(["tide", "--shell", "claude --resume", "/tmp"]);
        let mut settings = Settings::default();
        settings.merge_cli(&cli);
        assert_eq!(settings.shell_command.as_deref(), Some("claude --resume"));
        assert_eq!(cli.dir, Some(PathBuf::from("/tmp")));
    }

    #[test]
    fn test_validate_normalizes() {
        let mut settings = Settings {
            session_prefix: "bad:prefix".to_string(),
            shell_command: Some("  ".to_string()),
            ..Settings::default()
        };
        settings.validate();
        assert_eq!(settings.session_prefix, "ide");
        assert!(settings.shell_command.is_none());
    }

    #[test]
    fn test_load_custom_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("tide.toml");
        std::fs::write(&path, "docs_command = \"mdcat\"\n").expect("write");

        let settings = Settings::load(Some(&path)).expect("load");
        assert_eq!(settings.docs_command, "mdcat");
    }

    #[test]
    fn test_load_reports_parse_errors() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("tide.toml");
        std::fs::write(&path, "windows = 3\n").expect("write");

        let err = Settings::load(Some(&path)).expect_err("must fail");
        assert!(err.to_string().starts_with("Failed to parse config file"));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_load_from_xdg_config_home() {
        let config_home = tempfile::tempdir().expect("tempdir");
        let home = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(config_home.path().join("tide")).expect("mkdir");
        std::fs::write(
            config_home.path().join("tide/config.toml"),
            "session_prefix = \"xdg\"\n",
        )
        .expect("write");

        temp_env::with_vars(
            [
                ("XDG_CONFIG_HOME", Some(config_home.path())),
                ("HOME", Some(home.path())),
            ],
            || {
                let settings = Settings::load(None).expect("load");
                assert_eq!(settings.session_prefix, "xdg");
            },
        );
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_load_defaults_without_config() {
        let empty = tempfile::tempdir().expect("tempdir");
        temp_env::with_vars(
            [
                ("XDG_CONFIG_HOME", Some(empty.path())),
                ("HOME", Some(empty.path())),
            ],
            || {
                let settings = Settings::load(None).expect("load");
                assert_eq!(settings.session_prefix, "ide");
            },
        );
    }

    #[test]
    fn test_subcommands_parse() {
        let cli = Config::parse_from(["tide", "sessions", "kill", "ide-42"]);
        match cli.command {
            Some(Command::Sessions { action, json, .. }) => {
                assert_eq!(
                    action,
                    Some(SessionsAction::Kill {
                        name: "ide-42".to_string()
                    })
                );
                assert!(!json);
            }
            other => panic!("unexpected command: {:?}", other),
        }

        let cli = Config::parse_from(["tide", "-s", "work", "--no-attach"]);
        assert_eq!(cli.session.as_deref(), Some("work"));
        assert!(cli.no_attach);
        assert!(cli.command.is_none());

        let cli = Config::parse_from(["tide", "sessions", "menu", "--client", "/dev/pts/3", "--kill"]);
        match cli.command {
            Some(Command::Sessions { action, .. }) => assert_eq!(
                action,
                Some(SessionsAction::Menu {
                    client: Some("/dev/pts/3".to_string()),
                    kill: true,
                })
            ),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_config_path_arg() {
        let args = |words: &[&str]| words.iter().map(OsString::from).collect::<Vec<_>>();
        assert_eq!(
            config_path_arg(&args(&["tide", "-c", "/etc/tide.toml", "--help"])),
            Some(PathBuf::from("/etc/tide.toml"))
        );
        assert_eq!(
            config_path_arg(&args(&["tide", "keys", "--config=/tmp/t.toml"])),
            Some(PathBuf::from("/tmp/t.toml"))
        );
        assert_eq!(config_path_arg(&args(&["tide", "--help"])), None);
        assert_eq!(config_path_arg(&args(&["tide", "--", "-c", "x"])), None);
    }

    #[test]
    fn test_help_lists_configured_windows() {
        let settings: Settings = toml::from_str(
            r#"
            [[windows]]
            index = 4
            name = "Git"
            program = "lazygit"
            hotkey = 7
            "#,
        )
        .expect("Should parse TOML");
        let help = settings.hotkey_help();
        assert!(help.contains("F7            Git"));
        assert!(help.contains("F3            Docs"));

        // A rejected window list still documents the default windows
        let mut broken = settings.clone();
        broken.windows[0].hotkey = Some(1);
        let help = broken.hotkey_help();
        assert!(help.contains("F1"));
        assert!(!help.contains("Git"));
    }
}
