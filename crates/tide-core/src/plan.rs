//! Window plan: which windows a session gets and which hotkey selects each.

use std::collections::HashSet;
use std::path::Path;

use serde::Serialize;

use crate::error::PlanError;
use crate::quote::quote_single;

/// Highest index a planned window may use; terminals opened later live above it
pub const MAX_WINDOW_INDEX: u32 = 9;

/// Placeholder in program arguments replaced by the session's working directory
pub const DIR_PLACEHOLDER: &str = "{dir}";

/// Function key that selects a planned window (F1..F9)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Hotkey(u8);

impl Hotkey {
    /// F10 and F12 are reserved for exit and passthrough
    pub fn new(number: u8) -> Result<Self, PlanError> {
        if (1..=9).contains(&number) {
            Ok(Self(number))
        } else {
            Err(PlanError::InvalidHotkey { hotkey: number })
        }
    }

    pub fn number(self) -> u8 {
        self.0
    }

    /// tmux key name (`F1`)
    pub fn key_name(self) -> String {
        format!("F{}", self.0)
    }

    /// Every hotkey a window could ever be assigned
    pub fn all() -> impl Iterator<Item = Hotkey> {
        (1..=9).map(Hotkey)
    }
}

/// What runs in a window once it exists
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Launch {
    /// Leave the default interactive shell alone
    Shell,
    /// Type `program args...` into the window's shell
    Program { program: String, args: Vec<String> },
}

impl Launch {
    /// Program launch with `{dir}` in any argument replaced by `cwd`
    pub fn program_in(program: impl Into<String>, args: &[String], cwd: &Path) -> Self {
        let dir = cwd.display().to_string();
        Self::Program {
            program: program.into(),
            args: args
                .iter()
                .map(|a| a.replace(DIR_PLACEHOLDER, &dir))
                .collect(),
        }
    }

    /// Parse a whitespace separated command line (`claude --resume`)
    pub fn from_command_line(command: &str) -> Self {
        let mut words = command.split_whitespace();
        match words.next() {
            Some(program) => Self::Program {
                program: program.to_string(),
                args: words.map(str::to_string).collect(),
            },
            None => Self::Shell,
        }
    }

    /// Keystrokes typed into the window, or `None` for a bare shell
    ///
    /// Every word is single-quoted and the line starts with a space so the
    /// shell keeps it out of history.
    pub fn command_line(&self) -> Option<String> {
        match self {
            Launch::Shell => None,
            Launch::Program { program, args } => {
                let mut line = format!(" {}", quote_single(program));
                for arg in args {
                    line.push(' ');
                    line.push_str(&quote_single(arg));
                }
                Some(line)
            }
        }
    }
}

/// One planned window
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WindowSpec {
    /// Window index inside the session
    pub index: u32,
    /// Display name
    pub name: String,
    /// What to run
    pub launch: Launch,
    /// Key that selects this window
    pub hotkey: Hotkey,
}

impl WindowSpec {
    pub fn new(index: u32, name: impl Into<String>, launch: Launch, hotkey: Hotkey) -> Self {
        Self {
            index,
            name: name.into(),
            launch,
            hotkey,
        }
    }
}

/// Commands behind the default windows
#[derive(Debug, Clone)]
pub struct PlanDefaults {
    /// Program started in the first window (plain shell when unset)
    pub shell_command: Option<String>,
    /// Tree browser, started with the working directory
    pub tree_command: String,
    /// Markdown viewer, started with the working directory
    pub docs_command: String,
}

impl Default for PlanDefaults {
    fn default() -> Self {
        Self {
            shell_command: None,
            tree_command: "tide-tree".to_string(),
            docs_command: "glow".to_string(),
        }
    }
}

/// Validated, index-ordered list of windows
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WindowPlan {
    windows: Vec<WindowSpec>,
}

impl WindowPlan {
    /// Validate and sort a list of windows
    pub fn new(mut windows: Vec<WindowSpec>) -> Result<Self, PlanError> {
        if windows.is_empty() {
            return Err(PlanError::Empty);
        }

        let mut indices = HashSet::new();
        let mut hotkeys = HashSet::new();
        for window in &windows {
            if window.index == 0 || window.index > MAX_WINDOW_INDEX {
                return Err(PlanError::IndexOutOfRange {
                    index: window.index,
                    max: MAX_WINDOW_INDEX,
                });
            }
            if !indices.insert(window.index) {
                return Err(PlanError::DuplicateIndex {
                    index: window.index,
                });
            }
            if !hotkeys.insert(window.hotkey) {
                return Err(PlanError::DuplicateHotkey {
                    hotkey: window.hotkey.number(),
                });
            }
            if window.name.trim().is_empty() {
                return Err(PlanError::EmptyName {
                    index: window.index,
                });
            }
            if let Launch::Program { program, .. } = &window.launch {
                if program.trim().is_empty() {
                    return Err(PlanError::EmptyProgram {
                        index: window.index,
                    });
                }
            }
        }

        windows.sort_by_key(|w| w.index);
        Ok(Self { windows })
    }

    /// Shell on F1, tree browser on F2, markdown viewer on F3
    pub fn default_for(cwd: &Path, defaults: &PlanDefaults) -> Result<Self, PlanError> {
        let dir = [DIR_PLACEHOLDER.to_string()];
        let shell = defaults
            .shell_command
            .as_deref()
            .map(Launch::from_command_line)
            .unwrap_or(Launch::Shell);

        Self::new(vec![
            WindowSpec::new(1, "❯", shell, Hotkey(1)),
            WindowSpec::new(
                2,
                "Tree",
                Launch::program_in(&defaults.tree_command, &dir, cwd),
                Hotkey(2),
            ),
            WindowSpec::new(
                3,
                "Docs",
                Launch::program_in(&defaults.docs_command, &dir, cwd),
                Hotkey(3),
            ),
        ])
    }

    /// Merge extra windows in; an extra window replaces a planned one with the same index
    pub fn with_windows(self, extra: Vec<WindowSpec>) -> Result<Self, PlanError> {
        let mut windows: Vec<WindowSpec> = self
            .windows
            .into_iter()
            .filter(|w| !extra.iter().any(|e| e.index == w.index))
            .collect();
        windows.extend(extra);
        Self::new(windows)
    }

    pub fn windows(&self) -> &[WindowSpec] {
        &self.windows
    }

    /// Window created together with the session
    pub fn first(&self) -> &WindowSpec {
        // new() rejects empty plans
        &self.windows[0]
    }

    /// Window Shift+F1 returns to: the first plain shell, else the first window
    pub fn home_window(&self) -> u32 {
        self.windows
            .iter()
            .find(|w| matches!(w.launch, Launch::Shell))
            .unwrap_or(self.first())
            .index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn hk(n: u8) -> Hotkey {
        Hotkey::new(n).expect("valid hotkey")
    }

    #[test]
    fn test_hotkey_range() {
        assert!(Hotkey::new(0).is_err());
        assert!(Hotkey::new(10).is_err());
        assert!(Hotkey::new(12).is_err());
        assert_eq!(hk(9).key_name(), "F9");
        assert_eq!(Hotkey::all().count(), 9);
    }

    #[test]
    fn test_default_plan() {
        let cwd = PathBuf::from("/work/project");
        let plan = WindowPlan::default_for(&cwd, &PlanDefaults::default()).expect("valid plan");

        let summary: Vec<(u32, &str, String)> = plan
            .windows()
            .iter()
            .map(|w| (w.index, w.name.as_str(), w.hotkey.key_name()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (1, "❯", "F1".to_string()),
                (2, "Tree", "F2".to_string()),
                (3, "Docs", "F3".to_string()),
            ]
        );
        assert_eq!(plan.windows()[0].launch, Launch::Shell);
        assert_eq!(
            plan.windows()[2].launch.command_line().as_deref(),
            Some(" 'glow' '/work/project'")
        );
        assert_eq!(plan.home_window(), 1);
    }

    #[test]
    fn test_default_plan_with_shell_command() {
        let defaults = PlanDefaults {
            shell_command: Some("claude --resume".to_string()),
            ..PlanDefaults::default()
        };
        let plan = WindowPlan::default_for(Path::new("/tmp"), &defaults).expect("valid plan");
        assert_eq!(
            plan.first().launch.command_line().as_deref(),
            Some(" 'claude' '--resume'")
        );
        // No plain shell left, Shift+F1 falls back to the first window
        assert_eq!(plan.home_window(), 1);
    }

    #[test]
    fn test_command_line_escapes_hostile_path() {
        let launch = Launch::program_in(
            "glow",
            &["{dir}".to_string()],
            Path::new("/tmp/it's; rm -rf ~"),
        );
        assert_eq!(
            launch.command_line().as_deref(),
            Some(" 'glow' '/tmp/it'\\''s; rm -rf ~'")
        );
    }

    #[test]
    fn test_from_command_line_empty_is_shell() {
        assert_eq!(Launch::from_command_line("   "), Launch::Shell);
    }

    #[test]
    fn test_plan_sorted_by_index() {
        let plan = WindowPlan::new(vec![
            WindowSpec::new(3, "c", Launch::Shell, hk(3)),
            WindowSpec::new(1, "a", Launch::Shell, hk(1)),
            WindowSpec::new(2, "b", Launch::Shell, hk(2)),
        ])
        .expect("valid plan");
        let indices: Vec<u32> = plan.windows().iter().map(|w| w.index).collect();
        assert_eq!(indices, vec![1, 2, 3]);
    }

    #[test]
    fn test_plan_validation() {
        assert_eq!(WindowPlan::new(vec![]), Err(PlanError::Empty));
        assert_eq!(
            WindowPlan::new(vec![WindowSpec::new(0, "a", Launch::Shell, hk(1))]),
            Err(PlanError::IndexOutOfRange { index: 0, max: 9 })
        );
        assert_eq!(
            WindowPlan::new(vec![WindowSpec::new(12, "a", Launch::Shell, hk(1))]),
            Err(PlanError::IndexOutOfRange { index: 12, max: 9 })
        );
        assert_eq!(
            WindowPlan::new(vec![
                WindowSpec::new(1, "a", Launch::Shell, hk(1)),
                WindowSpec::new(1, "b", Launch::Shell, hk(2)),
            ]),
            Err(PlanError::DuplicateIndex { index: 1 })
        );
        assert_eq!(
            WindowPlan::new(vec![
                WindowSpec::new(1, "a", Launch::Shell, hk(4)),
                WindowSpec::new(2, "b", Launch::Shell, hk(4)),
            ]),
            Err(PlanError::DuplicateHotkey { hotkey: 4 })
        );
        assert_eq!(
            WindowPlan::new(vec![WindowSpec::new(1, " ", Launch::Shell, hk(1))]),
            Err(PlanError::EmptyName { index: 1 })
        );
        assert_eq!(
            WindowPlan::new(vec![WindowSpec::new(
                1,
                "a",
                Launch::Program {
                    program: String::new(),
                    args: vec![]
                },
                hk(1)
            )]),
            Err(PlanError::EmptyProgram { index: 1 })
        );
    }

    #[test]
    fn test_with_windows_replaces_and_extends() {
        let plan = WindowPlan::default_for(Path::new("/w"), &PlanDefaults::default())
            .expect("valid plan")
            .with_windows(vec![
                WindowSpec::new(3, "Git", Launch::from_command_line("lazygit"), hk(3)),
                WindowSpec::new(4, "Favs", Launch::from_command_line("tide-favs"), hk(4)),
            ])
            .expect("valid plan");

        let names: Vec<&str> = plan.windows().iter().map(|w| w.name.as_str()).collect();
        assert_eq!(names, vec!["❯", "Tree", "Git", "Favs"]);
        assert_eq!(plan.windows()[3].hotkey, hk(4));
    }
}
