//! Quoting for strings that end up in a POSIX shell or a tmux command line.
//!
//! Launch commands are typed into a window as literal keystrokes, so every
//! argument is single-quoted before it reaches the receiving shell. tmux's own
//! command parser follows the same single-quote rules, which lets nested
//! command strings (passthrough toggle, `run-shell` scripts) reuse them.

/// Characters that require quoting in a shell or tmux command string.
const SPECIAL_CHARS: &[char] = &[
    ' ', '\t', '\n', '\r', // Whitespace
    '\'', '"', '`', // Quotes and backticks
    '$', '!', '&', '|', // Variable expansion and control operators
    ';', '(', ')', '{', '}', '[', ']', // Grouping and subshell
    '<', '>', // Redirection
    '*', '?', // Glob patterns
    '\\', '#', '~', '^', // Escape, comments, home, history
];

fn needs_quoting(s: &str) -> bool {
    s.is_empty() || s.chars().any(|c| SPECIAL_CHARS.contains(&c))
}

/// Always wrap in single quotes.
///
/// `it's` becomes `'it'\''s'`.
pub fn quote_single(s: &str) -> String {
    let escaped = s.replace('\'', "'\\''");
    format!("'{}'", escaped)
}

/// Single-quote only when the argument contains special characters
pub fn quote_arg(s: &str) -> String {
    if needs_quoting(s) {
        quote_single(s)
    } else {
        s.to_string()
    }
}

/// Join arguments into one command string, quoting where needed
pub fn join_args<S: AsRef<str>>(args: &[S]) -> String {
    args.iter()
        .map(|a| quote_arg(a.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Escape text embedded in a string tmux expands as a format
/// (`run-shell` scripts); `#D` would otherwise become the pane id.
pub fn escape_format(s: &str) -> String {
    s.replace('#', "##")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_single_always_wraps() {
        assert_eq!(quote_single("/usr/bin/glow"), "'/usr/bin/glow'");
        assert_eq!(quote_single(""), "''");
    }

    #[test]
    fn test_quote_single_embedded_quote() {
        assert_eq!(quote_single("/home/me/it's here"), "'/home/me/it'\\''s here'");
    }

    #[test]
    fn test_quote_single_keeps_dollar_literal() {
        assert_eq!(quote_single("$(rm -rf ~)"), "'$(rm -rf ~)'");
    }

    #[test]
    fn test_quote_arg_only_when_needed() {
        assert_eq!(quote_arg("select-window"), "select-window");
        assert_eq!(quote_arg("ide-1000:1"), "ide-1000:1");
        assert_eq!(quote_arg("Exit session? (y/n)"), "'Exit session? (y/n)'");
        assert_eq!(quote_arg("#{pane_current_path}"), "'#{pane_current_path}'");
        assert_eq!(quote_arg(""), "''");
    }

    #[test]
    fn test_join_args() {
        let args = ["bind-key", "-n", "F1", "select-window", "-t", "ide-1000:1"];
        assert_eq!(join_args(&args), "bind-key -n F1 select-window -t ide-1000:1");

        let args = vec!["set-option".to_string(), "@passthrough".to_string(), String::new()];
        assert_eq!(join_args(&args), "set-option @passthrough ''");
    }

    #[test]
    fn test_escape_format() {
        assert_eq!(escape_format("bg=#D0D0D0"), "bg=##D0D0D0");
        assert_eq!(escape_format("/opt/tide/bin/tide"), "/opt/tide/bin/tide");
    }
}
