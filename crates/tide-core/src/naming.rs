//! Session naming and the managed-session listing.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::error::LaunchError;

/// Product prefix for auto-named sessions
pub const DEFAULT_PREFIX: &str = "ide";

/// Format passed to `tmux list-sessions -F`
pub const LIST_SESSIONS_FORMAT: &str = "#{session_name}|#{session_created}|#{session_attached}";

/// tmux rewrites `:` and `.` in session names, which would break targets
static SESSION_NAME_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9_-]+$").expect("Invalid SESSION_NAME_PATTERN regex")
});

/// Derive the session name for this launch.
///
/// An explicit name is returned unchanged (a persistent, reattachable
/// session). Otherwise the name is `<prefix>-<pid>` (an ephemeral session
/// destroyed on detach).
pub fn derive_session_name(explicit: Option<&str>, pid: u32, prefix: &str) -> String {
    match explicit {
        Some(name) => name.to_string(),
        None => format!("{}-{}", prefix, pid),
    }
}

/// Reject names tmux would silently rewrite
pub fn validate_session_name(name: &str) -> Result<(), LaunchError> {
    if !SESSION_NAME_PATTERN.is_match(name) {
        return Err(LaunchError::InvalidSessionName {
            name: name.to_string(),
        });
    }
    Ok(())
}

/// Whether `name` is an auto-named session of this product
pub fn is_managed_session(name: &str, prefix: &str) -> bool {
    name.strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('-'))
        .is_some_and(|pid| !pid.is_empty() && pid.bytes().all(|b| b.is_ascii_digit()))
}

/// One row of `tmux list-sessions`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    /// Session name
    pub name: String,
    /// Creation time
    pub created: DateTime<Utc>,
    /// Whether at least one client is attached
    pub attached: bool,
}

impl SessionInfo {
    /// Parse a line produced with [`LIST_SESSIONS_FORMAT`]
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.splitn(3, '|');
        let name = parts.next()?;
        let created: i64 = parts.next()?.trim().parse().ok()?;
        let attached = parts.next()?.trim();
        if name.is_empty() {
            return None;
        }

        Some(Self {
            name: name.to_string(),
            created: DateTime::from_timestamp(created, 0)?,
            attached: attached != "0",
        })
    }

    /// Parse every line of `list-sessions` output, skipping malformed ones
    pub fn parse_list(output: &str) -> Vec<Self> {
        output.lines().filter_map(Self::parse).collect()
    }

    /// Keep this product's auto-named sessions, newest first
    pub fn managed(sessions: Vec<Self>, prefix: &str) -> Vec<Self> {
        let mut sessions: Vec<Self> = sessions
            .into_iter()
            .filter(|s| is_managed_session(&s.name, prefix))
            .collect();
        sessions.sort_by(|a, b| b.created.cmp(&a.created).then_with(|| a.name.cmp(&b.name)));
        sessions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_derive_explicit_name() {
        assert_eq!(derive_session_name(Some("work"), 1000, "ide"), "work");
    }

    #[test]
    fn test_derive_ephemeral_name() {
        assert_eq!(derive_session_name(None, 1000, "ide"), "ide-1000");
        assert_eq!(derive_session_name(None, 42, "dev"), "dev-42");
    }

    #[test]
    fn test_validate_session_name() {
        assert!(validate_session_name("ide-1000").is_ok());
        assert!(validate_session_name("my_work").is_ok());
        assert!(validate_session_name("").is_err());
        assert!(validate_session_name("a:b").is_err());
        assert!(validate_session_name("a.b").is_err());
        assert!(validate_session_name("x; kill-server").is_err());
    }

    #[test]
    fn test_is_managed_session() {
        assert!(is_managed_session("ide-1000", "ide"));
        assert!(!is_managed_session("ide-", "ide"));
        assert!(!is_managed_session("ide-abc", "ide"));
        assert!(!is_managed_session("idea-1000", "ide"));
        assert!(!is_managed_session("main", "ide"));
    }

    #[test]
    fn test_parse_session_info() {
        let info = SessionInfo::parse("ide-1000|1760000000|1").expect("Should parse");
        assert_eq!(info.name, "ide-1000");
        assert_eq!(info.created.timestamp(), 1_760_000_000);
        assert!(info.attached);

        let info = SessionInfo::parse("ide-2000|1760000100|0").expect("Should parse");
        assert!(!info.attached);

        assert!(SessionInfo::parse("garbage").is_none());
        assert!(SessionInfo::parse("ide-1|notanumber|0").is_none());
    }

    #[test]
    fn test_parse_managed_sorted_newest_first() {
        let output = "main|1760000500|1\nide-1000|1760000000|0\nide-2000|1760000100|1\n";
        let sessions = SessionInfo::managed(SessionInfo::parse_list(output), "ide");
        let names: Vec<&str> = sessions.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["ide-2000", "ide-1000"]);
    }
}
