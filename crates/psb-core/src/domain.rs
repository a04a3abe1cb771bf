use std::fmt;

use serde::{Deserialize, Serialize};

/// Telegram user id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Telegram chat id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChatId(pub i64);

impl From<UserId> for ChatId {
    /// Private chats share the id of the user.
    fn from(u: UserId) -> Self {
        ChatId(u.0)
    }
}

/// Where a user's subscription files are published.
#[derive(Clone, PartialEq, Eq)]
pub struct RepoTarget {
    /// `owner/name` on GitHub.
    pub repo_name: String,
    pub token: String,
}

impl fmt::Debug for RepoTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepoTarget")
            .field("repo_name", &self.repo_name)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Replace every occurrence of `secret` in `text` with a placeholder.
pub fn redact(text: &str, secret: &str) -> String {
    if secret.is_empty() {
        return text.to_string();
    }
    text.replace(secret, "***")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_target_debug_hides_token() {
        let t = RepoTarget {
            repo_name: "me/subs".to_string(),
            token: "ghp_secret".to_string(),
        };
        let dbg = format!("{t:?}");
        assert!(dbg.contains("me/subs"));
        assert!(!dbg.contains("ghp_secret"));
    }

    #[test]
    fn redact_replaces_all_occurrences() {
        assert_eq!(redact("a tok b tok", "tok"), "a *** b ***");
        assert_eq!(redact("nothing", ""), "nothing");
    }
}
