//! Telegram-HTML renderings of update results.

use crate::{
    errors::Error,
    pipeline::UpdateOutcome,
    userdb::{UpdateStatus, UserRecord},
    utils::truncate_chars,
};

/// Escape text for Telegram HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

pub fn format_outcome(repo: Option<&str>, res: &Result<UpdateOutcome, Error>) -> String {
    let repo = repo
        .map(|r| format!(" to <code>{}</code>", escape_html(r)))
        .unwrap_or_default();
    match res {
        Ok(UpdateOutcome::NoChannels) => {
            "ℹ️ No channels configured. Add one with /tch @channel.".to_string()
        }
        Ok(UpdateOutcome::NoLinks) => {
            "ℹ️ No subscription links found in your channels.".to_string()
        }
        Ok(UpdateOutcome::AlreadyRunning) => {
            "⏳ An update for you is already running.".to_string()
        }
        Ok(UpdateOutcome::Unchanged { links }) => {
            format!("✅ {links} links checked; subscription files already up to date{repo}.")
        }
        Ok(UpdateOutcome::Pushed {
            links,
            commit_message,
        }) => format!(
            "✅ Published {links} links{repo}.\n<i>{}</i>",
            escape_html(commit_message)
        ),
        Err(e) => format!(
            "❌ Update failed: <code>{}</code>",
            escape_html(&truncate_chars(&e.to_string(), 500))
        ),
    }
}

pub fn format_status(record: &UserRecord, next_run: Option<&str>) -> String {
    let mut lines = vec!["📊 <b>Subscription Status</b>\n".to_string()];

    let repo = record
        .repo_name
        .as_deref()
        .filter(|r| !r.trim().is_empty())
        .map(|r| format!("<code>{}</code>", escape_html(r)))
        .unwrap_or_else(|| "default".to_string());
    lines.push(format!("Repository: {repo}"));
    lines.push(format!(
        "Token: {}",
        if record.github_token.as_deref().is_some_and(|t| !t.trim().is_empty()) {
            "personal"
        } else {
            "default"
        }
    ));
    lines.push(format!("Channels: {}", record.channels.len()));

    match &record.last_update {
        Some(UpdateStatus {
            at,
            outcome,
            links,
            error,
        }) => {
            lines.push(format!(
                "Last update: {} ({}, {links} links)",
                escape_html(at),
                escape_html(outcome)
            ));
            if let Some(err) = error {
                lines.push(format!(
                    "Last error: <code>{}</code>",
                    escape_html(&truncate_chars(err, 300))
                ));
            }
        }
        None => lines.push("Last update: never".to_string()),
    }

    if let Some(next) = next_run {
        lines.push(format!("Next scheduled run: {}", escape_html(next)));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_html_specials() {
        assert_eq!(escape_html("<a href=\"x\">&</a>"), "&lt;a href=&quot;x&quot;&gt;&amp;&lt;/a&gt;");
    }

    #[test]
    fn outcome_mentions_repo_and_escapes_errors() {
        let ok = format_outcome(
            Some("me/subs"),
            &Ok(UpdateOutcome::Pushed {
                links: 4,
                commit_message: "Update <x>".to_string(),
            }),
        );
        assert!(ok.contains("Published 4 links to <code>me/subs</code>"));
        assert!(ok.contains("Update &lt;x&gt;"));

        let err = format_outcome(None, &Err(Error::Publish("bad <ref>".to_string())));
        assert!(err.contains("bad &lt;ref&gt;"));
    }

    #[test]
    fn status_hides_token_value() {
        let record = UserRecord {
            repo_name: Some("me/subs".to_string()),
            github_token: Some("ghp_secret".to_string()),
            channels: vec!["@a".to_string()],
            last_update: Some(UpdateStatus {
                at: "2026-01-01T00:00:00+00:00".to_string(),
                outcome: "pushed".to_string(),
                links: 9,
                error: None,
            }),
        };
        let html = format_status(&record, Some("12:00"));
        assert!(html.contains("Token: personal"));
        assert!(!html.contains("ghp_secret"));
        assert!(html.contains("pushed, 9 links"));
        assert!(html.contains("Next scheduled run: 12:00"));
    }
}
