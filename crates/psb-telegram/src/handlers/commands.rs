use std::sync::Arc;

use teloxide::{prelude::*, types::Message};

use psb_core::{
    config::validate_repo_name,
    domain::{ChatId, UserId},
    feed::normalize_channel,
    formatting::{escape_html, format_outcome, format_status},
    security::validate_github_token,
    userdb::UserRecord,
    Result,
};

use crate::router::AppState;

const HELP: &str = "🤖 <b>Proxy Subscription Bot</b>\n\n\
Collects proxy links posted in Telegram channels, sorts them by protocol and \
publishes subscription files to your GitHub repository.\n\n\
<b>Commands</b>\n\
/tch <code>@channel</code> - subscribe to / unsubscribe from a channel\n\
/channels - list your channels\n\
/setrepo <code>owner/name</code> - publish to this repository (<code>default</code> to reset)\n\
/settoken <code>token</code> - use your own GitHub token (<code>default</code> to reset)\n\
/update - collect and publish now\n\
/status - show your settings and the last run\n\n\
The bot only sees posts from channels where it has been added as an admin.";

fn parse_command(text: &str) -> (String, String) {
    // Telegram may send `/cmd@botname arg1 ...`
    let mut parts = text.trim().splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim().to_string();

    let cmd = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    (cmd, rest)
}

/// `default` and `-` clear a per-user override.
fn is_reset(arg: &str) -> bool {
    arg.eq_ignore_ascii_case("default") || arg == "-"
}

pub(super) async fn handle_command(
    bot: Bot,
    msg: Message,
    state: Arc<AppState>,
    user: UserId,
) -> ResponseResult<()> {
    let (cmd, arg) = parse_command(msg.text().unwrap_or(""));
    tracing::debug!(user = %user, cmd = %cmd, "command");

    let reply = match cmd.as_str() {
        "start" | "help" => HELP.to_string(),
        "tch" => toggle_channel(&state, user, &arg),
        "channels" => list_channels(&state, user),
        "setrepo" => set_repo(&state, user, &arg),
        "settoken" => {
            let private = msg.chat.is_private();
            // The token must not stay in the chat history.
            if let Err(e) = bot.delete_message(msg.chat.id, msg.id).await {
                tracing::debug!("could not delete token message: {e}");
            }
            if private {
                set_token(&state, user, &arg)
            } else {
                "⚠️ Send /settoken in a private chat with the bot.".to_string()
            }
        }
        "update" => run_update(&state, user).await,
        "status" => status(&state, user),
        _ => "Unknown command. Send /help for the list of commands.".to_string(),
    };

    reply_html(&state, msg.chat.id.0, &reply).await;
    Ok(())
}

async fn reply_html(state: &AppState, chat_id: i64, html: &str) {
    if let Err(e) = state.messenger.send_html(ChatId(chat_id), html).await {
        tracing::warn!(chat_id, "failed to send reply: {e}");
    }
}

fn update_record(
    state: &AppState,
    user: UserId,
    f: &mut dyn FnMut(&mut UserRecord),
) -> Result<UserRecord> {
    state.service.store().update(user, f)
}

fn toggle_channel(state: &AppState, user: UserId, arg: &str) -> String {
    if arg.is_empty() {
        return "Usage: /tch <code>@channel</code>".to_string();
    }
    let Some(channel) = normalize_channel(arg) else {
        return format!("❌ Not a valid channel: <code>{}</code>", escape_html(arg));
    };

    let mut added = false;
    if let Err(e) = update_record(state, user, &mut |r| added = r.toggle_channel(&channel)) {
        tracing::error!(user = %user, "failed to save channels: {e}");
        return "❌ Could not save your channels, try again later.".to_string();
    }
    tracing::info!(user = %user, channel = %channel, added, "channel toggled");

    if !added {
        return format!("➖ Removed <code>{}</code>", escape_html(&channel));
    }
    let mut reply = format!("➕ Added <code>{}</code>", escape_html(&channel));
    if !state.feed.channels().contains(&channel) {
        reply.push_str(
            "\nNo posts seen from this channel yet. Add the bot to it as an admin \
             so new posts are collected.",
        );
    }
    reply
}

fn list_channels(state: &AppState, user: UserId) -> String {
    let record = match state.service.store().get(user) {
        Ok(r) => r,
        Err(e) => {
            tracing::error!(user = %user, "failed to read user record: {e}");
            return "❌ Could not read your settings.".to_string();
        }
    };
    if record.channels.is_empty() {
        return "You have no channels yet. Add one with /tch <code>@channel</code>".to_string();
    }
    let lines: Vec<String> = record
        .channels
        .iter()
        .map(|c| format!("• <code>{}</code>", escape_html(c)))
        .collect();
    format!("📡 <b>Your channels</b>\n{}", lines.join("\n"))
}

fn set_repo(state: &AppState, user: UserId, arg: &str) -> String {
    if arg.is_empty() {
        return "Usage: /setrepo <code>owner/name</code>".to_string();
    }
    let repo = if is_reset(arg) {
        None
    } else {
        if let Err(e) = validate_repo_name(arg) {
            return format!("❌ {}", escape_html(&e.to_string()));
        }
        Some(arg.to_string())
    };

    if let Err(e) = update_record(state, user, &mut |r| r.repo_name = repo.clone()) {
        tracing::error!(user = %user, "failed to save repository: {e}");
        return "❌ Could not save the repository, try again later.".to_string();
    }
    match repo {
        Some(r) => format!("✅ Repository set to <code>{}</code>", escape_html(&r)),
        None => "✅ Using the default repository.".to_string(),
    }
}

fn set_token(state: &AppState, user: UserId, arg: &str) -> String {
    if arg.is_empty() {
        return "Usage: /settoken <code>token</code>".to_string();
    }
    let token = if is_reset(arg) {
        None
    } else {
        if validate_github_token(arg).is_err() {
            return "❌ That does not look like a GitHub token.".to_string();
        }
        Some(arg.to_string())
    };

    if let Err(e) = update_record(state, user, &mut |r| r.github_token = token.clone()) {
        tracing::error!(user = %user, "failed to save token: {e}");
        return "❌ Could not save the token, try again later.".to_string();
    }
    tracing::info!(user = %user, personal = token.is_some(), "token updated");
    match token {
        Some(_) => "✅ Token saved. Your message was deleted.".to_string(),
        None => "✅ Using the default token.".to_string(),
    }
}

async fn run_update(state: &AppState, user: UserId) -> String {
    reply_html(state, user.0, "⏳ Collecting links...").await;

    let res = state.service.update_user(user).await;
    let repo = state
        .service
        .store()
        .get(user)
        .ok()
        .and_then(|r| r.target(&state.cfg).ok())
        .map(|t| t.repo_name);
    format_outcome(repo.as_deref(), &res)
}

fn status(state: &AppState, user: UserId) -> String {
    match state.service.store().get(user) {
        Ok(record) => {
            let next = state
                .scheduler
                .as_ref()
                .and_then(|s| s.next_run())
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string());
            format_status(&record, next.as_deref())
        }
        Err(e) => {
            tracing::error!(user = %user, "failed to read user record: {e}");
            "❌ Could not read your settings.".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_command_strips_bot_mention_and_keeps_args() {
        assert_eq!(
            parse_command("/TCH@psb_bot  @free_proxies "),
            ("tch".to_string(), "@free_proxies".to_string())
        );
        assert_eq!(parse_command("/update"), ("update".to_string(), String::new()));
    }

    #[test]
    fn reset_keywords() {
        assert!(is_reset("default"));
        assert!(is_reset("DEFAULT"));
        assert!(is_reset("-"));
        assert!(!is_reset("me/subs"));
    }
}
