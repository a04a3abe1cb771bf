//! Telegram update handlers.
//!
//! Channel posts feed the post cache; private messages are checked against
//! the allowlist and dispatched to the command handlers.

use std::sync::Arc;

use teloxide::{prelude::*, types::Message};

use psb_core::domain::UserId;
use psb_core::security::is_authorized;

use crate::router::AppState;

mod channel_post;
mod commands;

pub use channel_post::handle_channel_post;

pub async fn handle_message(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let user_id = msg.from().map(|u| UserId(u.id.0 as i64));

    if !is_authorized(user_id, &state.cfg.telegram_allowed_users) {
        tracing::info!(chat_id = msg.chat.id.0, "rejected unauthorized user");
        let _ = bot
            .send_message(
                msg.chat.id,
                "Unauthorized. Contact the bot owner for access.",
            )
            .await;
        return Ok(());
    }
    let Some(user) = user_id else {
        return Ok(());
    };

    if msg.text().is_some_and(|t| t.starts_with('/')) {
        return commands::handle_command(bot, msg, state, user).await;
    }
    if msg.text().is_some() {
        bot.send_message(msg.chat.id, "Send /help for the list of commands.")
            .await?;
    }
    Ok(())
}
