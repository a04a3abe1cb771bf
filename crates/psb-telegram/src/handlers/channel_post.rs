use std::sync::Arc;

use teloxide::{prelude::*, types::Message};

use crate::router::AppState;

/// Remember the text (or media caption) of a channel post.
pub async fn handle_channel_post(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(text) = msg.text().or_else(|| msg.caption()) else {
        return Ok(());
    };
    for key in channel_keys(msg.chat.username(), msg.chat.id.0) {
        state.feed.record(&key, text);
    }
    tracing::debug!(chat_id = msg.chat.id.0, "cached channel post");
    Ok(())
}

/// Cache keys for a channel, matching what `normalize_channel` produces for
/// the username and for the numeric chat id.
fn channel_keys(username: Option<&str>, chat_id: i64) -> Vec<String> {
    let mut keys = Vec::with_capacity(2);
    if let Some(name) = username.filter(|n| !n.is_empty()) {
        keys.push(format!("@{}", name.to_lowercase()));
    }
    keys.push(chat_id.to_string());
    keys
}

#[cfg(test)]
mod tests {
    use super::*;
    use psb_core::feed::normalize_channel;

    #[test]
    fn keys_line_up_with_user_subscriptions() {
        let keys = channel_keys(Some("FreeProxies"), -1001234567890);
        assert_eq!(keys, vec!["@freeproxies", "-1001234567890"]);
        assert_eq!(normalize_channel("https://t.me/FreeProxies").as_deref(), Some("@freeproxies"));
        assert_eq!(normalize_channel("-1001234567890").as_deref(), Some("-1001234567890"));
    }

    #[test]
    fn private_channels_are_keyed_by_id_only() {
        assert_eq!(channel_keys(None, -10042), vec!["-10042"]);
        assert_eq!(channel_keys(Some(""), -10042), vec!["-10042"]);
    }
}
