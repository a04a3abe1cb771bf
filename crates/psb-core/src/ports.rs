//! Hexagonal ports. Telegram, git and the JSON stores live behind these traits so
//! the update pipeline can be driven by fakes in tests.

use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    categories::CategoryTable,
    domain::{ChatId, RepoTarget, UserId},
    userdb::UserRecord,
    Result,
};

/// Source of recent channel posts (text or caption of each post).
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Up to `limit` most recent posts of `channel`, oldest first.
    async fn recent_posts(&self, channel: &str, limit: usize) -> Result<Vec<String>>;
}

/// Per-user record store.
pub trait UserStore: Send + Sync {
    /// Missing users read as an empty record.
    fn get(&self, user: UserId) -> Result<UserRecord>;

    fn all(&self) -> Result<Vec<(UserId, UserRecord)>>;

    /// Read-modify-write of one record; returns the stored result.
    fn update(
        &self,
        user: UserId,
        f: &mut dyn FnMut(&mut UserRecord),
    ) -> Result<UserRecord>;
}

#[derive(Clone, Debug)]
pub struct PublishRequest {
    pub user: UserId,
    pub target: RepoTarget,
    pub links: Vec<String>,
    pub categories: Arc<CategoryTable>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Generated files matched the repository; nothing was committed.
    Unchanged,
    Pushed { commit_message: String },
}

/// Builds the subscription files for a request and publishes them.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, req: PublishRequest) -> Result<PublishOutcome>;
}

/// Outbound notifications.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<()>;
}
