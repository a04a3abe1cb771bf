//! Per-user update pipeline: channel posts → links → published subscription files.

use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
};

use tokio::task::JoinSet;

use crate::{
    categories::CategoryTable,
    config::Config,
    domain::{redact, UserId},
    errors::Error,
    extractor::extract_links_from_posts,
    ports::{FeedSource, PublishOutcome, PublishRequest, Publisher, UserStore},
    userdb::{UpdateStatus, UserRecord},
    utils::iso_timestamp_utc,
    Result,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The user follows no channels.
    NoChannels,
    /// Channels were read but contained no links; nothing was published.
    NoLinks,
    /// Another update for the same user was in flight; this one did nothing.
    AlreadyRunning,
    Unchanged { links: usize },
    Pushed { links: usize, commit_message: String },
}

impl UpdateOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::NoChannels => "no_channels",
            Self::NoLinks => "no_links",
            Self::AlreadyRunning => "already_running",
            Self::Unchanged { .. } => "unchanged",
            Self::Pushed { .. } => "pushed",
        }
    }

    pub fn links(&self) -> usize {
        match self {
            Self::Unchanged { links } | Self::Pushed { links, .. } => *links,
            Self::NoChannels | Self::NoLinks | Self::AlreadyRunning => 0,
        }
    }
}

pub struct UpdateService {
    cfg: Arc<Config>,
    store: Arc<dyn UserStore>,
    feed: Arc<dyn FeedSource>,
    publisher: Arc<dyn Publisher>,
    categories: Arc<CategoryTable>,
    in_flight: InFlight,
}

/// Users with an update currently running.
#[derive(Default)]
struct InFlight {
    users: Mutex<HashSet<UserId>>,
}

struct InFlightGuard<'a> {
    set: &'a InFlight,
    user: UserId,
}

impl InFlight {
    fn try_claim(&self, user: UserId) -> Option<InFlightGuard<'_>> {
        let mut users = self.users.lock().unwrap_or_else(|e| e.into_inner());
        users.insert(user).then_some(InFlightGuard { set: self, user })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let mut users = self.set.users.lock().unwrap_or_else(|e| e.into_inner());
        users.remove(&self.user);
    }
}

impl UpdateService {
    pub fn new(
        cfg: Arc<Config>,
        store: Arc<dyn UserStore>,
        feed: Arc<dyn FeedSource>,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        let categories = Arc::new(cfg.categories.clone());
        Self {
            cfg,
            store,
            feed,
            publisher,
            categories,
            in_flight: InFlight::default(),
        }
    }

    pub fn store(&self) -> &Arc<dyn UserStore> {
        &self.store
    }

    /// Run one update for `user` and remember its result in the user record.
    ///
    /// Returns [`UpdateOutcome::AlreadyRunning`] without touching the record
    /// when an update for the same user is still in flight.
    pub async fn update_user(&self, user: UserId) -> Result<UpdateOutcome> {
        let Some(_claim) = self.in_flight.try_claim(user) else {
            tracing::info!(user = %user, "update already running, skipping");
            return Ok(UpdateOutcome::AlreadyRunning);
        };
        let record = self.store.get(user)?;
        let res = self.run(user, &record).await;

        let secret = record
            .target(&self.cfg)
            .map(|t| t.token)
            .unwrap_or_default();
        let status = UpdateStatus {
            at: iso_timestamp_utc(),
            outcome: match &res {
                Ok(o) => o.label().to_string(),
                Err(_) => "failed".to_string(),
            },
            links: res.as_ref().map(UpdateOutcome::links).unwrap_or(0),
            error: res.as_ref().err().map(|e| redact(&e.to_string(), &secret)),
        };
        if let Err(e) = self
            .store
            .update(user, &mut |r| r.last_update = Some(status.clone()))
        {
            tracing::warn!(user = %user, "failed to record update status: {e}");
        }

        match &res {
            Ok(o) => tracing::info!(user = %user, outcome = o.label(), links = o.links(), "update finished"),
            Err(e) => tracing::error!(user = %user, "update failed: {}", redact(&e.to_string(), &secret)),
        }
        res
    }

    /// Update every stored user, one task per user, with at most
    /// `update_concurrency` tasks running at once.
    ///
    /// Results are ordered by user id.
    pub async fn update_all(self: &Arc<Self>) -> Result<Vec<(UserId, Result<UpdateOutcome>)>> {
        let users = self.store.all()?;
        let max_concurrent = self.cfg.update_concurrency.max(1);
        tracing::info!(users = users.len(), max_concurrent, "starting update run");

        let mut results = Vec::new();
        let mut set = JoinSet::new();
        for (user, _) in users {
            while set.len() >= max_concurrent {
                collect_joined(set.join_next().await, &mut results);
            }
            let svc = Arc::clone(self);
            set.spawn(async move { (user, svc.update_user(user).await) });
        }
        while let Some(joined) = set.join_next().await {
            collect_joined(Some(joined), &mut results);
        }

        results.sort_by_key(|(user, _)| *user);
        Ok(results)
    }

    async fn run(&self, user: UserId, record: &UserRecord) -> Result<UpdateOutcome> {
        if record.channels.is_empty() {
            return Ok(UpdateOutcome::NoChannels);
        }
        let target = record.target(&self.cfg)?;

        let mut posts = Vec::new();
        for channel in &record.channels {
            match self.feed.recent_posts(channel, self.cfg.fetch_limit).await {
                Ok(mut p) => {
                    tracing::debug!(user = %user, channel = %channel, posts = p.len(), "fetched posts");
                    posts.append(&mut p);
                }
                Err(e) => tracing::warn!(user = %user, channel = %channel, "failed to fetch posts: {e}"),
            }
        }

        let links = extract_links_from_posts(&posts);
        if links.is_empty() {
            return Ok(UpdateOutcome::NoLinks);
        }
        let count = links.len();

        let outcome = self
            .publisher
            .publish(PublishRequest {
                user,
                target,
                links,
                categories: self.categories.clone(),
            })
            .await
            .map_err(|e| match e {
                Error::Publish(_) => e,
                other => Error::Publish(other.to_string()),
            })?;

        Ok(match outcome {
            PublishOutcome::Unchanged => UpdateOutcome::Unchanged { links: count },
            PublishOutcome::Pushed { commit_message } => UpdateOutcome::Pushed {
                links: count,
                commit_message,
            },
        })
    }
}

type Joined = std::result::Result<(UserId, Result<UpdateOutcome>), tokio::task::JoinError>;

fn collect_joined(joined: Option<Joined>, results: &mut Vec<(UserId, Result<UpdateOutcome>)>) {
    match joined {
        Some(Ok(r)) => results.push(r),
        Some(Err(e)) => tracing::error!("update task aborted: {e}"),
        None => {}
    }
}
