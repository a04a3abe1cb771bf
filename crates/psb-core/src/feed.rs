//! Channel post cache.
//!
//! The Bot API cannot read channel history, so the bot keeps the most recent
//! posts of every channel it sees (as a channel admin) and serves them to the
//! update pipeline.

use std::{
    collections::{BTreeMap, HashMap, VecDeque},
    fs,
    path::PathBuf,
    sync::Mutex,
};

use async_trait::async_trait;

use crate::{ports::FeedSource, userdb::write_json_atomic, Result};

/// Canonical key for a channel reference, or `None` if it cannot name a public channel.
///
/// Accepts `@name`, `name`, `t.me/name`, `https://t.me/name` (and `/s/` preview
/// links) or a numeric chat id such as `-1001234567890`.
pub fn normalize_channel(input: &str) -> Option<String> {
    let s = input.trim();
    let digits = s.strip_prefix('-').unwrap_or(s);
    if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
        return Some(s.to_string());
    }

    let s = s
        .trim_start_matches("https://")
        .trim_start_matches("http://");
    let s = s.strip_prefix("www.").unwrap_or(s);
    let s = s
        .strip_prefix("t.me/")
        .or_else(|| s.strip_prefix("telegram.me/"))
        .map(|rest| rest.strip_prefix("s/").unwrap_or(rest))
        .unwrap_or(s);
    let s = s.trim_start_matches('@');
    let name = s.split(['/', '?', '#']).next().unwrap_or("");

    let valid = (5..=32).contains(&name.len())
        && name.starts_with(|c: char| c.is_ascii_alphabetic())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return None;
    }
    Some(format!("@{}", name.to_lowercase()))
}

/// Bounded per-channel ring of recent post texts, newest last.
pub struct PostBuffer {
    capacity: usize,
    path: Option<PathBuf>,
    posts: Mutex<HashMap<String, VecDeque<String>>>,
}

impl PostBuffer {
    pub fn in_memory(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            path: None,
            posts: Mutex::new(HashMap::new()),
        }
    }

    /// Load the cache from `path` (missing or corrupt files start empty).
    pub fn persistent(path: impl Into<PathBuf>, capacity: usize) -> Self {
        let path = path.into();
        let capacity = capacity.max(1);
        let loaded: BTreeMap<String, Vec<String>> = match fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), "post cache is corrupt, starting empty: {e}");
                BTreeMap::new()
            }),
            Err(_) => BTreeMap::new(),
        };

        let posts = loaded
            .into_iter()
            .map(|(channel, list)| {
                let skip = list.len().saturating_sub(capacity);
                (channel, list.into_iter().skip(skip).collect())
            })
            .collect();

        Self {
            capacity,
            path: Some(path),
            posts: Mutex::new(posts),
        }
    }

    /// Remember a post. Blank posts are ignored.
    ///
    /// The cache file is rewritten while the lock is held, so the newest
    /// snapshot is always the one left on disk.
    pub fn record(&self, channel: &str, text: &str) {
        if text.trim().is_empty() {
            return;
        }
        let mut posts = self.posts.lock().unwrap_or_else(|e| e.into_inner());
        let ring = posts.entry(channel.to_string()).or_default();
        ring.push_back(text.to_string());
        while ring.len() > self.capacity {
            ring.pop_front();
        }

        if let Some(path) = &self.path {
            if let Err(e) = write_json_atomic(path, &snapshot(&posts)) {
                tracing::warn!(path = %path.display(), "failed to persist post cache: {e}");
            }
        }
    }

    pub fn channels(&self) -> Vec<String> {
        let posts = self.posts.lock().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<String> = posts.keys().cloned().collect();
        names.sort();
        names
    }
}

fn snapshot(posts: &HashMap<String, VecDeque<String>>) -> BTreeMap<String, Vec<String>> {
    posts
        .iter()
        .map(|(k, v)| (k.clone(), v.iter().cloned().collect()))
        .collect()
}

#[async_trait]
impl FeedSource for PostBuffer {
    async fn recent_posts(&self, channel: &str, limit: usize) -> Result<Vec<String>> {
        let posts = self.posts.lock().unwrap_or_else(|e| e.into_inner());
        let Some(ring) = posts.get(channel) else {
            return Ok(Vec::new());
        };
        let skip = ring.len().saturating_sub(limit);
        Ok(ring.iter().skip(skip).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_channel_references() {
        for input in [
            "@FreeProxies",
            "freeproxies",
            "t.me/FreeProxies",
            "https://t.me/freeproxies",
            "https://t.me/s/freeproxies/123",
            "http://telegram.me/freeproxies?x=1",
            "  @freeproxies  ",
        ] {
            assert_eq!(
                normalize_channel(input).as_deref(),
                Some("@freeproxies"),
                "{input}"
            );
        }
        assert_eq!(
            normalize_channel("-1001234567890").as_deref(),
            Some("-1001234567890")
        );
    }

    #[test]
    fn rejects_invalid_channel_references() {
        for input in ["", "@", "abc", "https://t.me/+AbCdEf", "@1channel", "bad-name!"] {
            assert_eq!(normalize_channel(input), None, "{input}");
        }
    }

    #[tokio::test]
    async fn keeps_only_the_most_recent_posts() {
        let buf = PostBuffer::in_memory(2);
        buf.record("@c", "one");
        buf.record("@c", "two");
        buf.record("@c", "   ");
        buf.record("@c", "three");

        assert_eq!(buf.recent_posts("@c", 10).await.unwrap(), vec!["two", "three"]);
        assert_eq!(buf.recent_posts("@c", 1).await.unwrap(), vec!["three"]);
        assert!(buf.recent_posts("@other", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn persists_across_instances() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("posts.json");

        let buf = PostBuffer::persistent(&path, 3);
        buf.record("@a", "vmess://1");
        buf.record("@b", "ss://2");
        drop(buf);

        let reloaded = PostBuffer::persistent(&path, 3);
        assert_eq!(reloaded.channels(), vec!["@a", "@b"]);
        assert_eq!(
            reloaded.recent_posts("@a", 10).await.unwrap(),
            vec!["vmess://1"]
        );
    }

    #[tokio::test]
    async fn reload_trims_to_capacity() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("posts.json");
        fs::write(&path, r#"{"@a": ["1", "2", "3", "4"]}"#).unwrap();

        let buf = PostBuffer::persistent(&path, 2);
        assert_eq!(buf.recent_posts("@a", 10).await.unwrap(), vec!["3", "4"]);
    }

    #[test]
    fn concurrent_records_all_reach_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("posts.json");
        let buf = std::sync::Arc::new(PostBuffer::persistent(&path, 1000));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let buf = buf.clone();
                std::thread::spawn(move || {
                    for i in 0..20 {
                        buf.record(&format!("@chan{t}"), &format!("post {t}-{i}"));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let on_disk: BTreeMap<String, Vec<String>> =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk.len(), 8);
        assert_eq!(on_disk.values().map(Vec::len).sum::<usize>(), 160);
        assert!(!path.with_extension("json.tmp").exists());
    }
}
