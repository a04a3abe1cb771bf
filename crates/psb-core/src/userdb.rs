//! JSON-file user record store (`users.json`).
//!
//! Layout: `{ "<user id>": { "repo_name": .., "github_token": .., "channels": [..] } }`.
//! A missing, empty or corrupt file reads as an empty store.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
};

use serde::{Deserialize, Serialize};

use crate::{
    config::Config,
    domain::{RepoTarget, UserId},
    errors::Error,
    ports::UserStore,
    Result,
};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_token: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub channels: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update: Option<UpdateStatus>,
}

/// Result of the most recent update run for a user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateStatus {
    /// RFC3339, UTC.
    pub at: String,
    pub outcome: String,
    #[serde(default)]
    pub links: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UserRecord {
    /// Publishing target: the user's own settings, else the process-wide defaults.
    ///
    /// Empty strings count as unset.
    pub fn target(&self, cfg: &Config) -> Result<RepoTarget> {
        let repo_name = set_or(&self.repo_name, &cfg.default_repo)
            .ok_or_else(|| Error::Config("repository name not configured".to_string()))?;
        let token = set_or(&self.github_token, &cfg.github_token)
            .ok_or_else(|| Error::Config("GitHub token not configured".to_string()))?;
        Ok(RepoTarget { repo_name, token })
    }

    /// Add `channel` if absent, remove it otherwise. Returns true when added.
    pub fn toggle_channel(&mut self, channel: &str) -> bool {
        if let Some(pos) = self.channels.iter().position(|c| c == channel) {
            self.channels.remove(pos);
            false
        } else {
            self.channels.push(channel.to_string());
            true
        }
    }
}

fn set_or(own: &Option<String>, default: &Option<String>) -> Option<String> {
    own.as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .or_else(|| default.as_deref().map(str::trim).filter(|s| !s.is_empty()))
        .map(str::to_string)
}

pub struct JsonUserStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonUserStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<String, UserRecord>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(e.into()),
        };
        if contents.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        match serde_json::from_str(&contents) {
            Ok(v) => Ok(v),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), "user store is corrupt, starting empty: {e}");
                Ok(BTreeMap::new())
            }
        }
    }

    fn save(&self, data: &BTreeMap<String, UserRecord>) -> Result<()> {
        write_json_atomic(&self.path, data)
    }

    fn guard(&self) -> std::sync::MutexGuard<'_, ()> {
        // The guarded data lives on disk; a poisoned lock carries no broken state.
        self.lock.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl UserStore for JsonUserStore {
    fn get(&self, user: UserId) -> Result<UserRecord> {
        let _g = self.guard();
        Ok(self.load()?.remove(&user.to_string()).unwrap_or_default())
    }

    fn all(&self) -> Result<Vec<(UserId, UserRecord)>> {
        let _g = self.guard();
        let mut out = Vec::new();
        for (key, record) in self.load()? {
            match key.parse::<i64>() {
                Ok(id) => out.push((UserId(id), record)),
                Err(_) => tracing::warn!(key = %key, "ignoring user entry with non-numeric id"),
            }
        }
        Ok(out)
    }

    fn update(&self, user: UserId, f: &mut dyn FnMut(&mut UserRecord)) -> Result<UserRecord> {
        let _g = self.guard();
        let mut data = self.load()?;
        let record = data.entry(user.to_string()).or_default();
        f(record);
        let updated = record.clone();
        self.save(&data)?;
        Ok(updated)
    }
}

/// Serialize `value` next to `path` and rename it into place.
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, serde_json::to_vec_pretty(value)?)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
