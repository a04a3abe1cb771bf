use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{categories::CategoryTable, errors::Error, Result};

/// Typed configuration, loaded from the environment (and `.env`).
#[derive(Clone, Debug)]
pub struct Config {
    // Telegram
    pub telegram_bot_token: String,
    /// Empty means every user may talk to the bot.
    pub telegram_allowed_users: Vec<i64>,

    // Publishing defaults (used when a user has not configured their own)
    pub github_token: Option<String>,
    pub default_repo: Option<String>,

    // Storage
    pub data_dir: PathBuf,
    pub users_file: PathBuf,
    pub posts_file: PathBuf,
    /// Directory inside the published repository that receives the files.
    pub subs_dir: PathBuf,

    // Feed
    pub fetch_limit: usize,

    // Scheduler
    pub scheduler_enabled: bool,
    pub update_cron: String,
    /// Upper bound on users updated at the same time.
    pub update_concurrency: usize,

    // Git
    pub git_path: PathBuf,
    pub git_user_name: String,
    pub git_user_email: String,
    pub git_timeout: Duration,

    pub categories: CategoryTable,
}

impl Config {
    /// Full bot configuration. Requires `TELEGRAM_BOT_TOKEN`.
    pub fn load() -> Result<Self> {
        let cfg = Self::from_env()?;
        if cfg.telegram_bot_token.trim().is_empty() {
            return Err(Error::Config(
                "TELEGRAM_BOT_TOKEN environment variable is required".to_string(),
            ));
        }
        Ok(cfg)
    }

    /// Configuration for offline commands (`build`, `extract`, `update`).
    pub fn for_build() -> Result<Self> {
        Self::from_env()
    }

    fn from_env() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let telegram_bot_token = env_str("TELEGRAM_BOT_TOKEN").unwrap_or_default();
        let telegram_allowed_users = parse_csv_i64(env_str("TELEGRAM_ALLOWED_USERS"))?;

        let github_token = env_str("GITHUB_TOKEN").and_then(non_empty);
        let default_repo = env_str("DEFAULT_REPO").and_then(non_empty);
        if let Some(repo) = &default_repo {
            validate_repo_name(repo)?;
        }

        let data_dir = env_path("PSB_DATA_DIR").unwrap_or_else(|| PathBuf::from("data"));
        let users_file = data_dir.join("users.json");
        let posts_file = data_dir.join("posts.json");
        let subs_dir = env_path("PSB_SUBS_DIR").unwrap_or_else(|| PathBuf::from("data/subs"));
        if subs_dir.is_absolute() {
            return Err(Error::InvalidPath {
                path: subs_dir,
                reason: "PSB_SUBS_DIR must be relative to the repository root".to_string(),
            });
        }

        let fetch_limit = env_usize("PSB_FETCH_LIMIT").unwrap_or(50).clamp(1, 1000);

        let scheduler_enabled = env_bool("PSB_SCHEDULER_ENABLED").unwrap_or(true);
        let update_concurrency = env_usize("PSB_UPDATE_CONCURRENCY")
            .unwrap_or(4)
            .clamp(1, 32);
        let update_cron = env_str("PSB_UPDATE_CRON")
            .and_then(non_empty)
            .unwrap_or_else(|| "0 */6 * * *".to_string());

        let git_path = env_path("PSB_GIT_PATH")
            .or_else(|| which_in_path("git"))
            .unwrap_or_else(|| PathBuf::from("/usr/bin/git"));
        let git_user_name = env_str("PSB_GIT_USER_NAME")
            .and_then(non_empty)
            .unwrap_or_else(|| "Telegram Subscription Bot".to_string());
        let git_user_email = env_str("PSB_GIT_USER_EMAIL")
            .and_then(non_empty)
            .unwrap_or_else(|| "bot@example.com".to_string());
        let git_timeout = Duration::from_secs(env_u64("PSB_GIT_TIMEOUT_SECS").unwrap_or(120));

        let categories = CategoryTable::with_overrides(
            env_str("PSB_CATEGORY_MAP").as_deref(),
            env_str("PSB_FALLBACK_CATEGORY").and_then(non_empty).as_deref(),
        )?;

        Ok(Self {
            telegram_bot_token,
            telegram_allowed_users,
            github_token,
            default_repo,
            data_dir,
            users_file,
            posts_file,
            subs_dir,
            fetch_limit,
            scheduler_enabled,
            update_cron,
            update_concurrency,
            git_path,
            git_user_name,
            git_user_email,
            git_timeout,
            categories,
        })
    }

    /// Defaults rooted at `data_dir`, without reading the environment.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            telegram_bot_token: String::new(),
            telegram_allowed_users: Vec::new(),
            github_token: None,
            default_repo: None,
            users_file: data_dir.join("users.json"),
            posts_file: data_dir.join("posts.json"),
            data_dir,
            subs_dir: PathBuf::from("data/subs"),
            fetch_limit: 50,
            scheduler_enabled: true,
            update_cron: "0 */6 * * *".to_string(),
            update_concurrency: 4,
            git_path: PathBuf::from("git"),
            git_user_name: "Telegram Subscription Bot".to_string(),
            git_user_email: "bot@example.com".to_string(),
            git_timeout: Duration::from_secs(120),
            categories: CategoryTable::default(),
        }
    }
}

/// `owner/name`, GitHub's allowed characters only.
pub fn validate_repo_name(repo: &str) -> Result<()> {
    let valid_part = |s: &str| {
        !s.is_empty()
            && !s.starts_with('.')
            && s
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    };
    match repo.split_once('/') {
        Some((owner, name)) if valid_part(owner) && valid_part(name) => Ok(()),
        _ => Err(Error::Config(format!(
            "invalid repository `{repo}` (expected owner/name)"
        ))),
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let Some((key, val)) = parse_dotenv_line(raw) else {
            continue;
        };
        if env::var_os(&key).is_some() {
            continue; // do not override existing env
        }
        env::set_var(key, val);
    }
}

fn parse_dotenv_line(raw: &str) -> Option<(String, String)> {
    let line = raw.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let line = line.strip_prefix("export ").unwrap_or(line);
    let (k, v) = line.split_once('=')?;
    let key = k.trim();
    if key.is_empty() {
        return None;
    }

    let mut val = v.trim();
    if val.len() >= 2
        && ((val.starts_with('"') && val.ends_with('"'))
            || (val.starts_with('\'') && val.ends_with('\'')))
    {
        val = &val[1..val.len() - 1];
    }
    Some((key.to_string(), val.to_string()))
}

fn env_bool(key: &str) -> Option<bool> {
    env_str(key).map(|s| {
        matches!(
            s.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    env_str(key).and_then(|s| s.trim().parse::<usize>().ok())
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var_os(key)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

fn parse_csv_i64(v: Option<String>) -> Result<Vec<i64>> {
    v.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>()
                .map_err(|_| Error::Config(format!("invalid user id in TELEGRAM_ALLOWED_USERS: {s}")))
        })
        .collect()
}

fn which_in_path(binary: &str) -> Option<PathBuf> {
    let path = env::var_os("PATH")?;
    env::split_paths(&path)
        .map(|dir| dir.join(binary))
        .find(|candidate| candidate.is_file())
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s.trim().to_string())
    }
}
