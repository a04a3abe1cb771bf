//! Git publisher.
//!
//! Clones the user's repository into a temporary directory, builds the
//! subscription files into it and pushes a commit when anything changed.

use std::{
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use async_trait::async_trait;
use chrono::Utc;
use tokio::process::Command;

use psb_core::{
    builder::build_sub_files,
    config::Config,
    domain::{redact, RepoTarget},
    errors::Error,
    ports::{PublishOutcome, PublishRequest, Publisher},
    utils::commit_message,
    Result,
};

const STDERR_TAIL_MAX_BYTES: usize = 4 * 1024;
const STDERR_TAIL_MAX_LINES: usize = 20;

#[derive(Clone, Debug)]
pub struct GitConfig {
    pub git_path: PathBuf,
    pub user_name: String,
    pub user_email: String,
    /// Repository-relative directory receiving the files.
    pub subs_dir: PathBuf,
    /// Per-command timeout.
    pub timeout: Duration,
    /// `https://github.com` in production; tests point this at a local `file://` root.
    pub remote_base: String,
}

impl GitConfig {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            git_path: cfg.git_path.clone(),
            user_name: cfg.git_user_name.clone(),
            user_email: cfg.git_user_email.clone(),
            subs_dir: cfg.subs_dir.clone(),
            timeout: cfg.git_timeout,
            remote_base: "https://github.com".to_string(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct GitPublisher {
    cfg: GitConfig,
}

#[derive(Debug)]
struct GitOutput {
    stdout: String,
}

impl GitPublisher {
    pub fn new(cfg: GitConfig) -> Self {
        Self { cfg }
    }

    async fn git(&self, args: &[&str], cwd: Option<&Path>, secret: &str) -> Result<GitOutput> {
        let sub = args.first().copied().unwrap_or("git");
        let mut cmd = Command::new(&self.cfg.git_path);
        cmd.args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }

        let child = cmd
            .spawn()
            .map_err(|e| Error::Publish(format!("failed to run {}: {e}", self.cfg.git_path.display())))?;

        let out = match tokio::time::timeout(self.cfg.timeout, child.wait_with_output()).await {
            Ok(res) => res?,
            Err(_) => {
                return Err(Error::Publish(format!(
                    "git {sub} timed out after {}s",
                    self.cfg.timeout.as_secs()
                )))
            }
        };

        if !out.status.success() {
            let stderr = redact(&String::from_utf8_lossy(&out.stderr), secret);
            if looks_like_tls_failure(&stderr) {
                tracing::error!(
                    "git {sub} failed with a transport error; check the TLS/SSL libraries on this host"
                );
            }
            let tail = stderr_tail(&stderr);
            let mut msg = format!("git {sub} exited with status {}", out.status);
            if !tail.is_empty() {
                msg.push_str("\nstderr (tail):\n");
                msg.push_str(&tail);
            }
            return Err(Error::Publish(msg));
        }

        Ok(GitOutput {
            stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
        })
    }
}

#[async_trait]
impl Publisher for GitPublisher {
    async fn publish(&self, req: PublishRequest) -> Result<PublishOutcome> {
        let secret = req.target.token.clone();
        let repo = req.target.repo_name.clone();

        let tmp = tempfile::tempdir()?;
        let clone_dir = tmp.path().join("repo");
        let clone_str = clone_dir.to_str().ok_or_else(|| Error::InvalidPath {
            path: clone_dir.clone(),
            reason: "temporary path is not UTF-8".to_string(),
        })?;

        tracing::info!(user = %req.user, repo = %repo, "cloning repository");
        let url = remote_url(&self.cfg.remote_base, &req.target);
        self.git(&["clone", "--depth", "1", url.as_str(), clone_str], None, &secret)
            .await?;

        let out_dir = clone_dir.join(&self.cfg.subs_dir);
        let links = req.links;
        let categories = req.categories;
        let report = tokio::task::spawn_blocking(move || {
            build_sub_files(&links, &out_dir, &categories)
        })
        .await
        .map_err(|e| Error::External(format!("build task failed: {e}")))??;
        tracing::info!(user = %req.user, files = report.artifacts.len(), "subscription files built");

        let status = self
            .git(&["status", "--porcelain"], Some(&clone_dir), &secret)
            .await?;
        if status.stdout.trim().is_empty() {
            tracing::info!(user = %req.user, repo = %repo, "no changes to commit");
            return Ok(PublishOutcome::Unchanged);
        }

        let message = commit_message(Utc::now());
        let steps: [&[&str]; 5] = [
            &["config", "user.name", self.cfg.user_name.as_str()],
            &["config", "user.email", self.cfg.user_email.as_str()],
            &["add", "--all", "."],
            &["-c", "commit.gpgsign=false", "commit", "-m", message.as_str()],
            &["push", "origin", "HEAD"],
        ];
        for args in steps {
            self.git(args, Some(&clone_dir), &secret).await?;
        }

        tracing::info!(user = %req.user, repo = %repo, "pushed: {message}");
        Ok(PublishOutcome::Pushed {
            commit_message: message,
        })
    }
}

/// Authenticated clone URL. Local `file://` roots take no credentials.
fn remote_url(base: &str, target: &RepoTarget) -> String {
    let base = base.trim_end_matches('/');
    if let Some(rest) = base.strip_prefix("https://") {
        return format!(
            "https://x-access-token:{}@{rest}/{}.git",
            target.token, target.repo_name
        );
    }
    format!("{base}/{}.git", target.repo_name)
}

fn looks_like_tls_failure(stderr: &str) -> bool {
    stderr.contains("remote end hung up unexpectedly")
        || stderr.contains("TLS")
        || stderr.contains("SSL")
}

/// Last lines of `stderr`, bounded in count and bytes.
fn stderr_tail(stderr: &str) -> String {
    let mut lines: Vec<&str> = Vec::new();
    let mut bytes = 0usize;
    for line in stderr.lines().rev().filter(|l| !l.trim().is_empty()) {
        bytes += line.len() + 1;
        if lines.len() >= STDERR_TAIL_MAX_LINES || bytes > STDERR_TAIL_MAX_BYTES {
            break;
        }
        lines.push(line);
    }
    lines.reverse();
    lines.join("\n")
}
