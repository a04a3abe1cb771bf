use std::path::PathBuf;

/// Core error type for the subscription bot.
///
/// Adapter crates (git, Telegram) map their specific errors into this type so the
/// update pipeline can report failures consistently.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid path: {path}: {reason}")]
    InvalidPath { path: PathBuf, reason: String },

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("publish failed: {0}")]
    Publish(String),

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Failure of a single artifact write.
#[derive(Debug)]
pub struct ArtifactFailure {
    pub name: String,
    pub path: PathBuf,
    pub source: std::io::Error,
}

/// Errors produced while materializing subscription files.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// The destination cannot be used as an output directory. Nothing was written.
    #[error("destination unwritable: {path}: {reason}")]
    DestinationUnwritable { path: PathBuf, reason: String },

    /// One or more artifacts failed to write. Sibling artifacts were still attempted.
    #[error("failed to write {}: {}", failed_names(.failures), first_cause(.failures))]
    WriteFailure {
        failures: Vec<ArtifactFailure>,
        written: Vec<String>,
    },
}

fn failed_names(failures: &[ArtifactFailure]) -> String {
    failures
        .iter()
        .map(|f| f.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn first_cause(failures: &[ArtifactFailure]) -> String {
    failures
        .first()
        .map(|f| format!("{}: {}", f.path.display(), f.source))
        .unwrap_or_default()
}
