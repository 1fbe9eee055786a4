use thiserror::Error;

/// Coarse error taxonomy surfaced to the embedding UI.
///
/// Deliberately flat: callers show these to the user rather than
/// terminating the event loop. See spec §7.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid name{}", .suggestion.as_ref().map(|s| format!(" (try {s:?})")).unwrap_or_default())]
    NameInvalid { suggestion: Option<String> },

    #[error("git command failed: {0}")]
    GitFailed(String),

    #[error("path already exists: {0}")]
    PathExists(String),

    #[error("post-creation setup failed: {0}")]
    SetupFailed(String),

    #[error("tmux not found on PATH")]
    MultiplexerNotFound,

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("manifest corrupt, falling back to empty: {0}")]
    ManifestCorrupt(String),

    #[error("status could not be determined")]
    StatusIndeterminate,

    #[error("pane capture failed")]
    CaptureFailed,
}

pub type CoreResult<T> = std::result::Result<T, CoreError>;
