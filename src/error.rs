use crate::candidate::SourceError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("content source unavailable: {0}")]
    SourceUnavailable(#[from] SourceError),

    #[error("retrieval failed for {url}: {reason}")]
    RetrievalFailed { url: String, reason: String },

    #[error("no new candidate after {passes} passes (limit={limit})")]
    Exhausted { passes: u32, limit: usize },

    #[error("filesystem error at {path}: {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("external tool is missing: {tool}")]
    ExternalToolMissing { tool: String },

    #[error("external tool failed: {tool} (code={code:?}) {stderr}")]
    ExternalToolFailed {
        tool: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("retrieval canceled")]
    Canceled,

    #[error("tool install failed: {0}")]
    InstallFailed(String),
}

impl EngineError {
    pub fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        EngineError::Filesystem {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
