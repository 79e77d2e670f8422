use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One ranked post from a content source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub title: String,
    pub source_url: String,
    pub is_text_only: bool,
    pub is_video: bool,
    /// Present only for hosted videos.
    pub video_fallback_url: Option<String>,
    /// Galleries and links to web pages: not text, but nothing to download.
    #[serde(default)]
    pub is_unsupported: bool,
}

impl Candidate {
    pub fn text(title: &str, permalink: &str) -> Self {
        Self {
            title: title.to_string(),
            source_url: permalink.to_string(),
            is_text_only: true,
            is_video: false,
            video_fallback_url: None,
            is_unsupported: false,
        }
    }

    pub fn media(title: &str, url: &str) -> Self {
        Self {
            title: title.to_string(),
            source_url: url.to_string(),
            is_text_only: false,
            is_video: false,
            video_fallback_url: None,
            is_unsupported: false,
        }
    }

    pub fn video(title: &str, post_url: &str, fallback_url: &str) -> Self {
        Self {
            title: title.to_string(),
            source_url: post_url.to_string(),
            is_text_only: false,
            is_video: true,
            video_fallback_url: Some(fallback_url.to_string()),
            is_unsupported: false,
        }
    }

    pub fn unsupported(title: &str, url: &str) -> Self {
        Self {
            is_unsupported: true,
            ..Self::media(title, url)
        }
    }

    /// The URL whose bytes end up on disk: the query-less fallback stream for
    /// videos, the post URL otherwise.
    pub fn media_url(&self) -> Option<String> {
        if self.is_video {
            self.video_fallback_url
                .as_deref()
                .map(strip_query)
                .filter(|url| !url.is_empty())
        } else if self.source_url.trim().is_empty() {
            None
        } else {
            Some(self.source_url.trim().to_string())
        }
    }
}

pub(crate) fn strip_query(url: &str) -> String {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    url[..end].trim().to_string()
}

/// Which upstream a source talks to. Selects source-specific URL conventions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Reddit,
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("rate limited by content source")]
    RateLimited,

    #[error("content source rejected credentials (status {status})")]
    Unauthorized { status: u16 },

    #[error("content source returned http {status}")]
    Http { status: u16 },

    #[error("network error: {0}")]
    Network(String),

    #[error("malformed listing: {0}")]
    Malformed(String),
}

impl SourceError {
    /// Transient failures may succeed on a later call; the rest need operator action.
    pub fn is_transient(&self) -> bool {
        matches!(self, SourceError::RateLimited | SourceError::Network(_))
    }
}

pub trait ContentSource: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// Returns up to `limit` candidates for `topic`, in upstream rank order.
    fn list_hot(&self, topic: &str, limit: usize) -> Result<Vec<Candidate>, SourceError>;
}
