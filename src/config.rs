use crate::paths::AppPaths;
use crate::reddit::MAX_LISTING_LIMIT;
use crate::{EngineError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::Duration;

pub const DEFAULT_SUBREDDIT: &str = "cryptocurrencymemes";
pub const DEFAULT_USER_AGENT: &str = "memefarm/0.1 (media fetcher)";
pub const DEFAULT_AUDIO_SEGMENT: &str = "DASH_audio.mp4";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub subreddit: String,
    /// Overrides the media folder; relative paths live under the base dir.
    pub media_dir: Option<String>,
    pub initial_limit: usize,
    pub limit_step: usize,
    pub max_limit: usize,
    pub max_passes: u32,
    /// Pause between widening passes, for rate-limited listings.
    pub pass_delay_ms: u64,
    pub http_timeout_secs: u64,
    pub user_agent: String,
    /// Last path segment of the audio stream that accompanies a hosted video.
    pub audio_segment: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            subreddit: DEFAULT_SUBREDDIT.to_string(),
            media_dir: None,
            initial_limit: 10,
            limit_step: 5,
            max_limit: 100,
            max_passes: 20,
            pass_delay_ms: 0,
            http_timeout_secs: 60,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            audio_segment: DEFAULT_AUDIO_SEGMENT.to_string(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        validate_subreddit(&self.subreddit)?;
        if self.initial_limit == 0 {
            return Err(EngineError::InvalidConfig(
                "initial_limit must be at least 1".to_string(),
            ));
        }
        if self.limit_step == 0 {
            return Err(EngineError::InvalidConfig(
                "limit_step must be at least 1".to_string(),
            ));
        }
        if self.max_limit < self.initial_limit {
            return Err(EngineError::InvalidConfig(format!(
                "max_limit ({}) is below initial_limit ({})",
                self.max_limit, self.initial_limit
            )));
        }
        if self.max_limit > MAX_LISTING_LIMIT {
            return Err(EngineError::InvalidConfig(format!(
                "max_limit ({}) exceeds the listing page size ({MAX_LISTING_LIMIT})",
                self.max_limit
            )));
        }
        if self.max_passes == 0 {
            return Err(EngineError::InvalidConfig(
                "max_passes must be at least 1".to_string(),
            ));
        }
        if self.audio_segment.trim().is_empty() || self.audio_segment.contains('/') {
            return Err(EngineError::InvalidConfig(format!(
                "audio_segment must be a single path segment: {:?}",
                self.audio_segment
            )));
        }
        Ok(())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs.max(1))
    }

    pub fn pass_delay(&self) -> Duration {
        Duration::from_millis(self.pass_delay_ms)
    }
}

/// Subreddit names are 2-21 ASCII letters, digits or underscores.
pub fn validate_subreddit(name: &str) -> Result<()> {
    if subreddit_name_re().is_match(name.trim()) {
        Ok(())
    } else {
        Err(EngineError::InvalidConfig(format!(
            "invalid subreddit name: {name:?}"
        )))
    }
}

fn subreddit_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_]{2,21}$").expect("subreddit name regex"))
}

pub fn load_pipeline_config(paths: &AppPaths) -> Result<PipelineConfig> {
    let path = paths.pipeline_config_path();
    if !path.exists() {
        return Ok(PipelineConfig::default());
    }
    let bytes = std::fs::read(&path)?;
    let parsed: PipelineConfig = serde_json::from_slice(&bytes).map_err(|e| {
        EngineError::InvalidConfig(format!(
            "failed to parse pipeline config at {}: {e}",
            path.to_string_lossy()
        ))
    })?;
    Ok(parsed)
}

pub fn save_pipeline_config(paths: &AppPaths, config: &PipelineConfig) -> Result<()> {
    let path = paths.pipeline_config_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(&path, format!("{json}\n"))?;
    Ok(())
}

#[derive(Clone)]
pub struct RedditCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub user_agent: Option<String>,
}

impl std::fmt::Debug for RedditCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedditCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

impl RedditCredentials {
    /// Reads `REDDIT_CLIENT_ID`, `REDDIT_SECRET` and optionally `REDDIT_USER_AGENT`.
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        Some(Self {
            client_id: non_empty("REDDIT_CLIENT_ID")?,
            client_secret: non_empty("REDDIT_SECRET")?,
            user_agent: non_empty("REDDIT_USER_AGENT"),
        })
    }
}
