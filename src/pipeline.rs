//! Picks the first new, non-text candidate from a ranked feed and retrieves it.
//!
//! One invocation yields at most one file. When a whole window of candidates
//! is text or already on disk, the window is widened and the listing repeated,
//! within the pass and size bounds of [`WindowPolicy`].

use crate::candidate::{Candidate, ContentSource};
use crate::config::{self, PipelineConfig, RedditCredentials};
use crate::index::{self, ArtifactIndex, FilenameIndex};
use crate::naming::TargetFile;
use crate::paths::AppPaths;
use crate::reddit::RedditClient;
use crate::retrieve::{redact_url_for_log, MediaRetriever};
use crate::{EngineError, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetrievalResult {
    Success(PathBuf),
    Failure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowPolicy {
    pub initial_limit: usize,
    pub step: usize,
    pub max_limit: usize,
    pub max_passes: u32,
    pub pass_delay: Duration,
}

impl WindowPolicy {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            initial_limit: config.initial_limit,
            step: config.limit_step,
            max_limit: config.max_limit,
            max_passes: config.max_passes,
            pass_delay: config.pass_delay(),
        }
    }

    fn first_window(&self) -> RetrievalWindow {
        RetrievalWindow {
            limit: self.initial_limit.clamp(1, self.max_limit.max(1)),
        }
    }
}

impl Default for WindowPolicy {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

/// How many ranked candidates one pass asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrievalWindow {
    pub limit: usize,
}

impl RetrievalWindow {
    /// The next, larger window, or `None` once the cap has been reached.
    pub fn widen(self, policy: &WindowPolicy) -> Option<RetrievalWindow> {
        if self.limit >= policy.max_limit {
            return None;
        }
        let limit = self
            .limit
            .saturating_add(policy.step.max(1))
            .min(policy.max_limit);
        Some(RetrievalWindow { limit })
    }
}

/// Shared flag a caller flips to stop an invocation between candidates.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

enum PassOutcome {
    Retrieved(PathBuf),
    NothingNew,
}

pub struct CandidatePipeline {
    topic: String,
    directory: PathBuf,
    source: Box<dyn ContentSource>,
    index: Box<dyn ArtifactIndex>,
    retriever: MediaRetriever,
    policy: WindowPolicy,
    cancel: CancelFlag,
}

impl CandidatePipeline {
    /// Rejects a malformed `topic` and creates `directory` if needed. Dedup
    /// defaults to [`FilenameIndex`].
    pub fn new(
        topic: &str,
        directory: PathBuf,
        source: Box<dyn ContentSource>,
        retriever: MediaRetriever,
        policy: WindowPolicy,
    ) -> Result<Self> {
        config::validate_subreddit(topic)?;
        index::ensure_directory(&directory)?;
        Ok(Self {
            topic: topic.trim().to_string(),
            directory,
            source,
            index: Box::new(FilenameIndex),
            retriever,
            policy,
            cancel: CancelFlag::new(),
        })
    }

    /// Reddit listing, HTTP downloads and ffmpeg muxing wired from config.
    pub fn from_config(
        paths: &AppPaths,
        config: &PipelineConfig,
        credentials: Option<RedditCredentials>,
    ) -> Result<Self> {
        config.validate()?;
        let source = RedditClient::new(credentials, &config.user_agent, config.http_timeout());
        let retriever = MediaRetriever::from_config(paths, config, source.kind());
        let directory = paths.media_dir(config.media_dir.as_deref());
        info!(directory = %directory.display(), subreddit = %config.subreddit, "media pipeline ready");
        Self::new(
            &config.subreddit,
            directory,
            Box::new(source),
            retriever,
            WindowPolicy::from_config(config),
        )
    }

    pub fn with_index(mut self, index: Box<dyn ArtifactIndex>) -> Self {
        self.index = index;
        self
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Collapses every error to `Failure` after logging it.
    pub fn fetch_next(&self) -> RetrievalResult {
        match self.try_fetch_next() {
            Ok(path) => RetrievalResult::Success(path),
            Err(err) => {
                warn!(subreddit = %self.topic, error = %err, "failed to fetch media");
                RetrievalResult::Failure
            }
        }
    }

    pub fn try_fetch_next(&self) -> Result<PathBuf> {
        let lock = directory_lock(&self.directory);
        let _held = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut window = self.policy.first_window();
        let mut pass: u32 = 1;
        loop {
            if self.cancel.is_canceled() {
                return Err(EngineError::Canceled);
            }

            match self.scan_window(window)? {
                PassOutcome::Retrieved(path) => return Ok(path),
                PassOutcome::NothingNew => {}
            }

            let next = match window.widen(&self.policy) {
                Some(next) if pass < self.policy.max_passes => next,
                _ => {
                    warn!(subreddit = %self.topic, passes = pass, limit = window.limit, "no new media within bounds");
                    return Err(EngineError::Exhausted {
                        passes: pass,
                        limit: window.limit,
                    });
                }
            };
            warn!(subreddit = %self.topic, from = window.limit, to = next.limit, "no unique media found, widening window");
            window = next;
            pass += 1;

            if !self.policy.pass_delay.is_zero() {
                std::thread::sleep(self.policy.pass_delay);
            }
        }
    }

    fn scan_window(&self, window: RetrievalWindow) -> Result<PassOutcome> {
        debug!(subreddit = %self.topic, limit = window.limit, "listing candidates");
        let candidates = self.source.list_hot(&self.topic, window.limit)?;

        for candidate in candidates.iter().take(window.limit) {
            if self.cancel.is_canceled() {
                return Err(EngineError::Canceled);
            }
            if let Some(path) = self.evaluate(candidate)? {
                return Ok(PassOutcome::Retrieved(path));
            }
        }
        Ok(PassOutcome::NothingNew)
    }

    /// `Ok(None)` means skip. A retrieval error ends the invocation rather
    /// than moving on to the next candidate.
    fn evaluate(&self, candidate: &Candidate) -> Result<Option<PathBuf>> {
        if candidate.is_text_only {
            debug!(title = %candidate.title, "skipping text post");
            return Ok(None);
        }
        if candidate.is_unsupported {
            debug!(title = %candidate.title, "skipping gallery or link post");
            return Ok(None);
        }
        let Some(media_url) = candidate.media_url() else {
            debug!(title = %candidate.title, "skipping post without media url");
            return Ok(None);
        };

        let target = TargetFile::new(&self.directory, &candidate.title, &media_url);
        if self.index.is_known(&target)? {
            debug!(file = %target.file_name(), "already retrieved");
            return Ok(None);
        }

        info!(file = %target.file_name(), url = %redact_url_for_log(&media_url), video = candidate.is_video, "retrieving");
        let path = match self.retriever.retrieve(candidate, &target) {
            Ok(path) => path,
            Err(err) => {
                warn!(file = %target.file_name(), error = %err, "retrieval failed, not trying further candidates");
                return Err(err);
            }
        };
        info!(subreddit = %self.topic, path = %path.display(), "saved media");
        Ok(Some(path))
    }
}

/// One mutex per media directory, shared by every pipeline in the process.
fn directory_lock(directory: &Path) -> Arc<Mutex<()>> {
    static LOCKS: OnceLock<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> = OnceLock::new();
    let key = directory
        .canonicalize()
        .unwrap_or_else(|_| directory.to_path_buf());
    let mut locks = LOCKS
        .get_or_init(Default::default)
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    locks.entry(key).or_default().clone()
}
