//! Byte transfer for one eligible candidate.
//!
//! Images and animations are a single download. Hosted videos keep their
//! audio in a separate stream, so both are fetched to temporary files next to
//! the target and muxed into a temporary container. Only a complete file is
//! renamed onto the target path.

use crate::candidate::{Candidate, SourceKind};
use crate::config::PipelineConfig;
use crate::ffmpeg;
use crate::naming::TargetFile;
use crate::paths::AppPaths;
use crate::{EngineError, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::{NamedTempFile, TempPath};
use tracing::{debug, warn};
use url::Url;

pub use crate::naming::TEMP_PREFIX;

const PART_SUFFIX: &str = ".part";

pub trait Fetcher: Send + Sync {
    /// Writes the body at `url` to `dest`. On error `dest` does not exist.
    fn fetch_to(&self, url: &str, dest: &Path) -> Result<u64>;
}

pub trait Muxer: Send + Sync {
    fn mux(&self, video: &Path, audio: &Path, output: &Path) -> Result<()>;
}

/// Finds the audio stream that belongs to a video stream URL.
///
/// This is an upstream naming convention, not a protocol; it changes without
/// notice, so each source kind gets its own resolver.
pub trait AudioTrackResolver: Send + Sync {
    fn audio_url(&self, video_url: &str) -> Option<String>;
}

/// Reddit DASH layout: `https://v.redd.it/<id>/DASH_720.mp4` has its audio at
/// `https://v.redd.it/<id>/<audio_segment>`.
#[derive(Debug, Clone)]
pub struct DashAudioResolver {
    audio_segment: String,
}

impl DashAudioResolver {
    pub fn new(audio_segment: &str) -> Self {
        Self {
            audio_segment: audio_segment.trim().to_string(),
        }
    }
}

impl AudioTrackResolver for DashAudioResolver {
    fn audio_url(&self, video_url: &str) -> Option<String> {
        let mut parsed = Url::parse(video_url).ok()?;
        parsed.set_query(None);
        parsed.set_fragment(None);
        {
            let mut segments = parsed.path_segments_mut().ok()?;
            segments.pop_if_empty().pop().push(&self.audio_segment);
        }
        let audio = parsed.to_string();
        if audio == video_url {
            None
        } else {
            Some(audio)
        }
    }
}

pub fn resolver_for_source(kind: SourceKind, config: &PipelineConfig) -> Box<dyn AudioTrackResolver> {
    match kind {
        SourceKind::Reddit => Box::new(DashAudioResolver::new(&config.audio_segment)),
    }
}

pub struct HttpFetcher {
    agent: ureq::Agent,
}

impl HttpFetcher {
    pub fn new(user_agent: &str, timeout: Duration) -> Self {
        let mut config = ureq::Agent::config_builder();
        config = config
            .http_status_as_error(false)
            .timeout_global(Some(timeout))
            .user_agent(user_agent);
        Self {
            agent: config.build().into(),
        }
    }
}

impl Fetcher for HttpFetcher {
    fn fetch_to(&self, url: &str, dest: &Path) -> Result<u64> {
        let failed = |reason: String| EngineError::RetrievalFailed {
            url: redact_url_for_log(url),
            reason,
        };

        let mut response = self
            .agent
            .get(url)
            .call()
            .map_err(|e| failed(format!("request failed: {e}")))?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            return Err(failed(format!("http {status}")));
        }

        let content_type = header_string(&response, "content-type");
        if content_type.contains("text/html") || content_type.contains("application/xhtml+xml") {
            return Err(failed("URL resolved to a web page, not a media file".to_string()));
        }

        // Only comparable when the body is not transfer-decoded.
        let expected_len = if header_string(&response, "content-encoding").is_empty() {
            header_string(&response, "content-length").parse::<u64>().ok()
        } else {
            None
        };

        let mut output =
            std::fs::File::create(dest).map_err(|e| EngineError::filesystem(dest, e))?;
        let mut body_reader = response.body_mut().as_reader();
        let written = std::io::copy(&mut body_reader, &mut output).and_then(|n| {
            output.flush()?;
            Ok(n)
        });
        drop(output);

        match written {
            Ok(0) => {
                remove_quietly(dest);
                Err(failed("response body is empty".to_string()))
            }
            Ok(bytes) if expected_len.is_some_and(|len| len != bytes) => {
                remove_quietly(dest);
                Err(failed(format!(
                    "transfer interrupted: got {bytes} of {} bytes",
                    expected_len.unwrap_or_default()
                )))
            }
            Ok(bytes) => Ok(bytes),
            Err(err) => {
                remove_quietly(dest);
                Err(failed(format!("transfer interrupted: {err}")))
            }
        }
    }
}

pub struct FfmpegMuxer {
    ffmpeg: PathBuf,
}

impl FfmpegMuxer {
    pub fn new(ffmpeg: PathBuf) -> Self {
        Self { ffmpeg }
    }

    pub fn from_paths(paths: &AppPaths) -> Self {
        Self::new(paths.ffmpeg_cmd())
    }
}

impl Muxer for FfmpegMuxer {
    fn mux(&self, video: &Path, audio: &Path, output: &Path) -> Result<()> {
        ffmpeg::mux_audio_onto_video(&self.ffmpeg, video, audio, output)
    }
}

pub struct MediaRetriever {
    fetcher: Box<dyn Fetcher>,
    muxer: Box<dyn Muxer>,
    audio: Box<dyn AudioTrackResolver>,
}

impl MediaRetriever {
    pub fn new(
        fetcher: Box<dyn Fetcher>,
        muxer: Box<dyn Muxer>,
        audio: Box<dyn AudioTrackResolver>,
    ) -> Self {
        Self {
            fetcher,
            muxer,
            audio,
        }
    }

    /// HTTP fetcher, ffmpeg muxer and the audio convention of `kind`.
    pub fn from_config(paths: &AppPaths, config: &PipelineConfig, kind: SourceKind) -> Self {
        Self::new(
            Box::new(HttpFetcher::new(&config.user_agent, config.http_timeout())),
            Box::new(FfmpegMuxer::from_paths(paths)),
            resolver_for_source(kind, config),
        )
    }

    /// On success exactly `target.path()` exists. On failure neither the
    /// target nor any intermediate file is left behind.
    pub fn retrieve(&self, candidate: &Candidate, target: &TargetFile) -> Result<PathBuf> {
        let Some(url) = candidate.media_url() else {
            return Err(EngineError::RetrievalFailed {
                url: "<none>".to_string(),
                reason: "candidate has no media url".to_string(),
            });
        };
        if candidate.is_video {
            self.retrieve_muxed(&url, target)
        } else {
            self.retrieve_direct(&url, target)
        }
    }

    fn retrieve_direct(&self, url: &str, target: &TargetFile) -> Result<PathBuf> {
        let part = temp_path_in(&target.directory, PART_SUFFIX)?;
        self.fetcher.fetch_to(url, &part)?;
        persist(part, target.path())
    }

    fn retrieve_muxed(&self, video_url: &str, target: &TargetFile) -> Result<PathBuf> {
        let audio_url =
            self.audio
                .audio_url(video_url)
                .ok_or_else(|| EngineError::RetrievalFailed {
                    url: redact_url_for_log(video_url),
                    reason: "no audio track convention matches this video url".to_string(),
                })?;

        // All three are deleted on drop unless persisted; the muxed output
        // keeps the target extension so ffmpeg picks the right container.
        let video_tmp = temp_path_in(&target.directory, &target.extension)?;
        let audio_tmp = temp_path_in(&target.directory, &target.extension)?;
        let muxed_tmp = temp_path_in(&target.directory, &target.extension)?;

        self.fetcher.fetch_to(video_url, &video_tmp)?;
        self.fetcher.fetch_to(&audio_url, &audio_tmp)?;

        debug!(path = %target.path().display(), "muxing audio onto video");
        if let Err(err) = self.muxer.mux(&video_tmp, &audio_tmp, &muxed_tmp) {
            return Err(EngineError::RetrievalFailed {
                url: redact_url_for_log(video_url),
                reason: format!("mux failed: {err}"),
            });
        }
        let muxed_len = std::fs::metadata(&muxed_tmp).map(|m| m.len()).unwrap_or(0);
        if muxed_len == 0 {
            return Err(EngineError::RetrievalFailed {
                url: redact_url_for_log(video_url),
                reason: "muxer reported success but wrote no output".to_string(),
            });
        }
        persist(muxed_tmp, target.path())
    }
}

/// Reserves a uniquely named `temp_*` file in `directory`. Saved names never
/// carry the prefix, so a temp file cannot shadow retrieved media.
fn temp_path_in(directory: &Path, suffix: &str) -> Result<TempPath> {
    tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .suffix(suffix)
        .tempfile_in(directory)
        .map(NamedTempFile::into_temp_path)
        .map_err(|e| EngineError::filesystem(directory, e))
}

fn persist(temp: TempPath, final_path: PathBuf) -> Result<PathBuf> {
    temp.persist(&final_path)
        .map_err(|e| EngineError::filesystem(&final_path, e.error))?;
    Ok(final_path)
}

fn remove_quietly(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => warn!(path = %path.display(), error = %err, "failed to remove file"),
    }
}

fn header_string(response: &ureq::http::Response<ureq::Body>, key: &str) -> String {
    response
        .headers()
        .get(key)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_ascii_lowercase()
}

pub fn redact_url_for_log(value: &str) -> String {
    match Url::parse(value) {
        Ok(uri) => {
            let scheme = uri.scheme();
            let authority = uri.host_str().unwrap_or("unknown-host");
            format!("{scheme}://{authority}/...")
        }
        Err(_) => "[invalid-url]".to_string(),
    }
}
