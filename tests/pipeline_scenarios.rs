use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use memefarm_engine::candidate::{Candidate, ContentSource, SourceError, SourceKind};
use memefarm_engine::index::{ArtifactIndex, FilenameIndex};
use memefarm_engine::naming::TargetFile;
use memefarm_engine::pipeline::{CancelFlag, CandidatePipeline, RetrievalResult, WindowPolicy};
use memefarm_engine::retrieve::{DashAudioResolver, Fetcher, MediaRetriever, Muxer, TEMP_PREFIX};
use memefarm_engine::{EngineError, Result};

#[derive(Clone, Default)]
struct Calls {
    limits: Arc<Mutex<Vec<usize>>>,
    fetched: Arc<Mutex<Vec<String>>>,
    checked: Arc<Mutex<Vec<String>>>,
}

impl Calls {
    fn limits(&self) -> Vec<usize> {
        self.limits.lock().expect("lock").clone()
    }

    fn fetched(&self) -> Vec<String> {
        self.fetched.lock().expect("lock").clone()
    }

    fn checked(&self) -> Vec<String> {
        self.checked.lock().expect("lock").clone()
    }
}

struct FixedFeed {
    candidates: Vec<Candidate>,
    fail_with: Option<fn() -> SourceError>,
    calls: Calls,
}

impl ContentSource for FixedFeed {
    fn kind(&self) -> SourceKind {
        SourceKind::Reddit
    }

    fn list_hot(&self, _topic: &str, limit: usize) -> std::result::Result<Vec<Candidate>, SourceError> {
        self.calls.limits.lock().expect("lock").push(limit);
        if let Some(make_err) = self.fail_with {
            return Err(make_err());
        }
        Ok(self.candidates.iter().take(limit).cloned().collect())
    }
}

struct StubFetcher {
    failing: HashSet<String>,
    calls: Calls,
}

impl Fetcher for StubFetcher {
    fn fetch_to(&self, url: &str, dest: &Path) -> Result<u64> {
        self.calls.fetched.lock().expect("lock").push(url.to_string());
        if self.failing.contains(url) {
            return Err(EngineError::RetrievalFailed {
                url: url.to_string(),
                reason: "http 404".to_string(),
            });
        }
        std::fs::write(dest, url.as_bytes())?;
        Ok(url.len() as u64)
    }
}

struct CopyMuxer;

impl Muxer for CopyMuxer {
    fn mux(&self, video: &Path, _audio: &Path, output: &Path) -> Result<()> {
        std::fs::copy(video, output)?;
        Ok(())
    }
}

struct RecordingIndex {
    calls: Calls,
}

impl ArtifactIndex for RecordingIndex {
    fn is_known(&self, target: &TargetFile) -> Result<bool> {
        self.calls
            .checked
            .lock()
            .expect("lock")
            .push(target.file_name());
        FilenameIndex.is_known(target)
    }
}

fn policy(initial: usize, step: usize, max: usize, passes: u32) -> WindowPolicy {
    WindowPolicy {
        initial_limit: initial,
        step,
        max_limit: max,
        max_passes: passes,
        pass_delay: Duration::ZERO,
    }
}

fn ranked_feed() -> Vec<Candidate> {
    vec![
        Candidate::text("Daily Discussion", "https://www.reddit.com/r/x/comments/1/"),
        Candidate::media("Foo", "https://i.redd.it/foo.jpg"),
        Candidate::media("Bar", "https://i.redd.it/bar.jpg"),
    ]
}

struct Harness {
    calls: Calls,
    pipeline: CandidatePipeline,
}

fn harness(
    dir: &Path,
    candidates: Vec<Candidate>,
    failing: &[&str],
    fail_with: Option<fn() -> SourceError>,
    window: WindowPolicy,
) -> Harness {
    let calls = Calls::default();
    let source = FixedFeed {
        candidates,
        fail_with,
        calls: calls.clone(),
    };
    let retriever = MediaRetriever::new(
        Box::new(StubFetcher {
            failing: failing.iter().map(|s| s.to_string()).collect(),
            calls: calls.clone(),
        }),
        Box::new(CopyMuxer),
        Box::new(DashAudioResolver::new("DASH_audio.mp4")),
    );
    let pipeline = CandidatePipeline::new("memes", dir.to_path_buf(), Box::new(source), retriever, window)
        .expect("pipeline")
        .with_index(Box::new(RecordingIndex {
            calls: calls.clone(),
        }));
    Harness { calls, pipeline }
}

fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .expect("read_dir")
        .flatten()
        .map(|e| e.file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}

#[test]
fn empty_directory_skips_text_and_downloads_first_image() {
    let dir = tempfile::tempdir().expect("tempdir");
    let h = harness(dir.path(), ranked_feed(), &[], None, policy(10, 5, 100, 20));

    let result = h.pipeline.fetch_next();
    assert_eq!(result, RetrievalResult::Success(dir.path().join("Foo.jpg")));
    assert_eq!(h.calls.fetched(), vec!["https://i.redd.it/foo.jpg".to_string()]);
    assert_eq!(file_names(dir.path()), vec!["Foo.jpg".to_string()]);
}

#[test]
fn existing_file_is_skipped_and_next_candidate_downloaded() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("Foo.jpg"), b"old").expect("seed");
    let h = harness(dir.path(), ranked_feed(), &[], None, policy(10, 5, 100, 20));

    let result = h.pipeline.fetch_next();
    assert_eq!(result, RetrievalResult::Success(dir.path().join("Bar.jpg")));
    assert_eq!(h.calls.fetched(), vec!["https://i.redd.it/bar.jpg".to_string()]);
    assert_eq!(std::fs::read(dir.path().join("Foo.jpg")).expect("read"), b"old");
}

#[test]
fn fully_known_feed_widens_once_then_reports_exhausted() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("Foo.jpg"), b"x").expect("seed");
    std::fs::write(dir.path().join("Bar.jpg"), b"x").expect("seed");
    let h = harness(dir.path(), ranked_feed(), &[], None, policy(10, 5, 15, 20));

    let err = h.pipeline.try_fetch_next().expect_err("should be exhausted");
    assert!(
        matches!(err, EngineError::Exhausted { passes: 2, limit: 15 }),
        "err={err:?}"
    );
    assert_eq!(h.calls.limits(), vec![10, 15]);
    assert!(h.calls.fetched().is_empty());

    assert_eq!(h.pipeline.fetch_next(), RetrievalResult::Failure);
}

#[test]
fn window_growth_is_monotonic_and_bounded_by_pass_count() {
    let dir = tempfile::tempdir().expect("tempdir");
    let feed = vec![Candidate::text("only text", "https://www.reddit.com/r/x/comments/2/")];
    let h = harness(dir.path(), feed, &[], None, policy(10, 5, 100, 3));

    let err = h.pipeline.try_fetch_next().expect_err("should be exhausted");
    assert!(matches!(err, EngineError::Exhausted { passes: 3, limit: 20 }), "err={err:?}");

    let limits = h.calls.limits();
    assert_eq!(limits, vec![10, 15, 20]);
    assert!(limits.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn window_never_exceeds_configured_maximum() {
    let dir = tempfile::tempdir().expect("tempdir");
    let h = harness(dir.path(), Vec::new(), &[], None, policy(10, 7, 20, 50));

    let err = h.pipeline.try_fetch_next().expect_err("should be exhausted");
    assert!(matches!(err, EngineError::Exhausted { limit: 20, .. }), "err={err:?}");
    assert_eq!(h.calls.limits(), vec![10, 17, 20]);
}

#[test]
fn text_posts_never_reach_the_index() {
    let dir = tempfile::tempdir().expect("tempdir");
    let h = harness(dir.path(), ranked_feed(), &[], None, policy(10, 5, 100, 20));

    h.pipeline.try_fetch_next().expect("retrieve");
    assert_eq!(h.calls.checked(), vec!["Foo.jpg".to_string()]);
}

#[test]
fn repeated_calls_never_download_the_same_target_twice() {
    let dir = tempfile::tempdir().expect("tempdir");
    let h = harness(dir.path(), ranked_feed(), &[], None, policy(10, 5, 10, 20));

    let first = h.pipeline.fetch_next();
    let second = h.pipeline.fetch_next();
    let third = h.pipeline.try_fetch_next();

    assert_eq!(first, RetrievalResult::Success(dir.path().join("Foo.jpg")));
    assert_eq!(second, RetrievalResult::Success(dir.path().join("Bar.jpg")));
    assert!(matches!(third, Err(EngineError::Exhausted { .. })), "third={third:?}");

    let fetched = h.calls.fetched();
    let unique: HashSet<&String> = fetched.iter().collect();
    assert_eq!(fetched.len(), unique.len(), "fetched={fetched:?}");
}

#[test]
fn known_file_is_skipped_at_any_rank() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("Baz.png"), b"x").expect("seed");
    let feed = vec![
        Candidate::media("Baz", "https://i.redd.it/baz.png"),
        Candidate::media("Qux", "https://i.redd.it/qux.gif"),
    ];
    let h = harness(dir.path(), feed, &[], None, policy(10, 5, 100, 20));

    assert_eq!(
        h.pipeline.fetch_next(),
        RetrievalResult::Success(dir.path().join("Qux.gif"))
    );
}

#[test]
fn url_without_suffix_is_saved_as_jpg() {
    let dir = tempfile::tempdir().expect("tempdir");
    let feed = vec![Candidate::media("Plain", "https://i.imgur.com/abcdef")];
    let h = harness(dir.path(), feed, &[], None, policy(10, 5, 100, 20));

    assert_eq!(
        h.pipeline.fetch_next(),
        RetrievalResult::Success(dir.path().join("Plain.jpg"))
    );
}

#[test]
fn gallery_and_link_posts_are_skipped_like_text() {
    let dir = tempfile::tempdir().expect("tempdir");
    let feed = vec![
        Candidate::unsupported("Album", "https://www.reddit.com/gallery/1abc"),
        Candidate::unsupported("Article", "https://news.example.com/story"),
        Candidate::media("Foo", "https://i.redd.it/foo.jpg"),
    ];
    let h = harness(dir.path(), feed, &[], None, policy(10, 5, 100, 20));

    assert_eq!(
        h.pipeline.fetch_next(),
        RetrievalResult::Success(dir.path().join("Foo.jpg"))
    );
    assert_eq!(h.calls.checked(), vec!["Foo.jpg".to_string()]);
    assert_eq!(h.calls.fetched(), vec!["https://i.redd.it/foo.jpg".to_string()]);
}

#[test]
fn malformed_topic_is_rejected_before_listing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let retriever = MediaRetriever::new(
        Box::new(StubFetcher {
            failing: HashSet::new(),
            calls: Calls::default(),
        }),
        Box::new(CopyMuxer),
        Box::new(DashAudioResolver::new("DASH_audio.mp4")),
    );
    let source = FixedFeed {
        candidates: ranked_feed(),
        fail_with: None,
        calls: Calls::default(),
    };

    let err = match CandidatePipeline::new(
        "../x",
        dir.path().to_path_buf(),
        Box::new(source),
        retriever,
        policy(10, 5, 100, 20),
    ) {
        Ok(_) => panic!("topic should be rejected"),
        Err(err) => err,
    };
    assert!(matches!(err, EngineError::InvalidConfig(_)), "err={err:?}");
}

#[test]
fn saved_title_with_temp_prefix_survives_later_fetches() {
    let dir = tempfile::tempdir().expect("tempdir");
    let feed = vec![
        Candidate::media("temp_Clip", "https://i.redd.it/tc.mp4"),
        Candidate::video(
            "Clip",
            "https://v.redd.it/abc",
            "https://v.redd.it/abc/DASH_720.mp4?source=fallback",
        ),
    ];
    let h = harness(dir.path(), feed, &[], None, policy(10, 5, 100, 20));

    let first = h.pipeline.fetch_next();
    let second = h.pipeline.fetch_next();
    assert_eq!(first, RetrievalResult::Success(dir.path().join("_temp_Clip.mp4")));
    assert_eq!(second, RetrievalResult::Success(dir.path().join("Clip.mp4")));
    assert_eq!(
        file_names(dir.path()),
        vec!["Clip.mp4".to_string(), "_temp_Clip.mp4".to_string()]
    );
}

#[test]
fn source_failure_is_not_retried_by_widening() {
    let dir = tempfile::tempdir().expect("tempdir");
    let h = harness(
        dir.path(),
        ranked_feed(),
        &[],
        Some(|| SourceError::Unauthorized { status: 401 }),
        policy(10, 5, 100, 20),
    );

    let err = h.pipeline.try_fetch_next().expect_err("should fail");
    assert!(
        matches!(err, EngineError::SourceUnavailable(SourceError::Unauthorized { status: 401 })),
        "err={err:?}"
    );
    assert_eq!(h.calls.limits(), vec![10]);
}

#[test]
fn download_error_stops_instead_of_trying_next_candidate() {
    let dir = tempfile::tempdir().expect("tempdir");
    let h = harness(
        dir.path(),
        ranked_feed(),
        &["https://i.redd.it/foo.jpg"],
        None,
        policy(10, 5, 100, 20),
    );

    assert_eq!(h.pipeline.fetch_next(), RetrievalResult::Failure);
    assert_eq!(h.calls.fetched(), vec!["https://i.redd.it/foo.jpg".to_string()]);
    assert!(file_names(dir.path()).is_empty());
}

#[test]
fn video_with_failing_audio_leaves_no_files() {
    let dir = tempfile::tempdir().expect("tempdir");
    let feed = vec![Candidate::video(
        "Clip",
        "https://v.redd.it/abc",
        "https://v.redd.it/abc/DASH_720.mp4?source=fallback",
    )];
    let h = harness(
        dir.path(),
        feed,
        &["https://v.redd.it/abc/DASH_audio.mp4"],
        None,
        policy(10, 5, 100, 20),
    );

    assert_eq!(h.pipeline.fetch_next(), RetrievalResult::Failure);
    assert_eq!(
        h.calls.fetched(),
        vec![
            "https://v.redd.it/abc/DASH_720.mp4".to_string(),
            "https://v.redd.it/abc/DASH_audio.mp4".to_string(),
        ]
    );
    assert!(!dir.path().join("Clip.mp4").exists());
    assert!(file_names(dir.path())
        .iter()
        .all(|name| !name.starts_with(TEMP_PREFIX)));
}

#[test]
fn video_success_leaves_only_the_muxed_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let feed = vec![Candidate::video(
        "Clip",
        "https://v.redd.it/abc",
        "https://v.redd.it/abc/DASH_720.mp4?source=fallback",
    )];
    let h = harness(dir.path(), feed, &[], None, policy(10, 5, 100, 20));

    assert_eq!(
        h.pipeline.fetch_next(),
        RetrievalResult::Success(dir.path().join("Clip.mp4"))
    );
    assert_eq!(file_names(dir.path()), vec!["Clip.mp4".to_string()]);
}

#[test]
fn canceled_pipeline_does_not_list() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cancel = CancelFlag::new();
    let h = harness(dir.path(), ranked_feed(), &[], None, policy(10, 5, 100, 20));
    let pipeline = h.pipeline.with_cancel_flag(cancel.clone());
    cancel.cancel();

    let err = pipeline.try_fetch_next().expect_err("should be canceled");
    assert!(matches!(err, EngineError::Canceled), "err={err:?}");
    assert!(h.calls.limits().is_empty());
}

#[test]
fn unreadable_directory_surfaces_as_failure() {
    let dir = tempfile::tempdir().expect("tempdir");
    let media: PathBuf = dir.path().join("memes");
    let h = harness(&media, ranked_feed(), &[], None, policy(10, 5, 100, 20));
    assert!(media.is_dir());
    std::fs::remove_dir_all(&media).expect("remove");

    let err = h.pipeline.try_fetch_next().expect_err("should fail");
    assert!(matches!(err, EngineError::Filesystem { .. }), "err={err:?}");
    assert_eq!(h.pipeline.fetch_next(), RetrievalResult::Failure);
}

#[test]
fn concurrent_pipelines_on_one_directory_do_not_duplicate() {
    let dir = tempfile::tempdir().expect("tempdir");
    let feed = vec![Candidate::media("Solo", "https://i.redd.it/solo.png")];
    let a = harness(dir.path(), feed.clone(), &[], None, policy(10, 5, 10, 1));
    let b = harness(dir.path(), feed, &[], None, policy(10, 5, 10, 1));

    let handles: Vec<_> = [a.pipeline, b.pipeline]
        .into_iter()
        .map(|pipeline| std::thread::spawn(move || pipeline.fetch_next()))
        .collect();
    let results: Vec<RetrievalResult> = handles
        .into_iter()
        .map(|h| h.join().expect("join"))
        .collect();

    let successes = results
        .iter()
        .filter(|r| matches!(r, RetrievalResult::Success(_)))
        .count();
    assert_eq!(successes, 1, "results={results:?}");
    assert_eq!(a.calls.fetched().len() + b.calls.fetched().len(), 1);
    assert_eq!(file_names(dir.path()), vec!["Solo.png".to_string()]);
}
