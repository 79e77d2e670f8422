use std::path::PathBuf;

use memefarm_engine::config::{self, RedditCredentials};
use memefarm_engine::delivery;
use memefarm_engine::paths::AppPaths;
use memefarm_engine::pipeline::CandidatePipeline;
use memefarm_engine::tools;
use memefarm_engine::EngineError;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), String> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "-h" || a == "--help") {
        print_help();
        return Ok(());
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("memefarm_engine=info,memefarm_fetch=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut base_dir: Option<PathBuf> = None;
    let mut subreddit: Option<String> = None;
    let mut media_dir: Option<String> = None;
    let mut max_limit: Option<usize> = None;
    let mut install_ffmpeg = false;
    let mut save_config = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--base-dir" => {
                i += 1;
                let v = args
                    .get(i)
                    .ok_or_else(|| "--base-dir requires a value".to_string())?;
                base_dir = Some(PathBuf::from(v));
            }
            "--subreddit" => {
                i += 1;
                let v = args
                    .get(i)
                    .ok_or_else(|| "--subreddit requires a value".to_string())?;
                subreddit = Some(v.trim_start_matches("r/").to_string());
            }
            "--media-dir" => {
                i += 1;
                let v = args
                    .get(i)
                    .ok_or_else(|| "--media-dir requires a value".to_string())?;
                media_dir = Some(v.to_string());
            }
            "--max-limit" => {
                i += 1;
                let v = args
                    .get(i)
                    .ok_or_else(|| "--max-limit requires a value".to_string())?;
                max_limit = Some(
                    v.parse()
                        .map_err(|_| format!("--max-limit expects a number, got {v}"))?,
                );
            }
            "--install-ffmpeg" => install_ffmpeg = true,
            "--save-config" => save_config = true,
            other => return Err(format!("unknown arg: {other} (try --help)")),
        }
        i += 1;
    }

    let paths = base_dir
        .or_else(default_base_dir)
        .map(AppPaths::new)
        .unwrap_or_else(AppPaths::from_current_dir);

    let mut cfg = config::load_pipeline_config(&paths).map_err(|e| e.to_string())?;
    if let Some(v) = subreddit {
        cfg.subreddit = v;
    }
    if let Some(v) = media_dir {
        cfg.media_dir = Some(v);
    }
    if let Some(v) = max_limit {
        cfg.max_limit = v;
    }
    cfg.validate().map_err(|e| e.to_string())?;

    if save_config {
        config::save_pipeline_config(&paths, &cfg).map_err(|e| e.to_string())?;
        println!("Config: {}", paths.pipeline_config_path().to_string_lossy());
    }

    if install_ffmpeg {
        let status = tools::ffmpeg_tools_status(&paths);
        if status.bundled {
            println!("FFmpeg: already installed ({})", status.ffmpeg_path);
        } else {
            println!("FFmpeg: installing...");
            let next = tools::install_ffmpeg_tools(&paths).map_err(|e| e.to_string())?;
            println!("FFmpeg: installed ({})", next.ffmpeg_path);
        }
    }

    if !tools::ffmpeg_tools_status(&paths).usable() {
        tracing::warn!("ffmpeg not found; hosted video posts will fail (see --install-ffmpeg)");
    }

    let credentials = RedditCredentials::from_env();
    if credentials.is_none() {
        tracing::info!("no reddit credentials in environment, using public listing");
    }

    let pipeline =
        CandidatePipeline::from_config(&paths, &cfg, credentials).map_err(|e| e.to_string())?;

    println!("Media dir: {}", pipeline.directory().to_string_lossy());

    match pipeline.try_fetch_next() {
        Ok(path) => {
            let kind = delivery::classify(&path);
            println!("{}", path.to_string_lossy());
            println!("kind: {kind}");
            println!("caption: {}", delivery::caption(&path));
            Ok(())
        }
        Err(EngineError::SourceUnavailable(err)) if err.is_transient() => Err(format!(
            "r/{} is temporarily unavailable ({err}); try again later",
            pipeline.topic()
        )),
        Err(err) => Err(format!(
            "no media retrieved from r/{}: {err}",
            pipeline.topic()
        )),
    }
}

fn default_base_dir() -> Option<PathBuf> {
    let v = std::env::var("MEMEFARM_BASE_DIR").ok()?;
    let t = v.trim();
    if t.is_empty() {
        None
    } else {
        Some(PathBuf::from(t))
    }
}

fn print_help() {
    println!(
        r#"memefarm_fetch

Fetches the first new media post from a subreddit's hot listing into the media folder.

Usage:
  memefarm_fetch [--base-dir <DIR>] [--subreddit <NAME>] [--media-dir <DIR>]
                 [--max-limit <N>] [--install-ffmpeg] [--save-config]

Defaults:
  --base-dir uses $MEMEFARM_BASE_DIR, else the current directory
  config is read from <base-dir>/config/pipeline.json when present

Environment:
  MEMEFARM_BASE_DIR                                    default base dir
  REDDIT_CLIENT_ID, REDDIT_SECRET, REDDIT_USER_AGENT   use OAuth listing instead of public JSON
  RUST_LOG                                             log filter (default memefarm_engine=info)

Notes:
  Hosted videos need ffmpeg on PATH or a bundled copy (--install-ffmpeg).
"#
    );
}
