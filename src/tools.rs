use crate::ffmpeg::tool_version_first_line;
use crate::paths::AppPaths;
use crate::{EngineError, Result};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct FfmpegToolsStatus {
    /// A bundled copy exists under the tools dir.
    pub bundled: bool,
    pub ffmpeg_path: String,
    pub ffmpeg_version: Option<String>,
}

impl FfmpegToolsStatus {
    pub fn usable(&self) -> bool {
        self.ffmpeg_version.is_some()
    }
}

pub fn ffmpeg_tools_status(paths: &AppPaths) -> FfmpegToolsStatus {
    let resolved = paths.ffmpeg_cmd();
    FfmpegToolsStatus {
        bundled: paths.ffmpeg_bin_path().exists(),
        ffmpeg_path: resolved.to_string_lossy().to_string(),
        ffmpeg_version: tool_version_first_line(&resolved),
    }
}

/// Downloads a static ffmpeg build into the tools dir.
pub fn install_ffmpeg_tools(paths: &AppPaths) -> Result<FfmpegToolsStatus> {
    paths.ensure_dirs()?;

    let destination = paths.ffmpeg_dir();
    let download_url = ffmpeg_sidecar::download::ffmpeg_download_url()
        .map_err(|e| EngineError::InstallFailed(e.to_string()))?;
    let archive_path =
        ffmpeg_sidecar::download::download_ffmpeg_package(download_url, &destination)
            .map_err(|e| EngineError::InstallFailed(e.to_string()))?;
    ffmpeg_sidecar::download::unpack_ffmpeg(&archive_path, &destination)
        .map_err(|e| EngineError::InstallFailed(e.to_string()))?;

    let status = ffmpeg_tools_status(paths);
    tracing::info!(path = %status.ffmpeg_path, version = ?status.ffmpeg_version, "ffmpeg installed");
    Ok(status)
}
