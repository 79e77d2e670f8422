use crate::{EngineError, Result};
use std::ffi::OsStr;
use std::path::Path;
use std::process::{Command, Output};

pub fn command(program: impl AsRef<OsStr>) -> Command {
    let mut cmd = Command::new(program);
    configure_for_background(&mut cmd);
    cmd
}

#[cfg(windows)]
fn configure_for_background(cmd: &mut Command) {
    use std::os::windows::process::CommandExt;

    // Keep ffmpeg from flashing a console window when run from a service.
    const CREATE_NO_WINDOW: u32 = 0x0800_0000;
    cmd.creation_flags(CREATE_NO_WINDOW);
}

#[cfg(not(windows))]
fn configure_for_background(_cmd: &mut Command) {}

/// Puts the first audio stream of `audio` next to the first video stream of
/// `video` in a new container at `output`. Streams are copied, not re-encoded.
pub fn mux_audio_onto_video(ffmpeg: &Path, video: &Path, audio: &Path, output: &Path) -> Result<()> {
    let result = command(ffmpeg)
        .args(["-nostdin", "-y", "-loglevel", "error"])
        .arg("-i")
        .arg(video)
        .arg("-i")
        .arg(audio)
        .args(["-map", "0:v:0", "-map", "1:a:0"])
        .args(["-c", "copy"])
        .arg(output)
        .output();
    check_output("ffmpeg", result)
}

pub fn tool_version_first_line(program: impl AsRef<OsStr>) -> Option<String> {
    let output = command(program).arg("-version").output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout);
    let first = text.lines().next()?.trim();
    if first.is_empty() {
        return None;
    }
    Some(first.to_string())
}

fn check_output(tool: &str, result: std::io::Result<Output>) -> Result<()> {
    let output = result.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => EngineError::ExternalToolMissing {
            tool: tool.to_string(),
        },
        _ => EngineError::Io(e),
    })?;

    if !output.status.success() {
        return Err(EngineError::ExternalToolFailed {
            tool: tool.to_string(),
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(())
}
