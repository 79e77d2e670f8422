//! How a retrieved file is handed to a chat layer: the extension alone picks
//! the send method.

use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Animation,
    Video,
    /// Carries the extension (with its dot, possibly empty) for the notice text.
    Unrecognized(String),
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Animation => "animation",
            MediaKind::Video => "video",
            MediaKind::Unrecognized(_) => "unrecognized",
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaKind::Unrecognized(ext) => write!(f, "unrecognized extension '{ext}'"),
            other => f.write_str(other.as_str()),
        }
    }
}

pub fn classify(path: &Path) -> MediaKind {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{e}"))
        .unwrap_or_default();
    match ext.as_str() {
        ".jpg" | ".png" => MediaKind::Image,
        ".gif" => MediaKind::Animation,
        ".mp4" => MediaKind::Video,
        _ => MediaKind::Unrecognized(ext),
    }
}

/// Caption sent alongside the media: the stored name without its extension.
pub fn caption(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}
