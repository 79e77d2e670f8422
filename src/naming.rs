//! Maps a candidate's title and media URL to the filename it is stored under.

use std::path::{Path, PathBuf};
use url::Url;

pub const DEFAULT_EXTENSION: &str = ".jpg";
/// Reserved for in-flight downloads; no derived name starts with it.
pub const TEMP_PREFIX: &str = "temp_";
const FALLBACK_NAME: &str = "untitled";
const MAX_NAME_BYTES: usize = 200;
const MAX_EXTENSION_CHARS: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetFile {
    pub directory: PathBuf,
    pub name: String,
    /// Includes the leading dot.
    pub extension: String,
}

impl TargetFile {
    pub fn new(directory: &Path, title: &str, media_url: &str) -> Self {
        let (name, extension) = derive(title, media_url);
        Self {
            directory: directory.to_path_buf(),
            name,
            extension,
        }
    }

    pub fn file_name(&self) -> String {
        format!("{}{}", self.name, self.extension)
    }

    pub fn path(&self) -> PathBuf {
        self.directory.join(self.file_name())
    }
}

pub fn derive(title: &str, media_url: &str) -> (String, String) {
    (derive_name(title), derive_extension(media_url))
}

pub fn derive_name(title: &str) -> String {
    let stripped = title
        .trim()
        .trim_matches(|ch| ch == '/' || ch == '\\')
        .trim();

    let mut out = String::with_capacity(stripped.len());
    for ch in stripped.chars() {
        if is_invalid_filename_char(ch) {
            out.push('_');
        } else {
            out.push(ch);
        }
        if out.len() >= MAX_NAME_BYTES {
            break;
        }
    }

    // Windows refuses trailing dots and spaces.
    let cleaned = out.trim_end_matches(['.', ' ']).trim_start();
    if cleaned.is_empty() || cleaned.chars().all(|ch| ch == '.' || ch == '_') {
        return FALLBACK_NAME.to_string();
    }
    if has_temp_prefix(cleaned) {
        return format!("_{cleaned}");
    }
    cleaned.to_string()
}

fn has_temp_prefix(name: &str) -> bool {
    name.get(..TEMP_PREFIX.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(TEMP_PREFIX))
}

pub fn derive_extension(media_url: &str) -> String {
    let path = match Url::parse(media_url.trim()) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => crate::candidate::strip_query(media_url),
    };
    let last_segment = path.rsplit('/').next().unwrap_or("");

    let Some(dot) = last_segment.rfind('.') else {
        return DEFAULT_EXTENSION.to_string();
    };
    let ext = &last_segment[dot + 1..];
    if dot == 0
        || ext.is_empty()
        || ext.len() > MAX_EXTENSION_CHARS
        || !ext.chars().all(|ch| ch.is_ascii_alphanumeric())
    {
        return DEFAULT_EXTENSION.to_string();
    }
    format!(".{}", ext.to_ascii_lowercase())
}

fn is_invalid_filename_char(ch: char) -> bool {
    ch.is_control() || matches!(ch, '/' | '\\' | '<' | '>' | ':' | '"' | '|' | '?' | '*')
}
