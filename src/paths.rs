use std::path::{Path, PathBuf};

const DEFAULT_MEDIA_FOLDER: &str = "memes";

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub base_dir: PathBuf,
}

impl AppPaths {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Uses the working directory, falling back to `.` when it cannot be read.
    pub fn from_current_dir() -> Self {
        let base_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::new(base_dir)
    }

    pub fn config_dir(&self) -> PathBuf {
        self.base_dir.join("config")
    }

    pub fn pipeline_config_path(&self) -> PathBuf {
        self.config_dir().join("pipeline.json")
    }

    pub fn default_media_dir(&self) -> PathBuf {
        self.base_dir.join(DEFAULT_MEDIA_FOLDER)
    }

    /// Resolves a configured media folder. Relative values live under the base dir.
    pub fn media_dir(&self, configured: Option<&str>) -> PathBuf {
        match configured.map(str::trim) {
            Some(value) if !value.is_empty() => {
                let path = Path::new(value);
                if path.is_absolute() {
                    path.to_path_buf()
                } else {
                    self.base_dir.join(path)
                }
            }
            _ => self.default_media_dir(),
        }
    }

    pub fn tools_dir(&self) -> PathBuf {
        self.base_dir.join("tools")
    }

    pub fn ffmpeg_dir(&self) -> PathBuf {
        self.tools_dir().join("ffmpeg")
    }

    pub fn ffmpeg_bin_path(&self) -> PathBuf {
        let mut path = self.ffmpeg_dir().join("ffmpeg");
        if cfg!(windows) {
            path.set_extension("exe");
        }
        path
    }

    pub fn ffmpeg_cmd(&self) -> PathBuf {
        let path = self.ffmpeg_bin_path();
        if path.exists() {
            path
        } else {
            PathBuf::from("ffmpeg")
        }
    }

    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(self.config_dir())?;
        std::fs::create_dir_all(self.ffmpeg_dir())?;
        Ok(())
    }
}
