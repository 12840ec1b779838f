//! User settings persisted between runs

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::{ProjectDirs, UserDirs};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::model::Quality;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Folder pre-filled in the destination field
    pub download_dir: PathBuf,
    /// Preset selected at start-up
    pub default_quality: Quality,
    /// Explicit yt-dlp executable
    pub ytdlp_path: Option<PathBuf>,
    /// Forwarded to yt-dlp as `--ffmpeg-location`
    pub ffmpeg_location: Option<PathBuf>,
    pub dark_mode: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            default_quality: Quality::Best,
            ytdlp_path: None,
            ffmpeg_location: None,
            dark_mode: true,
        }
    }
}

fn default_download_dir() -> PathBuf {
    UserDirs::new()
        .and_then(|u| {
            u.download_dir()
                .map(Path::to_path_buf)
                .or_else(|| Some(u.home_dir().join("Downloads")))
        })
        .unwrap_or_else(|| PathBuf::from("./downloads"))
}

impl AppConfig {
    /// Location of `config.json` in the platform config dir
    pub fn config_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("com", "yt-video-downloader", "yt-video-downloader")
            .context("Failed to get project directories")?;
        Ok(dirs.config_dir().join("config.json"))
    }

    /// Loads settings, falling back to defaults so the window always opens
    pub fn load_or_default() -> Self {
        match Self::config_path().and_then(|p| Self::load_from(&p)) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "using default settings");
                Self::default()
            }
        }
    }

    /// Reads `path`; a missing file yields the defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        info!(path = %path.display(), "loaded settings");
        Ok(config)
    }

    /// Records the folder and quality of a successful download.
    ///
    /// Returns whether anything changed.
    pub fn remember(&mut self, folder: PathBuf, quality: Quality) -> bool {
        if self.download_dir == folder && self.default_quality == quality {
            return false;
        }
        self.download_dir = folder;
        self.default_quality = quality;
        true
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }
}
