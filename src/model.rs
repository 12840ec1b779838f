use std::{fmt, path::PathBuf};

use serde::{Deserialize, Serialize};

/// Quality presets offered in the dropdown
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Quality {
    /// Best video and best audio, merged
    #[default]
    #[serde(rename = "best")]
    Best,
    #[serde(rename = "1080p")]
    P1080,
    #[serde(rename = "720p")]
    P720,
    #[serde(rename = "480p")]
    P480,
    #[serde(rename = "360p")]
    P360,
    /// Best audio stream, converted to MP3
    #[serde(rename = "audio_only")]
    AudioOnly,
}

impl Quality {
    /// Every preset, in dropdown order
    pub const ALL: [Quality; 6] = [
        Quality::Best,
        Quality::P1080,
        Quality::P720,
        Quality::P480,
        Quality::P360,
        Quality::AudioOnly,
    ];

    /// Name shown in the UI and stored in the settings file
    pub fn as_str(self) -> &'static str {
        match self {
            Quality::Best => "best",
            Quality::P1080 => "1080p",
            Quality::P720 => "720p",
            Quality::P480 => "480p",
            Quality::P360 => "360p",
            Quality::AudioOnly => "audio_only",
        }
    }

    /// Height ceiling in pixels for the fixed tiers
    pub fn max_height(self) -> Option<u32> {
        match self {
            Quality::P1080 => Some(1080),
            Quality::P720 => Some(720),
            Quality::P480 => Some(480),
            Quality::P360 => Some(360),
            Quality::Best | Quality::AudioOnly => None,
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One user-initiated download, built fresh from the form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    /// Video URL as typed (trimmed)
    pub url: String,
    /// Folder the file is written to; must already exist
    pub destination: PathBuf,
    /// Selected quality preset
    pub quality: Quality,
}

impl DownloadRequest {
    pub fn new(url: impl Into<String>, destination: impl Into<PathBuf>, quality: Quality) -> Self {
        Self {
            url: url.into().trim().to_owned(),
            destination: destination.into(),
            quality,
        }
    }
}

/// Audio conversion applied after the transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostProcessing {
    /// Target codec passed to the extractor (e.g. "mp3")
    pub codec: &'static str,
    /// Target bitrate in kbps
    pub bitrate_kbps: u32,
}

/// Stream selector plus optional post-processing for one quality preset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatSelection {
    pub format_expression: String,
    pub post_processing: Option<PostProcessing>,
}

/// What the progress bar and status line show
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressState {
    /// Fraction complete (0.0 to 1.0)
    pub fraction: f32,
    /// Short status text
    pub label: String,
}

impl ProgressState {
    pub const READY: &'static str = "Ready";

    pub fn ready() -> Self {
        Self {
            fraction: 0.0,
            label: Self::READY.to_owned(),
        }
    }
}

impl Default for ProgressState {
    fn default() -> Self {
        Self::ready()
    }
}

/// Lifecycle of a single request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadPhase {
    Idle,
    Validating,
    Fetching,
    /// Bytes are in, yt-dlp is merging or transcoding
    PostProcessing,
    Succeeded,
    Failed,
}

impl DownloadPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, DownloadPhase::Succeeded | DownloadPhase::Failed)
    }
}
