//! Maps quality presets onto yt-dlp format selectors.

use crate::model::{FormatSelection, PostProcessing, Quality};

const AUDIO_CODEC: &str = "mp3";
const AUDIO_BITRATE_KBPS: u32 = 192;

/// Resolves a preset into a format expression and optional audio conversion
pub fn resolve(quality: Quality) -> FormatSelection {
    match quality {
        Quality::Best => FormatSelection {
            format_expression: "bestvideo+bestaudio/best".to_owned(),
            post_processing: None,
        },
        Quality::AudioOnly => FormatSelection {
            format_expression: "bestaudio/best".to_owned(),
            post_processing: Some(PostProcessing {
                codec: AUDIO_CODEC,
                bitrate_kbps: AUDIO_BITRATE_KBPS,
            }),
        },
        tier => {
            // every remaining preset is a height tier
            let h = tier.max_height().unwrap_or(u32::MAX);
            FormatSelection {
                format_expression: format!("bestvideo[height<={h}]+bestaudio/best[height<={h}]"),
                post_processing: None,
            }
        }
    }
}
