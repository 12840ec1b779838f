use tracing::warn;

use crate::model::{DownloadPhase, ProgressState};

/// Marker prepended to every progress line we ask yt-dlp to print
pub const PROGRESS_MARKER: &str = "[yvd] ";

/// Value for `--progress-template`, decoded by [`parse_progress_line`]
pub const PROGRESS_TEMPLATE: &str =
    "download:[yvd] %(progress.status)s|%(progress._percent_str)s";

pub const FINISHED_LABEL: &str = "Processing... Almost done!";

/// Status event reported by the fetcher while a transfer runs
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// Bytes are moving; percent string as reported, e.g. " 45.5%"
    Downloading { percent: Option<String> },
    /// Transfer complete, post-processing may follow
    Finished,
    /// Any other status (e.g. "error"); ignored
    Other(String),
}

/// Receives translated progress and phase changes from the orchestrator
pub trait ProgressSink: Send {
    fn progress(&mut self, state: &ProgressState);

    fn phase(&mut self, _phase: DownloadPhase) {}
}

/// Turns fetcher events into the state shown by the progress bar
#[derive(Debug, Default)]
pub struct ProgressTranslator {
    state: ProgressState,
}

impl ProgressTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &ProgressState {
        &self.state
    }

    /// Applies one event and returns the current state.
    ///
    /// Missing or malformed percentages leave the state untouched.
    pub fn on_event(&mut self, event: &ProgressEvent) -> &ProgressState {
        match event {
            ProgressEvent::Downloading { percent: Some(raw) } => match parse_percent(raw) {
                Some((value, text)) => {
                    self.state.fraction = (value / 100.0).clamp(0.0, 1.0);
                    self.state.label = format!("Downloading: {text}%");
                }
                None => warn!(percent = %raw, "ignoring unparseable progress percentage"),
            },
            ProgressEvent::Downloading { percent: None } => {}
            ProgressEvent::Finished => {
                self.state.fraction = 1.0;
                self.state.label = FINISHED_LABEL.to_owned();
            }
            ProgressEvent::Other(_) => {}
        }
        &self.state
    }
}

/// Returns the numeric value and its trimmed text, e.g. `" 45.5%"` -> `(45.5, "45.5")`
fn parse_percent(raw: &str) -> Option<(f32, &str)> {
    let text = raw.trim().trim_end_matches('%').trim();
    let value = text.parse::<f32>().ok().filter(|v| v.is_finite())?;
    Some((value, text))
}

/// Decodes a stdout line printed through [`PROGRESS_TEMPLATE`]
pub fn parse_progress_line(line: &str) -> Option<ProgressEvent> {
    let rest = line.trim_start().strip_prefix(PROGRESS_MARKER)?;
    let (status, percent) = match rest.split_once('|') {
        Some((status, percent)) => (status.trim(), Some(percent)),
        None => (rest.trim(), None),
    };
    let event = match status {
        "downloading" => ProgressEvent::Downloading {
            percent: percent
                .map(str::trim)
                .filter(|p| !p.is_empty() && *p != "NA")
                .map(str::to_owned),
        },
        "finished" => ProgressEvent::Finished,
        other => ProgressEvent::Other(other.to_owned()),
    };
    Some(event)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn downloading(p: &str) -> ProgressEvent {
        ProgressEvent::Downloading {
            percent: Some(p.to_owned()),
        }
    }

    #[test]
    fn percent_sets_fraction_and_label() {
        let mut t = ProgressTranslator::new();
        let s = t.on_event(&downloading("45.5%"));
        assert!((s.fraction - 0.455).abs() < 1e-6);
        assert_eq!(s.label, "Downloading: 45.5%");
    }

    #[test]
    fn padded_percent_is_trimmed() {
        let mut t = ProgressTranslator::new();
        assert_eq!(t.on_event(&downloading("  7.0%")).label, "Downloading: 7.0%");
    }

    #[test]
    fn missing_percent_keeps_previous_state() {
        let mut t = ProgressTranslator::new();
        t.on_event(&downloading("20%"));
        let s = t.on_event(&ProgressEvent::Downloading { percent: None }).clone();
        assert!((s.fraction - 0.2).abs() < 1e-6);
        assert_eq!(s.label, "Downloading: 20%");
    }

    #[test]
    fn garbage_percent_keeps_previous_state() {
        let mut t = ProgressTranslator::new();
        t.on_event(&downloading("30%"));
        for junk in ["Unknown%", "N/A", "", "nan%", "inf%"] {
            let s = t.on_event(&downloading(junk));
            assert!((s.fraction - 0.3).abs() < 1e-6, "{junk}");
        }
    }

    #[test]
    fn finished_means_post_processing() {
        let mut t = ProgressTranslator::new();
        t.on_event(&downloading("99.9%"));
        let s = t.on_event(&ProgressEvent::Finished);
        assert_eq!(s.fraction, 1.0);
        assert_eq!(s.label, "Processing... Almost done!");
    }

    #[test]
    fn other_statuses_are_ignored() {
        let mut t = ProgressTranslator::new();
        let before = t.state().clone();
        assert_eq!(t.on_event(&ProgressEvent::Other("error".into())), &before);
    }

    #[test]
    fn fraction_is_clamped() {
        let mut t = ProgressTranslator::new();
        assert_eq!(t.on_event(&downloading("100.4%")).fraction, 1.0);
    }

    #[test]
    fn parses_marked_lines() {
        assert_eq!(
            parse_progress_line("[yvd] downloading|  12.3%"),
            Some(downloading("12.3%"))
        );
        assert_eq!(
            parse_progress_line("[yvd] finished|100.0%"),
            Some(ProgressEvent::Finished)
        );
        assert_eq!(
            parse_progress_line("[yvd] downloading|NA"),
            Some(ProgressEvent::Downloading { percent: None })
        );
        assert_eq!(
            parse_progress_line("[yvd] error|"),
            Some(ProgressEvent::Other("error".into()))
        );
    }

    #[test]
    fn ignores_unmarked_lines() {
        assert_eq!(parse_progress_line("[download] Destination: a.mp4"), None);
        assert_eq!(parse_progress_line("[Merger] Merging formats"), None);
    }
}
