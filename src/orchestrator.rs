//! Runs one download request from validation to the terminal result.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::{
    format,
    model::{DownloadPhase, DownloadRequest, FormatSelection},
    progress::{ProgressEvent, ProgressSink, ProgressTranslator},
};

/// Output name pattern handed to the fetcher: remote title plus negotiated extension
pub const OUTPUT_TEMPLATE: &str = "%(title)s.%(ext)s";

/// Failures surfaced to the caller of [`Orchestrator::run`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DownloadError {
    #[error("Please enter a video URL")]
    EmptyUrl,
    #[error("Download path does not exist: {}", .0.display())]
    InvalidDestination(PathBuf),
    #[error("Download failed: {message}")]
    Download { message: String },
}

/// Everything the fetcher needs for a single call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchJob {
    pub url: String,
    /// Destination folder joined with [`OUTPUT_TEMPLATE`]
    pub output_template: PathBuf,
    pub selection: FormatSelection,
}

/// The external media library; called exactly once per request
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn fetch(
        &self,
        job: &FetchJob,
        on_event: &mut (dyn FnMut(ProgressEvent) + Send),
    ) -> Result<(), Self::Error>;
}

pub struct Orchestrator<F> {
    fetcher: F,
}

impl<F: MediaFetcher> Orchestrator<F> {
    pub fn new(fetcher: F) -> Self {
        Self { fetcher }
    }

    pub async fn run(
        &self,
        request: &DownloadRequest,
        sink: &mut dyn ProgressSink,
    ) -> Result<(), DownloadError> {
        sink.phase(DownloadPhase::Validating);
        validate(request)?;

        let selection = format::resolve(request.quality);
        let job = FetchJob {
            url: request.url.clone(),
            output_template: request.destination.join(OUTPUT_TEMPLATE),
            selection,
        };

        info!(url = %job.url, quality = %request.quality, "starting download");
        sink.phase(DownloadPhase::Fetching);

        let mut translator = ProgressTranslator::new();
        // merged formats finish one stream, then start the next
        let mut post_processing = false;
        let mut forward = |event: ProgressEvent| {
            match event {
                ProgressEvent::Finished if !post_processing => {
                    post_processing = true;
                    sink.phase(DownloadPhase::PostProcessing);
                }
                ProgressEvent::Downloading { .. } if post_processing => {
                    post_processing = false;
                    sink.phase(DownloadPhase::Fetching);
                }
                _ => {}
            }
            let state = translator.on_event(&event);
            sink.progress(state);
        };

        let outcome = self.fetcher.fetch(&job, &mut forward).await;
        debug!(state = ?translator.state(), "fetcher returned");

        match outcome {
            Ok(()) => {
                info!(url = %job.url, "download finished");
                Ok(())
            }
            Err(e) => {
                error!(url = %job.url, error = %e, "download failed");
                Err(DownloadError::Download {
                    message: e.to_string(),
                })
            }
        }
    }
}

fn validate(request: &DownloadRequest) -> Result<(), DownloadError> {
    if request.url.trim().is_empty() {
        return Err(DownloadError::EmptyUrl);
    }
    if !is_existing_dir(&request.destination) {
        return Err(DownloadError::InvalidDestination(request.destination.clone()));
    }
    Ok(())
}

fn is_existing_dir(path: &Path) -> bool {
    !path.as_os_str().is_empty() && path.is_dir()
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    use super::*;
    use crate::model::{ProgressState, Quality};

    #[derive(Debug, Error)]
    #[error("{0}")]
    pub struct FakeError(pub String);

    /// Replays scripted events, then returns the scripted outcome
    #[derive(Default)]
    pub struct ScriptedFetcher {
        pub events: Vec<ProgressEvent>,
        pub fail_with: Option<String>,
        pub calls: AtomicUsize,
        pub jobs: Mutex<Vec<FetchJob>>,
    }

    #[async_trait]
    impl MediaFetcher for ScriptedFetcher {
        type Error = FakeError;

        async fn fetch(
            &self,
            job: &FetchJob,
            on_event: &mut (dyn FnMut(ProgressEvent) + Send),
        ) -> Result<(), FakeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.jobs.lock().unwrap().push(job.clone());
            for e in &self.events {
                on_event(e.clone());
            }
            match &self.fail_with {
                Some(msg) => Err(FakeError(msg.clone())),
                None => Ok(()),
            }
        }
    }

    #[derive(Default)]
    pub struct RecordingSink {
        pub phases: Vec<DownloadPhase>,
        pub states: Vec<ProgressState>,
    }

    impl ProgressSink for RecordingSink {
        fn progress(&mut self, state: &ProgressState) {
            self.states.push(state.clone());
        }

        fn phase(&mut self, phase: DownloadPhase) {
            self.phases.push(phase);
        }
    }

    fn downloading(p: &str) -> ProgressEvent {
        ProgressEvent::Downloading {
            percent: Some(p.into()),
        }
    }

    #[tokio::test]
    async fn empty_url_fails_before_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let orch = Orchestrator::new(ScriptedFetcher::default());
        let mut sink = RecordingSink::default();
        let req = DownloadRequest::new("   ", dir.path(), Quality::Best);

        assert_eq!(orch.run(&req, &mut sink).await, Err(DownloadError::EmptyUrl));
        assert_eq!(orch.fetcher.calls.load(Ordering::SeqCst), 0);
        assert_eq!(sink.phases, vec![DownloadPhase::Validating]);
    }

    #[tokio::test]
    async fn missing_destination_fails_before_fetch() {
        let orch = Orchestrator::new(ScriptedFetcher::default());
        let mut sink = RecordingSink::default();
        let req = DownloadRequest::new("https://youtu.be/x", "/nonexistent/yvd", Quality::Best);

        assert_eq!(
            orch.run(&req, &mut sink).await,
            Err(DownloadError::InvalidDestination(PathBuf::from("/nonexistent/yvd")))
        );
        assert_eq!(orch.fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn file_as_destination_is_rejected() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let orch = Orchestrator::new(ScriptedFetcher::default());
        let req = DownloadRequest::new("https://youtu.be/x", file.path(), Quality::Best);
        let res = orch.run(&req, &mut RecordingSink::default()).await;
        assert!(matches!(res, Err(DownloadError::InvalidDestination(_))));
    }

    #[tokio::test]
    async fn success_fetches_once_with_resolved_job() {
        let dir = tempfile::tempdir().unwrap();
        let orch = Orchestrator::new(ScriptedFetcher {
            events: vec![downloading("50%"), ProgressEvent::Finished],
            ..Default::default()
        });
        let mut sink = RecordingSink::default();
        let req = DownloadRequest::new("https://youtu.be/x", dir.path(), Quality::AudioOnly);

        assert_eq!(orch.run(&req, &mut sink).await, Ok(()));
        assert_eq!(orch.fetcher.calls.load(Ordering::SeqCst), 1);

        let jobs = orch.fetcher.jobs.lock().unwrap();
        assert_eq!(jobs[0].url, "https://youtu.be/x");
        assert_eq!(jobs[0].output_template, dir.path().join("%(title)s.%(ext)s"));
        assert_eq!(jobs[0].selection, format::resolve(Quality::AudioOnly));

        assert_eq!(
            sink.phases,
            vec![
                DownloadPhase::Validating,
                DownloadPhase::Fetching,
                DownloadPhase::PostProcessing
            ]
        );
        assert_eq!(sink.states.len(), 2);
        assert_eq!(sink.states[1].fraction, 1.0);
    }

    #[tokio::test]
    async fn progress_is_forwarded_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let orch = Orchestrator::new(ScriptedFetcher {
            events: vec![
                downloading("10%"),
                ProgressEvent::Downloading { percent: None },
                downloading("bogus"),
                downloading("60%"),
            ],
            ..Default::default()
        });
        let mut sink = RecordingSink::default();
        let req = DownloadRequest::new("https://youtu.be/x", dir.path(), Quality::P720);
        orch.run(&req, &mut sink).await.unwrap();

        let labels: Vec<_> = sink.states.iter().map(|s| s.label.as_str()).collect();
        assert_eq!(
            labels,
            [
                "Downloading: 10%",
                "Downloading: 10%",
                "Downloading: 10%",
                "Downloading: 60%"
            ]
        );
    }

    #[tokio::test]
    async fn second_stream_returns_to_fetching() {
        let dir = tempfile::tempdir().unwrap();
        let orch = Orchestrator::new(ScriptedFetcher {
            events: vec![
                downloading("100%"),
                ProgressEvent::Finished,
                downloading("3%"),
                downloading("100%"),
                ProgressEvent::Finished,
            ],
            ..Default::default()
        });
        let mut sink = RecordingSink::default();
        let req = DownloadRequest::new("https://youtu.be/x", dir.path(), Quality::Best);
        orch.run(&req, &mut sink).await.unwrap();

        assert_eq!(
            sink.phases,
            vec![
                DownloadPhase::Validating,
                DownloadPhase::Fetching,
                DownloadPhase::PostProcessing,
                DownloadPhase::Fetching,
                DownloadPhase::PostProcessing,
            ]
        );
        assert_eq!(sink.states[2].label, "Downloading: 3%");
    }

    #[tokio::test]
    async fn fetch_failure_is_wrapped() {
        let dir = tempfile::tempdir().unwrap();
        let orch = Orchestrator::new(ScriptedFetcher {
            events: vec![downloading("5%")],
            fail_with: Some("HTTP Error 403: Forbidden".into()),
            ..Default::default()
        });
        let req = DownloadRequest::new("https://youtu.be/x", dir.path(), Quality::Best);
        let err = orch
            .run(&req, &mut RecordingSink::default())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            DownloadError::Download {
                message: "HTTP Error 403: Forbidden".into()
            }
        );
        assert_eq!(err.to_string(), "Download failed: HTTP Error 403: Forbidden");
    }
}
