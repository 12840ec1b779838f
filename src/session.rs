use thiserror::Error;
use tokio::sync::mpsc::{UnboundedReceiver, error::TryRecvError};
use tracing::{error, info};

use crate::{
    model::{DownloadPhase, ProgressState},
    orchestrator::DownloadError,
    worker::WorkerEvent,
};

pub const STARTING_LABEL: &str = "Starting download...";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("a download is already running")]
    Busy,
}

/// Modal message shown once a request ends
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub title: &'static str,
    pub message: String,
    pub is_error: bool,
}

impl Notice {
    fn from_result(result: &Result<(), DownloadError>) -> Self {
        match result {
            Ok(()) => Notice {
                title: "Success",
                message: "Video downloaded successfully!".to_owned(),
                is_error: false,
            },
            Err(e) => Notice {
                title: "Error",
                message: e.to_string(),
                is_error: true,
            },
        }
    }
}

/// UI-side view of the current download; lives on the event loop thread
#[derive(Debug)]
pub struct DownloadSession {
    phase: DownloadPhase,
    progress: ProgressState,
    in_flight: Option<UnboundedReceiver<WorkerEvent>>,
    notice: Option<Notice>,
    /// Phase the last request ended in, kept for the status line
    last_outcome: Option<DownloadPhase>,
}

impl Default for DownloadSession {
    fn default() -> Self {
        Self {
            phase: DownloadPhase::Idle,
            progress: ProgressState::ready(),
            in_flight: None,
            notice: None,
            last_outcome: None,
        }
    }
}

impl DownloadSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> DownloadPhase {
        self.phase
    }

    pub fn progress(&self) -> &ProgressState {
        &self.progress
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    pub fn last_outcome(&self) -> Option<DownloadPhase> {
        self.last_outcome
    }

    pub fn dismiss_notice(&mut self) {
        self.notice = None;
    }

    /// Whether the Download button may be pressed
    pub fn trigger_enabled(&self) -> bool {
        self.in_flight.is_none()
    }

    /// Takes ownership of a freshly dispatched request.
    ///
    /// `dispatch` is only called when no request is in flight.
    pub fn start<D>(&mut self, dispatch: D) -> Result<(), SessionError>
    where
        D: FnOnce() -> UnboundedReceiver<WorkerEvent>,
    {
        if !self.trigger_enabled() {
            return Err(SessionError::Busy);
        }
        self.notice = None;
        self.progress = ProgressState {
            fraction: 0.0,
            label: STARTING_LABEL.to_owned(),
        };
        self.phase = DownloadPhase::Validating;
        self.in_flight = Some(dispatch());
        Ok(())
    }

    /// Drains pending worker events; call once per frame.
    ///
    /// Returns the terminal phase when the request ended during this call.
    pub fn poll(&mut self) -> Option<DownloadPhase> {
        loop {
            let rx = self.in_flight.as_mut()?;
            let event = match rx.try_recv() {
                Ok(event) => event,
                Err(TryRecvError::Empty) => return None,
                Err(TryRecvError::Disconnected) => {
                    WorkerEvent::Finished(Err(DownloadError::Download {
                        message: "download worker stopped unexpectedly".to_owned(),
                    }))
                }
            };
            if let Some(outcome) = self.apply(event) {
                return Some(outcome);
            }
        }
    }

    fn apply(&mut self, event: WorkerEvent) -> Option<DownloadPhase> {
        match event {
            WorkerEvent::Phase(phase) => self.phase = phase,
            // last write wins
            WorkerEvent::Progress(state) => self.progress = state,
            WorkerEvent::Finished(result) => return Some(self.finish(result)),
        }
        None
    }

    fn finish(&mut self, result: Result<(), DownloadError>) -> DownloadPhase {
        self.phase = match &result {
            Ok(()) => {
                info!("download completed");
                DownloadPhase::Succeeded
            }
            Err(e) => {
                error!(error = %e, "download failed");
                DownloadPhase::Failed
            }
        };
        debug_assert!(self.phase.is_terminal());
        self.last_outcome = Some(self.phase);
        self.notice = Some(Notice::from_result(&result));
        let outcome = self.phase;
        self.reset();
        outcome
    }

    /// Back to idle: empty bar, "Ready", trigger enabled
    fn reset(&mut self) {
        self.in_flight = None;
        self.progress = ProgressState::ready();
        self.phase = DownloadPhase::Idle;
    }
}
