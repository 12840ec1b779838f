//! Background dispatch of a single download onto the tokio runtime.

use std::sync::Arc;

use tokio::{
    runtime::Handle,
    sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel},
};
use tracing::debug;

use crate::{
    model::{DownloadPhase, DownloadRequest, ProgressState},
    orchestrator::{DownloadError, MediaFetcher, Orchestrator},
    progress::ProgressSink,
};

/// Messages from the worker to the UI, in emission order
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    Phase(DownloadPhase),
    Progress(ProgressState),
    Finished(Result<(), DownloadError>),
}

/// Forwards sink calls over the channel
struct ChannelSink {
    tx: UnboundedSender<WorkerEvent>,
}

impl ProgressSink for ChannelSink {
    fn progress(&mut self, state: &ProgressState) {
        // receiver gone means the UI closed; keep downloading regardless
        let _ = self.tx.send(WorkerEvent::Progress(state.clone()));
    }

    fn phase(&mut self, phase: DownloadPhase) {
        let _ = self.tx.send(WorkerEvent::Phase(phase));
    }
}

/// Runs `request` on `handle` and returns the event stream for it
pub fn spawn_download<F>(
    handle: &Handle,
    orchestrator: Arc<Orchestrator<F>>,
    request: DownloadRequest,
) -> UnboundedReceiver<WorkerEvent>
where
    F: MediaFetcher + 'static,
{
    let (tx, rx) = unbounded_channel();
    handle.spawn(async move {
        let mut sink = ChannelSink { tx: tx.clone() };
        let result = orchestrator.run(&request, &mut sink).await;
        debug!(ok = result.is_ok(), "worker finished");
        let _ = tx.send(WorkerEvent::Finished(result));
    });
    rx
}
