use std::sync::Arc;

use tokio::{
    runtime::Handle,
    sync::mpsc::{error::TryRecvError, unbounded_channel, UnboundedReceiver, UnboundedSender},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    downloader::{expected_output, DownloadJob, MediaFetchClient},
    error::{FetchError, WorkerLost},
    model::{DownloadOutcome, DownloadRequest, ProgressSample, VideoMetadata},
    quality::output_template,
};

/// What a worker reports, in emission order: one `Metadata` (unless the probe
/// fails), any number of `Progress`, then exactly one `Done`.
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadEvent {
    Metadata(VideoMetadata),
    Progress(ProgressSample),
    Done(DownloadOutcome),
}

/// Controller-side end of a running worker
pub struct WorkerHandle {
    cancel: CancellationToken,
    events: UnboundedReceiver<DownloadEvent>,
    request: DownloadRequest,
}

impl WorkerHandle {
    /// Requests cancellation; safe to call any number of times.
    ///
    /// The flag is only looked at when the next progress sample arrives, so a
    /// stalled network read keeps the worker alive until the library returns.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Next pending event without waiting; used from the UI loop.
    ///
    /// `Err` means the task is gone; if no `Done` was seen before that, it died
    /// without an outcome.
    pub fn try_next(&mut self) -> Result<Option<DownloadEvent>, WorkerLost> {
        match self.events.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(WorkerLost),
        }
    }

    #[cfg(test)]
    pub async fn next(&mut self) -> Option<DownloadEvent> {
        self.events.recv().await
    }

    pub fn request(&self) -> &DownloadRequest {
        &self.request
    }
}

/// Runs one [`DownloadRequest`] to a terminal [`DownloadOutcome`]; a new
/// request needs a new worker.
pub struct DownloadWorker {
    client: Arc<dyn MediaFetchClient>,
    request: DownloadRequest,
    cancel: CancellationToken,
    events: UnboundedSender<DownloadEvent>,
}

impl DownloadWorker {
    pub fn start(client: Arc<dyn MediaFetchClient>, request: DownloadRequest, runtime: &Handle) -> WorkerHandle {
        let (tx, rx) = unbounded_channel();
        let cancel = CancellationToken::new();

        let worker = DownloadWorker {
            client,
            request: request.clone(),
            cancel: cancel.clone(),
            events: tx,
        };
        runtime.spawn(worker.run());

        WorkerHandle { cancel, events: rx, request }
    }

    async fn run(self) {
        info!(url = %self.request.url, quality = %self.request.quality, "download started");
        let outcome = self.execute().await;
        match &outcome {
            DownloadOutcome::Success { output_path, .. } => info!(path = %output_path.display(), "download completed"),
            DownloadOutcome::Failure { message } => warn!(%message, "download failed"),
            DownloadOutcome::Cancelled => info!("download cancelled"),
        }
        // The receiver may already be gone if the controller was dropped.
        let _ = self.events.send(DownloadEvent::Done(outcome));
    }

    async fn execute(&self) -> DownloadOutcome {
        let metadata = match self.client.probe(&self.request.url).await {
            Ok(metadata) => metadata,
            Err(err) => {
                let reason = match err {
                    FetchError::Metadata { reason } => reason,
                    other => other.to_string(),
                };
                warn!(url = %self.request.url, %reason, "metadata probe failed");
                return failure(FetchError::Metadata { reason });
            }
        };
        let _ = self.events.send(DownloadEvent::Metadata(metadata.clone()));

        if self.cancel.is_cancelled() {
            return DownloadOutcome::Cancelled;
        }

        let selection = self.request.quality.selection(metadata.has_thumbnail());
        let job = DownloadJob {
            url: self.request.url.clone(),
            output_template: output_template(&self.request.output_directory),
            expected_output: expected_output(&self.request.output_directory, &metadata.title, selection.extension),
            selection,
        };

        let cancel = self.cancel.clone();
        let events = self.events.clone();
        let mut on_progress = move |sample: ProgressSample| {
            if cancel.is_cancelled() {
                return Err(FetchError::Cancelled);
            }
            debug!(downloaded = sample.downloaded_bytes, elapsed = sample.elapsed_seconds, "progress");
            let _ = events.send(DownloadEvent::Progress(sample));
            Ok(())
        };

        match self.client.download(&job, &mut on_progress).await {
            _ if self.cancel.is_cancelled() => DownloadOutcome::Cancelled,
            Ok(output_path) => DownloadOutcome::Success { metadata, output_path },
            Err(FetchError::Cancelled) => DownloadOutcome::Cancelled,
            Err(err) => failure(err),
        }
    }
}

fn failure(err: FetchError) -> DownloadOutcome {
    DownloadOutcome::Failure { message: err.to_string() }
}
