use std::{path::PathBuf, sync::Arc};

use tokio::{
    runtime::Handle,
    sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
};
use tracing::{error, info};

use crate::{
    config::AppConfig,
    downloader::MediaFetchClient,
    error::{IntentError, StorageError},
    history::HistoryStore,
    model::{
        DisplayProgress, DownloadOutcome, DownloadRequest, HistoryRecord, HistoryStatus, NewHistoryRecord,
        VideoMetadata,
    },
    progress::ProgressReducer,
    quality::Quality,
    worker::{DownloadEvent, DownloadWorker, WorkerHandle},
};

/// Form fields the user edits before pressing Download
#[derive(Debug, Clone, PartialEq)]
pub struct Draft {
    pub url: String,
    pub output_directory: String,
    pub quality: Quality,
}

/// Things the view should react to once, returned from [`Controller::poll`]
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    /// Metadata arrived with a thumbnail worth fetching
    ThumbnailAvailable(String),
    Finished(DownloadOutcome),
}

/// Listing produced by one background history job
struct HistoryReply {
    seq: u64,
    result: Result<Vec<HistoryRecord>, StorageError>,
}

/// Owns the single active download and the history log on behalf of the view.
///
/// History reads and writes never run on the caller's thread: each one is sent
/// to the runtime's blocking pool and its refreshed listing comes back through
/// [`Controller::poll`].
pub struct Controller {
    client: Arc<dyn MediaFetchClient>,
    store: HistoryStore,
    runtime: Handle,
    history_limit: usize,

    /// Set on start, cleared when the worker's `Done` event is handled
    active: Option<WorkerHandle>,
    progress: ProgressReducer,
    metadata: Option<VideoMetadata>,
    history: Vec<HistoryRecord>,
    status: String,

    history_tx: UnboundedSender<HistoryReply>,
    history_rx: UnboundedReceiver<HistoryReply>,
    /// Sequence number of the last history job sent out
    history_seq: u64,
    /// Sequence number of the listing currently shown
    history_shown: u64,
    history_pending: usize,

    pub draft: Draft,
}

impl Controller {
    pub fn new(client: Arc<dyn MediaFetchClient>, store: HistoryStore, runtime: Handle, config: &AppConfig) -> Self {
        let (history_tx, history_rx) = unbounded_channel();
        let mut controller = Self {
            client,
            store,
            runtime,
            history_limit: config.history_limit,
            active: None,
            progress: ProgressReducer::default(),
            metadata: None,
            history: Vec::new(),
            status: "Ready".to_owned(),
            history_tx,
            history_rx,
            history_seq: 0,
            history_shown: 0,
            history_pending: 0,
            draft: Draft {
                url: String::new(),
                output_directory: config.download_dir.display().to_string(),
                quality: config.quality(),
            },
        };
        controller.refresh_history();
        controller
    }

    pub fn is_busy(&self) -> bool {
        self.active.is_some()
    }

    /// A history job has been sent out and its listing has not arrived yet
    pub fn history_pending(&self) -> bool {
        self.history_pending > 0
    }

    /// Starts a download from the current form values
    pub fn start(&mut self) -> Result<(), IntentError> {
        let request = DownloadRequest {
            url: self.draft.url.trim().to_owned(),
            output_directory: PathBuf::from(self.draft.output_directory.trim()),
            quality: self.draft.quality,
        };
        self.start_request(request)
    }

    /// Rejects the request while another download is active
    pub fn start_request(&mut self, request: DownloadRequest) -> Result<(), IntentError> {
        if self.is_busy() {
            return Err(IntentError::Busy);
        }
        if request.url.is_empty() {
            return Err(IntentError::EmptyUrl);
        }
        if !request.output_directory.is_dir() {
            return Err(IntentError::InvalidDirectory(request.output_directory));
        }

        self.progress = ProgressReducer::default();
        self.metadata = None;
        self.status = "Starting download...".to_owned();
        self.active = Some(DownloadWorker::start(Arc::clone(&self.client), request, &self.runtime));
        Ok(())
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.active.as_ref().filter(|h| !h.is_cancelled()) {
            handle.cancel();
            info!(url = %handle.request().url, "cancellation requested");
            self.status = "Canceling download...".to_owned();
        }
    }

    /// Applies every worker event and history listing that arrived since the last call
    pub fn poll(&mut self) -> Vec<Notice> {
        let mut notices = Vec::new();
        while let Some(handle) = self.active.as_mut() {
            let event = match handle.try_next() {
                Ok(Some(event)) => event,
                Ok(None) => break,
                Err(lost) => {
                    error!("download worker ended without an outcome");
                    DownloadEvent::Done(DownloadOutcome::Failure { message: lost.to_string() })
                }
            };
            self.apply(event, &mut notices);
        }

        while let Ok(reply) = self.history_rx.try_recv() {
            self.history_pending = self.history_pending.saturating_sub(1);
            match reply.result {
                Ok(records) if reply.seq > self.history_shown => {
                    self.history_shown = reply.seq;
                    self.history = records;
                }
                Ok(_) => {}
                Err(err) => {
                    error!(%err, "history update failed");
                    self.status = format!("History error: {err}");
                }
            }
        }
        notices
    }

    fn apply(&mut self, event: DownloadEvent, notices: &mut Vec<Notice>) {
        match event {
            DownloadEvent::Metadata(metadata) => {
                if metadata.has_thumbnail() {
                    notices.push(Notice::ThumbnailAvailable(metadata.thumbnail_url.clone()));
                }
                self.status = format!("Downloading: {}", metadata.title);
                self.metadata = Some(metadata);
            }
            DownloadEvent::Progress(sample) => {
                self.progress = self.progress.reduce(&sample);
            }
            DownloadEvent::Done(outcome) => {
                if let Some(handle) = self.active.take() {
                    self.finish(handle.request(), &outcome);
                }
                notices.push(Notice::Finished(outcome));
            }
        }
    }

    /// Called once per second of wall time; counts the ETA down between samples
    pub fn tick(&mut self) {
        if self.is_busy() {
            self.progress = self.progress.tick();
        }
    }

    fn finish(&mut self, request: &DownloadRequest, outcome: &DownloadOutcome) {
        let record = match outcome {
            DownloadOutcome::Success { metadata, output_path } => {
                self.progress = self.progress.finish(true);
                self.status = format!("Download completed: {}", metadata.title);
                Some(history_record(request, metadata, output_path.display().to_string(), HistoryStatus::Completed))
            }
            DownloadOutcome::Failure { message } => {
                self.progress = self.progress.finish(false);
                self.status = format!("Download failed: {message}");
                let metadata = self.metadata.clone().unwrap_or_else(unknown_metadata);
                let directory = request.output_directory.display().to_string();
                Some(history_record(request, &metadata, directory, HistoryStatus::Failed))
            }
            // Cancellation is a normal user action and is not logged
            DownloadOutcome::Cancelled => {
                self.progress = self.progress.finish(false);
                self.status = "Download cancelled".to_owned();
                None
            }
        };

        if let Some(record) = record {
            self.run_history(move |store| {
                let id = store.append(&record)?;
                info!(id, status = record.status.as_str(), "history entry saved");
                Ok(())
            });
        }
    }

    /// Runs `job` on the blocking pool, then reloads the listing
    fn run_history<F>(&mut self, job: F)
    where
        F: FnOnce(&HistoryStore) -> Result<(), StorageError> + Send + 'static,
    {
        self.history_seq += 1;
        self.history_pending += 1;

        let seq = self.history_seq;
        let store = self.store.clone();
        let limit = self.history_limit;
        let tx = self.history_tx.clone();
        self.runtime.spawn_blocking(move || {
            let result = job(&store).and_then(|()| store.list(limit));
            let _ = tx.send(HistoryReply { seq, result });
        });
    }

    /// Pre-fills the URL field with a past download's URL
    pub fn reuse(&mut self, url: &str) {
        self.draft.url = url.to_owned();
    }

    pub fn delete_history_item(&mut self, id: i64) {
        self.run_history(move |store| store.delete_one(id));
    }

    pub fn clear_history(&mut self) {
        self.run_history(|store| {
            let removed = store.clear_all()?;
            info!(removed, "history cleared");
            Ok(())
        });
    }

    pub fn refresh_history(&mut self) {
        self.run_history(|_| Ok(()));
    }

    pub fn display(&self) -> DisplayProgress {
        self.progress.display()
    }

    pub fn metadata(&self) -> Option<&VideoMetadata> {
        self.metadata.as_ref()
    }

    pub fn history(&self) -> &[HistoryRecord] {
        &self.history
    }

    pub fn status(&self) -> &str {
        &self.status
    }
}

fn unknown_metadata() -> VideoMetadata {
    VideoMetadata {
        title: "Unknown Video".to_owned(),
        uploader: "Unknown Uploader".to_owned(),
        ..VideoMetadata::default()
    }
}

fn history_record(
    request: &DownloadRequest,
    metadata: &VideoMetadata,
    output_path: String,
    status: HistoryStatus,
) -> NewHistoryRecord {
    NewHistoryRecord {
        title: metadata.title.clone(),
        url: request.url.clone(),
        uploader: metadata.uploader.clone(),
        duration: metadata.duration.clone(),
        view_count: metadata.view_count.clone(),
        quality: request.quality.label().to_owned(),
        output_path,
        status,
    }
}
