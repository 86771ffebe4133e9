//! Scripted media-fetch client and fixtures shared by worker and controller tests.

use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::{
    downloader::{DownloadJob, MediaFetchClient},
    error::FetchError,
    model::{DownloadRequest, ProgressSample, RawVideoInfo, SampleStatus, TotalBytes, VideoMetadata},
    quality::Quality,
    worker::{DownloadEvent, WorkerHandle},
};

pub struct ScriptedClient {
    metadata: Option<VideoMetadata>,
    samples: Vec<ProgressSample>,
    result: Result<PathBuf, FetchError>,
    gate: Option<Arc<Notify>>,
    hold: Option<Arc<Notify>>,
    jobs: Mutex<Vec<DownloadJob>>,
    delivered: AtomicUsize,
}

impl ScriptedClient {
    pub fn new(metadata: VideoMetadata) -> Self {
        Self {
            metadata: Some(metadata),
            samples: Vec::new(),
            result: Ok(PathBuf::from("/tmp/out/Example.mp4")),
            gate: None,
            hold: None,
            jobs: Mutex::new(Vec::new()),
            delivered: AtomicUsize::new(0),
        }
    }

    pub fn failing_probe() -> Self {
        Self { metadata: None, ..Self::new(VideoMetadata::default()) }
    }

    pub fn with_samples(mut self, samples: Vec<ProgressSample>) -> Self {
        self.samples = samples;
        self
    }

    pub fn with_result(mut self, result: Result<PathBuf, FetchError>) -> Self {
        self.result = result;
        self
    }

    /// Holds `download` until [`ScriptedClient::release`] is called
    pub fn gated(mut self) -> Self {
        self.gate = Some(Arc::new(Notify::new()));
        self
    }

    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.notify_one();
        }
    }

    /// Keeps `download` from returning after its samples until
    /// [`ScriptedClient::finish`] is called
    pub fn held(mut self) -> Self {
        self.hold = Some(Arc::new(Notify::new()));
        self
    }

    pub fn finish(&self) {
        if let Some(hold) = &self.hold {
            hold.notify_one();
        }
    }

    pub fn jobs(&self) -> Vec<DownloadJob> {
        self.jobs.lock().unwrap().clone()
    }

    /// Samples the progress callback accepted
    pub fn delivered(&self) -> usize {
        self.delivered.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaFetchClient for ScriptedClient {
    async fn probe(&self, url: &str) -> Result<VideoMetadata, FetchError> {
        self.metadata.clone().ok_or_else(|| FetchError::Metadata { reason: format!("unsupported URL: {url}") })
    }

    async fn download(
        &self,
        job: &DownloadJob,
        on_progress: &mut (dyn FnMut(ProgressSample) -> Result<(), FetchError> + Send),
    ) -> Result<PathBuf, FetchError> {
        self.jobs.lock().unwrap().push(job.clone());
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        for sample in &self.samples {
            on_progress(sample.clone())?;
            self.delivered.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
        }
        if let Some(hold) = &self.hold {
            hold.notified().await;
        }
        self.result.clone()
    }
}

/// Client whose probe panics, killing the worker task before it reports
pub struct PanickingClient;

#[async_trait]
impl MediaFetchClient for PanickingClient {
    async fn probe(&self, _url: &str) -> Result<VideoMetadata, FetchError> {
        panic!("extractor crashed");
    }

    async fn download(
        &self,
        _job: &DownloadJob,
        _on_progress: &mut (dyn FnMut(ProgressSample) -> Result<(), FetchError> + Send),
    ) -> Result<PathBuf, FetchError> {
        unreachable!("probe always panics")
    }
}

/// Metadata built from raw values: 3665 seconds and 1,234,567 views
pub fn example_metadata() -> VideoMetadata {
    VideoMetadata::from(RawVideoInfo {
        title: Some("Example".to_owned()),
        description: Some("An example video".to_owned()),
        thumbnail: Some("https://i.example.com/thumb.jpg".to_owned()),
        duration: Some(3665.0),
        uploader: Some("Chan".to_owned()),
        view_count: Some(1_234_567),
    })
}

pub fn request(quality: Quality) -> DownloadRequest {
    DownloadRequest {
        url: "https://www.youtube.com/watch?v=abc123".to_owned(),
        output_directory: std::env::temp_dir(),
        quality,
    }
}

pub fn sample(downloaded: u64, total: u64, elapsed: f64) -> ProgressSample {
    ProgressSample {
        status: SampleStatus::Downloading,
        downloaded_bytes: downloaded,
        total_bytes: Some(TotalBytes::Exact(total)),
        elapsed_seconds: elapsed,
        speed_bytes_per_sec: Some(1024.0),
    }
}

/// Drains a handle until its terminal event
pub async fn collect_events(mut handle: WorkerHandle) -> Vec<DownloadEvent> {
    let mut events = Vec::new();
    while let Some(event) = handle.next().await {
        let done = matches!(event, DownloadEvent::Done(_));
        events.push(event);
        if done {
            break;
        }
    }
    events
}
