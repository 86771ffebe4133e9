use std::{path::PathBuf, str::FromStr};

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::{error::UnknownStatus, quality::Quality};

/// Everything the worker needs to run one download; fixed once the worker starts
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadRequest {
    /// Video page URL pasted by the user
    pub url: String,
    /// Folder the media file is written into
    pub output_directory: PathBuf,
    /// Selected quality preset
    pub quality: Quality,
}

/// Display-ready video information, fetched once before the download starts
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VideoMetadata {
    pub title: String,
    pub description: String,
    /// Empty when the site exposes no thumbnail
    pub thumbnail_url: String,
    /// `H:MM:SS` or `M:SS`
    pub duration: String,
    pub uploader: String,
    /// Abbreviated with a K/M/B suffix
    pub view_count: String,
}

impl VideoMetadata {
    pub fn has_thumbnail(&self) -> bool {
        !self.thumbnail_url.trim().is_empty()
    }
}

/// Raw probe payload as printed by `yt-dlp --dump-json`
#[derive(Debug, Default, Deserialize)]
pub struct RawVideoInfo {
    pub title: Option<String>,
    pub description: Option<String>,
    pub thumbnail: Option<String>,
    pub duration: Option<f64>,
    pub uploader: Option<String>,
    pub view_count: Option<u64>,
}

impl From<RawVideoInfo> for VideoMetadata {
    fn from(raw: RawVideoInfo) -> Self {
        Self {
            title: raw.title.unwrap_or_else(|| "Unknown Video".to_owned()),
            description: raw.description.unwrap_or_default(),
            thumbnail_url: raw.thumbnail.unwrap_or_default(),
            duration: format_duration(raw.duration.unwrap_or(0.0).max(0.0) as u64),
            uploader: raw.uploader.unwrap_or_else(|| "Unknown Uploader".to_owned()),
            view_count: format_count(raw.view_count.unwrap_or(0)),
        }
    }
}

/// Phase reported by the media-fetch library alongside each sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleStatus {
    Downloading,
    Other,
}

/// Size of the payload, when the library knows it
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TotalBytes {
    Exact(u64),
    Estimated(u64),
}

impl TotalBytes {
    pub fn bytes(self) -> u64 {
        match self {
            TotalBytes::Exact(n) | TotalBytes::Estimated(n) => n,
        }
    }
}

/// One raw progress report from an in-flight download
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSample {
    pub status: SampleStatus,
    pub downloaded_bytes: u64,
    pub total_bytes: Option<TotalBytes>,
    pub elapsed_seconds: f64,
    /// `None` when the library could not measure the speed yet
    pub speed_bytes_per_sec: Option<f64>,
}

/// Values shown in the progress area
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayProgress {
    /// Whole percent in `0..=100`
    pub percent: u8,
    pub speed_label: String,
    /// `None` renders as unknown
    pub eta_seconds: Option<u64>,
    /// The run reached its outcome; the ETA label is blank from then on
    pub finished: bool,
}

impl DisplayProgress {
    pub fn percent_label(&self) -> String {
        format!("{}%", self.percent)
    }

    pub fn eta_label(&self) -> String {
        match self.eta_seconds {
            _ if self.finished => String::new(),
            Some(secs) => format!("ETA: {:02}:{:02}", secs / 60, secs % 60),
            None => "ETA: --:--".to_owned(),
        }
    }
}

/// Terminal result of one worker run, emitted exactly once
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadOutcome {
    Success {
        metadata: VideoMetadata,
        output_path: PathBuf,
    },
    Failure {
        message: String,
    },
    Cancelled,
}

/// Persisted status of a history row; cancellations are never stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HistoryStatus {
    #[default]
    Completed,
    Failed,
}

impl HistoryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryStatus::Completed => "completed",
            HistoryStatus::Failed => "failed",
        }
    }
}

impl FromStr for HistoryStatus {
    type Err = UnknownStatus;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "completed" => Ok(HistoryStatus::Completed),
            "failed" => Ok(HistoryStatus::Failed),
            other => Err(UnknownStatus(other.to_owned())),
        }
    }
}

/// Fields supplied by the caller when appending to the history log
#[derive(Debug, Clone, PartialEq)]
pub struct NewHistoryRecord {
    pub title: String,
    pub url: String,
    pub uploader: String,
    pub duration: String,
    pub view_count: String,
    pub quality: String,
    pub output_path: String,
    pub status: HistoryStatus,
}

/// A stored history row
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRecord {
    pub id: i64,
    pub title: String,
    pub url: String,
    pub uploader: String,
    pub duration: String,
    pub view_count: String,
    pub quality: String,
    pub output_path: String,
    pub created_at: DateTime<Utc>,
    pub status: HistoryStatus,
}

/// Formats a duration in seconds as `H:MM:SS`, or `M:SS` under an hour
pub fn format_duration(total_seconds: u64) -> String {
    let (minutes, seconds) = (total_seconds / 60, total_seconds % 60);
    let (hours, minutes) = (minutes / 60, minutes % 60);
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

/// Abbreviates a view count: `1.2M`, `3.4K`, `999`
pub fn format_count(count: u64) -> String {
    const BILLION: u64 = 1_000_000_000;
    const MILLION: u64 = 1_000_000;
    const THOUSAND: u64 = 1_000;

    if count >= BILLION {
        format!("{:.1}B", count as f64 / BILLION as f64)
    } else if count >= MILLION {
        format!("{:.1}M", count as f64 / MILLION as f64)
    } else if count >= THOUSAND {
        format!("{:.1}K", count as f64 / THOUSAND as f64)
    } else {
        count.to_string()
    }
}
