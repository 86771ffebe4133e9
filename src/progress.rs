use crate::model::{DisplayProgress, ProgressSample, SampleStatus, TotalBytes};

/// Prefix of the lines produced by [`PROGRESS_TEMPLATE`]
const PROGRESS_PREFIX: &str = "[progress]";

/// yt-dlp `--progress-template` whose output [`parse_progress_from_line`] understands.
/// Fields: status; downloaded; total; total estimate; elapsed; speed.
pub const PROGRESS_TEMPLATE: &str = "download:[progress]%(progress.status)s;%(progress.downloaded_bytes)s;%(progress.total_bytes)s;%(progress.total_bytes_estimate)s;%(progress.elapsed)s;%(progress.speed)s";

/// yt-dlp prints `NA` (or `None`) for fields it does not know
fn field(raw: &str) -> Option<&str> {
    match raw.trim() {
        "" | "NA" | "None" => None,
        value => Some(value),
    }
}

fn number(raw: &str) -> Option<f64> {
    field(raw)?.parse::<f64>().ok().filter(|v| v.is_finite() && *v >= 0.0)
}

pub fn parse_progress_from_line(line: &str) -> Option<ProgressSample> {
    let rest = line.trim().strip_prefix(PROGRESS_PREFIX)?;
    let [status, downloaded, total, estimate, elapsed, speed]: [&str; 6] =
        rest.split(';').collect::<Vec<_>>().try_into().ok()?;

    let status = match field(status) {
        Some("downloading") => SampleStatus::Downloading,
        _ => SampleStatus::Other,
    };
    let total_bytes = number(total)
        .map(|n| TotalBytes::Exact(n as u64))
        .or_else(|| number(estimate).map(|n| TotalBytes::Estimated(n as u64)));

    Some(ProgressSample {
        status,
        downloaded_bytes: number(downloaded).unwrap_or(0.0) as u64,
        total_bytes,
        elapsed_seconds: number(elapsed).unwrap_or(0.0),
        speed_bytes_per_sec: number(speed),
    })
}

/// Formats a byte rate the way the progress area shows it
pub fn speed_label(speed_bytes_per_sec: Option<f64>) -> String {
    match speed_bytes_per_sec {
        Some(speed) if speed > 0.0 => format!("{:.1} KB/s", speed / 1024.0),
        _ => "unknown speed".to_owned(),
    }
}

/// Turns progress samples into the values shown on screen.
///
/// Each call returns the next state and leaves `self` untouched, so the reducer
/// can be driven from tests without a UI. Percent never goes backwards within a
/// download. The ETA is a separate running estimate: it is recomputed from the
/// average speed whenever a sample reports a later elapsed time, and counts
/// down once per [`ProgressReducer::tick`] in between.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ProgressReducer {
    percent: f64,
    speed: Option<f64>,
    eta: Option<f64>,
    last_elapsed: f64,
    finished: bool,
}

impl ProgressReducer {
    pub fn reduce(&self, sample: &ProgressSample) -> Self {
        let mut next = *self;
        if sample.status != SampleStatus::Downloading {
            return next;
        }

        next.speed = sample.speed_bytes_per_sec;

        let total = sample.total_bytes.map(TotalBytes::bytes).filter(|t| *t > 0);
        if let Some(total) = total {
            let percent = (sample.downloaded_bytes as f64 / total as f64 * 100.0).clamp(0.0, 100.0);
            next.percent = next.percent.max(percent);
        }

        let elapsed = sample.elapsed_seconds;
        if elapsed > 0.0 && elapsed > self.last_elapsed {
            next.last_elapsed = elapsed;
            let average_speed = sample.downloaded_bytes as f64 / elapsed;
            if let (Some(total), true) = (total, average_speed > 0.0) {
                let remaining = total.saturating_sub(sample.downloaded_bytes) as f64;
                next.eta = Some(remaining / average_speed);
            }
        }

        next
    }

    /// One second of wall time has passed without a fresh estimate
    pub fn tick(&self) -> Self {
        Self {
            eta: self.eta.map(|eta| (eta - 1.0).max(0.0)),
            ..*self
        }
    }

    /// Terminal outcome: clear the ETA, and fill the bar if the download succeeded
    pub fn finish(&self, succeeded: bool) -> Self {
        Self {
            percent: if succeeded { 100.0 } else { self.percent },
            eta: None,
            finished: true,
            ..*self
        }
    }

    pub fn eta_seconds(&self) -> Option<f64> {
        self.eta
    }

    pub fn display(&self) -> DisplayProgress {
        DisplayProgress {
            percent: self.percent.clamp(0.0, 100.0) as u8,
            speed_label: speed_label(self.speed),
            eta_seconds: self.eta_seconds().map(|eta| eta.max(0.0) as u64),
            finished: self.finished,
        }
    }
}
