use std::{
    path::{Path, PathBuf},
    process::Stdio,
};

use async_trait::async_trait;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    process::Command,
    sync::mpsc,
};
use tracing::debug;

use crate::{
    error::FetchError,
    model::{ProgressSample, RawVideoInfo, VideoMetadata},
    progress::{parse_progress_from_line, PROGRESS_TEMPLATE},
    quality::{FormatSelection, PostProcess},
};

/// Prefix of the line yt-dlp prints once the final file is in place
const OUTPUT_PREFIX: &str = "[output]";

/// Parameters of one download call
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadJob {
    pub url: String,
    pub selection: FormatSelection,
    /// `<output_directory>/%(title)s.%(ext)s`
    pub output_template: String,
    /// Where the file is expected to land if the library does not report it
    pub expected_output: PathBuf,
}

/// The external extraction/download library, used as a black box.
///
/// `download` calls `on_progress` for every sample it produces. When the
/// callback returns an error the call must stop and return that error; this is
/// how cancellation reaches the library. Bytes already in flight are not
/// interrupted, so cancellation latency depends on the library's chunk size.
#[async_trait]
pub trait MediaFetchClient: Send + Sync {
    /// Metadata-only probe; no media bytes are transferred
    async fn probe(&self, url: &str) -> Result<VideoMetadata, FetchError>;

    async fn download(
        &self,
        job: &DownloadJob,
        on_progress: &mut (dyn FnMut(ProgressSample) -> Result<(), FetchError> + Send),
    ) -> Result<PathBuf, FetchError>;
}

/// [`MediaFetchClient`] backed by the `yt-dlp` executable
pub struct YtDlpClient {
    binary: PathBuf,
}

impl YtDlpClient {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self { binary: binary.into() }
    }
}

/// Command-line arguments for a download job, URL last
pub fn download_args(job: &DownloadJob) -> Vec<String> {
    let mut args = vec![
        "-f".to_owned(),
        job.selection.format_spec.clone(),
        "--no-playlist".to_owned(),
        "--quiet".to_owned(),
        "--progress".to_owned(),
        "--newline".to_owned(),
        "--color".to_owned(),
        "no_color".to_owned(),
        "--progress-template".to_owned(),
        PROGRESS_TEMPLATE.to_owned(),
        "--print".to_owned(),
        format!("after_move:{OUTPUT_PREFIX}%(filepath)s"),
        "--no-simulate".to_owned(),
        "-o".to_owned(),
        job.output_template.clone(),
    ];

    for step in &job.selection.postprocess {
        match step {
            PostProcess::ExtractAudio { codec, bitrate_kbps } => {
                args.push("--extract-audio".to_owned());
                args.push("--audio-format".to_owned());
                args.push((*codec).to_owned());
                args.push("--audio-quality".to_owned());
                args.push(format!("{bitrate_kbps}K"));
            }
            PostProcess::MergeInto(container) => {
                args.push("--merge-output-format".to_owned());
                args.push((*container).to_owned());
            }
            PostProcess::EmbedThumbnail => args.push("--embed-thumbnail".to_owned()),
        }
    }

    args.push(job.url.clone());
    args
}

/// Picks the most useful line out of yt-dlp's stderr
fn error_message(stderr: &str) -> Option<String> {
    let lines = stderr.lines().map(str::trim).filter(|l| !l.is_empty());
    lines
        .clone()
        .filter_map(|l| l.strip_prefix("ERROR:"))
        .last()
        .or_else(|| lines.last())
        .map(|l| l.trim().to_owned())
}

fn parse_probe_output(stdout: &[u8]) -> Result<VideoMetadata, FetchError> {
    let text = String::from_utf8_lossy(stdout);
    let json = text.lines().map(str::trim).find(|l| !l.is_empty()).ok_or_else(|| FetchError::Metadata {
        reason: "probe returned no data".to_owned(),
    })?;
    let raw: RawVideoInfo = serde_json::from_str(json).map_err(|e| FetchError::Metadata {
        reason: format!("unreadable probe output: {e}"),
    })?;
    Ok(raw.into())
}

#[async_trait]
impl MediaFetchClient for YtDlpClient {
    async fn probe(&self, url: &str) -> Result<VideoMetadata, FetchError> {
        let output = Command::new(&self.binary)
            .args(["--dump-json", "--skip-download", "--no-playlist", "--no-warnings", url])
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| FetchError::Metadata { reason: format!("could not run yt-dlp: {e}") })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FetchError::Metadata {
                reason: error_message(&stderr).unwrap_or_else(|| format!("yt-dlp exited with {}", output.status)),
            });
        }

        parse_probe_output(&output.stdout)
    }

    async fn download(
        &self,
        job: &DownloadJob,
        on_progress: &mut (dyn FnMut(ProgressSample) -> Result<(), FetchError> + Send),
    ) -> Result<PathBuf, FetchError> {
        let args = download_args(job);
        debug!(?args, "spawning yt-dlp");

        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| FetchError::Download(format!("Failed to start yt-dlp: {e}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| FetchError::Download("yt-dlp stdout unavailable".to_owned()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| FetchError::Download("yt-dlp stderr unavailable".to_owned()))?;

        // `--print` puts yt-dlp in quiet mode, which moves progress output to
        // stderr, so both pipes feed one line channel.
        let (lines_tx, mut lines_rx) = mpsc::unbounded_channel();
        forward_lines(stdout, Pipe::Stdout, lines_tx.clone());
        forward_lines(stderr, Pipe::Stderr, lines_tx);

        let mut output_path = None;
        let mut stderr_text = String::new();
        while let Some((pipe, line)) = lines_rx.recv().await {
            if let Some(sample) = parse_progress_from_line(&line) {
                if let Err(err) = on_progress(sample) {
                    let _ = child.kill().await;
                    return Err(err);
                }
            } else if let Some(path) = line.trim().strip_prefix(OUTPUT_PREFIX) {
                output_path = Some(PathBuf::from(path.trim()));
            } else {
                debug!(target: "yt-dlp", "{line}");
                if pipe == Pipe::Stderr {
                    stderr_text.push_str(&line);
                    stderr_text.push('\n');
                }
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| FetchError::Download(format!("yt-dlp process failed: {e}")))?;
        if !status.success() {
            return Err(FetchError::Download(
                error_message(&stderr_text).unwrap_or_else(|| format!("yt-dlp exited with {status}")),
            ));
        }

        Ok(output_path.unwrap_or_else(|| job.expected_output.clone()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pipe {
    Stdout,
    Stderr,
}

fn forward_lines<R>(reader: R, pipe: Pipe, tx: mpsc::UnboundedSender<(Pipe, String)>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send((pipe, line)).is_err() {
                break;
            }
        }
    });
}

/// `<output_directory>/<title>.<ext>`
pub fn expected_output(output_directory: &Path, title: &str, extension: &str) -> PathBuf {
    output_directory.join(format!("{title}.{extension}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quality::{output_template, Quality};

    fn job(quality: Quality, thumbnail: bool) -> DownloadJob {
        let dir = Path::new("/tmp/out");
        let selection = quality.selection(thumbnail);
        DownloadJob {
            url: "https://www.youtube.com/watch?v=abc".to_owned(),
            expected_output: expected_output(dir, "Example", selection.extension),
            output_template: output_template(dir),
            selection,
        }
    }

    #[test]
    fn audio_job_extracts_mp3() {
        let args = download_args(&job(Quality::AudioOnly, true));
        let joined = args.join(" ");
        assert!(joined.contains("-f bestaudio "));
        assert!(joined.contains("--extract-audio --audio-format mp3 --audio-quality 192K"));
        assert!(joined.contains("--embed-thumbnail"));
        assert!(!joined.contains("--merge-output-format"));
        assert_eq!(args.last().map(String::as_str), Some("https://www.youtube.com/watch?v=abc"));
    }

    #[test]
    fn video_job_merges_into_mp4() {
        let args = download_args(&job(Quality::P480, false));
        let joined = args.join(" ");
        assert!(joined.contains("--merge-output-format mp4"));
        assert!(joined.contains("--no-playlist"));
        assert!(!joined.contains("--embed-thumbnail"));
        assert!(args.contains(&PROGRESS_TEMPLATE.to_owned()));
    }

    #[test]
    fn expected_output_uses_title_and_extension() {
        let j = job(Quality::AudioOnly, false);
        assert_eq!(j.expected_output, PathBuf::from("/tmp/out/Example.mp3"));
    }

    #[test]
    fn stderr_prefers_error_lines() {
        let stderr = "WARNING: slow\nERROR: [youtube] abc: Video unavailable\n\n";
        assert_eq!(error_message(stderr).as_deref(), Some("[youtube] abc: Video unavailable"));
        assert_eq!(error_message("something broke\n").as_deref(), Some("something broke"));
        assert_eq!(error_message(""), None);
    }

    #[test]
    fn probe_output_becomes_metadata() {
        let meta = parse_probe_output(br#"{"title":"Example","uploader":"Chan","duration":65,"view_count":1500}"#).unwrap();
        assert_eq!(meta.title, "Example");
        assert_eq!(meta.duration, "1:05");
        assert_eq!(meta.view_count, "1.5K");

        assert!(matches!(parse_probe_output(b"\n"), Err(FetchError::Metadata { .. })));
        assert!(matches!(parse_probe_output(b"null"), Err(FetchError::Metadata { .. })));
    }

    /// Writes an executable `sh` script standing in for yt-dlp
    #[cfg(unix)]
    fn stub_client(dir: &Path, body: &str) -> YtDlpClient {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("yt-dlp");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        YtDlpClient::new(path)
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn probe_runs_binary_and_parses_json() {
        let dir = tempfile::tempdir().unwrap();
        let client = stub_client(
            dir.path(),
            r#"echo '{"title":"Stub","uploader":"Chan","duration":65,"view_count":1500}'"#,
        );

        let meta = client.probe("https://www.youtube.com/watch?v=abc").await.unwrap();
        assert_eq!(meta.title, "Stub");
        assert_eq!(meta.uploader, "Chan");
        assert_eq!(meta.duration, "1:05");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn probe_failure_carries_error_line() {
        let dir = tempfile::tempdir().unwrap();
        let client = stub_client(dir.path(), "echo 'ERROR: [generic] Unsupported URL' >&2\nexit 1");

        let err = client.probe("https://example.com").await.unwrap_err();
        assert_eq!(err, FetchError::Metadata { reason: "[generic] Unsupported URL".to_owned() });
        assert_eq!(err.to_string(), "Failed to get video information");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn download_reads_progress_from_both_pipes_and_reports_output() {
        let dir = tempfile::tempdir().unwrap();
        let client = stub_client(
            dir.path(),
            "echo '[progress]downloading;500;1000;NA;10.0;50.0' >&2\n\
             echo '[progress]downloading;1000;1000;NA;20.0;50.0'\n\
             echo '[output]/tmp/out/Stub.mp4'",
        );

        let mut samples = Vec::new();
        let mut on_progress = |sample: ProgressSample| -> Result<(), FetchError> {
            samples.push(sample);
            Ok(())
        };
        let path = client.download(&job(Quality::Best, false), &mut on_progress).await.unwrap();

        assert_eq!(path, PathBuf::from("/tmp/out/Stub.mp4"));
        assert_eq!(samples.len(), 2);
        let mut downloaded: Vec<_> = samples.iter().map(|s| s.downloaded_bytes).collect();
        downloaded.sort_unstable();
        assert_eq!(downloaded, [500, 1000]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn download_without_output_line_uses_expected_path() {
        let dir = tempfile::tempdir().unwrap();
        let client = stub_client(dir.path(), "exit 0");

        let j = job(Quality::AudioOnly, false);
        let path = client.download(&j, &mut |_: ProgressSample| Ok::<(), FetchError>(())).await.unwrap();
        assert_eq!(path, j.expected_output);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failed_download_reports_error_line() {
        let dir = tempfile::tempdir().unwrap();
        let client = stub_client(
            dir.path(),
            "echo '[progress]downloading;100;1000;NA;1.0;100.0' >&2\n\
             echo '[progress]downloading;200;1000;NA;2.0;100.0' >&2\n\
             echo 'WARNING: slow connection' >&2\n\
             echo 'ERROR: boom' >&2\n\
             exit 1",
        );

        let mut delivered = 0;
        let result = client
            .download(&job(Quality::Best, false), &mut |_: ProgressSample| -> Result<(), FetchError> {
                delivered += 1;
                Ok(())
            })
            .await;

        assert_eq!(result, Err(FetchError::Download("boom".to_owned())));
        assert_eq!(delivered, 2);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn callback_error_kills_the_process() {
        let dir = tempfile::tempdir().unwrap();
        let client = stub_client(
            dir.path(),
            "echo '[progress]downloading;100;1000;NA;1.0;100.0'\n\
             echo '[progress]downloading;200;1000;NA;2.0;100.0'\n\
             exec sleep 30",
        );

        let mut accepted = 0;
        let mut on_progress = |_: ProgressSample| -> Result<(), FetchError> {
            if accepted == 1 {
                return Err(FetchError::Cancelled);
            }
            accepted += 1;
            Ok(())
        };
        let result = tokio::time::timeout(
            std::time::Duration::from_secs(10),
            client.download(&job(Quality::Best, false), &mut on_progress),
        )
        .await
        .expect("download should stop long before the stub exits");

        assert_eq!(result, Err(FetchError::Cancelled));
        assert_eq!(accepted, 1);
    }
}
