//! yt-dlp backend driving the external `yt-dlp` executable

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use super::context::FetchContext;
use super::progress::ProgressUpdate;
use super::traits::{FetchOutcome, MediaBackend};
use crate::config::BackendConfig;
use crate::error::BackendError;
use crate::types::MediaMetadata;

/// Marker prefixed to every progress line so it can be told apart from log output
const PROGRESS_MARKER: &str = "media-dl-progress:";

/// Progress template: `marker downloaded|total|estimate|fragment|fragments|percent`
const PROGRESS_TEMPLATE: &str = "download:media-dl-progress:%(progress.downloaded_bytes)s|%(progress.total_bytes)s|%(progress.total_bytes_estimate)s|%(progress.fragment_index)s|%(progress.fragment_count)s|%(progress._percent_str)s";

/// Post-processor line prefixes; seeing one means the transfer itself is done
const POSTPROCESS_PREFIXES: &[&str] = &["[Merger]", "[VideoConvertor]", "[FixupM3u8]"];

/// Title used when the probe returns none
const UNKNOWN_TITLE: &str = "unknown";

/// Percentage inside `_percent_str`, which may carry ANSI colour codes
#[allow(clippy::expect_used)]
static PERCENT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(-?\d+(?:\.\d+)?)\s*%").expect("percent regex is valid") // Static pattern, safe to panic
});

/// Backend that shells out to `yt-dlp`
///
/// Metadata comes from `--dump-single-json`, transfers run with a
/// machine-readable `--progress-template`. Cancellation kills the child process;
/// partial files are left to yt-dlp's own `.part` handling.
///
/// # Examples
///
/// ```no_run
/// use media_dl::backend::{MediaBackend, YtDlpBackend};
/// use media_dl::config::BackendConfig;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = YtDlpBackend::from_path(BackendConfig::default())
///     .expect("yt-dlp not found in PATH");
///
/// let metadata = backend.probe("https://example.com/watch?v=1").await?;
/// println!("{} ({}s)", metadata.title, metadata.duration_seconds);
/// # Ok(())
/// # }
/// ```
pub struct YtDlpBackend {
    binary_path: PathBuf,
    options: BackendConfig,
}

impl YtDlpBackend {
    /// Create a backend with an explicit binary path
    pub fn new(binary_path: PathBuf, options: BackendConfig) -> Self {
        Self {
            binary_path,
            options,
        }
    }

    /// Attempt to find yt-dlp in PATH
    ///
    /// Returns `None` if the binary is not found.
    pub fn from_path(options: BackendConfig) -> Option<Self> {
        which::which("yt-dlp")
            .ok()
            .map(|path| Self::new(path, options))
    }

    /// Resolve the binary from configuration: explicit path first, then PATH if allowed
    pub fn from_config(options: &BackendConfig) -> Option<Self> {
        if let Some(ref path) = options.ytdlp_path {
            return Some(Self::new(path.clone(), options.clone()));
        }
        if options.search_path {
            return Self::from_path(options.clone());
        }
        None
    }

    /// Path of the yt-dlp binary in use
    pub fn binary_path(&self) -> &std::path::Path {
        &self.binary_path
    }

    fn fetch_args(&self, ctx: &FetchContext) -> Vec<String> {
        let output_template = ctx.dest_dir().join("%(title)s.%(ext)s");
        vec![
            "--newline".to_string(),
            "--no-warnings".to_string(),
            "--no-playlist".to_string(),
            "--progress-template".to_string(),
            PROGRESS_TEMPLATE.to_string(),
            "--format".to_string(),
            self.options.format.clone(),
            "--merge-output-format".to_string(),
            self.options.merge_output_format.clone(),
            "--recode-video".to_string(),
            self.options.merge_output_format.clone(),
            "--force-overwrites".to_string(),
            "--retries".to_string(),
            self.options.retries.to_string(),
            "--fragment-retries".to_string(),
            self.options.fragment_retries.to_string(),
            "--socket-timeout".to_string(),
            self.options.socket_timeout.as_secs().to_string(),
            "--output".to_string(),
            output_template.to_string_lossy().into_owned(),
            ctx.url().to_string(),
        ]
    }
}

#[derive(Deserialize)]
struct ProbeJson {
    title: Option<String>,
    duration: Option<f64>,
}

#[async_trait]
impl MediaBackend for YtDlpBackend {
    async fn probe(&self, url: &str) -> Result<MediaMetadata, BackendError> {
        let output = Command::new(&self.binary_path)
            .args(["--dump-single-json", "--no-download", "--no-warnings", "--no-playlist"])
            .arg(url)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| BackendError::Tool(format!("Failed to execute yt-dlp: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BackendError::Probe(last_error_line(&stderr).unwrap_or_else(
                || format!("yt-dlp exited with {}", output.status),
            )));
        }

        parse_probe_output(&output.stdout)
    }

    async fn fetch(&self, ctx: &FetchContext) -> Result<FetchOutcome, BackendError> {
        if ctx.is_cancelled() {
            return Ok(FetchOutcome::Cancelled);
        }

        let mut child = Command::new(&self.binary_path)
            .args(self.fetch_args(ctx))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| BackendError::Tool(format!("Failed to execute yt-dlp: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BackendError::Tool("yt-dlp stdout unavailable".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| BackendError::Tool("yt-dlp stderr unavailable".to_string()))?;

        let mut out_lines = BufReader::new(stdout).lines();
        let mut err_lines = BufReader::new(stderr).lines();
        let mut stdout_done = false;
        let mut stderr_done = false;
        let mut last_error: Option<String> = None;

        let status = loop {
            tokio::select! {
                _ = ctx.cancelled() => {
                    tracing::debug!(task_id = ctx.task_id().0, "Killing yt-dlp after cancellation");
                    if let Err(e) = child.start_kill() {
                        tracing::warn!(task_id = ctx.task_id().0, error = %e, "Failed to kill yt-dlp process");
                    }
                    child.wait().await.ok();
                    return Ok(FetchOutcome::Cancelled);
                }

                line = out_lines.next_line(), if !stdout_done => match line {
                    Ok(Some(line)) => handle_output_line(ctx, &line),
                    Ok(None) => stdout_done = true,
                    Err(e) => {
                        tracing::debug!(task_id = ctx.task_id().0, error = %e, "Error reading yt-dlp stdout");
                        stdout_done = true;
                    }
                },

                line = err_lines.next_line(), if !stderr_done => match line {
                    Ok(Some(line)) => {
                        if let Some(error) = last_error_line(&line) {
                            last_error = Some(error);
                        } else {
                            handle_output_line(ctx, &line);
                        }
                    }
                    Ok(None) => stderr_done = true,
                    Err(e) => {
                        tracing::debug!(task_id = ctx.task_id().0, error = %e, "Error reading yt-dlp stderr");
                        stderr_done = true;
                    }
                },

                status = child.wait(), if stdout_done && stderr_done => {
                    break status.map_err(|e| BackendError::Tool(format!("Failed to wait for yt-dlp: {}", e)))?;
                }
            }
        };

        if ctx.is_cancelled() {
            return Ok(FetchOutcome::Cancelled);
        }

        if !status.success() {
            return Err(BackendError::Fetch(
                last_error.unwrap_or_else(|| format!("yt-dlp exited with {}", status)),
            ));
        }

        ctx.on_finished();
        Ok(FetchOutcome::Completed)
    }

    fn name(&self) -> &'static str {
        "yt-dlp"
    }
}

fn handle_output_line(ctx: &FetchContext, line: &str) {
    if let Some(update) = parse_progress_line(line) {
        ctx.on_progress(update);
    } else if POSTPROCESS_PREFIXES.iter().any(|p| line.starts_with(p)) {
        ctx.on_finished();
    }
}

/// Parse a line produced by [`PROGRESS_TEMPLATE`]
///
/// yt-dlp prints `NA` for fields it does not know; those become `None`.
pub(crate) fn parse_progress_line(line: &str) -> Option<ProgressUpdate> {
    let body = line.trim().strip_prefix(PROGRESS_MARKER)?;
    let mut fields = body.splitn(6, '|');

    let downloaded_bytes = parse_number(fields.next()?)?;
    let total_bytes = fields.next().and_then(parse_number);
    let total_bytes_estimate = fields.next().and_then(parse_number);
    let fragment_index = fields.next().and_then(parse_number);
    let fragment_count = fields.next().and_then(parse_number);
    let percent_hint = fields.next().and_then(|s| {
        PERCENT_PATTERN
            .captures(s)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<f32>().ok())
    });

    Some(ProgressUpdate {
        downloaded_bytes,
        total_bytes,
        total_bytes_estimate,
        fragment_index,
        fragment_count,
        percent_hint,
    })
}

/// yt-dlp prints integers for exact sizes but floats for estimates
fn parse_number(field: &str) -> Option<u64> {
    let field = field.trim();
    if field.is_empty() || field == "NA" || field == "None" {
        return None;
    }
    field
        .parse::<u64>()
        .ok()
        .or_else(|| field.parse::<f64>().ok().filter(|v| *v >= 0.0).map(|v| v as u64))
}

/// Last `ERROR:` line of yt-dlp output, without the prefix
fn last_error_line(output: &str) -> Option<String> {
    output
        .lines()
        .rev()
        .find_map(|l| l.trim().strip_prefix("ERROR:"))
        .map(|msg| msg.trim().to_string())
}

fn parse_probe_output(stdout: &[u8]) -> Result<MediaMetadata, BackendError> {
    let probe: ProbeJson = serde_json::from_slice(stdout)
        .map_err(|e| BackendError::Probe(format!("Unreadable yt-dlp metadata: {}", e)))?;

    Ok(MediaMetadata {
        title: probe
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| UNKNOWN_TITLE.to_string()),
        duration_seconds: probe
            .duration
            .filter(|d| d.is_finite() && *d > 0.0)
            .map(|d| d.round() as u64)
            .unwrap_or(0),
    })
}
