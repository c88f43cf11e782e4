use async_trait::async_trait;
use serde::Deserialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tempfile::TempPath;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::AppConfig;

/// Appended to the staged path to name the fast-start copy.
pub const OPTIMIZED_SUFFIX: &str = ".processing";

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("failed to launch {tool}: {source}")]
    Spawn {
        tool: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} timed out after {after:?}")]
    TimedOut { tool: &'static str, after: Duration },

    #[error("{tool} exited with {status}: {stderr}")]
    Failed {
        tool: &'static str,
        status: ExitStatus,
        stderr: String,
    },
}

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("unparsable probe output: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("no video streams found")]
    NoVideoStream,

    #[error("video stream reports no usable width/height")]
    MissingDimensions,
}

#[derive(Error, Debug)]
pub enum OptimizeError {
    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("optimizer produced no output at {0}")]
    MissingOutput(PathBuf),
}

/// Geometry of the first video stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamInfo {
    pub width: u32,
    pub height: u32,
}

/// Fast-start copy of a staged upload. The file is removed when this value
/// is dropped or closed.
#[derive(Debug)]
pub struct OptimizedFile {
    path: TempPath,
}

impl OptimizedFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: TempPath::from_path(path.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn close(self) -> std::io::Result<()> {
        self.path.close()
    }
}

/// External media tooling used by the ingest pipeline.
#[async_trait]
pub trait MediaProcessor: Send + Sync {
    /// Reads the geometry of the first video stream in `path`.
    async fn probe(&self, path: &Path) -> Result<StreamInfo, ProbeError>;

    /// Writes a fast-start copy of `path` without re-encoding.
    async fn optimize(&self, path: &Path) -> Result<OptimizedFile, OptimizeError>;
}

/// `{input}.processing`
pub fn optimized_path_for(input: &Path) -> PathBuf {
    let mut path = OsString::from(input.as_os_str());
    path.push(OPTIMIZED_SUFFIX);
    PathBuf::from(path)
}

#[derive(Deserialize)]
struct ProbeReport {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

/// Extracts the first video stream from `ffprobe -print_format json -show_streams`.
pub fn parse_probe_report(stdout: &[u8]) -> Result<StreamInfo, ProbeError> {
    let report: ProbeReport = serde_json::from_slice(stdout)?;
    let stream = report
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or(ProbeError::NoVideoStream)?;

    match (stream.width, stream.height) {
        (Some(width), Some(height)) if width > 0 && height > 0 => Ok(StreamInfo { width, height }),
        _ => Err(ProbeError::MissingDimensions),
    }
}

/// ffprobe/ffmpeg running as child processes.
pub struct FfmpegProcessor {
    ffmpeg_path: String,
    ffprobe_path: String,
    timeout: Duration,
}

impl FfmpegProcessor {
    pub fn new(ffmpeg_path: String, ffprobe_path: String, timeout: Duration) -> Self {
        Self {
            ffmpeg_path,
            ffprobe_path,
            timeout,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.ffmpeg_path.clone(),
            config.ffprobe_path.clone(),
            config.tool_timeout(),
        )
    }

    /// Runs `command` to completion and returns its stdout. The child is
    /// killed if the timeout fires or the calling future is dropped.
    async fn run(&self, tool: &'static str, mut command: Command) -> Result<Vec<u8>, ToolError> {
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(?command, "running {}", tool);

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(result) => result.map_err(|source| ToolError::Spawn { tool, source })?,
            Err(_) => {
                warn!("{} did not finish within {:?}, killed", tool, self.timeout);
                return Err(ToolError::TimedOut {
                    tool,
                    after: self.timeout,
                });
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(ToolError::Failed {
                tool,
                status: output.status,
                stderr,
            });
        }

        Ok(output.stdout)
    }
}

#[async_trait]
impl MediaProcessor for FfmpegProcessor {
    async fn probe(&self, path: &Path) -> Result<StreamInfo, ProbeError> {
        let mut command = Command::new(&self.ffprobe_path);
        command
            .args(["-v", "error", "-print_format", "json", "-show_streams"])
            .arg(path);

        let stdout = self.run("ffprobe", command).await?;
        parse_probe_report(&stdout)
    }

    async fn optimize(&self, path: &Path) -> Result<OptimizedFile, OptimizeError> {
        // Owns the output from here on so a partial write is removed on failure.
        let output = OptimizedFile::new(optimized_path_for(path));

        let mut command = Command::new(&self.ffmpeg_path);
        command
            .args(["-v", "error", "-y", "-i"])
            .arg(path)
            .args(["-c", "copy", "-movflags", "faststart", "-f", "mp4"])
            .arg(output.path());

        self.run("ffmpeg", command).await?;

        if !tokio::fs::try_exists(output.path()).await.unwrap_or(false) {
            return Err(OptimizeError::MissingOutput(output.path().to_path_buf()));
        }
        Ok(output)
    }
}
