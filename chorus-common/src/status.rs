//! Job status data model and status artifact I/O
//!
//! A job's worker subprocess self-reports progress by overwriting
//! `status.json` in its job folder. The orchestrator reads the same file when
//! reconciling status, so both sides share the types in this module.
//!
//! Writes are atomic (temp file + rename in the same directory): a reader
//! sees either the previous report or the new one, never a torn file.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

/// File name of the status artifact inside a job folder
pub const STATUS_FILE_NAME: &str = "status.json";

/// File name of the verbatim job configuration
pub const CONFIG_FILE_NAME: &str = "config.json";

/// File name of the combined stdout/stderr log
pub const LOG_FILE_NAME: &str = "logs.txt";

/// Environment variable carrying the status artifact path into a worker
pub const STATUS_PATH_ENV_VAR: &str = "CHORUS_STATUS_PATH";

/// Kind of long-running ML job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Inference,
    Training,
    Extraction,
}

impl JobKind {
    pub const ALL: [JobKind; 3] = [JobKind::Inference, JobKind::Training, JobKind::Extraction];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Inference => "inference",
            JobKind::Training => "training",
            JobKind::Extraction => "extraction",
        }
    }

    /// Output artifacts the worker is expected to leave in the job folder.
    /// The orchestrator never reads them.
    pub fn expected_outputs(&self) -> &'static [&'static str] {
        match self {
            JobKind::Inference => &["predictions.csv"],
            JobKind::Training => &["model.pt"],
            JobKind::Extraction => &["extraction_task.csv"],
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "inference" => Ok(JobKind::Inference),
            "training" | "train" => Ok(JobKind::Training),
            "extraction" | "extract" => Ok(JobKind::Extraction),
            other => Err(Error::InvalidInput(format!("Unknown job kind: {}", other))),
        }
    }
}

/// Lifecycle state of a job
///
/// `pending -> running -> {completed, failed, cancelled}`. `Unknown` is only
/// produced by reconciliation when a job was left running by a previous
/// orchestrator process and nothing proves how it ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    Unknown,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed | JobState::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Running => "running",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
            JobState::Unknown => "unknown",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One status report, as written to the status artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatus {
    pub status: JobState,

    /// Free-text phase label ("loading model", "epoch 3/10", ...)
    #[serde(default)]
    pub stage: String,

    /// Percent complete (0-100), `None` when unknown
    #[serde(default)]
    pub progress: Option<f32>,

    /// Human-readable message
    #[serde(default)]
    pub message: String,

    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,

    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl JobStatus {
    pub fn new(status: JobState, message: impl Into<String>) -> Self {
        Self {
            status,
            stage: String::new(),
            progress: None,
            message: message.into(),
            timestamp: Utc::now(),
            metadata: Map::new(),
        }
    }

    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = stage.into();
        self
    }

    /// Set progress, clamped to 0-100; non-finite values mean unknown
    pub fn with_progress(mut self, progress: f32) -> Self {
        self.progress = progress.is_finite().then(|| progress.clamp(0.0, 100.0));
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Read a status artifact. A missing file is `Ok(None)`; an unparsable
/// file is an error so callers can decide how to treat it.
pub fn read_status_artifact(path: &Path) -> Result<Option<JobStatus>> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut status: JobStatus = serde_json::from_slice(&bytes)?;
    if let Some(progress) = status.progress {
        status.progress = progress.is_finite().then(|| progress.clamp(0.0, 100.0));
    }
    Ok(Some(status))
}

/// Atomically overwrite a status artifact
pub fn write_status_artifact(path: &Path, status: &JobStatus) -> Result<()> {
    let json = serde_json::to_vec_pretty(status)?;
    write_atomic(path, &json)
}

/// Write `contents` to a sibling temp file and rename it over `path`
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::InvalidInput(format!("Not a file path: {}", path.display())))?;
    let tmp_name = format!(
        ".{}.{}.{}.tmp",
        file_name,
        std::process::id(),
        TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
    );
    let tmp_path = path.with_file_name(tmp_name);

    std::fs::write(&tmp_path, contents)?;
    if let Err(e) = std::fs::rename(&tmp_path, path) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(e.into());
    }
    Ok(())
}

/// Status writer for worker executables.
///
/// Workers locate their artifact from `CHORUS_STATUS_PATH`, or from the
/// `--config` path they were given (the artifact sits next to it).
#[derive(Debug, Clone)]
pub struct StatusReporter {
    path: PathBuf,
}

impl StatusReporter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn from_env() -> Option<Self> {
        std::env::var_os(STATUS_PATH_ENV_VAR).map(|p| Self::new(PathBuf::from(p)))
    }

    pub fn for_config(config_path: &Path) -> Self {
        let dir = config_path.parent().unwrap_or_else(|| Path::new("."));
        Self::new(dir.join(STATUS_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn report(&self, status: &JobStatus) -> Result<()> {
        write_status_artifact(&self.path, status)
    }

    pub fn running(&self, stage: &str, progress: f32, message: &str) -> Result<()> {
        self.report(
            &JobStatus::new(JobState::Running, message)
                .with_stage(stage)
                .with_progress(progress),
        )
    }

    pub fn completed(&self, message: &str) -> Result<()> {
        self.report(&JobStatus::new(JobState::Completed, message).with_progress(100.0))
    }

    pub fn failed(&self, message: &str) -> Result<()> {
        self.report(&JobStatus::new(JobState::Failed, message))
    }
}
