//! Job folder layout and the orchestrator manifest
//!
//! Every path is derived from `root + job_id`, so a job can be rediscovered
//! after a restart from nothing but its id.
//!
//! ```text
//! <root>/<job_id>/
//!     job.json      orchestrator manifest (kind, name, timestamps, pid)
//!     config.json   job configuration, written once
//!     logs.txt      worker stdout + stderr, append-only
//!     status.json   status artifact, overwritten by the worker
//! ```

use super::error::{JobError, JobResult};
use chorus_common::status::{write_atomic, CONFIG_FILE_NAME, LOG_FILE_NAME, STATUS_FILE_NAME};
use chorus_common::JobKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const MANIFEST_FILE_NAME: &str = "job.json";

const MAX_JOB_ID_LEN: usize = 128;

/// Artifact paths for one job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobPaths {
    pub dir: PathBuf,
    pub manifest: PathBuf,
    pub config: PathBuf,
    pub log: PathBuf,
    pub status: PathBuf,
}

impl JobPaths {
    pub fn new(root: &Path, job_id: &str) -> Self {
        let dir = root.join(job_id);
        Self {
            manifest: dir.join(MANIFEST_FILE_NAME),
            config: dir.join(CONFIG_FILE_NAME),
            log: dir.join(LOG_FILE_NAME),
            status: dir.join(STATUS_FILE_NAME),
            dir,
        }
    }

    /// Kind-specific outputs the worker is expected to produce
    pub fn expected_outputs(&self, kind: JobKind) -> Vec<PathBuf> {
        kind.expected_outputs()
            .iter()
            .map(|name| self.dir.join(name))
            .collect()
    }
}

/// Contents of `job.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: String,
    pub kind: JobKind,
    /// Human label; manifests written without one read back as empty
    #[serde(default)]
    pub name: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// Time of the terminal status, once one is known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Informational only; a pid is never re-attached after restart
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
}

impl JobRecord {
    pub fn new(job_id: impl Into<String>, kind: JobKind) -> Self {
        let created_at = Utc::now();
        Self {
            job_id: job_id.into(),
            kind,
            name: default_job_name(kind, created_at),
            created_at,
            started_at: None,
            finished_at: None,
            pid: None,
        }
    }

    /// Replace the generated name; blank names keep it
    pub fn with_name(mut self, name: Option<&str>) -> Self {
        if let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) {
            self.name = name.to_string();
        }
        self
    }

    pub fn load(path: &Path) -> JobResult<Self> {
        let bytes = std::fs::read(path)?;
        serde_json::from_slice(&bytes)
            .map_err(|e| JobError::Manifest(format!("{}: {}", path.display(), e)))
    }

    pub fn save(&self, path: &Path) -> JobResult<()> {
        let json = serde_json::to_vec_pretty(self)
            .map_err(|e| JobError::Manifest(e.to_string()))?;
        write_atomic(path, &json).map_err(|e| JobError::Manifest(e.to_string()))
    }
}

/// Generated job name: `<kind>_task_<YYYYmmdd_HHMMSS>`
pub fn default_job_name(kind: JobKind, created_at: DateTime<Utc>) -> String {
    format!("{}_task_{}", kind.as_str(), created_at.format("%Y%m%d_%H%M%S"))
}

/// Allocate a new id: `<kind>-<YYYYmmdd-HHMMSS>-<8 hex>`
pub fn new_job_id(kind: JobKind) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "{}-{}-{}",
        kind.as_str(),
        Utc::now().format("%Y%m%d-%H%M%S"),
        &suffix[..8]
    )
}

/// Reject ids that could escape the root folder
pub fn validate_job_id(job_id: &str) -> JobResult<()> {
    let valid = !job_id.is_empty()
        && job_id.len() <= MAX_JOB_ID_LEN
        && job_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(JobError::InvalidJobId(job_id.to_string()))
    }
}
