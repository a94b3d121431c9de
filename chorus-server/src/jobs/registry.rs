//! Job registry
//!
//! Maps job id to its manifest, artifact paths, worker handle and cached
//! terminal status. The in-memory map is a cache over the job folders:
//! any job whose folder exists under the root can be rediscovered by id
//! (see [`JobRegistry::list_jobs`]), which is how jobs survive restarts.
//!
//! **Locking:** the map is behind a `RwLock` held only to look up or insert
//! entries. Each entry has its own `Mutex`, so operations on one job are
//! serialised while different jobs never wait on each other.

use super::error::{JobError, JobResult};
use super::paths::{default_job_name, new_job_id, validate_job_id, JobPaths, JobRecord, MANIFEST_FILE_NAME};
use super::process::{ProcessHandle, ProcessState};
use super::reconciler::{reconcile, tail_lines, Observation};
use super::runner::JobRunner;
use chorus_common::config::WorkerSpec;
use chorus_common::status::{read_status_artifact, write_atomic, write_status_artifact};
use chorus_common::{JobKind, JobState, JobStatus};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Bytes read from the end of a log when quoting its tail
const LOG_TAIL_BYTES: u64 = 64 * 1024;

/// Result of a cancel request. Every variant is a success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelOutcome {
    /// Already completed, failed or cancelled; nothing was done
    AlreadyTerminal,
    /// Termination requested; the job reads `cancelled` once the worker exits
    Signalled,
    /// A previous cancel is still in progress
    AlreadyRequested,
    /// The job never started and is now `cancelled`
    CancelledBeforeStart,
    /// No tracked worker (orphaned after restart); marked `cancelled` without a signal
    MarkedWithoutProcess,
}

/// Expected output artifact of a job
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputInfo {
    pub name: String,
    pub path: PathBuf,
    pub exists: bool,
}

/// Listing entry for one job
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobInfo {
    pub job_id: String,
    pub kind: JobKind,
    pub name: String,
    pub job_folder: PathBuf,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: JobStatus,
    pub expected_outputs: Vec<OutputInfo>,
}

struct JobEntry {
    job_id: String,
    paths: JobPaths,
    state: Mutex<EntryState>,
}

struct EntryState {
    record: JobRecord,
    process: Option<Arc<dyn ProcessHandle>>,
    cancel_requested: bool,
    terminal: Option<JobStatus>,
}

pub struct JobRegistry {
    root: PathBuf,
    runner: JobRunner,
    log_tail_lines: usize,
    entries: RwLock<HashMap<String, Arc<JobEntry>>>,
}

impl JobRegistry {
    /// Create a registry over `root`, creating the folder if needed
    pub fn new(root: impl Into<PathBuf>, runner: JobRunner, log_tail_lines: usize) -> JobResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| {
            JobError::ConfigWrite(format!("Cannot create root folder {}: {}", root.display(), e))
        })?;
        info!(root = %root.display(), "Job registry initialised");

        Ok(Self {
            root,
            runner,
            log_tail_lines,
            entries: RwLock::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn paths(&self, job_id: &str) -> JobPaths {
        JobPaths::new(&self.root, job_id)
    }

    /// Number of jobs currently registered in memory
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Allocate a job with a generated name
    pub fn create_job(&self, kind: JobKind, config: &Value) -> JobResult<String> {
        self.create_named_job(kind, None, config)
    }

    /// Allocate a job, create its folder and write `config.json`, an empty
    /// `logs.txt`, the manifest and a `pending` status.
    pub fn create_named_job(&self, kind: JobKind, name: Option<&str>, config: &Value) -> JobResult<String> {
        let (job_id, paths) = loop {
            let candidate = new_job_id(kind);
            let paths = self.paths(&candidate);
            if !paths.dir.exists() && !self.entries.read().contains_key(&candidate) {
                break (candidate, paths);
            }
        };

        let write_err = |what: &str, e: &dyn std::fmt::Display| {
            JobError::ConfigWrite(format!("{} for job {}: {}", what, job_id, e))
        };

        std::fs::create_dir_all(&paths.dir).map_err(|e| write_err("Create job folder", &e))?;

        let config_json = serde_json::to_vec_pretty(config).map_err(|e| write_err("Serialize config", &e))?;
        write_atomic(&paths.config, &config_json).map_err(|e| write_err("Write config.json", &e))?;
        std::fs::File::create(&paths.log).map_err(|e| write_err("Create logs.txt", &e))?;

        let record = JobRecord::new(job_id.clone(), kind).with_name(name);
        record.save(&paths.manifest).map_err(|e| write_err("Write job.json", &e))?;

        let pending = JobStatus::new(JobState::Pending, "Job created").with_stage("created");
        write_status_artifact(&paths.status, &pending).map_err(|e| write_err("Write status.json", &e))?;

        info!(job_id = %job_id, kind = %kind, name = %record.name, folder = %paths.dir.display(), "Job created");
        self.insert_entry(record, paths);
        Ok(job_id)
    }

    /// Spawn the worker for a created job
    pub fn start(&self, job_id: &str, worker: &WorkerSpec) -> JobResult<Option<u32>> {
        let entry = self.entry(job_id)?;
        let mut state = entry.state.lock();

        if let Some(handle) = &state.process {
            if JobRunner::is_alive(handle.as_ref()) {
                return Err(JobError::AlreadyRunning(job_id.to_string()));
            }
            return Err(JobError::AlreadyStarted(job_id.to_string()));
        }
        if state.terminal.is_some() || state.record.started_at.is_some() {
            return Err(JobError::AlreadyStarted(job_id.to_string()));
        }

        let starting = JobStatus::new(JobState::Running, "Worker starting").with_stage("starting");
        write_status_artifact(&entry.paths.status, &starting).map_err(|e| {
            JobError::ConfigWrite(format!("Write status.json for job {}: {}", job_id, e))
        })?;

        let spec = self.runner.build_invocation(&state.record, &entry.paths, worker);
        state.record.started_at = Some(Utc::now());

        let handle = match self.runner.launch(&spec) {
            Ok(handle) => handle,
            Err(e) => {
                warn!(job_id, program = %spec.program.display(), error = %e, "Worker spawn failed");
                let failed = JobStatus::new(JobState::Failed, format!("Failed to start worker: {}", e))
                    .with_stage("starting");
                if let Err(write_err) = write_status_artifact(&entry.paths.status, &failed) {
                    warn!(job_id, error = %write_err, "Failed to record spawn failure");
                }
                Self::mark_terminal(&entry, &mut state, failed);
                return Err(JobError::Spawn {
                    job_id: job_id.to_string(),
                    source: e,
                });
            }
        };

        let pid = handle.pid();
        state.record.pid = pid;
        state.process = Some(handle);
        Self::save_record(&entry, &state.record);

        info!(job_id, ?pid, program = %spec.program.display(), "Worker started");
        Ok(pid)
    }

    /// Current reconciled status
    pub fn get_status(&self, job_id: &str) -> JobResult<JobStatus> {
        let entry = self.entry(job_id)?;
        let mut state = entry.state.lock();
        Ok(self.resolve(&entry, &mut state))
    }

    /// Kind of a registered or discoverable job
    pub fn job_kind(&self, job_id: &str) -> JobResult<JobKind> {
        let entry = self.entry(job_id)?;
        let kind = entry.state.lock().record.kind;
        Ok(kind)
    }

    /// Cancel a job. Idempotent: repeated or late cancels are not errors.
    pub fn cancel(&self, job_id: &str) -> JobResult<CancelOutcome> {
        let entry = self.entry(job_id)?;
        let mut state = entry.state.lock();

        if state.terminal.is_some() {
            return Ok(CancelOutcome::AlreadyTerminal);
        }
        if state.cancel_requested {
            return Ok(CancelOutcome::AlreadyRequested);
        }
        if self.resolve(&entry, &mut state).is_terminal() {
            return Ok(CancelOutcome::AlreadyTerminal);
        }

        if let Some(handle) = state.process.clone() {
            state.cancel_requested = true;
            self.runner.kill_detached(job_id, handle);
            info!(job_id, "Cancellation requested");
            return Ok(CancelOutcome::Signalled);
        }

        let (outcome, message) = if state.record.started_at.is_none() {
            (CancelOutcome::CancelledBeforeStart, "Job cancelled before start")
        } else {
            warn!(job_id, "No tracked worker to signal, marking cancelled");
            (
                CancelOutcome::MarkedWithoutProcess,
                "Job marked cancelled; worker was not tracked by this orchestrator",
            )
        };

        let cancelled = JobStatus::new(JobState::Cancelled, message);
        if let Err(e) = write_status_artifact(&entry.paths.status, &cancelled) {
            warn!(job_id, error = %e, "Failed to write cancelled status");
        }
        state.cancel_requested = true;
        Self::mark_terminal(&entry, &mut state, cancelled);
        Ok(outcome)
    }

    /// Scan the root for job folders, register any not yet known, and return
    /// every known id, newest first.
    pub fn list_jobs(&self) -> JobResult<Vec<String>> {
        for dir_entry in std::fs::read_dir(&self.root)? {
            let dir_entry = match dir_entry {
                Ok(e) => e,
                Err(e) => {
                    warn!(error = %e, "Failed to read root folder entry");
                    continue;
                }
            };
            let path = dir_entry.path();
            if !path.join(MANIFEST_FILE_NAME).is_file() {
                continue;
            }
            let Some(job_id) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if validate_job_id(job_id).is_err() || self.entries.read().contains_key(job_id) {
                continue;
            }
            if let Err(e) = self.discover(job_id) {
                warn!(job_id, error = %e, "Skipping unreadable job folder");
            }
        }

        // Entry locks are never taken while the map lock is held
        let entries: Vec<Arc<JobEntry>> = self.entries.read().values().cloned().collect();
        let mut known: Vec<(DateTime<Utc>, String)> = entries
            .iter()
            .map(|entry| (entry.state.lock().record.created_at, entry.job_id.clone()))
            .collect();
        known.sort_by(|a, b| b.cmp(a));
        Ok(known.into_iter().map(|(_, id)| id).collect())
    }

    /// Listing details for one job
    pub fn job_info(&self, job_id: &str) -> JobResult<JobInfo> {
        let entry = self.entry(job_id)?;
        let mut state = entry.state.lock();
        let status = self.resolve(&entry, &mut state);
        let record = &state.record;

        let expected_outputs = entry
            .paths
            .expected_outputs(record.kind)
            .into_iter()
            .map(|path| OutputInfo {
                name: path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                exists: path.exists(),
                path,
            })
            .collect();

        Ok(JobInfo {
            job_id: record.job_id.clone(),
            kind: record.kind,
            name: record.name.clone(),
            job_folder: entry.paths.dir.clone(),
            created_at: record.created_at,
            started_at: record.started_at,
            finished_at: record.finished_at,
            status,
            expected_outputs,
        })
    }

    /// Drop a job from memory. Its folder and artifacts are kept.
    ///
    /// The status is resolved first, so an exit nobody polled is persisted
    /// and survives rediscovery.
    pub fn clear(&self, job_id: &str) -> JobResult<()> {
        let entry = self
            .entries
            .read()
            .get(job_id)
            .cloned()
            .ok_or_else(|| JobError::UnknownJob(job_id.to_string()))?;

        let mut state = entry.state.lock();
        if let Some(handle) = &state.process {
            if JobRunner::is_alive(handle.as_ref()) {
                return Err(JobError::StillRunning(job_id.to_string()));
            }
        }
        let status = self.resolve(&entry, &mut state);
        self.entries.write().remove(job_id);
        drop(state);

        info!(job_id, status = %status.status, "Job cleared from registry");
        Ok(())
    }

    fn insert_entry(&self, record: JobRecord, paths: JobPaths) -> Arc<JobEntry> {
        let job_id = record.job_id.clone();
        let entry = Arc::new(JobEntry {
            job_id: job_id.clone(),
            paths,
            state: Mutex::new(EntryState {
                record,
                process: None,
                cancel_requested: false,
                terminal: None,
            }),
        });
        // A concurrent discovery of the same id keeps the first entry
        Arc::clone(self.entries.write().entry(job_id).or_insert(entry))
    }

    /// Registered entry, or one rediscovered from disk
    fn entry(&self, job_id: &str) -> JobResult<Arc<JobEntry>> {
        validate_job_id(job_id)?;
        if let Some(entry) = self.entries.read().get(job_id) {
            return Ok(Arc::clone(entry));
        }
        self.discover(job_id)
    }

    fn discover(&self, job_id: &str) -> JobResult<Arc<JobEntry>> {
        let paths = self.paths(job_id);

        let record = if paths.manifest.is_file() {
            let mut record = JobRecord::load(&paths.manifest)?;
            if record.job_id != job_id {
                return Err(JobError::Manifest(format!(
                    "{} names job {}",
                    paths.manifest.display(),
                    record.job_id
                )));
            }
            if record.name.is_empty() {
                record.name = default_job_name(record.kind, record.created_at);
            }
            record
        } else if paths.status.is_file() {
            // Folder without a manifest: infer the kind from the id prefix
            let kind: JobKind = job_id
                .split('-')
                .next()
                .and_then(|prefix| prefix.parse().ok())
                .ok_or_else(|| JobError::UnknownJob(job_id.to_string()))?;
            let mut record = JobRecord::new(job_id, kind);
            record.started_at = Some(record.created_at);
            record
        } else {
            return Err(JobError::UnknownJob(job_id.to_string()));
        };

        debug!(
            job_id,
            kind = %record.kind,
            started = record.started_at.is_some(),
            "Rediscovered job from disk"
        );
        Ok(self.insert_entry(record, paths))
    }

    fn observe(state: &EntryState, job_id: &str) -> Observation {
        match &state.process {
            Some(handle) => match handle.poll() {
                Ok(ProcessState::Running) => Observation::Alive,
                Ok(ProcessState::Exited(code)) => Observation::Exited { code },
                Err(e) => {
                    warn!(job_id, error = %e, "Failed to poll worker, treating as exited");
                    Observation::Exited { code: None }
                }
            },
            None if state.record.started_at.is_none() => Observation::NotStarted,
            None => Observation::Untracked,
        }
    }

    /// Reconcile under the entry lock, caching and persisting terminal results
    fn resolve(&self, entry: &JobEntry, state: &mut EntryState) -> JobStatus {
        if let Some(terminal) = &state.terminal {
            return terminal.clone();
        }

        let job_id = entry.job_id.as_str();
        let observation = Self::observe(state, job_id);
        let artifact = match read_status_artifact(&entry.paths.status) {
            Ok(artifact) => artifact,
            Err(e) => {
                debug!(job_id, error = %e, "Unreadable status artifact, treating as absent");
                None
            }
        };
        let reported = artifact.as_ref().map(|a| a.status);

        let status = reconcile(job_id, artifact, observation, state.cancel_requested, || {
            read_log_tail(&entry.paths.log, self.log_tail_lines)
        });

        if status.is_terminal() {
            // The worker is gone, so the artifact can be brought up to date
            if matches!(observation, Observation::Exited { .. }) && reported != Some(status.status) {
                if let Err(e) = write_status_artifact(&entry.paths.status, &status) {
                    warn!(job_id, error = %e, "Failed to persist resolved status");
                }
            }
            info!(job_id, status = %status.status, "Job reached terminal state");
            Self::mark_terminal(entry, state, status.clone());
        }
        status
    }

    /// Cache a terminal status and stamp `finished_at` in the manifest
    fn mark_terminal(entry: &JobEntry, state: &mut EntryState, status: JobStatus) {
        if state.record.finished_at.is_none() {
            state.record.finished_at = Some(status.timestamp);
            Self::save_record(entry, &state.record);
        }
        state.terminal = Some(status);
    }

    fn save_record(entry: &JobEntry, record: &JobRecord) {
        if let Err(e) = record.save(&entry.paths.manifest) {
            warn!(job_id = %entry.job_id, error = %e, "Failed to update job manifest");
        }
    }
}

/// Last `lines` lines of the log, reading at most the final 64 KiB
pub fn read_log_tail(path: &Path, lines: usize) -> String {
    let mut file = match std::fs::File::open(path) {
        Ok(file) => file,
        Err(_) => return String::new(),
    };
    let len = file.metadata().map(|m| m.len()).unwrap_or(0);
    if len > LOG_TAIL_BYTES && file.seek(SeekFrom::Start(len - LOG_TAIL_BYTES)).is_err() {
        return String::new();
    }
    let mut bytes = Vec::new();
    if file.read_to_end(&mut bytes).is_err() {
        return String::new();
    }
    tail_lines(&String::from_utf8_lossy(&bytes), lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_read_log_tail_limits_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logs.txt");
        let text: String = (1..=30).map(|i| format!("line {}\n", i)).collect();
        std::fs::write(&path, text).unwrap();

        let tail = read_log_tail(&path, 3);
        assert_eq!(tail, "line 28\nline 29\nline 30");
        assert_eq!(read_log_tail(&dir.path().join("absent.txt"), 3), "");
    }

    #[test]
    fn test_read_log_tail_of_large_log() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logs.txt");
        let mut text = "x".repeat(200 * 1024);
        text.push_str("\nfinal error\n");
        std::fs::write(&path, text).unwrap();

        assert!(read_log_tail(&path, 1).ends_with("final error"));
    }
}
