//! Long-running ML job orchestration
//!
//! A job is one worker subprocess (inference, training or extraction) with
//! its own folder of artifacts. The worker reports progress by overwriting
//! `status.json`; callers poll [`JobRegistry::get_status`], which reconciles
//! that report with the process state.

pub mod error;
pub mod paths;
pub mod process;
pub mod reconciler;
pub mod registry;
pub mod runner;

pub use error::{JobError, JobResult};
pub use paths::{JobPaths, JobRecord};
pub use process::{LaunchSpec, OsLauncher, ProcessHandle, ProcessLauncher, ProcessState};
pub use reconciler::{reconcile, Observation};
pub use registry::{CancelOutcome, JobInfo, JobRegistry, OutputInfo};
pub use runner::JobRunner;
