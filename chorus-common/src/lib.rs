//! # Chorus Common Library
//!
//! Shared code for the chorus job orchestrator and clip service:
//! - Configuration loading and root folder resolution
//! - Logging initialisation
//! - Job status data model and status-artifact I/O
//! - Common error type

pub mod config;
pub mod error;
pub mod logging;
pub mod status;

pub use error::{Error, Result};
pub use status::{JobKind, JobState, JobStatus};
