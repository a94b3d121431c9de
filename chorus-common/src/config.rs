//! Configuration loading and root folder resolution
//!
//! Bootstrap configuration comes from a TOML file. Individual values are
//! resolved in priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. OS-dependent compiled default (fallback)

use crate::status::JobKind;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "CHORUS_CONFIG";

/// Environment variable naming the jobs root folder
pub const ROOT_FOLDER_ENV_VAR: &str = "CHORUS_ROOT_FOLDER";

/// Bootstrap configuration loaded from `chorus.toml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Folder that holds one sub-directory per job
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_folder: Option<PathBuf>,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub jobs: JobsConfig,

    #[serde(default)]
    pub clips: ClipsConfig,
}

/// HTTP listener settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// How to invoke the worker executable for one job kind.
///
/// The orchestrator appends `--config <path>` to `args`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerSpec {
    pub program: PathBuf,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
}

impl WorkerSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Built-in worker for a job kind: the bundled Python scripts
    pub fn builtin(kind: JobKind) -> Self {
        let script = match kind {
            JobKind::Inference => "scripts/inference.py",
            JobKind::Training => "scripts/train_model.py",
            JobKind::Extraction => "scripts/extract_clips.py",
        };
        Self::new("python3").with_args([script])
    }
}

/// Job orchestration settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobsConfig {
    /// Time between graceful termination and forced kill
    #[serde(default = "default_kill_grace_ms")]
    pub kill_grace_ms: u64,

    /// Number of log lines quoted in the message of a failed job
    #[serde(default = "default_log_tail_lines")]
    pub log_tail_lines: usize,

    /// Worker executables keyed by job kind (`inference`, `training`, `extraction`)
    #[serde(default)]
    pub workers: BTreeMap<String, WorkerSpec>,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            kill_grace_ms: default_kill_grace_ms(),
            log_tail_lines: default_log_tail_lines(),
            workers: BTreeMap::new(),
        }
    }
}

impl JobsConfig {
    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }

    /// Configured worker for `kind`, or the built-in default
    pub fn worker_for(&self, kind: JobKind) -> WorkerSpec {
        self.workers
            .get(kind.as_str())
            .cloned()
            .unwrap_or_else(|| WorkerSpec::builtin(kind))
    }
}

/// Clip rendering service settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipsConfig {
    /// Maximum number of rendered clips kept in memory
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Render worker threads; `None` means a small multiple of the CPU count
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_threads: Option<usize>,
}

impl Default for ClipsConfig {
    fn default() -> Self {
        Self {
            cache_capacity: default_cache_capacity(),
            worker_threads: None,
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_kill_grace_ms() -> u64 {
    2000
}

fn default_log_tail_lines() -> usize {
    10
}

fn default_cache_capacity() -> usize {
    1000
}

/// Parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    let config = toml::from_str(&content)?;
    debug!("Loaded config from {}", path.display());
    Ok(config)
}

/// Load the bootstrap config.
///
/// An explicitly named file must exist. Without one, `CHORUS_CONFIG` and
/// then the platform default location are tried; if neither exists the
/// built-in defaults are returned.
pub fn load_config(explicit: Option<&Path>) -> Result<(TomlConfig, Option<PathBuf>)> {
    if let Some(path) = explicit {
        return Ok((load_toml_config(path)?, Some(path.to_path_buf())));
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        let path = PathBuf::from(path);
        return Ok((load_toml_config(&path)?, Some(path)));
    }

    match default_config_path() {
        Some(path) if path.exists() => Ok((load_toml_config(&path)?, Some(path))),
        _ => {
            info!("No config file found, using built-in defaults");
            Ok((TomlConfig::default(), None))
        }
    }
}

/// Write a TOML config file atomically (temp file + rename)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let tmp_path = path.with_extension("toml.tmp");
    std::fs::write(&tmp_path, content)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Platform config file location (`~/.config/chorus/chorus.toml` on Linux)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("chorus").join("chorus.toml"))
}

/// Resolve the jobs root folder: CLI, then `CHORUS_ROOT_FOLDER`, then TOML,
/// then the OS default.
pub fn resolve_root_folder(cli_arg: Option<&Path>, toml_config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV_VAR) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &toml_config.root_folder {
        return path.clone();
    }

    get_default_root_folder()
}

/// Get OS-dependent default root folder path
pub fn get_default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/chorus
        dirs::data_local_dir()
            .map(|d| d.join("chorus"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/chorus"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("chorus"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/chorus"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("chorus"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\chorus"))
    } else {
        PathBuf::from("./chorus_data")
    }
}
