//! Pipeline configuration
//!
//! All paths, the result TTL and the worker command are resolved once at the
//! outermost assembly point (the binary or a test) and handed to each
//! component by value. Resolution order is: built-in defaults, then an
//! optional TOML file, then `BIOCLUST_*` environment variables.

use crate::error::{ErrorCode, PipelineError, Result};
use crate::results::ResultLayout;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming an optional TOML configuration file
pub const CONFIG_PATH_ENV: &str = "BIOCLUST_CONFIG";

/// How the validity lookup treats a record whose expiry timestamp has passed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpiryPolicy {
    /// Expiry is metadata for an external reaper; presence alone means valid
    #[default]
    Declarative,
    /// An expired record reports as invalid even while still on disk
    Enforce,
}

/// External worker command configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Executable to launch
    #[serde(default = "default_worker_program")]
    pub program: String,

    /// Script passed as the first argument, ahead of the five positional
    /// parameters. Empty means the program is the worker itself.
    #[serde(
        default = "default_worker_script",
        deserialize_with = "empty_path_as_none",
        serialize_with = "none_as_empty_path"
    )]
    pub script: Option<PathBuf>,

    /// Upper bound on a single worker run
    #[serde(with = "humantime_serde", default = "default_worker_timeout")]
    pub timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            program: default_worker_program(),
            script: default_worker_script(),
            timeout: default_worker_timeout(),
        }
    }
}

/// Main pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Result records and staged uploads
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,

    /// Scratch base handed to the worker as its fifth argument
    #[serde(default = "default_storage_dir")]
    pub worker_scratch_dir: PathBuf,

    /// Directory under the scratch base the worker writes per-result output into
    #[serde(default = "default_worker_output_subdir")]
    pub worker_output_subdir: String,

    /// Predefined datasets, looked up as `<name>.txt`
    #[serde(default = "default_datasets_dir")]
    pub datasets_dir: PathBuf,

    /// Large tab-delimited relation table joined against cluster output
    #[serde(default = "default_reference_table")]
    pub reference_table: PathBuf,

    /// Lifetime written into each result record
    #[serde(with = "humantime_serde", default = "default_result_ttl")]
    pub result_ttl: Duration,

    #[serde(default)]
    pub expiry_policy: ExpiryPolicy,

    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default)]
    pub worker: WorkerConfig,
}

// Default value functions for serde
fn default_storage_dir() -> PathBuf {
    PathBuf::from("tmp")
}

fn default_worker_output_subdir() -> String {
    "toden_e_py_outputs".to_string()
}

fn default_datasets_dir() -> PathBuf {
    PathBuf::from("python_scripts").join("data")
}

fn default_reference_table() -> PathBuf {
    PathBuf::from("go_metadata").join("m_type_biological_process.txt")
}

fn default_result_ttl() -> Duration {
    Duration::from_secs(30 * 60)
}

fn default_worker_program() -> String {
    "python3".to_string()
}

fn default_worker_script() -> Option<PathBuf> {
    Some(PathBuf::from("python_scripts").join("runner.py"))
}

/// TOML has no null: an empty string disables the script
fn empty_path_as_none<'de, D>(deserializer: D) -> std::result::Result<Option<PathBuf>, D::Error>
where
    D: Deserializer<'de>,
{
    let path = Option::<PathBuf>::deserialize(deserializer)?;
    Ok(path.filter(|p| !p.as_os_str().is_empty()))
}

fn none_as_empty_path<S>(path: &Option<PathBuf>, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match path {
        Some(path) => path.serialize(serializer),
        None => serializer.serialize_str(""),
    }
}

fn default_worker_timeout() -> Duration {
    Duration::from_secs(10 * 60)
}

fn default_bind_addr() -> String {
    "127.0.0.1:3000".to_string()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            worker_scratch_dir: default_storage_dir(),
            worker_output_subdir: default_worker_output_subdir(),
            datasets_dir: default_datasets_dir(),
            reference_table: default_reference_table(),
            result_ttl: default_result_ttl(),
            expiry_policy: ExpiryPolicy::default(),
            worker: WorkerConfig::default(),
            bind_addr: default_bind_addr(),
        }
    }
}

impl PipelineConfig {
    /// Resolve the configuration: defaults, optional file, then environment.
    ///
    /// An explicit `path` wins over `BIOCLUST_CONFIG`.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        let from_env = std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from);
        let mut config = match path.map(Path::to_path_buf).or(from_env) {
            Some(file) => Self::from_file(&file)?,
            None => Self::default(),
        };
        config.merge_env_vars();
        Ok(config)
    }

    /// Load a TOML configuration file; absent keys take their defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::config_with_code(
                ErrorCode::CONFIG_NOT_FOUND,
                format!("cannot read {}", path.display()),
            )
            .with_source(e)
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            PipelineError::config_with_code(ErrorCode::CONFIG_PARSE_ERROR, "invalid TOML")
                .with_source(e)
        })
    }

    /// Apply `BIOCLUST_*` overrides from the process environment
    pub fn merge_env_vars(&mut self) {
        self.merge_env_with(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup
    pub fn merge_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("BIOCLUST_STORAGE_DIR") {
            self.storage_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("BIOCLUST_WORKER_SCRATCH_DIR") {
            self.worker_scratch_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("BIOCLUST_DATASETS_DIR") {
            self.datasets_dir = PathBuf::from(dir);
        }
        if let Some(table) = lookup("BIOCLUST_REFERENCE_TABLE") {
            self.reference_table = PathBuf::from(table);
        }
        if let Some(program) = lookup("BIOCLUST_WORKER_PROGRAM") {
            self.worker.program = program;
        }
        if let Some(script) = lookup("BIOCLUST_WORKER_SCRIPT") {
            self.worker.script = if script.is_empty() {
                None
            } else {
                Some(PathBuf::from(script))
            };
        }
        if let Some(addr) = lookup("BIOCLUST_BIND_ADDR") {
            self.bind_addr = addr;
        }
    }

    /// Key-to-path mapping derived from this configuration
    pub fn layout(&self) -> ResultLayout {
        ResultLayout::new(
            self.storage_dir.clone(),
            self.worker_scratch_dir.clone(),
            self.worker_output_subdir.clone(),
        )
    }
}
