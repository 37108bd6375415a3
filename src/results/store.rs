use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{is_clean_identifier, ResultId, ResultLayout, ResultRecord};
use crate::config::{ExpiryPolicy, PipelineConfig};
use crate::error::{ErrorCode, PipelineError, Result};

/// Where the worker's input table comes from
#[derive(Debug, Clone)]
pub enum InputSource {
    /// Raw bytes uploaded by the caller
    Upload { filename: String, bytes: Vec<u8> },
    /// Name of a dataset shipped with the service
    Dataset { name: String },
}

/// Input table ready for the worker
#[derive(Debug, Clone)]
pub struct StagedInput {
    pub path: PathBuf,
    /// Human-facing descriptor stored as `requestedInput`
    pub descriptor: String,
    owned: bool,
}

impl StagedInput {
    /// Remove a staged upload. Predefined datasets are left alone.
    pub async fn cleanup(&self) {
        if !self.owned {
            return;
        }
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => debug!("Removed staged input {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                "Failed to remove staged input {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}

/// Outcome of a validity lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validity {
    Valid,
    /// Never issued, already reaped, or unreadable
    Unknown,
    /// Still on disk but past its expiry under [`ExpiryPolicy::Enforce`]
    Expired,
    /// Rejected by the identifier gate before any storage access
    Malformed,
}

impl Validity {
    pub fn is_valid(self) -> bool {
        matches!(self, Validity::Valid)
    }
}

/// Sole reader and writer of the storage area keyed by result identifier
#[derive(Debug, Clone)]
pub struct ResultStore {
    layout: ResultLayout,
    datasets_dir: PathBuf,
    ttl: Duration,
    expiry_policy: ExpiryPolicy,
}

impl ResultStore {
    pub fn new(
        layout: ResultLayout,
        datasets_dir: PathBuf,
        ttl: Duration,
        expiry_policy: ExpiryPolicy,
    ) -> Self {
        Self {
            layout,
            datasets_dir,
            ttl,
            expiry_policy,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            config.layout(),
            config.datasets_dir.clone(),
            config.result_ttl,
            config.expiry_policy,
        )
    }

    pub fn layout(&self) -> &ResultLayout {
        &self.layout
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Make the worker input available on disk
    pub async fn stage_input(&self, id: &ResultId, source: InputSource) -> Result<StagedInput> {
        match source {
            InputSource::Upload { filename, bytes } => {
                let path = self.layout.staged_upload_path(id, &filename);
                ensure_dir(self.layout.storage_dir()).await;
                tokio::fs::write(&path, &bytes).await.map_err(|e| {
                    PipelineError::persistence(
                        ErrorCode::STORAGE_IO_ERROR,
                        "failed to stage uploaded input",
                        Some(path.clone()),
                    )
                    .with_source(e)
                })?;
                info!(
                    result_id = %id,
                    "Uploaded file \"{}\" staged at {}",
                    filename,
                    path.display()
                );
                Ok(StagedInput {
                    path,
                    descriptor: filename,
                    owned: true,
                })
            }
            InputSource::Dataset { name } => {
                let descriptor = format!("{}.txt", name);
                if !is_clean_identifier(&name) {
                    return Err(PipelineError::validation(
                        ErrorCode::VALIDATION_INPUT_SOURCE,
                        "file",
                        "Invalid dataset name.",
                    ));
                }
                let path = self.datasets_dir.join(&descriptor);
                match tokio::fs::try_exists(&path).await {
                    Ok(true) => {}
                    _ => return Err(PipelineError::input_not_found(descriptor)),
                }
                debug!(result_id = %id, "Using predefined dataset {}", path.display());
                Ok(StagedInput {
                    path,
                    descriptor,
                    owned: false,
                })
            }
        }
    }

    /// Write the record to `<storage>/<id>.json`.
    ///
    /// The file appears under its final name only once fully written.
    pub async fn persist(&self, record: &ResultRecord) -> Result<PathBuf> {
        let path = self.layout.record_path(&record.id);
        let partial = path.with_extension("json.partial");

        let body = serde_json::to_vec_pretty(record).map_err(|e| {
            PipelineError::persistence(
                ErrorCode::STORAGE_SERIALIZATION_ERROR,
                "failed to serialize result record",
                None,
            )
            .with_source(e)
        })?;

        ensure_dir(self.layout.storage_dir()).await;
        let write = async {
            tokio::fs::write(&partial, &body).await?;
            tokio::fs::rename(&partial, &path).await
        };
        if let Err(e) = write.await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(PipelineError::persistence(
                ErrorCode::STORAGE_IO_ERROR,
                "failed to write result record",
                Some(path),
            )
            .with_source(e));
        }

        info!(result_id = %record.id, "Result record stored at {}", path.display());
        Ok(path)
    }

    /// Boolean validity for an externally supplied identifier
    pub async fn check_valid(&self, candidate: &str) -> bool {
        self.lookup(candidate).await.is_valid()
    }

    pub async fn lookup(&self, candidate: &str) -> Validity {
        self.lookup_at(candidate, Utc::now()).await
    }

    /// Validity as of `now`. Never fails: absence is an expected answer.
    pub async fn lookup_at(&self, candidate: &str, now: DateTime<Utc>) -> Validity {
        let Some(path) = self.layout.record_path_for(candidate) else {
            debug!("Rejected malformed result identifier");
            return Validity::Malformed;
        };

        match self.expiry_policy {
            ExpiryPolicy::Declarative => match tokio::fs::try_exists(&path).await {
                Ok(true) => Validity::Valid,
                Ok(false) => Validity::Unknown,
                Err(e) => {
                    warn!("Could not check {}: {}", path.display(), e);
                    Validity::Unknown
                }
            },
            ExpiryPolicy::Enforce => match read_record(&path).await {
                Ok(record) if record.is_expired_at(now) => Validity::Expired,
                Ok(_) => Validity::Valid,
                Err(PipelineError::Persistence { source, .. }) => {
                    if let Some(source) = source {
                        debug!("Record {} unreadable: {}", path.display(), source);
                    }
                    Validity::Unknown
                }
                Err(_) => Validity::Unknown,
            },
        }
    }
}

async fn read_record(path: &Path) -> Result<ResultRecord> {
    let bytes = tokio::fs::read(path).await.map_err(|e| {
        PipelineError::persistence(
            ErrorCode::STORAGE_IO_ERROR,
            "failed to read result record",
            Some(path.to_path_buf()),
        )
        .with_source(e)
    })?;
    serde_json::from_slice(&bytes).map_err(|e| {
        PipelineError::persistence(
            ErrorCode::STORAGE_SERIALIZATION_ERROR,
            "corrupt result record",
            Some(path.to_path_buf()),
        )
        .with_source(e)
    })
}

/// Best-effort directory bootstrap; a real failure shows up on the write
async fn ensure_dir(dir: &Path) {
    if let Err(e) = tokio::fs::create_dir_all(dir).await {
        warn!("Could not create directory {}: {}", dir.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::{JoinGeneration, RequestParams};
    use serde_json::json;
    use tempfile::TempDir;

    fn store(dir: &TempDir, policy: ExpiryPolicy) -> ResultStore {
        let layout = ResultLayout::new(
            dir.path().join("store"),
            dir.path().join("scratch"),
            "outputs".to_string(),
        );
        ResultStore::new(
            layout,
            dir.path().join("datasets"),
            Duration::from_secs(1800),
            policy,
        )
    }

    fn record(id: ResultId, generated_at: DateTime<Utc>) -> ResultRecord {
        ResultRecord::new(
            id,
            "sampleA.txt".to_string(),
            RequestParams {
                alpha: "0.5".to_string(),
                clusters: "3".to_string(),
            },
            json!({"k": 1}),
            JoinGeneration::failed_or_skipped(),
            generated_at,
            Duration::from_secs(1800),
        )
    }

    #[tokio::test]
    async fn test_stage_upload_sanitizes_name() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, ExpiryPolicy::Declarative);
        let id = ResultId::generate();

        let staged = store
            .stage_input(
                &id,
                InputSource::Upload {
                    filename: "my pags/v1.txt".to_string(),
                    bytes: b"GS1\tGS2\n".to_vec(),
                },
            )
            .await
            .unwrap();

        assert_eq!(staged.descriptor, "my pags/v1.txt");
        assert_eq!(
            staged.path.file_name().unwrap().to_str().unwrap(),
            format!("{}_input_my_pags_v1.txt", id)
        );
        assert_eq!(std::fs::read(&staged.path).unwrap(), b"GS1\tGS2\n");

        staged.cleanup().await;
        assert!(!staged.path.exists());
    }

    #[tokio::test]
    async fn test_stage_dataset_requires_existing_file() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, ExpiryPolicy::Declarative);
        let id = ResultId::generate();

        let err = store
            .stage_input(
                &id,
                InputSource::Dataset {
                    name: "sampleA".to_string(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::InputNotFound { ref descriptor, .. } if descriptor == "sampleA.txt"
        ));

        std::fs::create_dir_all(dir.path().join("datasets")).unwrap();
        std::fs::write(dir.path().join("datasets/sampleA.txt"), "x").unwrap();
        let staged = store
            .stage_input(
                &id,
                InputSource::Dataset {
                    name: "sampleA".to_string(),
                },
            )
            .await
            .unwrap();
        assert_eq!(staged.descriptor, "sampleA.txt");

        // Datasets survive cleanup
        staged.cleanup().await;
        assert!(staged.path.exists());
    }

    #[tokio::test]
    async fn test_stage_dataset_rejects_traversal() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, ExpiryPolicy::Declarative);
        let err = store
            .stage_input(
                &ResultId::generate(),
                InputSource::Dataset {
                    name: "../../etc/passwd".to_string(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_persist_then_lookup() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, ExpiryPolicy::Declarative);
        let id = ResultId::generate();

        let path = store.persist(&record(id.clone(), Utc::now())).await.unwrap();
        assert_eq!(path, store.layout().record_path(&id));
        assert!(!path.with_extension("json.partial").exists());

        assert!(store.check_valid(id.as_str()).await);
        assert!(!store.check_valid(ResultId::generate().as_str()).await);
        assert_eq!(read_record(&path).await.unwrap().id, id);
    }

    #[tokio::test]
    async fn test_malformed_ids_never_touch_storage() {
        let dir = TempDir::new().unwrap();
        // Storage dir does not even exist
        let store = store(&dir, ExpiryPolicy::Enforce);
        assert_eq!(store.lookup("../etc/passwd").await, Validity::Malformed);
        assert_eq!(store.lookup("a/b").await, Validity::Malformed);
        assert!(!dir.path().join("store").exists());
    }

    #[tokio::test]
    async fn test_declarative_policy_ignores_expiry() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, ExpiryPolicy::Declarative);
        let id = ResultId::generate();
        let long_ago = Utc::now() - chrono::Duration::days(2);
        store.persist(&record(id.clone(), long_ago)).await.unwrap();

        assert_eq!(store.lookup(id.as_str()).await, Validity::Valid);
    }

    #[tokio::test]
    async fn test_enforce_policy_reports_expired() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, ExpiryPolicy::Enforce);
        let id = ResultId::generate();
        let generated_at = Utc::now();
        store.persist(&record(id.clone(), generated_at)).await.unwrap();

        assert_eq!(
            store.lookup_at(id.as_str(), generated_at).await,
            Validity::Valid
        );
        let later = generated_at + chrono::Duration::minutes(31);
        assert_eq!(
            store.lookup_at(id.as_str(), later).await,
            Validity::Expired
        );
    }

    #[tokio::test]
    async fn test_enforce_policy_treats_corrupt_record_as_unknown() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, ExpiryPolicy::Enforce);
        std::fs::create_dir_all(dir.path().join("store")).unwrap();
        std::fs::write(dir.path().join("store/broken.json"), "{not json").unwrap();

        assert_eq!(store.lookup("broken").await, Validity::Unknown);
    }
}
