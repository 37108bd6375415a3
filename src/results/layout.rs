use std::path::{Path, PathBuf};

use super::ResultId;

/// True when `candidate` can be used as a single path component.
///
/// Rejects empty strings, path separators and parent-directory sequences.
pub fn is_clean_identifier(candidate: &str) -> bool {
    !candidate.trim().is_empty()
        && !candidate.contains('/')
        && !candidate.contains('\\')
        && !candidate.contains("..")
}

/// Replace every character outside `[A-Za-z0-9._-]` with an underscore
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Key-to-path mapping for everything stored under a result identifier
#[derive(Debug, Clone)]
pub struct ResultLayout {
    storage_dir: PathBuf,
    worker_scratch_dir: PathBuf,
    worker_output_subdir: String,
}

impl ResultLayout {
    pub fn new(
        storage_dir: PathBuf,
        worker_scratch_dir: PathBuf,
        worker_output_subdir: String,
    ) -> Self {
        Self {
            storage_dir,
            worker_scratch_dir,
            worker_output_subdir,
        }
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    /// Base directory handed to the worker
    pub fn worker_scratch_dir(&self) -> &Path {
        &self.worker_scratch_dir
    }

    /// `<storage>/<id>.json`
    pub fn record_path(&self, id: &ResultId) -> PathBuf {
        self.record_path_unchecked(id.as_str())
    }

    /// Record path for an externally supplied identifier, `None` when the
    /// identifier could escape the storage directory.
    pub fn record_path_for(&self, candidate: &str) -> Option<PathBuf> {
        is_clean_identifier(candidate).then(|| self.record_path_unchecked(candidate))
    }

    fn record_path_unchecked(&self, id: &str) -> PathBuf {
        self.storage_dir.join(format!("{}.json", id))
    }

    /// `<storage>/<id>_input_<sanitized name>`
    pub fn staged_upload_path(&self, id: &ResultId, original_name: &str) -> PathBuf {
        self.storage_dir
            .join(format!("{}_input_{}", id, sanitize_filename(original_name)))
    }

    /// `<scratch>/<subdir>/<id>`
    pub fn worker_output_dir(&self, id: &ResultId) -> PathBuf {
        self.worker_scratch_dir
            .join(&self.worker_output_subdir)
            .join(id.as_str())
    }

    /// Cluster table the worker leaves behind on success
    pub fn cluster_table_path(&self, id: &ResultId) -> PathBuf {
        self.worker_output_dir(id)
            .join(format!("clusters_{}.csv", id))
    }

    /// Derived relation table written by the join stage
    pub fn derived_table_path(&self, id: &ResultId) -> PathBuf {
        self.worker_output_dir(id).join(format!("data_{}.csv", id))
    }

    /// Derived table location relative to the scratch base, as recorded
    pub fn derived_table_relative(&self, id: &ResultId) -> String {
        format!("{}/{}/data_{}.csv", self.worker_output_subdir, id, id)
    }
}
