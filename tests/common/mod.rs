//! Shared fixtures for pipeline integration tests

#![allow(dead_code)]

use bioclust::config::{ExpiryPolicy, WorkerConfig};
use bioclust::PipelineConfig;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

/// Worker stand-in: writes a cluster table where the real worker would and
/// prints diagnostics before the result line.
pub const WORKER_SCRIPT: &str = r#"#!/bin/sh
out="$5/outputs/$4"
mkdir -p "$out"
echo "reading $1"
echo "warming up" >&2
printf 'cluster,members\nc1,"GS_1,GS_2"\nc2,GS_3\n' > "$out/clusters_$4.csv"
printf '{"result":{"alpha":"%s","clusters":%s}}\n' "$2" "$3"
"#;

/// Worker that exits non-zero without printing anything on stdout
pub const FAILING_WORKER_SCRIPT: &str = "#!/bin/sh\necho 'ImportError: numpy' >&2\nexit 1\n";

pub const REFERENCE_TABLE: &str = "GS_A\tGS_B\tc2\tc3\tc4\tc5\tSIM\n\
GS_1\tGS_2\t.\t.\t.\t.\t0.8\n\
GS_1\tGS_4\t.\t.\t.\t.\t0.7\n\
GS_3\tGS_2\t.\t.\t.\t.\t0.6\n";

pub struct PipelineFixture {
    pub dir: TempDir,
}

impl PipelineFixture {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("datasets")).unwrap();
        std::fs::write(
            dir.path().join("datasets").join("sampleA.txt"),
            "GS_1\tGS_2\tGS_3\n",
        )
        .unwrap();
        let fixture = Self { dir };
        fixture.set_worker(WORKER_SCRIPT);
        fixture
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn set_worker(&self, script: &str) {
        std::fs::write(self.worker_path(), script).unwrap();
    }

    pub fn with_reference_table(self) -> Self {
        std::fs::write(self.reference_path(), REFERENCE_TABLE).unwrap();
        self
    }

    pub fn worker_path(&self) -> PathBuf {
        self.path().join("worker.sh")
    }

    pub fn reference_path(&self) -> PathBuf {
        self.path().join("reference.tsv")
    }

    pub fn storage_dir(&self) -> PathBuf {
        self.path().join("store")
    }

    pub fn config(&self) -> PipelineConfig {
        PipelineConfig {
            storage_dir: self.storage_dir(),
            worker_scratch_dir: self.path().join("scratch"),
            worker_output_subdir: "outputs".to_string(),
            datasets_dir: self.path().join("datasets"),
            reference_table: self.reference_path(),
            result_ttl: Duration::from_secs(30 * 60),
            expiry_policy: ExpiryPolicy::Declarative,
            worker: WorkerConfig {
                program: "sh".to_string(),
                script: Some(self.worker_path()),
                timeout: Duration::from_secs(30),
            },
            bind_addr: "127.0.0.1:0".to_string(),
        }
    }

    /// Write the fixture configuration as a TOML file for the binary
    pub fn write_config_file(&self) -> PathBuf {
        let path = self.path().join("bioclust.toml");
        std::fs::write(&path, toml::to_string(&self.config()).unwrap()).unwrap();
        path
    }

    /// `BIOCLUST_*` variables pointing the binary at this fixture
    pub fn env(&self) -> Vec<(&'static str, String)> {
        let config = self.config();
        vec![
            ("BIOCLUST_STORAGE_DIR", path_str(&config.storage_dir)),
            (
                "BIOCLUST_WORKER_SCRATCH_DIR",
                path_str(&config.worker_scratch_dir),
            ),
            ("BIOCLUST_DATASETS_DIR", path_str(&config.datasets_dir)),
            ("BIOCLUST_REFERENCE_TABLE", path_str(&config.reference_table)),
            ("BIOCLUST_WORKER_PROGRAM", "sh".to_string()),
            ("BIOCLUST_WORKER_SCRIPT", path_str(&self.worker_path())),
        ]
    }
}

fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
