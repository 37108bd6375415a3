//! Worker invocation
//!
//! The clustering computation runs in an external process. It receives five
//! positional arguments (input table, alpha, cluster count, result id,
//! scratch base) and writes its structured result as the last line of
//! standard output. On success it also leaves a cluster table under the
//! scratch base, at the location [`crate::results::ResultLayout`] computes.

pub mod protocol;

pub use protocol::{parse_reply, WorkerReply};

use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::WorkerConfig;
use crate::error::{ErrorCode, PipelineError, Result};
use crate::results::ResultId;
use crate::subprocess::{ExitStatus, ProcessCommand, ProcessCommandBuilder, ProcessRunner};

/// Successful worker outcome
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerOutput {
    /// Opaque prediction payload
    pub result: Value,
}

/// Arguments for one worker run
#[derive(Debug, Clone, Copy)]
pub struct WorkerArgs<'a> {
    pub input_path: &'a Path,
    pub alpha: &'a str,
    pub clusters: &'a str,
    pub result_id: &'a ResultId,
    pub scratch_base: &'a Path,
}

pub struct WorkerInvoker {
    runner: Arc<dyn ProcessRunner>,
    config: WorkerConfig,
}

impl WorkerInvoker {
    pub fn new(runner: Arc<dyn ProcessRunner>, config: WorkerConfig) -> Self {
        Self { runner, config }
    }

    fn build_command(&self, args: &WorkerArgs<'_>) -> ProcessCommand {
        let mut builder = ProcessCommandBuilder::new(&self.config.program);
        if let Some(script) = &self.config.script {
            builder = builder.arg(&script.to_string_lossy());
        }
        builder
            .arg(&args.input_path.to_string_lossy())
            .arg(args.alpha)
            .arg(args.clusters)
            .arg(args.result_id.as_str())
            .arg(&args.scratch_base.to_string_lossy())
            .timeout(self.config.timeout)
            .build()
    }

    /// Run the worker once. There are no retries at this layer.
    pub async fn invoke(&self, args: WorkerArgs<'_>) -> Result<WorkerOutput> {
        let command = self.build_command(&args);
        info!(result_id = %args.result_id, "Invoking worker: {}", command.display());

        let output = self.runner.run(command).await?;

        if !output.stderr.trim().is_empty() {
            warn!(result_id = %args.result_id, "Worker stderr: {}", output.stderr.trim());
        }

        if !output.status.success() && output.stdout.trim().is_empty() {
            let (code, exit_code) = match output.status {
                ExitStatus::Signal(_) => (ErrorCode::EXEC_SIGNAL_RECEIVED, None),
                ref status => (ErrorCode::EXEC_SUBPROCESS_FAILED, status.code()),
            };
            return Err(PipelineError::worker_execution(
                code,
                format!("worker exited with {:?} and no output", output.status),
                exit_code,
                output.stderr.trim(),
            ));
        }

        let (noise, _) = protocol::split_result_line(&output.stdout);
        for line in &noise {
            debug!(result_id = %args.result_id, "worker: {}", line);
        }

        match parse_reply(&output.stdout) {
            Ok(WorkerReply::Success { result }) => Ok(WorkerOutput { result }),
            Ok(WorkerReply::Failure { error }) => {
                warn!(result_id = %args.result_id, "Worker reported an error: {}", error);
                Err(PipelineError::worker_reported(error))
            }
            Err(violation) => Err(PipelineError::worker_protocol(
                violation,
                output.stdout.trim(),
            )),
        }
    }
}
