use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;

use super::error::ProcessError;

#[derive(Debug, Clone)]
pub struct ProcessCommand {
    pub program: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub timeout: Option<Duration>,
}

impl ProcessCommand {
    /// Render the command line for logs
    pub fn display(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    Error(i32),
    Signal(i32),
}

impl ExitStatus {
    pub fn success(&self) -> bool {
        matches!(self, ExitStatus::Success)
    }

    pub fn code(&self) -> Option<i32> {
        match self {
            ExitStatus::Success => Some(0),
            ExitStatus::Error(code) => Some(*code),
            ExitStatus::Signal(_) => None,
        }
    }
}

#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run a command to completion, capturing both output streams.
    async fn run(&self, command: ProcessCommand) -> Result<ProcessOutput, ProcessError>;
}

/// Runs commands as tokio child processes.
///
/// Standard output and standard error are drained by two independent tasks
/// while the caller waits on the exit status, so a child that writes a lot
/// of diagnostics before its final line never blocks on a full pipe.
pub struct TokioProcessRunner;

type DrainHandle = JoinHandle<std::io::Result<Vec<u8>>>;

impl TokioProcessRunner {
    fn spawn_drain<R>(mut reader: R) -> DrainHandle
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        tokio::spawn(async move {
            let mut buf = Vec::new();
            reader.read_to_end(&mut buf).await?;
            Ok(buf)
        })
    }

    async fn collect_drain(handle: DrainHandle) -> Result<String, ProcessError> {
        let bytes = handle
            .await
            .map_err(|e| ProcessError::InternalError {
                message: format!("output drain task failed: {}", e),
            })??;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Extract a stream from a child process, converting None to error
    fn extract_stream<T>(stream: Option<T>, stream_name: &str) -> Result<T, ProcessError> {
        stream.ok_or_else(|| ProcessError::InternalError {
            message: format!("Failed to capture {}", stream_name),
        })
    }

    fn configure_command(command: &ProcessCommand) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&command.program);

        #[cfg(unix)]
        {
            // Worker leads its own group so a timeout can signal all of it
            cmd.process_group(0);
        }

        cmd.args(&command.args)
            .envs(&command.env)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    /// Map spawn error to ProcessError
    fn map_spawn_error(error: std::io::Error, command: &ProcessCommand) -> ProcessError {
        tracing::error!(
            "Failed to spawn '{}': {:?} (kind: {:?})",
            command.program,
            error,
            error.kind()
        );
        if error.kind() == std::io::ErrorKind::NotFound {
            ProcessError::CommandNotFound(command.program.clone())
        } else {
            ProcessError::SpawnFailed {
                command: command.display(),
                source: error,
            }
        }
    }

    /// Convert process exit status to our ExitStatus enum
    fn parse_exit_status(status: std::process::ExitStatus) -> ExitStatus {
        if status.success() {
            ExitStatus::Success
        } else if let Some(code) = status.code() {
            ExitStatus::Error(code)
        } else {
            Self::parse_signal_status(status)
        }
    }

    #[cfg(unix)]
    fn parse_signal_status(status: std::process::ExitStatus) -> ExitStatus {
        use std::os::unix::process::ExitStatusExt;
        match status.signal() {
            Some(signal) => ExitStatus::Signal(signal),
            None => ExitStatus::Error(1),
        }
    }

    #[cfg(not(unix))]
    fn parse_signal_status(_status: std::process::ExitStatus) -> ExitStatus {
        ExitStatus::Error(1)
    }

    /// Terminate the child and every process in its group
    async fn kill_process_group(child: &mut tokio::process::Child, group: Option<u32>) {
        #[cfg(unix)]
        {
            if let Some(pid) = group {
                use nix::sys::signal::{self, Signal};
                use nix::unistd::Pid;

                let pgid = Pid::from_raw(-(pid as i32));
                let _ = signal::kill(pgid, Signal::SIGTERM);
                tokio::time::sleep(Duration::from_millis(100)).await;
                // Descendants may ignore SIGTERM; the group is gone (ESRCH) if they did not
                let _ = signal::kill(pgid, Signal::SIGKILL);
            }
        }
        #[cfg(not(unix))]
        let _ = group;

        if let Err(e) = child.start_kill() {
            tracing::debug!("Child already gone when killing: {}", e);
        }
        let _ = child.wait().await;
    }

    fn log_result(result: &ProcessOutput, command: &ProcessCommand) {
        match &result.status {
            ExitStatus::Success => {
                tracing::debug!(
                    "Subprocess completed successfully in {:?}: {}",
                    result.duration,
                    command.program
                );
            }
            ExitStatus::Error(code) => {
                tracing::debug!(
                    "Subprocess failed with exit code {} in {:?}: {}",
                    code,
                    result.duration,
                    command.program
                );
            }
            ExitStatus::Signal(signal) => {
                tracing::warn!(
                    "Subprocess terminated by signal {} in {:?}: {}",
                    signal,
                    result.duration,
                    command.program
                );
            }
        }
        tracing::trace!(
            "Stdout length: {} bytes, stderr length: {} bytes",
            result.stdout.len(),
            result.stderr.len()
        );
    }
}

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(&self, command: ProcessCommand) -> Result<ProcessOutput, ProcessError> {
        let start = Instant::now();
        tracing::debug!("Executing subprocess: {}", command.display());

        let mut child = Self::configure_command(&command)
            .spawn()
            .map_err(|e| Self::map_spawn_error(e, &command))?;

        // The group id equals the child pid; it outlives the child itself
        // while any descendant still holds it.
        let group = child.id();

        let stdout = Self::spawn_drain(Self::extract_stream(child.stdout.take(), "stdout")?);
        let stderr = Self::spawn_drain(Self::extract_stream(child.stderr.take(), "stderr")?);
        let drains = [stdout.abort_handle(), stderr.abort_handle()];

        // One deadline covers the exit and both streams reaching EOF: a
        // descendant holding a pipe open keeps the run alive past the child.
        let completion = async {
            let status = child.wait().await;
            let stdout = Self::collect_drain(stdout).await;
            let stderr = Self::collect_drain(stderr).await;
            (status, stdout, stderr)
        };
        let finished = match command.timeout {
            Some(limit) => tokio::time::timeout(limit, completion).await.ok(),
            None => Some(completion.await),
        };

        let Some((status, stdout, stderr)) = finished else {
            let limit = command.timeout.unwrap_or_default();
            tracing::warn!(
                "Subprocess timed out after {:?}, killing process group: {}",
                limit,
                command.program
            );
            Self::kill_process_group(&mut child, group).await;
            for drain in drains {
                drain.abort();
            }
            return Err(ProcessError::Timeout(limit));
        };

        let result = ProcessOutput {
            status: Self::parse_exit_status(status?),
            stdout: stdout?,
            stderr: stderr?,
            duration: start.elapsed(),
        };
        Self::log_result(&result, &command);

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subprocess::ProcessCommandBuilder;

    fn sh(script: &str) -> ProcessCommand {
        ProcessCommandBuilder::new("sh").arg("-c").arg(script).build()
    }

    #[test]
    fn test_extract_stream_with_none() {
        let value: Option<i32> = None;
        let result = TokioProcessRunner::extract_stream(value, "test_stream");
        match result.unwrap_err() {
            ProcessError::InternalError { message } => {
                assert_eq!(message, "Failed to capture test_stream");
            }
            _ => panic!("Expected InternalError"),
        }
    }

    #[test]
    fn test_convert_exit_status() {
        use std::os::unix::process::ExitStatusExt;

        let status = std::process::ExitStatus::from_raw(0);
        assert_eq!(
            TokioProcessRunner::parse_exit_status(status),
            ExitStatus::Success
        );

        // Exit code 1
        let status = std::process::ExitStatus::from_raw(256);
        assert_eq!(
            TokioProcessRunner::parse_exit_status(status),
            ExitStatus::Error(1)
        );

        // SIGKILL
        let status = std::process::ExitStatus::from_raw(9);
        assert_eq!(
            TokioProcessRunner::parse_exit_status(status),
            ExitStatus::Signal(9)
        );
    }

    #[tokio::test]
    async fn test_captures_both_streams() {
        let output = TokioProcessRunner
            .run(sh("echo out; echo err >&2; exit 3"))
            .await
            .unwrap();
        assert_eq!(output.status, ExitStatus::Error(3));
        assert_eq!(output.stdout, "out\n");
        assert_eq!(output.stderr, "err\n");
    }

    #[tokio::test]
    async fn test_large_stderr_does_not_block() {
        // Well past a pipe buffer on every platform we run on
        let script = "i=0; while [ $i -lt 20000 ]; do echo diagnostic-line-$i >&2; i=$((i+1)); done; echo done";
        let output = TokioProcessRunner.run(sh(script)).await.unwrap();
        assert!(output.status.success());
        assert_eq!(output.stdout.trim(), "done");
        assert!(output.stderr.len() > 200_000);
    }

    #[tokio::test]
    async fn test_command_not_found() {
        let result = TokioProcessRunner
            .run(ProcessCommandBuilder::new("nonexistent_command_12345").build())
            .await;
        assert!(matches!(result, Err(ProcessError::CommandNotFound(_))));
    }

    #[tokio::test]
    async fn test_timeout_kills_child() {
        let command = ProcessCommandBuilder::new("sleep")
            .arg("5")
            .timeout(Duration::from_millis(100))
            .build();
        let start = Instant::now();
        let result = TokioProcessRunner.run(command).await;
        assert!(matches!(result, Err(ProcessError::Timeout(_))));
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_timeout_covers_lingering_descendant() {
        // The child prints its result and exits, but a background job keeps stdout open
        let command = ProcessCommandBuilder::new("sh")
            .arg("-c")
            .arg("sleep 4 & echo '{\"result\":1}'")
            .timeout(Duration::from_secs(1))
            .build();
        let start = Instant::now();
        let result = TokioProcessRunner.run(command).await;
        assert!(matches!(result, Err(ProcessError::Timeout(_))));
        assert!(start.elapsed() < Duration::from_secs(3));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_process_group() {
        let dir = tempfile::TempDir::new().unwrap();
        let marker = dir.path().join("survived");
        // The descendant would create the marker if it outlived the kill
        let script = format!(
            "(sleep 2; touch {}) & sleep 10",
            marker.display()
        );
        let command = ProcessCommandBuilder::new("sh")
            .arg("-c")
            .arg(&script)
            .timeout(Duration::from_millis(300))
            .build();
        let result = TokioProcessRunner.run(command).await;
        assert!(matches!(result, Err(ProcessError::Timeout(_))));

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn test_env_is_passed() {
        let command = ProcessCommandBuilder::new("sh")
            .arg("-c")
            .arg("printf %s \"$BIOCLUST_TEST_VAR\"")
            .env("BIOCLUST_TEST_VAR", "present")
            .build();
        let output = TokioProcessRunner.run(command).await.unwrap();
        assert_eq!(output.stdout, "present");
    }
}
