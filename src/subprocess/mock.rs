use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::error::ProcessError;
use super::runner::{ExitStatus, ProcessCommand, ProcessOutput, ProcessRunner};

type ArgsMatcher = Box<dyn Fn(&[String]) -> bool + Send + Sync>;

/// Scripted stand-in for [`ProcessRunner`].
///
/// Each expectation names a program, optionally filters on its arguments and
/// describes what the fake worker prints. The first matching expectation
/// answers; a command nothing matches fails with
/// [`ProcessError::MockExpectationNotMet`].
#[derive(Clone, Default)]
pub struct MockProcessRunner {
    replies: Arc<Mutex<Vec<ScriptedReply>>>,
    calls: Arc<Mutex<Vec<ProcessCommand>>>,
}

struct ScriptedReply {
    program: String,
    matcher: Option<ArgsMatcher>,
    noise: Vec<String>,
    result_line: Option<String>,
    output: ProcessOutput,
    spawn_fails: bool,
}

impl ScriptedReply {
    fn matches(&self, command: &ProcessCommand) -> bool {
        self.program == command.program
            && self
                .matcher
                .as_ref()
                .map_or(true, |matcher| matcher(&command.args))
    }

    fn respond(&self) -> ProcessOutput {
        let mut output = self.output.clone();
        let mut stdout = String::new();
        for line in &self.noise {
            stdout.push_str(line);
            stdout.push('\n');
        }
        if let Some(line) = &self.result_line {
            stdout.push_str(line);
            stdout.push('\n');
        }
        stdout.push_str(&output.stdout);
        output.stdout = stdout;
        output
    }
}

/// Builder for one scripted reply; registered by [`MockCommandConfig::finish`]
pub struct MockCommandConfig {
    runner: MockProcessRunner,
    reply: ScriptedReply,
}

impl MockProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expect_command(&mut self, program: &str) -> MockCommandConfig {
        MockCommandConfig {
            runner: self.clone(),
            reply: ScriptedReply {
                program: program.to_string(),
                matcher: None,
                noise: Vec::new(),
                result_line: None,
                output: ProcessOutput {
                    status: ExitStatus::Success,
                    stdout: String::new(),
                    stderr: String::new(),
                    duration: Duration::from_millis(10),
                },
                spawn_fails: false,
            },
        }
    }

    /// Every command run so far, in order
    pub fn calls(&self) -> Vec<ProcessCommand> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ProcessRunner for MockProcessRunner {
    async fn run(&self, command: ProcessCommand) -> Result<ProcessOutput, ProcessError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(command.clone());
        }

        let replies = self.replies.lock().map_err(|_| ProcessError::InternalError {
            message: "mock reply table poisoned".to_string(),
        })?;
        let Some(reply) = replies.iter().find(|r| r.matches(&command)) else {
            return Err(ProcessError::MockExpectationNotMet(format!(
                "no scripted reply for {}",
                command.display()
            )));
        };

        if reply.spawn_fails {
            return Err(ProcessError::CommandNotFound(command.program.clone()));
        }
        Ok(reply.respond())
    }
}

impl MockCommandConfig {
    pub fn with_args<F>(mut self, matcher: F) -> Self
    where
        F: Fn(&[String]) -> bool + Send + Sync + 'static,
    {
        self.reply.matcher = Some(Box::new(matcher));
        self
    }

    /// Diagnostic lines printed ahead of the result line
    pub fn emits_noise(mut self, lines: &[&str]) -> Self {
        self.reply.noise = lines.iter().map(|l| l.to_string()).collect();
        self
    }

    /// Worker succeeds with `{"result": <value>}` as its last line
    pub fn replies_with_result(mut self, result: Value) -> Self {
        self.reply.result_line = Some(json!({ "result": result }).to_string());
        self
    }

    /// Worker reports `{"error": <message>}` as its last line
    pub fn replies_with_error(mut self, message: &str) -> Self {
        self.reply.result_line = Some(json!({ "error": message }).to_string());
        self
    }

    /// Raw stdout appended after any noise and result line
    pub fn returns_stdout(mut self, stdout: &str) -> Self {
        self.reply.output.stdout = stdout.to_string();
        self
    }

    pub fn returns_stderr(mut self, stderr: &str) -> Self {
        self.reply.output.stderr = stderr.to_string();
        self
    }

    pub fn returns_exit_code(mut self, code: i32) -> Self {
        self.reply.output.status = if code == 0 {
            ExitStatus::Success
        } else {
            ExitStatus::Error(code)
        };
        self
    }

    pub fn killed_by_signal(mut self, signal: i32) -> Self {
        self.reply.output.status = ExitStatus::Signal(signal);
        self
    }

    /// Simulate an executable that cannot be launched
    pub fn fails_to_spawn(mut self) -> Self {
        self.reply.spawn_fails = true;
        self
    }

    pub fn finish(self) {
        if let Ok(mut replies) = self.runner.replies.lock() {
            replies.push(self.reply);
        }
    }
}
