//! Parsing of the worker's standard output.
//!
//! The worker may print any amount of diagnostics; only the last non-empty
//! line of standard output is authoritative and must be a JSON object with
//! an optional `error` string and an optional `result` value.

use serde::Deserialize;
use serde_json::Value;

/// Validated reply from the worker
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerReply {
    Success { result: Value },
    Failure { error: String },
}

/// Shape of the result line before validation
#[derive(Debug, Deserialize)]
struct RawReply {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    result: Option<Value>,
}

impl From<RawReply> for WorkerReply {
    fn from(raw: RawReply) -> Self {
        match raw.error {
            Some(error) if !error.is_empty() => WorkerReply::Failure { error },
            _ => WorkerReply::Success {
                result: raw.result.unwrap_or(Value::Null),
            },
        }
    }
}

/// Split captured stdout into diagnostic noise and the trailing result line
pub fn split_result_line(stdout: &str) -> (Vec<&str>, Option<&str>) {
    let mut lines: Vec<&str> = stdout.lines().filter(|l| !l.trim().is_empty()).collect();
    let last = lines.pop().map(str::trim);
    (lines, last)
}

/// Parse the trailing line of `stdout`; the error string explains the violation
pub fn parse_reply(stdout: &str) -> Result<WorkerReply, String> {
    let (_, last) = split_result_line(stdout);
    let line = last.ok_or_else(|| "worker produced no output".to_string())?;
    serde_json::from_str::<RawReply>(line)
        .map(WorkerReply::from)
        .map_err(|e| format!("last output line is not a result object: {}", e))
}
