use std::path::PathBuf;
use thiserror::Error;

pub mod codes;

pub use codes::{describe_error_code, ErrorCode};

/// Generic text returned to callers for failures whose detail stays in the logs.
pub const GENERIC_FAILURE_MESSAGE: &str = "An internal server error occurred.";

/// The unified error type for the prediction pipeline
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("[E{code:04}] Configuration error: {message}")]
    Config {
        code: u16,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("[E{code:04}] Validation error: {message}")]
    Validation {
        code: u16,
        message: String,
        field: Option<String>,
    },

    #[error("[E{code:04}] Input not found: {descriptor}")]
    InputNotFound { code: u16, descriptor: String },

    #[error("[E{code:04}] Worker execution failed: {message}")]
    WorkerExecution {
        code: u16,
        message: String,
        exit_code: Option<i32>,
        diagnostics: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("[E{code:04}] Worker protocol violation: {message}")]
    WorkerProtocol {
        code: u16,
        message: String,
        raw_output: String,
    },

    #[error("[E{code:04}] Worker reported error: {message}")]
    WorkerReported { code: u16, message: String },

    #[error("[E{code:04}] Join source not found: {}", .path.display())]
    SourceNotFound { code: u16, path: PathBuf },

    #[error("[E{code:04}] Persistence error: {message}")]
    Persistence {
        code: u16,
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl PipelineError {
    /// Create a configuration error with specific code
    pub fn config_with_code(code: u16, message: impl Into<String>) -> Self {
        Self::Config {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Create a validation error tied to a request field
    pub fn validation(code: u16, field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            code,
            message: message.into(),
            field: Some(field.into()),
        }
    }

    pub fn input_not_found(descriptor: impl Into<String>) -> Self {
        Self::InputNotFound {
            code: ErrorCode::INPUT_NOT_FOUND,
            descriptor: descriptor.into(),
        }
    }

    /// Create a worker execution error with specific code
    pub fn worker_execution(
        code: u16,
        message: impl Into<String>,
        exit_code: Option<i32>,
        diagnostics: impl Into<String>,
    ) -> Self {
        Self::WorkerExecution {
            code,
            message: message.into(),
            exit_code,
            diagnostics: diagnostics.into(),
            source: None,
        }
    }

    pub fn worker_protocol(message: impl Into<String>, raw_output: impl Into<String>) -> Self {
        Self::WorkerProtocol {
            code: ErrorCode::WORKER_PROTOCOL_VIOLATION,
            message: message.into(),
            raw_output: raw_output.into(),
        }
    }

    pub fn worker_reported(message: impl Into<String>) -> Self {
        Self::WorkerReported {
            code: ErrorCode::WORKER_REPORTED,
            message: message.into(),
        }
    }

    pub fn source_not_found(path: impl Into<PathBuf>) -> Self {
        Self::SourceNotFound {
            code: ErrorCode::JOIN_SOURCE_NOT_FOUND,
            path: path.into(),
        }
    }

    /// Create a persistence error with specific code and path
    pub fn persistence(code: u16, message: impl Into<String>, path: Option<PathBuf>) -> Self {
        Self::Persistence {
            code,
            message: message.into(),
            path,
            source: None,
        }
    }

    /// Add a source error to this error
    pub fn with_source(
        mut self,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        match &mut self {
            Self::Config { source: src, .. }
            | Self::WorkerExecution { source: src, .. }
            | Self::Persistence { source: src, .. } => {
                *src = Some(source.into());
            }
            _ => {}
        }
        self
    }

    /// Get the error code
    pub fn code(&self) -> u16 {
        match self {
            Self::Config { code, .. }
            | Self::Validation { code, .. }
            | Self::InputNotFound { code, .. }
            | Self::WorkerExecution { code, .. }
            | Self::WorkerProtocol { code, .. }
            | Self::WorkerReported { code, .. }
            | Self::SourceNotFound { code, .. }
            | Self::Persistence { code, .. } => *code,
        }
    }

    /// Whether this error aborts the whole request.
    ///
    /// Only a missing join source is absorbed into the result record.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::SourceNotFound { .. })
    }

    /// Message safe to hand back to a caller.
    ///
    /// Worker and persistence failures collapse into a generic message so
    /// that filesystem layout and worker diagnostics never leave the process.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation { message, .. } => message.clone(),
            Self::InputNotFound { descriptor, .. } => {
                format!("Selected data file \"{}\" not found on server.", descriptor)
            }
            _ => GENERIC_FAILURE_MESSAGE.to_string(),
        }
    }

    /// Get a developer-friendly error message with full chain
    pub fn developer_message(&self) -> String {
        format!("{:#}", self)
    }
}

/// Type alias for Results using PipelineError
pub type Result<T> = std::result::Result<T, PipelineError>;
