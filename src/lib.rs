//! # bioclust
//!
//! Runs an external clustering worker on a biological input table, derives a
//! filtered relation table from the worker's cluster output, and keeps the
//! combined result available under a short-lived identifier.
//!
//! ## Modules
//!
//! - `config` - Configuration resolved once at startup and passed down
//! - `error` - Error taxonomy and numeric error codes
//! - `subprocess` - Child process runner with concurrent stream draining
//! - `worker` - Worker invocation and result-line protocol
//! - `join` - Node extraction and relation table join
//! - `results` - Result identifiers, storage layout, records and validity lookup
//! - `orchestrator` - Per-request pipeline composition
//! - `server` - HTTP endpoints for prediction and validity checks
pub mod config;
pub mod error;
pub mod join;
pub mod orchestrator;
pub mod results;
pub mod server;
pub mod subprocess;
pub mod worker;

pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
