//! Result lifecycle
//!
//! A [`ResultId`] is issued once per request. [`ResultLayout`] is the only
//! place that turns an identifier into a filesystem path, and
//! [`ResultStore`] is the only reader and writer of the paths it hands out.

pub mod layout;
pub mod record;
pub mod store;

pub use layout::{is_clean_identifier, sanitize_filename, ResultLayout};
pub use record::{GenerationStatus, JoinGeneration, RequestParams, ResultRecord};
pub use store::{InputSource, ResultStore, StagedInput, Validity};

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque per-request result identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultId(String);

impl ResultId {
    /// Issue a fresh identifier
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResultId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ResultId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_unique_and_clean() {
        let a = ResultId::generate();
        let b = ResultId::generate();
        assert_ne!(a, b);
        assert!(is_clean_identifier(a.as_str()));
        assert_eq!(a.as_str().len(), 36);
    }

    #[test]
    fn test_serializes_as_plain_string() {
        let id = ResultId::generate();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id));
    }
}
