use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use super::ResultId;
use crate::join::JoinStats;

/// Request parameters exactly as the caller supplied them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestParams {
    pub alpha: String,
    pub clusters: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStatus {
    Success,
    FailedOrSkipped,
}

/// Outcome of the join stage as stored in the record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinGeneration {
    pub status: GenerationStatus,
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_nodes_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results_count: Option<usize>,
}

impl JoinGeneration {
    pub fn success(path: String, stats: JoinStats) -> Self {
        Self {
            status: GenerationStatus::Success,
            path: Some(path),
            allowed_nodes_count: Some(stats.allowed_nodes_count),
            results_count: Some(stats.results_count),
        }
    }

    pub fn failed_or_skipped() -> Self {
        Self {
            status: GenerationStatus::FailedOrSkipped,
            path: None,
            allowed_nodes_count: None,
            results_count: None,
        }
    }
}

/// The persisted artifact for one request. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultRecord {
    pub id: ResultId,
    pub requested_input: String,
    pub params: RequestParams,
    pub prediction: Value,
    pub m_type_data_generation: JoinGeneration,
    #[serde(with = "iso_millis")]
    pub generated_at: DateTime<Utc>,
    #[serde(with = "iso_millis")]
    pub expires_at_iso: DateTime<Utc>,
}

impl ResultRecord {
    /// Build a record whose expiry is `generated_at + ttl`
    pub fn new(
        id: ResultId,
        requested_input: String,
        params: RequestParams,
        prediction: Value,
        generation: JoinGeneration,
        generated_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        let expires_at_iso = generated_at
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            id,
            requested_input,
            params,
            prediction,
            m_type_data_generation: generation,
            generated_at,
            expires_at_iso,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at_iso
    }
}

/// RFC 3339 with millisecond precision and a `Z` suffix
mod iso_millis {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}
