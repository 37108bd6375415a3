//! Node extraction and relation join
//!
//! The worker leaves a cluster table behind; every identifier it mentions
//! forms the node universe. The reference relation table is then streamed
//! and only rows with both endpoints in that universe are kept.

pub mod nodes;
pub mod relation;

pub use nodes::{extract_nodes, NodeUniverse};
pub use relation::{join, DERIVED_HEADER};

use serde::{Deserialize, Serialize};

/// Counts reported by a successful join
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinStats {
    pub allowed_nodes_count: usize,
    pub results_count: usize,
}
