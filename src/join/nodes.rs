use std::collections::HashSet;
use tracing::debug;

/// Distinct entity identifiers referenced by one cluster table
pub type NodeUniverse = HashSet<String>;

/// Collect every identifier in a cluster table.
///
/// The first row and the first column are labels. Any other cell may hold a
/// quoted, comma-separated list of identifiers; quotes are dropped and the
/// content split again so each identifier lands in the set on its own.
pub fn extract_nodes(content: &str) -> NodeUniverse {
    // Blank lines never count as the header row
    let rows: String = content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(rows.as_bytes());

    let mut nodes = NodeUniverse::new();
    for (index, record) in reader.records().enumerate() {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                debug!("Skipping unreadable cluster row {}: {}", index + 1, e);
                continue;
            }
        };
        for cell in record.iter().skip(1) {
            let cleaned = cell.replace('"', "");
            nodes.extend(
                cleaned
                    .split(',')
                    .map(str::trim)
                    .filter(|token| !token.is_empty())
                    .map(str::to_string),
            );
        }
    }

    debug!("Extracted {} nodes from cluster table", nodes.len());
    nodes
}
