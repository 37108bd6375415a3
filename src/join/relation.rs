use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use tracing::{debug, info, warn};

use super::{extract_nodes, JoinStats, NodeUniverse};
use crate::error::{ErrorCode, PipelineError, Result};

/// Header of the derived relation table
pub const DERIVED_HEADER: [&str; 3] = ["GS_A_ID", "GS_B_ID", "SIMILARITY"];

/// Reference rows shorter than this are malformed
const MIN_REFERENCE_FIELDS: usize = 7;
const SIMILARITY_FIELD: usize = 6;

/// Derive the filtered relation table for one cluster table.
///
/// An empty node universe is a valid outcome and produces a header-only
/// table without reading the reference table at all.
pub fn join(cluster_table: &Path, reference_table: &Path, output: &Path) -> Result<JoinStats> {
    let content = std::fs::read_to_string(cluster_table)
        .map_err(|e| open_error(e, cluster_table))?;
    let nodes = extract_nodes(&content);

    if nodes.is_empty() {
        warn!(
            "No nodes extracted from {}; writing header-only table",
            cluster_table.display()
        );
        write_derived(output, std::iter::empty())?;
        return Ok(JoinStats::default());
    }

    let reference = File::open(reference_table).map_err(|e| open_error(e, reference_table))?;
    let results_count = write_derived(output, matching_rows(reference, &nodes))?;

    info!(
        "Derived relation table with {} rows from {} nodes written to {}",
        results_count,
        nodes.len(),
        output.display()
    );
    Ok(JoinStats {
        allowed_nodes_count: nodes.len(),
        results_count,
    })
}

type DerivedRow = Result<[Vec<u8>; 3]>;

/// Stream reference rows whose two endpoints are both in `nodes`,
/// projected to (field 0, field 1, field 6), in input order.
fn matching_rows<'a>(
    reference: File,
    nodes: &'a NodeUniverse,
) -> impl Iterator<Item = DerivedRow> + 'a {
    let reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .flexible(true)
        .quoting(false)
        .from_reader(BufReader::new(reference));

    reader.into_byte_records().filter_map(move |record| {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                return Some(Err(PipelineError::persistence(
                    ErrorCode::JOIN_IO_ERROR,
                    "failed to read reference table",
                    None,
                )
                .with_source(e)))
            }
        };
        if record.len() < MIN_REFERENCE_FIELDS {
            return None;
        }
        let member = |i: usize| {
            std::str::from_utf8(&record[i])
                .map(|id| nodes.contains(id))
                .unwrap_or(false)
        };
        if member(0) && member(1) {
            Some(Ok([
                record[0].to_vec(),
                record[1].to_vec(),
                record[SIMILARITY_FIELD].to_vec(),
            ]))
        } else {
            None
        }
    })
}

/// Write header plus rows; returns the number of rows written.
/// A partially written table is removed on failure.
fn write_derived<I>(output: &Path, rows: I) -> Result<usize>
where
    I: Iterator<Item = DerivedRow>,
{
    if let Some(dir) = output.parent() {
        if let Err(e) = std::fs::create_dir_all(dir) {
            debug!("Could not create {}: {}", dir.display(), e);
        }
    }

    let result = write_rows(output, rows);
    if result.is_err() {
        let _ = std::fs::remove_file(output);
    }
    result
}

fn write_rows<I>(output: &Path, rows: I) -> Result<usize>
where
    I: Iterator<Item = DerivedRow>,
{
    let file = File::create(output).map_err(|e| write_error(e, output))?;
    let mut writer = csv::Writer::from_writer(BufWriter::new(file));
    writer
        .write_record(DERIVED_HEADER)
        .map_err(|e| write_error(e, output))?;

    let mut count = 0;
    for row in rows {
        writer.write_record(&row?).map_err(|e| write_error(e, output))?;
        count += 1;
    }
    writer.flush().map_err(|e| write_error(e, output))?;
    Ok(count)
}

fn open_error(error: std::io::Error, path: &Path) -> PipelineError {
    if error.kind() == std::io::ErrorKind::NotFound {
        PipelineError::source_not_found(path)
    } else {
        PipelineError::persistence(
            ErrorCode::JOIN_IO_ERROR,
            "failed to open join source",
            Some(path.to_path_buf()),
        )
        .with_source(error)
    }
}

fn write_error<E>(error: E, path: &Path) -> PipelineError
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    PipelineError::persistence(
        ErrorCode::JOIN_IO_ERROR,
        "failed to write derived relation table",
        Some(path.to_path_buf()),
    )
    .with_source(error)
}
