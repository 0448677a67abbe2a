//! Sparse materialised aggregates.
//!
//! An SMA summarises one numeric column of one Parquet file for one
//! predicate: the column extrema, the interquartile-range fences, and a
//! materialised slice of the rows that are outliers *and* satisfy the
//! predicate. The slice carries all columns so later queries with a
//! different projection can reuse the same artifact.

mod builder;
mod format;
mod store;

pub use builder::build_sma;
pub use store::SmaStore;

use arrow::record_batch::RecordBatch;
use sha2::{Digest, Sha256};
use std::path::Path;

use crate::parser::Predicate;

/// Extrema, fences, and the outlier slice for one (file, predicate) pair.
///
/// Every row in `outliers` lies outside `[lower_threshold, upper_threshold]`
/// and satisfies the predicate, in the original file row order.
#[derive(Debug, Clone)]
pub struct Sma {
    pub min: f64,
    pub max: f64,
    pub lower_threshold: f64,
    pub upper_threshold: f64,
    pub outliers: RecordBatch,
}

impl Sma {
    pub fn outlier_count(&self) -> usize {
        self.outliers.num_rows()
    }
}

/// Stable identifier for a (file, column, op, literal) tuple.
///
/// Shaped as `{basename}-{dirhash}_{column}_{op}_{literal}`. The hash of the
/// canonical parent directory keeps files with equal basenames in different
/// directories from sharing accounting or artifacts. The key doubles as the
/// artifact file stem, so the operator is rendered as its mnemonic token.
pub fn predicate_key(path: &Path, predicate: &Predicate) -> String {
    let basename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    format!(
        "{}-{}_{}_{}_{}",
        basename,
        dir_hash(path),
        predicate.column,
        predicate.op.token(),
        predicate.literal
    )
}

/// First 8 hex chars of the SHA-256 of the canonical parent directory.
/// Falls back to the parent as written when the file cannot be resolved.
fn dir_hash(path: &Path) -> String {
    let parent = path
        .canonicalize()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf))
        .or_else(|| path.parent().map(Path::to_path_buf))
        .unwrap_or_default();

    let mut hasher = Sha256::new();
    hasher.update(parent.to_string_lossy().as_bytes());
    hex::encode(&hasher.finalize()[..4])
}

/// Quote a path for interpolation into a single-quoted SQL string literal.
pub(crate) fn sql_path(path: &Path) -> String {
    path.display().to_string().replace('\'', "''")
}
