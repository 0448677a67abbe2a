//! Builds SMA artifacts by scanning a Parquet file.
//!
//! Builds run on background threads, so the builder opens its own in-memory
//! DuckDB connection instead of borrowing the query thread's.

use arrow::array::{Array, Float64Array, UInt64Array};
use arrow::compute::{cast, concat_batches, take_record_batch};
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use duckdb::Connection;
use std::path::Path;

use super::{sql_path, Sma};
use crate::error::{Result, SmaqError};
use crate::parser::Predicate;

/// Scan `path` and compute the SMA for `predicate`.
///
/// Returns `None` when the file is empty or the column holds no non-null
/// values. Builds are idempotent: the same inputs yield a structurally
/// identical artifact, outlier rows in original file order.
pub fn build_sma(path: &Path, predicate: &Predicate, iqr_multiplier: f64) -> Result<Option<Sma>> {
    let Some(table) = read_file(path)? else {
        return Ok(None);
    };

    let column_index = table.schema().index_of(&predicate.column).map_err(|_| {
        SmaqError::Build {
            path: path.to_path_buf(),
            reason: format!("column {} not found", predicate.column),
        }
    })?;
    let values = cast(table.column(column_index), &DataType::Float64)?;
    let values = values
        .as_any()
        .downcast_ref::<Float64Array>()
        .ok_or_else(|| SmaqError::Build {
            path: path.to_path_buf(),
            reason: format!("column {} is not castable to double", predicate.column),
        })?;

    let mut dense: Vec<f64> = values.iter().flatten().collect();
    if dense.is_empty() {
        return Ok(None);
    }
    dense.sort_by(f64::total_cmp);

    let q1 = quantile(&dense, 0.25);
    let q3 = quantile(&dense, 0.75);
    let iqr = q3 - q1;
    let lower_threshold = q1 - iqr_multiplier * iqr;
    let upper_threshold = q3 + iqr_multiplier * iqr;

    // Collect rows that are outliers and also satisfy the predicate, in
    // file order.
    let mut indices: Vec<u64> = Vec::new();
    for i in 0..values.len() {
        if values.is_null(i) {
            continue;
        }
        let v = values.value(i);
        if (v < lower_threshold || v > upper_threshold) && predicate.op.eval(v, predicate.literal)
        {
            indices.push(i as u64);
        }
    }
    let outliers = take_record_batch(&table, &UInt64Array::from(indices))?;

    Ok(Some(Sma {
        min: dense[0],
        max: dense[dense.len() - 1],
        lower_threshold,
        upper_threshold,
        outliers,
    }))
}

/// Linear-interpolation quantile over a sorted slice: index `p * (n - 1)`,
/// interpolated between its floor and ceiling neighbours.
fn quantile(sorted: &[f64], p: f64) -> f64 {
    let idx = p * (sorted.len() - 1) as f64;
    let low = idx.floor() as usize;
    let high = idx.ceil() as usize;
    sorted[low] + (idx - low as f64) * (sorted[high] - sorted[low])
}

/// Read the whole file as one record batch, or `None` when it has no rows.
fn read_file(path: &Path) -> Result<Option<RecordBatch>> {
    let conn = Connection::open_in_memory()?;
    let mut stmt = conn.prepare(&format!("SELECT * FROM read_parquet('{}')", sql_path(path)))?;
    let batches: Vec<RecordBatch> = stmt.query_arrow([])?.collect();

    let total_rows: usize = batches.iter().map(|b| b.num_rows()).sum();
    if total_rows == 0 {
        return Ok(None);
    }
    if batches.len() == 1 {
        return Ok(batches.into_iter().next());
    }
    let schema = batches[0].schema();
    Ok(Some(concat_batches(&schema, &batches)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantile_interpolates() {
        let values = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(quantile(&values, 0.0), 1.0);
        assert_eq!(quantile(&values, 1.0), 4.0);
        assert_eq!(quantile(&values, 0.5), 2.5);
        assert_eq!(quantile(&values, 0.25), 1.75);
    }

    #[test]
    fn test_quantile_single_value() {
        let values = [7.0];
        assert_eq!(quantile(&values, 0.25), 7.0);
        assert_eq!(quantile(&values, 0.75), 7.0);
    }
}
