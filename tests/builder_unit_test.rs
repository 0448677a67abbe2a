//! Unit tests for the SMA builder against real Parquet files.

use arrow::array::{Array, Float64Array};
use duckdb::Connection;
use smaq::error::SmaqError;
use smaq::parser::{CompareOp, Predicate};
use smaq::sma::build_sma;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Materialise `query` as a Parquet file under `dir`.
fn write_parquet(dir: &Path, name: &str, query: &str) -> PathBuf {
    let path = dir.join(name);
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(&format!(
        "COPY ({query}) TO '{}' (FORMAT PARQUET)",
        path.display()
    ))
    .unwrap();
    path
}

/// 1..=100 plus a single 500.0 outlier, in ascending order.
fn orders_with_outlier(dir: &Path) -> PathBuf {
    write_parquet(
        dir,
        "orders.parquet",
        "SELECT range::DOUBLE AS price, 'row-' || range AS tag FROM range(1, 101)
         UNION ALL SELECT 500.0, 'spike' ORDER BY price",
    )
}

fn gt(literal: f64) -> Predicate {
    Predicate {
        column: "price".to_string(),
        op: CompareOp::Gt,
        literal,
    }
}

fn prices(sma: &smaq::sma::Sma) -> Vec<f64> {
    let col = sma
        .outliers
        .column(sma.outliers.schema().index_of("price").unwrap())
        .as_any()
        .downcast_ref::<Float64Array>()
        .unwrap()
        .clone();
    (0..col.len()).map(|i| col.value(i)).collect()
}

#[test]
fn test_build_computes_extrema_and_fences() {
    let dir = TempDir::new().unwrap();
    let path = orders_with_outlier(dir.path());

    let sma = build_sma(&path, &gt(200.0), 1.5).unwrap().unwrap();

    assert_eq!(sma.min, 1.0);
    assert_eq!(sma.max, 500.0);
    // 101 sorted values: Q1 = 26.0, Q3 = 76.0, IQR = 50.0
    assert_eq!(sma.lower_threshold, 26.0 - 75.0);
    assert_eq!(sma.upper_threshold, 76.0 + 75.0);
}

#[test]
fn test_build_materialises_matching_outliers_only() {
    let dir = TempDir::new().unwrap();
    let path = orders_with_outlier(dir.path());

    // 500 is the only row above the upper fence, and it satisfies > 200
    let sma = build_sma(&path, &gt(200.0), 1.5).unwrap().unwrap();
    assert_eq!(prices(&sma), vec![500.0]);
    // all columns are carried
    assert_eq!(sma.outliers.num_columns(), 2);

    // with a literal above the outlier, the slice is empty
    let sma = build_sma(&path, &gt(600.0), 1.5).unwrap().unwrap();
    assert_eq!(sma.outlier_count(), 0);
}

#[test]
fn test_build_respects_operator_when_filtering_outliers() {
    let dir = TempDir::new().unwrap();
    let path = write_parquet(
        dir.path(),
        "mixed.parquet",
        "SELECT unnest([-900.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 900.0]) AS price",
    );

    let lt = Predicate {
        column: "price".to_string(),
        op: CompareOp::Lt,
        literal: 0.0,
    };
    let sma = build_sma(&path, &lt, 1.5).unwrap().unwrap();
    // -900 and 900 are both outliers but only -900 satisfies < 0
    assert_eq!(prices(&sma), vec![-900.0]);
}

#[test]
fn test_build_preserves_file_row_order() {
    let dir = TempDir::new().unwrap();
    let path = write_parquet(
        dir.path(),
        "unordered.parquet",
        "SELECT unnest([700.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 5.5, 4.5, 3.5, 900.0]) AS price",
    );

    let sma = build_sma(&path, &gt(10.0), 1.5).unwrap().unwrap();
    assert_eq!(prices(&sma), vec![700.0, 900.0]);
}

#[test]
fn test_build_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let path = orders_with_outlier(dir.path());

    let first = build_sma(&path, &gt(200.0), 1.5).unwrap().unwrap();
    let second = build_sma(&path, &gt(200.0), 1.5).unwrap().unwrap();

    assert_eq!(first.min, second.min);
    assert_eq!(first.max, second.max);
    assert_eq!(first.lower_threshold, second.lower_threshold);
    assert_eq!(first.upper_threshold, second.upper_threshold);
    assert_eq!(first.outliers, second.outliers);
}

#[test]
fn test_build_ignores_null_values() {
    let dir = TempDir::new().unwrap();
    let path = write_parquet(
        dir.path(),
        "nulls.parquet",
        "SELECT unnest([NULL, 1.0, NULL, 2.0, 3.0, 1000.0]) AS price",
    );

    let sma = build_sma(&path, &gt(0.0), 1.5).unwrap().unwrap();
    assert_eq!(sma.min, 1.0);
    assert_eq!(sma.max, 1000.0);
}

#[test]
fn test_build_all_null_column_yields_nothing() {
    let dir = TempDir::new().unwrap();
    let path = write_parquet(
        dir.path(),
        "allnull.parquet",
        "SELECT NULL::DOUBLE AS price FROM range(5)",
    );

    assert!(build_sma(&path, &gt(0.0), 1.5).unwrap().is_none());
}

#[test]
fn test_build_empty_file_yields_nothing() {
    let dir = TempDir::new().unwrap();
    let path = write_parquet(
        dir.path(),
        "empty.parquet",
        "SELECT 1.0 AS price WHERE 1 = 0",
    );

    assert!(build_sma(&path, &gt(0.0), 1.5).unwrap().is_none());
}

#[test]
fn test_build_missing_column_fails() {
    let dir = TempDir::new().unwrap();
    let path = orders_with_outlier(dir.path());

    let missing = Predicate {
        column: "nope".to_string(),
        op: CompareOp::Gt,
        literal: 0.0,
    };
    let err = build_sma(&path, &missing, 1.5).unwrap_err();
    assert!(matches!(err, SmaqError::Build { .. }), "{err}");
}

#[test]
fn test_build_constant_column_collapses_fences() {
    let dir = TempDir::new().unwrap();
    let path = write_parquet(
        dir.path(),
        "constant.parquet",
        "SELECT 7.0 AS price FROM range(10)",
    );

    let sma = build_sma(&path, &gt(0.0), 1.5).unwrap().unwrap();
    assert_eq!(sma.min, 7.0);
    assert_eq!(sma.max, 7.0);
    assert_eq!(sma.lower_threshold, 7.0);
    assert_eq!(sma.upper_threshold, 7.0);
    assert_eq!(sma.outlier_count(), 0);
}

#[test]
fn test_build_wider_fence_multiplier_captures_fewer_rows() {
    let dir = TempDir::new().unwrap();
    let path = orders_with_outlier(dir.path());

    let tight = build_sma(&path, &gt(0.0), 1.5).unwrap().unwrap();
    let wide = build_sma(&path, &gt(0.0), 20.0).unwrap().unwrap();
    assert!(wide.outlier_count() <= tight.outlier_count());
    assert!(wide.upper_threshold > tight.upper_threshold);
}
