//! Unit tests for the SMA artifact store.

use arrow::array::{Float64Array, Int64Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use smaq::sma::{Sma, SmaStore};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

fn setup_store() -> (SmaStore, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let store = SmaStore::new(temp_dir.path()).unwrap();
    (store, temp_dir)
}

fn sample_sma(prices: Vec<f64>) -> Sma {
    let schema = Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("price", DataType::Float64, true),
    ]));
    let ids: Vec<i64> = (0..prices.len() as i64).collect();
    let outliers = RecordBatch::try_new(
        schema,
        vec![
            Arc::new(Int64Array::from(ids)),
            Arc::new(Float64Array::from(prices)),
        ],
    )
    .unwrap();
    Sma {
        min: 1.0,
        max: 500.0,
        lower_threshold: -48.5,
        upper_threshold: 150.25,
        outliers,
    }
}

#[test]
fn test_lookup_absent_returns_none() {
    let (store, _dir) = setup_store();
    assert!(store.lookup("missing_key").is_none());
}

#[test]
fn test_put_then_lookup_roundtrip() {
    let (store, _dir) = setup_store();
    let sma = sample_sma(vec![500.0, 410.5]);
    store.put("orders_price_gt_200", &sma).unwrap();

    let loaded = store.lookup("orders_price_gt_200").unwrap();
    assert_eq!(loaded.min, sma.min);
    assert_eq!(loaded.max, sma.max);
    assert_eq!(loaded.lower_threshold, sma.lower_threshold);
    assert_eq!(loaded.upper_threshold, sma.upper_threshold);
    assert_eq!(loaded.outliers, sma.outliers);
}

#[test]
fn test_put_overwrites_prior_artifact() {
    let (store, _dir) = setup_store();
    store.put("k", &sample_sma(vec![500.0])).unwrap();
    store.put("k", &sample_sma(vec![500.0, 600.0, 700.0])).unwrap();

    let loaded = store.lookup("k").unwrap();
    assert_eq!(loaded.outlier_count(), 3);
}

#[test]
fn test_remove_reports_existence_and_is_idempotent() {
    let (store, _dir) = setup_store();
    store.put("k", &sample_sma(vec![500.0])).unwrap();

    assert!(store.remove("k"));
    assert!(!store.remove("k"));
    assert!(store.lookup("k").is_none());
}

#[test]
fn test_corrupt_artifact_treated_absent_and_deleted() {
    let (store, _dir) = setup_store();
    let path = store.artifact_path("bad");
    fs::write(&path, b"this is not an artifact").unwrap();

    assert!(store.lookup("bad").is_none());
    assert!(!path.exists(), "corrupt artifact should have been deleted");
}

#[test]
fn test_truncated_artifact_treated_absent() {
    let (store, _dir) = setup_store();
    store.put("k", &sample_sma(vec![500.0])).unwrap();

    let path = store.artifact_path("k");
    let bytes = fs::read(&path).unwrap();
    fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();

    assert!(store.lookup("k").is_none());
    assert!(!path.exists());
}

#[test]
fn test_list_and_clear() {
    let (store, _dir) = setup_store();
    assert!(store.list().unwrap().is_empty());

    store.put("b_key", &sample_sma(vec![500.0])).unwrap();
    store.put("a_key", &sample_sma(vec![500.0])).unwrap();

    assert_eq!(store.list().unwrap(), vec!["a_key", "b_key"]);
    assert_eq!(store.clear().unwrap(), 2);
    assert!(store.list().unwrap().is_empty());
}

#[test]
fn test_concurrent_put_and_lookup_never_surface_partial_artifact() {
    let (store, _dir) = setup_store();
    store.put("k", &sample_sma(vec![500.0])).unwrap();

    let writer_store = store.clone();
    let writer = std::thread::spawn(move || {
        for i in 0..50 {
            let prices: Vec<f64> = (0..=i % 5).map(|j| 500.0 + j as f64).collect();
            writer_store.put("k", &sample_sma(prices)).unwrap();
        }
    });

    for _ in 0..200 {
        // every observation is a complete artifact with consistent bounds
        let sma = store.lookup("k").expect("artifact must stay visible");
        assert_eq!(sma.min, 1.0);
        assert_eq!(sma.max, 500.0);
        assert!(sma.outlier_count() >= 1);
    }

    writer.join().unwrap();
}
