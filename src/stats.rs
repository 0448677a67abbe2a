//! Persistent workload accounting.
//!
//! One JSON document holds the per-predicate-key budgets, the per-key scan
//! metrics, and the process-wide query-id counter. All access goes through
//! a single lock; persistence is write-to-temp plus atomic rename, so the
//! on-disk document is never partially updated.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use tempfile::NamedTempFile;
use tracing::warn;

use crate::error::{Result, SmaqError};

pub const STATS_FILE_NAME: &str = "stats.json";

/// Per-predicate-key counters. All counters are monotonically non-decreasing
/// within a process lifetime; unknown fields in a loaded document are
/// ignored and missing ones default to zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileMetrics {
    #[serde(default)]
    pub scan_count: u64,
    #[serde(default)]
    pub skipped_count: u64,
    #[serde(default)]
    pub outlier_retrieved_count: u64,
    #[serde(default)]
    pub total_scan_time: f64,
    #[serde(default)]
    pub last_scan_time: f64,
    #[serde(default)]
    pub last_parquet_scanned_query_id: u64,
    #[serde(default)]
    pub last_sma_used_query_id: u64,
    #[serde(default)]
    pub construction_count: u64,
    #[serde(default)]
    pub deconstruction_count: u64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StatsDocument {
    #[serde(default)]
    budgets: HashMap<String, f64>,
    #[serde(default)]
    files: HashMap<String, FileMetrics>,
    #[serde(default)]
    current_query_id: u64,
}

/// Snapshot of one key's accounting, for inspection surfaces.
#[derive(Debug, Clone)]
pub struct KeyStats {
    pub key: String,
    pub budget: f64,
    pub metrics: FileMetrics,
}

pub struct StatsManager {
    path: PathBuf,
    doc: Mutex<StatsDocument>,
}

impl StatsManager {
    /// Load the stats document from `base_dir`. A missing or malformed
    /// document starts empty; prior accounting is lost but queries proceed.
    pub fn load(base_dir: &Path) -> Self {
        let path = base_dir.join(STATS_FILE_NAME);
        let doc = match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(doc) => doc,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "malformed stats document, starting empty");
                    StatsDocument::default()
                }
            },
            Err(err) if err.kind() == io::ErrorKind::NotFound => StatsDocument::default(),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "unreadable stats document, starting empty");
                StatsDocument::default()
            }
        };
        Self {
            path,
            doc: Mutex::new(doc),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StatsDocument> {
        self.doc.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Return the current query id and advance the counter.
    pub fn next_query_id(&self) -> u64 {
        let mut doc = self.lock();
        let id = doc.current_query_id;
        doc.current_query_id += 1;
        id
    }

    pub fn current_query_id(&self) -> u64 {
        self.lock().current_query_id
    }

    pub fn budget(&self, key: &str) -> f64 {
        self.lock().budgets.get(key).copied().unwrap_or(0.0)
    }

    /// Adjust a key's budget by `delta`, clamping at zero from below.
    pub fn add_budget(&self, key: &str, delta: f64) {
        let mut doc = self.lock();
        let entry = doc.budgets.entry(key.to_string()).or_insert(0.0);
        *entry = (*entry + delta).max(0.0);
    }

    pub fn record_construction(&self, key: &str) {
        self.lock()
            .files
            .entry(key.to_string())
            .or_default()
            .construction_count += 1;
    }

    pub fn record_deconstruction(&self, key: &str) {
        self.lock()
            .files
            .entry(key.to_string())
            .or_default()
            .deconstruction_count += 1;
    }

    /// Record one per-file outcome: a skip, an outlier retrieval, or a full
    /// scan of duration `scan_time`. `skipped` wins when both flags are set.
    pub fn record_scan(&self, key: &str, scan_time: f64, skipped: bool, outlier: bool) {
        let mut doc = self.lock();
        let query_id = doc.current_query_id;
        let metrics = doc.files.entry(key.to_string()).or_default();
        metrics.scan_count += 1;
        metrics.total_scan_time += scan_time;
        metrics.last_scan_time = scan_time;
        if skipped || outlier {
            metrics.last_sma_used_query_id = query_id;
        }
        if skipped {
            metrics.skipped_count += 1;
        } else if outlier {
            metrics.outlier_retrieved_count += 1;
        } else {
            metrics.last_parquet_scanned_query_id = query_id;
        }
    }

    /// Mean fallback-scan duration for a key, 0 with no history.
    pub fn avg_scan_time(&self, key: &str) -> f64 {
        let doc = self.lock();
        match doc.files.get(key) {
            Some(m) if m.scan_count > 0 => m.total_scan_time / m.scan_count as f64,
            _ => 0.0,
        }
    }

    pub fn metrics(&self, key: &str) -> Option<FileMetrics> {
        self.lock().files.get(key).cloned()
    }

    /// Keys with a metrics entry, in no particular order.
    pub fn metric_keys(&self) -> Vec<String> {
        self.lock().files.keys().cloned().collect()
    }

    /// Sorted snapshot over every key with a budget or metrics entry.
    pub fn snapshot(&self) -> Vec<KeyStats> {
        let doc = self.lock();
        let keys: BTreeSet<&String> = doc.budgets.keys().chain(doc.files.keys()).collect();
        keys.into_iter()
            .map(|key| KeyStats {
                key: key.clone(),
                budget: doc.budgets.get(key).copied().unwrap_or(0.0),
                metrics: doc.files.get(key).cloned().unwrap_or_default(),
            })
            .collect()
    }

    /// Persist the document atomically.
    pub fn save(&self) -> Result<()> {
        let doc = self.lock();
        let json = serde_json::to_string_pretty(&*doc).map_err(|e| SmaqError::Stats(e.into()))?;
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = NamedTempFile::new_in(dir).map_err(SmaqError::Stats)?;
        tmp.write_all(json.as_bytes()).map_err(SmaqError::Stats)?;
        tmp.persist(&self.path)
            .map_err(|err| SmaqError::Stats(err.error))?;
        Ok(())
    }
}
