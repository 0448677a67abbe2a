//! Query execution with SMA acceleration.
//!
//! The engine parses a query, decides per file among skip, outlier read,
//! and scan, batches every scan into one DuckDB statement, unions the
//! fragments, and settles the economic accounting afterwards. Index builds
//! run on background threads and never affect the query that spawned them.

mod output;

pub use output::{OutputFormat, QueryResultFormatter};

use ahash::AHashSet;
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use duckdb::Connection;
use std::path::PathBuf;
use std::sync::Mutex;
use std::thread::JoinHandle;
use std::time::Instant;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::error::Result;
use crate::parser::{parse_query, ParsedQuery, Predicate};
use crate::policy::{decide, should_evict, Decision, PolicyConfig};
use crate::sma::{build_sma, predicate_key, sql_path, SmaStore};
use crate::stats::StatsManager;

/// Result of an accelerated query.
#[derive(Debug, Clone)]
pub struct QueryOutput {
    /// Unioned result fragments. Row order within a fragment follows the
    /// source file; cross-fragment order is unspecified.
    pub batches: Vec<RecordBatch>,
    /// Schema of the result, when at least one fragment was produced.
    pub schema: Option<SchemaRef>,
    pub files_skipped: usize,
    pub files_outlier_read: usize,
    pub files_scanned: usize,
    /// Wall-clock duration of the batched fallback scan; 0 when every file
    /// was answered from artifacts.
    pub scan_time_secs: f64,
    pub execution_time_secs: f64,
}

impl QueryOutput {
    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(|b| b.num_rows()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows() == 0
    }
}

/// The main query engine: one DuckDB connection, an artifact store, the
/// stats document, and the economic policy.
pub struct SmaEngine {
    conn: Connection,
    store: SmaStore,
    stats: StatsManager,
    policy: PolicyConfig,
    builds: Mutex<Vec<JoinHandle<()>>>,
}

impl SmaEngine {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let base_dir = config.resolve_base_dir()?;
        let store = SmaStore::new(&base_dir)?;
        let stats = StatsManager::load(&base_dir);
        let conn = Connection::open_in_memory()?;
        if let Some(limit) = &config.memory_limit {
            conn.execute(&format!("SET memory_limit = '{}'", limit), [])?;
        }
        Ok(Self {
            conn,
            store,
            stats,
            policy: config.policy.clone(),
            builds: Mutex::new(Vec::new()),
        })
    }

    pub fn store(&self) -> &SmaStore {
        &self.store
    }

    pub fn stats(&self) -> &StatsManager {
        &self.stats
    }

    /// Parse, plan, and execute one accelerated query.
    pub fn execute(&self, sql: &str) -> Result<QueryOutput> {
        let started = Instant::now();
        let parsed = parse_query(sql)?;
        let query_id = self.stats.next_query_id();
        debug!(query_id, files = parsed.files.len(), predicate = %parsed.predicate, "executing query");

        let mut fragments: Vec<RecordBatch> = Vec::new();
        let mut to_scan: Vec<&PathBuf> = Vec::new();
        let mut debited: AHashSet<String> = AHashSet::new();
        let mut files_skipped = 0;
        let mut files_outlier_read = 0;

        for file in &parsed.files {
            let key = predicate_key(file, &parsed.predicate);
            let sma = self.store.lookup(&key);
            let avg = self.stats.avg_scan_time(&key);
            let budget = self.stats.budget(&key);

            match decide(sma.as_ref(), &parsed.predicate, budget, avg, &self.policy) {
                Decision::BuildAndScan => {
                    let cost = self.policy.deposit_factor * avg;
                    self.stats.add_budget(&key, -cost);
                    if cost > 0.0 {
                        debited.insert(key.clone());
                    }
                    self.stats.record_construction(&key);
                    self.spawn_build(file.clone(), parsed.predicate.clone(), key);
                    to_scan.push(file);
                }
                Decision::Scan => to_scan.push(file),
                Decision::ProbeScan => {
                    let cost = self.policy.probe_penalty_factor * avg;
                    debug!(key = %key, cost, "index gave no benefit, charging probe");
                    self.stats.add_budget(&key, -cost);
                    if cost > 0.0 {
                        debited.insert(key.clone());
                    }
                    to_scan.push(file);
                }
                Decision::Skip => {
                    debug!(key = %key, "skipping file, predicate outside column range");
                    self.stats.record_scan(&key, 0.0, true, false);
                    self.stats
                        .add_budget(&key, self.policy.reinvest_factor * avg);
                    files_skipped += 1;
                }
                Decision::OutlierRead => {
                    debug!(key = %key, "answering from materialised outliers");
                    if let Some(sma) = &sma {
                        fragments.push(project_fragment(
                            &sma.outliers,
                            parsed.projection.as_deref(),
                        )?);
                    }
                    self.stats.record_scan(&key, 0.0, false, true);
                    self.stats
                        .add_budget(&key, self.policy.reinvest_factor * avg);
                    files_outlier_read += 1;
                }
            }
        }

        let mut scan_time_secs = 0.0;
        let mut scan_error = None;
        if !to_scan.is_empty() {
            let scan_sql = compose_scan_sql(&parsed, &to_scan);
            debug!(sql = %scan_sql, files = to_scan.len(), "dispatching fallback scan");
            let scan_started = Instant::now();
            match self.run_scan(&scan_sql) {
                Ok(batches) => {
                    scan_time_secs = scan_started.elapsed().as_secs_f64();

                    // The backing engine executed the files as one batch, so
                    // every participating key is charged with the same
                    // duration.
                    for file in &to_scan {
                        let key = predicate_key(file, &parsed.predicate);
                        self.stats.record_scan(&key, scan_time_secs, false, false);
                        self.stats
                            .add_budget(&key, self.policy.deposit_factor * scan_time_secs);
                    }
                    fragments.extend(batches);
                }
                // A failed batch records no scans and earns no deposits, but
                // the skip/outlier/build accounting above already happened
                // and still has to be swept and persisted.
                Err(err) => scan_error = Some(err),
            }
        }

        self.sweep(query_id, &debited);
        if let Err(err) = self.stats.save() {
            warn!(error = %err, "failed to persist stats document");
        }
        if let Some(err) = scan_error {
            return Err(err);
        }

        let schema = fragments.first().map(|b| b.schema());
        Ok(QueryOutput {
            batches: fragments,
            schema,
            files_skipped,
            files_outlier_read,
            files_scanned: to_scan.len(),
            scan_time_secs,
            execution_time_secs: started.elapsed().as_secs_f64(),
        })
    }

    /// Block until every in-flight background build has finished.
    pub fn wait_for_builds(&self) {
        let handles: Vec<JoinHandle<()>> = {
            let mut builds = self
                .builds
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            builds.drain(..).collect()
        };
        for handle in handles {
            let _ = handle.join();
        }
    }

    fn spawn_build(&self, path: PathBuf, predicate: Predicate, key: String) {
        let store = self.store.clone();
        let iqr_multiplier = self.policy.iqr_multiplier;
        let handle = std::thread::spawn(move || {
            match build_sma(&path, &predicate, iqr_multiplier) {
                Ok(Some(sma)) => {
                    debug!(key = %key, outliers = sma.outlier_count(), "built index artifact");
                    if let Err(err) = store.put(&key, &sma) {
                        warn!(key = %key, error = %err, "failed to store index artifact");
                    }
                }
                Ok(None) => debug!(key = %key, "column empty, no artifact built"),
                Err(err) => warn!(path = %path.display(), error = %err, "index build failed"),
            }
        });
        self.builds
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(handle);
    }

    fn run_scan(&self, sql: &str) -> Result<Vec<RecordBatch>> {
        let mut stmt = self.conn.prepare(sql)?;
        let batches: Vec<RecordBatch> = stmt.query_arrow([])?.collect();
        Ok(batches)
    }

    /// Evict artifacts whose budget is exhausted or whose recent utility is
    /// zero. Budgets and metrics are retained so re-builds stay informed.
    fn sweep(&self, query_id: u64, debited: &AHashSet<String>) {
        for key in self.stats.metric_keys() {
            let Some(metrics) = self.stats.metrics(&key) else {
                continue;
            };
            let budget = self.stats.budget(&key);
            if should_evict(&metrics, budget, query_id, debited.contains(&key), &self.policy)
                && self.store.remove(&key)
            {
                debug!(key = %key, "evicted stale index artifact");
                self.stats.record_deconstruction(&key);
            }
        }
    }
}

impl Drop for SmaEngine {
    fn drop(&mut self) {
        self.wait_for_builds();
    }
}

/// One fallback statement covering every file that needs a scan.
fn compose_scan_sql(parsed: &ParsedQuery, files: &[&PathBuf]) -> String {
    let projection = match &parsed.projection {
        Some(cols) => cols
            .iter()
            .map(|c| format!("\"{}\"", c))
            .collect::<Vec<_>>()
            .join(", "),
        None => "*".to_string(),
    };
    let paths = files
        .iter()
        .map(|p| format!("'{}'", sql_path(p)))
        .collect::<Vec<_>>()
        .join(", ");
    let predicate = &parsed.predicate;
    format!(
        "SELECT {} FROM read_parquet([{}]) WHERE \"{}\" {} {}",
        projection,
        paths,
        predicate.column,
        predicate.op.as_sql(),
        predicate.literal
    )
}

/// Narrow an outlier slice to the query's projection.
fn project_fragment(batch: &RecordBatch, projection: Option<&[String]>) -> Result<RecordBatch> {
    let Some(cols) = projection else {
        return Ok(batch.clone());
    };
    let schema = batch.schema();
    let indices = cols
        .iter()
        .map(|c| schema.index_of(c))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(batch.project(&indices)?)
}
