//! The economic controller.
//!
//! Indexes are modelled as investments: saved scans partially fund future
//! builds, and an index that is probed without benefit pays for the probe
//! until its budget runs dry. Decisions and eviction rules are pure
//! functions; the executor applies the accounting around them.

use serde::{Deserialize, Serialize};

use crate::parser::Predicate;
use crate::sma::Sma;
use crate::stats::FileMetrics;

/// Tunable constants of the economic model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Fraction of a fallback scan's duration deposited to the key after
    /// the scan completes, and the fraction of the average scan time a
    /// build costs up front.
    pub deposit_factor: f64,
    /// Fraction of the average scan time credited when an index saves a
    /// scan (skip or outlier read).
    pub reinvest_factor: f64,
    /// Fraction of the average scan time charged when an index is probed
    /// without benefit.
    pub probe_penalty_factor: f64,
    /// How many scans (and how many queries of disuse) an index survives
    /// before eviction.
    pub recency_window: u64,
    /// Fence multiplier `k` in `[Q1 - k*IQR, Q3 + k*IQR]`.
    pub iqr_multiplier: f64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            deposit_factor: 0.1,
            reinvest_factor: 0.5,
            probe_penalty_factor: 0.5,
            recency_window: 5,
            iqr_multiplier: 1.5,
        }
    }
}

/// The per-(file, predicate) action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The predicate is provably empty for this file; contribute nothing.
    Skip,
    /// Answer from the materialised outlier slice.
    OutlierRead,
    /// Full scan; no index exists and none is affordable yet.
    Scan,
    /// Full scan; the index exists but gave no benefit, charge the probe.
    ProbeScan,
    /// Full scan now, and schedule an index build in the background.
    BuildAndScan,
}

/// Decide what to do for one file under one predicate.
pub fn decide(
    sma: Option<&Sma>,
    predicate: &Predicate,
    budget: f64,
    avg_scan_time: f64,
    policy: &PolicyConfig,
) -> Decision {
    let Some(sma) = sma else {
        let build_cost = policy.deposit_factor * avg_scan_time;
        return if budget >= build_cost {
            Decision::BuildAndScan
        } else {
            Decision::Scan
        };
    };
    if predicate
        .op
        .selects_nothing(sma.min, sma.max, predicate.literal)
    {
        return Decision::Skip;
    }
    if predicate.op.selects_only_outliers(
        sma.lower_threshold,
        sma.upper_threshold,
        predicate.literal,
    ) {
        return Decision::OutlierRead;
    }
    Decision::ProbeScan
}

/// Whether a key's artifact should be evicted after the query that was
/// allocated `query_id`.
///
/// Three grounds: the budget is exhausted and this query charged it; the
/// index has a full window of scans without a single skip or outlier read;
/// or the index has not been used for more than a window of queries.
pub fn should_evict(
    metrics: &FileMetrics,
    budget: f64,
    query_id: u64,
    debited_this_query: bool,
    policy: &PolicyConfig,
) -> bool {
    if budget == 0.0 && debited_this_query {
        return true;
    }
    if metrics.scan_count >= policy.recency_window
        && metrics.skipped_count == 0
        && metrics.outlier_retrieved_count == 0
    {
        return true;
    }
    query_id.saturating_sub(metrics.last_sma_used_query_id) > policy.recency_window
}
