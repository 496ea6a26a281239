// SPDX-License-Identifier: Apache-2.0

//! Store-level metrics, modeled on `moveos/raw-store/src/metrics.rs`:
//! a flat struct of `prometheus` vecs registered once against a
//! caller-supplied registry. Optional — `NodeStore::new` tolerates `None`
//! so unit tests don't need to wire up a registry.

use std::sync::Arc;

use once_cell::sync::OnceCell;
use prometheus::{
    register_histogram_vec_with_registry, register_int_counter_vec_with_registry,
    HistogramVec, IntCounterVec, Registry,
};

#[derive(Debug)]
pub struct StoreMetrics {
    pub node_reads: IntCounterVec,
    pub node_writes: IntCounterVec,
    pub commits: IntCounterVec,
    pub commit_latency_seconds: HistogramVec,
}

static INSTANCE: OnceCell<Arc<StoreMetrics>> = OnceCell::new();

impl StoreMetrics {
    /// Constructed once per process via `once_cell`. A second call — e.g. a
    /// second `NodeStore::new` against the already-instrumented registry —
    /// returns the same registered collectors instead of registering a
    /// duplicate and panicking on prometheus's `AlreadyReg` error.
    pub fn new(registry: &Registry) -> Arc<Self> {
        INSTANCE
            .get_or_init(|| Arc::new(Self::register(registry)))
            .clone()
    }

    fn register(registry: &Registry) -> Self {
        Self {
            node_reads: register_int_counter_vec_with_registry!(
                "amt_store_node_reads_total",
                "Number of node reads served from the backing store.",
                &["result"],
                registry,
            )
            .expect("amt_store_node_reads_total metric registration"),
            node_writes: register_int_counter_vec_with_registry!(
                "amt_store_node_writes_total",
                "Number of node writes staged into a transaction.",
                &["op"],
                registry,
            )
            .expect("amt_store_node_writes_total metric registration"),
            commits: register_int_counter_vec_with_registry!(
                "amt_store_commits_total",
                "Number of committed (and rolled-back) transactions.",
                &["outcome"],
                registry,
            )
            .expect("amt_store_commits_total metric registration"),
            commit_latency_seconds: register_histogram_vec_with_registry!(
                "amt_store_commit_latency_seconds",
                "Latency of a backing-store write_batch call.",
                &["outcome"],
                registry,
            )
            .expect("amt_store_commit_latency_seconds metric registration"),
        }
    }
}
