// SPDX-License-Identifier: Apache-2.0

//! Tree-level metrics, parallel to `amt_store::metrics::StoreMetrics`.

use std::sync::Arc;

use once_cell::sync::OnceCell;
use prometheus::{
    register_histogram_vec_with_registry, register_int_counter_vec_with_registry,
    HistogramVec, IntCounterVec, Registry,
};

#[derive(Debug)]
pub struct TreeMetrics {
    pub rotations: IntCounterVec,
    pub batch_sizes: HistogramVec,
    pub proof_tokens_emitted: IntCounterVec,
}

static INSTANCE: OnceCell<Arc<TreeMetrics>> = OnceCell::new();

impl TreeMetrics {
    /// Constructed once per process via `once_cell`, for the same reason as
    /// `amt_store::metrics::StoreMetrics::new`: repeated calls return the
    /// already-registered collectors rather than re-registering and
    /// panicking.
    pub fn new(registry: &Registry) -> Arc<Self> {
        INSTANCE
            .get_or_init(|| Arc::new(Self::register(registry)))
            .clone()
    }

    fn register(registry: &Registry) -> Self {
        Self {
            rotations: register_int_counter_vec_with_registry!(
                "amt_tree_rotations_total",
                "Number of single/double rotations performed while rebalancing.",
                &["kind"],
                registry,
            )
            .expect("amt_tree_rotations_total metric registration"),
            batch_sizes: register_histogram_vec_with_registry!(
                "amt_tree_apply_batch_size",
                "Size of batches passed to apply().",
                &["path"],
                registry,
            )
            .expect("amt_tree_apply_batch_size metric registration"),
            proof_tokens_emitted: register_int_counter_vec_with_registry!(
                "amt_tree_proof_tokens_total",
                "Number of proof tokens emitted while materializing a branch.",
                &["selector"],
                registry,
            )
            .expect("amt_tree_proof_tokens_total metric registration"),
        }
    }
}
