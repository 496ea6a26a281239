// SPDX-License-Identifier: Apache-2.0

//! Small, `Default`-constructible configuration, mirroring the teacher's
//! `*Config` convention rather than hidden global state.

/// Tuning knobs for a [`crate::TreeEngine`]. None of these change observable
/// results — they only pick between equally-correct strategies.
#[derive(Debug, Clone)]
pub struct TreeConfig {
    /// Number of recently-touched nodes an embedder may cache in front of the
    /// backing store. The tree engine itself always treats the backing store
    /// as the source of truth (spec.md §5, "Memory"); this is advisory sizing
    /// information for that cache, not enforced here.
    pub node_cache_capacity: usize,
    /// Whether `apply` forks the left/right recursion across `rayon`'s
    /// thread pool. Disabling it is useful for deterministic single-threaded
    /// testing and for embedding in a context that already owns its own
    /// thread pool.
    pub parallel_batch_apply: bool,
    /// Target number of in-range nodes per chunk when streaming a range
    /// proof (spec.md §4.5.5); bounds memory without changing the result.
    pub proof_chunk_size: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            node_cache_capacity: 10_000,
            parallel_batch_apply: true,
            proof_chunk_size: 256,
        }
    }
}
