//! Deterministic seed derivation for independent random streams.
//!
//! Every forward simulation chunk, every iteration and every bootstrap realization
//! gets its own `StdRng`. Seeds are derived by hashing `(base, stream)` so that
//! streams never coincide and a run is reproducible from one user-facing seed.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use rand::SeedableRng;
use rand::rngs::StdRng;

/// Derive the seed of sub-stream `stream` from `base`.
pub fn derive_seed(base: u64, stream: u64) -> u64 {
    let mut hasher = DefaultHasher::new();
    base.hash(&mut hasher);
    stream.hash(&mut hasher);
    hasher.finish()
}

/// Seeded RNG for sub-stream `stream` of `base`.
pub fn stream_rng(base: u64, stream: u64) -> StdRng {
    StdRng::seed_from_u64(derive_seed(base, stream))
}
