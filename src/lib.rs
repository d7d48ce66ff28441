// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! # Convergent: state-based CRDTs and dense sequence positions
//!
//! This crate provides a small toolkit of **convergent replicated data types** (state-based
//! CRDTs) meant to be embedded in a larger peer-to-peer or multi-replica application. Replicas
//! mutate their local copies independently, possibly offline, and later exchange snapshots of
//! their state to reconcile without any coordination.
//!
//! ## Core Concepts
//!
//! The replicated types are:
//!
//! - [`GrowOnlySet`]: an add-only set. Once a value is in, it stays in.
//! - [`LastWriterWinsSet`]: a set supporting both additions and removals, where conflicting
//!   writes to the same value are resolved by timestamp, then by [`SiteId`].
//! - [`PositiveNegativeCounter`]: a counter supporting increments and decrements.
//!
//! All three implement [`Replicated`], which is the entire replication protocol:
//! [`Replicated::state`] produces a snapshot of plain records that can be serialized and
//! transmitted verbatim, and [`Replicated::merge`] folds a snapshot received from a peer into the
//! local state. Merging is idempotent, commutative and associative, so snapshots may be delivered
//! out of order, more than once, or with arbitrary delay, and replicas that have seen the same
//! updates always report the same [`Replicated::value`].
//!
//! Alongside them, [`Position`] is a dense, totally ordered identifier for the elements of a
//! replicated ordered sequence. [`Position::between`] mints a new position strictly between two
//! existing ones, tagged with the requesting site so that concurrent inserts never collide. The
//! canonical string form of a position sorts byte-wise the same way the position does, so it can
//! be used directly as a sort key in external storage.
//!
//! ## Getting Started
//!
//! ```rust
//! use convergent::{PositiveNegativeCounter, Replicated, SiteId};
//!
//! let mut a = PositiveNegativeCounter::new(SiteId::new("a").unwrap());
//! let mut b = PositiveNegativeCounter::new(SiteId::new("b").unwrap());
//!
//! a.increment(3);
//! b.increment(4);
//! a.merge(b.state());
//! assert_eq!(a.value(), 7);
//!
//! b.decrement(2);
//! a.merge(b.state());
//! assert_eq!(a.value(), 5);
//! ```
//!
//! ## Scope of this Crate
//!
//! **It does not include any networking protocols or persistence.** You are responsible for
//! shipping snapshots between replicas. Unlike causal CRDTs, nothing here requires causal
//! delivery: any complete snapshot may be merged at any time.
//!
//! Every type is a plain single-owner value with no internal locking. Share one across threads
//! the way you would share any other collection.
//!
//! ## Validation and Observation
//!
//! The sets accept a [`Sentinel`](crate::sentinel::Sentinel) during merges, which observes (and
//! may veto) every membership change a merge would cause. With the `json` feature, the
//! [`JsonState`] trait validates incoming snapshots at the transport boundary.
//!
//! ## License
//!
//! This project is licensed under either of
//!
//! - Apache License, Version 2.0, ([LICENSE-APACHE](LICENSE-APACHE) or http://www.apache.org/licenses/LICENSE-2.0)
//! - MIT license ([LICENSE-MIT](LICENSE-MIT) or http://opensource.org/licenses/MIT)
//!
//! at your option.
//!
//! ## Features
//!
//! - `json`: Enables exchanging snapshots as `serde_json::Value`, validated on the way in. This
//!   feature is enabled by default.
//! - `serde`: Provides `serde` support for all record, site and position types.
//! - `arbitrary`: Implements `quickcheck::Arbitrary` for records, sites and positions, useful for
//!   property-based testing.
//! - `chrono`: Reads the wall clock through `chrono`. This feature is enabled by default.
#[cfg(test)]
#[macro_use(quickcheck)]
extern crate quickcheck_macros;

use ahash::RandomState;
use std::{
    collections::{HashMap, HashSet},
    hash::BuildHasher,
    sync::atomic::{AtomicBool, Ordering},
};

// Use a constant seed for hashing to make performance benchmarks have less variance.
pub(crate) const DETERMINISTIC_HASHER: RandomState = RandomState::with_seeds(48, 1516, 23, 42);

pub mod clock;
pub use clock::{Clock, ManualClock, SystemClock, Timestamp};
pub mod crdts;
pub use crdts::{
    MalformedState, Replicated, ValueSet,
    gset::{GrowOnlySet, SetRecord},
    lwwset::{LastWriterWinsSet, LwwRecord},
    pncounter::{CounterState, PositiveNegativeCounter},
};
#[cfg(feature = "json")]
pub mod json;
#[cfg(feature = "json")]
pub use json::JsonState;
pub mod position;
pub use position::{Position, PositionError, Segment};
pub mod sentinel;
mod site;
pub use site::{SITE_PUNCTUATION, SiteId, SiteIdError};

static ENABLE_DETERMINISM: AtomicBool = AtomicBool::new(false);

/// Makes all data structures behave deterministically.
///
/// This should only be enabled for testing, as it increases the odds of DoS
/// scenarios.
#[doc(hidden)]
pub fn enable_determinism() {
    ENABLE_DETERMINISM.store(true, Ordering::Release);
}

/// Checks if determinism is enabled.
///
/// Should be used internally and for testing.
#[doc(hidden)]
pub fn determinism_enabled() -> bool {
    ENABLE_DETERMINISM.load(Ordering::Acquire)
}

/// Create a random state for a hashmap.
/// If `enable_determinism` has been used, this will return a deterministic
/// decidedly non-random RandomState, useful in tests.
#[inline]
fn make_random_state() -> RandomState {
    if determinism_enabled() {
        DETERMINISTIC_HASHER
    } else {
        RandomState::new()
    }
}

fn create_map<K, V>() -> HashMap<K, V, ConvergentRandomState> {
    HashMap::with_hasher(ConvergentRandomState::default())
}

fn create_set<T>() -> HashSet<T, ConvergentRandomState> {
    HashSet::with_hasher(ConvergentRandomState::default())
}

/// This is a small wrapper around the ahash RandomState.
/// This allows us to easily switch to a non-random RandomState for use in tests.
#[derive(Clone)]
pub struct ConvergentRandomState {
    inner: RandomState,
}

// Falls back on a regular ahash::RandomState except when 'enable_determinism' has been called, in
// which case a static only-for-test RandomState is used.
impl Default for ConvergentRandomState {
    #[inline]
    fn default() -> Self {
        Self {
            inner: make_random_state(),
        }
    }
}

impl BuildHasher for ConvergentRandomState {
    type Hasher = <RandomState as BuildHasher>::Hasher;

    #[inline]
    fn build_hasher(&self) -> Self::Hasher {
        self.inner.build_hasher()
    }
}

impl std::fmt::Debug for ConvergentRandomState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConvergentRandomState").finish_non_exhaustive()
    }
}
