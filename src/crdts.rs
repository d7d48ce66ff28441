// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! # State-based replicated types
//!
//! This module provides the replicated data types of this crate. Each is a **state-based** (or
//! convergent) CRDT: replicas exchange snapshots of their state rather than individual operations,
//! and merging a snapshot is a join in a semilattice (idempotent, commutative, and associative).
//!
//! - **[`GrowOnlySet`](gset::GrowOnlySet)**: an add-only set.
//! - **[`LastWriterWinsSet`](lwwset::LastWriterWinsSet)**: a set with additions and removals,
//!   resolved per value by `(timestamp, site)`.
//! - **[`PositiveNegativeCounter`](pncounter::PositiveNegativeCounter)**: per-site increment and
//!   decrement accumulators.
//!
//! ## Snapshots
//!
//! A snapshot ([`Replicated::state`]) is a `Vec` of plain records with no internal references,
//! safe to serialize and transmit. Every record carries the [`SiteId`](crate::SiteId) that
//! produced it, which is all a receiving replica needs to merge it: there is no causal context
//! and no delivery order requirement.
//!
//! ## Tombstones
//!
//! The last-writer-wins set keeps a record for every value it has ever seen, including removed
//! ones, because a removal must keep winning against older additions that arrive later. These
//! tombstones are never collected.
use crate::ConvergentRandomState;
use std::{collections::HashSet, fmt};

pub mod gset;
pub mod lwwset;
pub mod pncounter;

#[cfg(any(test, feature = "arbitrary"))]
mod test_util;

/// The set of values observed through [`Replicated::value`] on the sets.
pub type ValueSet<T> = HashSet<T, ConvergentRandomState>;

/// A state-based replicated data type.
///
/// Implementors guarantee that once two replicas have merged the same records, in any order and
/// any number of times, their [`Replicated::value`]s are equal.
pub trait Replicated {
    /// A single element of a snapshot.
    type Record;

    /// What the replicated state resolves to.
    type Value;

    /// Returns a snapshot of this replica's state, suitable for [`Replicated::merge`] on another
    /// replica.
    fn state(&self) -> Vec<Self::Record>;

    /// Merges records received from another replica into this one.
    fn merge<I>(&mut self, records: I)
    where
        I: IntoIterator<Item = Self::Record>;

    /// Returns the current value of this replica.
    fn value(&self) -> Self::Value;
}

/// Error returned when an incoming snapshot does not have the expected shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedState(pub String);

impl fmt::Display for MalformedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed state: {}", self.0)
    }
}

impl std::error::Error for MalformedState {}
