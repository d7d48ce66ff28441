// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Observe and validate changes to a replicated set.
//!
//! Sentinels are types that can be used to inspect the membership changes a merge is about to
//! apply. They are useful for validating that incoming state conforms to an application schema or
//! authorization policy, or simply to observe the changes for any other purpose (for example,
//! logging, metrics, updating a derived index, etc).
//!
//! Merges that accept a sentinel (such as
//! [`GrowOnlySet::merge_with`](crate::GrowOnlySet::merge_with)) report every change first and only
//! apply the merge if the sentinel accepted all of them. A sentinel that returns an error
//! therefore leaves the replica exactly as it was.

use std::{convert::Infallible, fmt::Debug};

/// Observes and optionally stops a change being applied to a CRDT.
///
/// This is the base trait that all Sentinels should implement. The actual behaviour lives in
/// specialized traits such as [`ValueSentinel`].
///
/// If Error = Infallible, the Sentinel is referred to as an Observer. If it can produce an error, it
/// may be referred to as a Validator.
pub trait Sentinel {
    type Error;
}

/// Observe when values enter or leave a set.
///
/// There are no ordering guarantees between calls for different values.
#[expect(unused_variables)]
pub trait ValueSentinel<V>: Sentinel {
    /// Observe and validate a value becoming a member.
    fn set(&mut self, value: &V) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Observe and validate a value ceasing to be a member.
    fn unset(&mut self, value: &V) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// A Sentinel that does nothing.
///
/// This is useful when the merge doesn't need any introspection. Using it helps the compiler
/// optimise some code away.
pub struct DummySentinel;

impl Sentinel for DummySentinel {
    type Error = Infallible;
}

impl<V> ValueSentinel<V> for DummySentinel {}

/// A sentinel that records all calls in a human readable form.
///
/// This is mostly useful for tests.
#[derive(Debug, Default)]
pub struct RecordingSentinel {
    /// A string-representation of each call that the sentinel has received.
    pub changes_seen: Vec<String>,
}

impl RecordingSentinel {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Sentinel for RecordingSentinel {
    type Error = Infallible;
}

impl<V: Debug> ValueSentinel<V> for RecordingSentinel {
    fn set(&mut self, value: &V) -> Result<(), Self::Error> {
        self.changes_seen.push(format!("set {value:?}"));
        Ok(())
    }

    fn unset(&mut self, value: &V) -> Result<(), Self::Error> {
        self.changes_seen.push(format!("unset {value:?}"));
        Ok(())
    }
}
