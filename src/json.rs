// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! JSON representation of snapshots
//!
//! A snapshot is a JSON array of records, each a JSON object with the fields of the record type.
//! Site ids are plain strings and timestamps are integers of milliseconds since the UNIX epoch.
//!
//! Incoming snapshots are decoded and validated in full before anything is merged: a payload with
//! a missing field, a value of the wrong type, an invalid site id or a negative counter is
//! rejected with [`MalformedState`] and leaves the replica untouched.
//!
//! # Examples
//!
//! ## A last-writer-wins set
//!
//! ```json
//! [
//!   { "value": "apples", "present": true, "timestamp": 1718000000000, "site": "alice" },
//!   { "value": "pears", "present": false, "timestamp": 1718000004242, "site": "bob" }
//! ]
//! ```
//!
//! ## A counter
//!
//! ```json
//! [{ "site": "alice", "positive": 7, "negative": 2 }]
//! ```
use crate::crdts::{MalformedState, Replicated};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use tracing::debug;

impl From<serde_json::Error> for MalformedState {
    fn from(error: serde_json::Error) -> Self {
        MalformedState(error.to_string())
    }
}

/// Exchanges the snapshots of a [`Replicated`] type as [`serde_json::Value`]s.
///
/// Implemented for every replicated type whose records can be serialized.
///
/// ```rust
/// # use convergent::{GrowOnlySet, JsonState, Replicated, SiteId};
/// let mut a = GrowOnlySet::new(SiteId::new("a").unwrap());
/// a.add(1);
/// let mut b = GrowOnlySet::new(SiteId::new("b").unwrap());
/// b.merge_json(a.state_json().unwrap()).unwrap();
/// assert!(b.contains(&1));
///
/// let malformed = serde_json::json!([{ "value": 2, "origin": "NOT A SITE" }]);
/// assert!(b.merge_json(malformed).is_err());
/// assert!(!b.contains(&2));
/// ```
pub trait JsonState: Replicated {
    /// Returns [`Replicated::state`] as a JSON array.
    fn state_json(&self) -> Result<Value, MalformedState>;

    /// Validates `state` as a snapshot and merges it.
    ///
    /// Nothing is merged unless every record in `state` is well-formed.
    fn merge_json(&mut self, state: Value) -> Result<(), MalformedState>;
}

impl<R> JsonState for R
where
    R: Replicated,
    R::Record: Serialize + DeserializeOwned,
{
    fn state_json(&self) -> Result<Value, MalformedState> {
        Ok(serde_json::to_value(self.state())?)
    }

    fn merge_json(&mut self, state: Value) -> Result<(), MalformedState> {
        if !state.is_array() {
            return Err(MalformedState(format!(
                "expected an array of records, found {state}"
            )));
        }
        let records: Vec<R::Record> = serde_json::from_value(state).inspect_err(|e| {
            debug!(error = %e, "rejecting malformed snapshot");
        })?;
        self.merge(records);
        Ok(())
    }
}
