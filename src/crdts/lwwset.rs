// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! A replicated set with additions and removals, resolved by last writer wins.
//!
//! Every value the set has ever seen has exactly one [`LwwRecord`], holding whether the value is
//! present, when that was decided, and by which site. Merging keeps, for each value, the record
//! with the greatest timestamp; on equal timestamps the record written by the lexicographically
//! smaller [`SiteId`] wins. Since that rule is a total order over `(timestamp, site)`, every
//! replica resolves a concurrent add and remove the same way.
//!
//! Sites are not assumed to have synchronized clocks. A site whose clock runs ahead wins more
//! conflicts than it should, which may let a stale add override a later remove from another site.
//! That is inherent to last-writer-wins and never makes replicas disagree.
use super::{Replicated, ValueSet};
use crate::{
    ConvergentRandomState, SiteId,
    clock::{Clock, SystemClock, Timestamp},
    create_map, create_set,
    sentinel::{DummySentinel, ValueSentinel},
};
use std::{cell::OnceCell, collections::HashMap, hash::Hash, sync::Arc};
use tracing::{debug, trace};

/// The snapshot record of a single value of a [`LastWriterWinsSet`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
pub struct LwwRecord<T> {
    pub value: T,
    /// Whether the value is a member (true) or a tombstone (false).
    pub present: bool,
    pub timestamp: Timestamp,
    /// The site that wrote this record.
    pub site: SiteId,
}

impl<T> LwwRecord<T> {
    /// Returns true if `self` replaces `other` when both are records for the same value.
    pub fn supersedes(&self, other: &Self) -> bool {
        self.timestamp > other.timestamp
            || (self.timestamp == other.timestamp && self.site < other.site)
    }
}

/// A set supporting both additions and removals.
///
/// ```rust
/// # use convergent::{LastWriterWinsSet, ManualClock, Replicated, SiteId, Timestamp};
/// let clock = ManualClock::new(Timestamp::from_millis(1));
/// let mut a = LastWriterWinsSet::with_clock(SiteId::new("a").unwrap(), clock.clone());
/// let mut b = LastWriterWinsSet::with_clock(SiteId::new("b").unwrap(), clock.clone());
///
/// a.add("x");
/// b.merge(a.state());
/// clock.advance(1);
/// b.remove("x");
/// a.merge(b.state());
/// assert!(a.value().is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct LastWriterWinsSet<T, C = SystemClock> {
    site: SiteId,
    clock: C,
    /// One per value, in the order this replica first learned about each value.
    records: Vec<LwwRecord<T>>,
    index: HashMap<T, usize, ConvergentRandomState>,
    cached: OnceCell<Arc<ValueSet<T>>>,
}

impl<T> LastWriterWinsSet<T>
where
    T: Hash + Eq + Clone,
{
    /// Creates an empty set whose writes are timestamped by the system clock.
    pub fn new(site: SiteId) -> Self {
        Self::with_clock(site, SystemClock)
    }
}

impl<T, C> LastWriterWinsSet<T, C>
where
    T: Hash + Eq + Clone,
    C: Clock,
{
    /// Creates an empty set whose writes are timestamped by `clock`.
    pub fn with_clock(site: SiteId, clock: C) -> Self {
        Self {
            site,
            clock,
            records: Vec::new(),
            index: create_map(),
            cached: OnceCell::new(),
        }
    }

    /// The site this replica writes under.
    pub fn site(&self) -> &SiteId {
        &self.site
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Makes `value` a member.
    pub fn add(&mut self, value: T) {
        self.write(value, true);
    }

    /// Makes `value` a non-member, leaving a tombstone.
    ///
    /// Removing a value this replica has never seen still records the removal, so that it wins
    /// against older additions merged later.
    pub fn remove(&mut self, value: T) {
        self.write(value, false);
    }

    fn write(&mut self, value: T, present: bool) {
        let now = self.clock.now();
        match self.index.get(&value) {
            Some(&i) => {
                let previous = &mut self.records[i];
                // strictly after the record it replaces, even if our clock lags behind its writer
                let timestamp = now.max(previous.timestamp.successor());
                if previous.present != present {
                    self.cached.take();
                }
                previous.present = present;
                previous.timestamp = timestamp;
                previous.site = self.site.clone();
            }
            None => {
                self.index.insert(value.clone(), self.records.len());
                self.records.push(LwwRecord {
                    value,
                    present,
                    timestamp: now,
                    site: self.site.clone(),
                });
                if present {
                    self.cached.take();
                }
            }
        }
    }

    /// Returns true if `value` is currently a member.
    pub fn contains(&self, value: &T) -> bool {
        self.record(value).is_some_and(|r| r.present)
    }

    /// Returns the winning record for `value`, if this replica has seen it at all.
    pub fn record(&self, value: &T) -> Option<&LwwRecord<T>> {
        self.index.get(value).map(|&i| &self.records[i])
    }

    /// Iterates over all records, tombstones included.
    pub fn records(&self) -> impl ExactSizeIterator<Item = &LwwRecord<T>> {
        self.records.iter()
    }

    /// Merges `records` into this replica, reporting every membership change to `sentinel`.
    ///
    /// Incoming records that do not supersede the local record for their value are ignored. A
    /// value that gains a superseding record only produces a sentinel call if its presence flips.
    /// If the sentinel rejects any change, nothing is merged.
    pub fn merge_with<I, S>(&mut self, records: I, sentinel: &mut S) -> Result<(), S::Error>
    where
        I: IntoIterator<Item = LwwRecord<T>>,
        S: ValueSentinel<T>,
    {
        // the winning incoming record per value
        let mut staged: Vec<LwwRecord<T>> = Vec::new();
        let mut staged_index = create_map::<T, usize>();
        for record in records {
            if let Some(local) = self.record(&record.value) {
                if !record.supersedes(local) {
                    trace!(
                        by = %record.site,
                        timestamp = %record.timestamp,
                        "ignoring superseded record"
                    );
                    continue;
                }
            }
            match staged_index.get(&record.value) {
                Some(&i) if record.supersedes(&staged[i]) => staged[i] = record,
                Some(_) => {}
                None => {
                    staged_index.insert(record.value.clone(), staged.len());
                    staged.push(record);
                }
            }
        }

        let mut flips = 0;
        for record in &staged {
            let was_present = self.contains(&record.value);
            match (was_present, record.present) {
                (false, true) => sentinel.set(&record.value)?,
                (true, false) => sentinel.unset(&record.value)?,
                _ => continue,
            }
            flips += 1;
        }

        if staged.is_empty() {
            return Ok(());
        }
        debug!(site = %self.site, updated = staged.len(), flips, "merged records");
        for record in staged {
            match self.index.get(&record.value) {
                Some(&i) => self.records[i] = record,
                None => {
                    self.index.insert(record.value.clone(), self.records.len());
                    self.records.push(record);
                }
            }
        }
        if flips > 0 {
            self.cached.take();
        }
        Ok(())
    }
}

impl<T, C> Replicated for LastWriterWinsSet<T, C>
where
    T: Hash + Eq + Clone,
    C: Clock,
{
    type Record = LwwRecord<T>;
    type Value = Arc<ValueSet<T>>;

    fn state(&self) -> Vec<LwwRecord<T>> {
        self.records.clone()
    }

    fn merge<I>(&mut self, records: I)
    where
        I: IntoIterator<Item = LwwRecord<T>>,
    {
        let Ok(()) = self.merge_with(records, &mut DummySentinel);
    }

    /// Returns the values whose winning record marks them present.
    ///
    /// Like [`GrowOnlySet::value`](super::gset::GrowOnlySet), the result is shared until the next
    /// change in membership.
    fn value(&self) -> Arc<ValueSet<T>> {
        let members = self.cached.get_or_init(|| {
            let mut members = create_set();
            members.extend(
                self.records
                    .iter()
                    .filter(|r| r.present)
                    .map(|r| r.value.clone()),
            );
            Arc::new(members)
        });
        Arc::clone(members)
    }
}
