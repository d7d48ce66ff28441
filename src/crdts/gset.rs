// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! An add-only replicated set.
use super::{Replicated, ValueSet};
use crate::{
    SiteId, create_set,
    sentinel::{DummySentinel, ValueSentinel},
};
use std::{cell::OnceCell, hash::Hash, sync::Arc};
use tracing::debug;

/// The snapshot record of a single member of a [`GrowOnlySet`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
pub struct SetRecord<T> {
    pub value: T,
    /// The site that first added the value.
    pub origin: SiteId,
}

/// A set to which values can only ever be added.
///
/// Membership is monotonic: once a value is observed by [`GrowOnlySet::value`], it is there on
/// every subsequent call, whatever is merged in the meantime.
///
/// ```rust
/// # use convergent::{GrowOnlySet, Replicated, SiteId};
/// let mut a = GrowOnlySet::new(SiteId::new("a").unwrap());
/// let mut b = GrowOnlySet::new(SiteId::new("b").unwrap());
/// a.add("apples");
/// b.add("bananas");
/// a.merge(b.state());
/// b.merge(a.state());
/// assert_eq!(a.value(), b.value());
/// assert_eq!(a.value().len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct GrowOnlySet<T> {
    site: SiteId,
    /// In the order this replica first learned about each value.
    records: Vec<SetRecord<T>>,
    members: ValueSet<T>,
    /// Cleared whenever membership changes.
    cached: OnceCell<Arc<ValueSet<T>>>,
}

impl<T> GrowOnlySet<T>
where
    T: Hash + Eq + Clone,
{
    pub fn new(site: SiteId) -> Self {
        Self {
            site,
            records: Vec::new(),
            members: create_set(),
            cached: OnceCell::new(),
        }
    }

    /// The site this replica adds values under.
    pub fn site(&self) -> &SiteId {
        &self.site
    }

    /// Adds `value` to the set.
    ///
    /// Returns false if it was already a member, in which case nothing changes.
    pub fn add(&mut self, value: T) -> bool {
        if !self.members.insert(value.clone()) {
            return false;
        }
        self.records.push(SetRecord {
            value,
            origin: self.site.clone(),
        });
        self.cached.take();
        true
    }

    pub fn contains(&self, value: &T) -> bool {
        self.members.contains(value)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterates over the records of this replica, in the order it learned about them.
    pub fn records(&self) -> impl ExactSizeIterator<Item = &SetRecord<T>> {
        self.records.iter()
    }

    /// Merges `records` into this replica, reporting every newly added value to `sentinel`.
    ///
    /// Records for values that are already members are ignored. If the sentinel rejects any
    /// value, nothing is merged.
    pub fn merge_with<I, S>(&mut self, records: I, sentinel: &mut S) -> Result<(), S::Error>
    where
        I: IntoIterator<Item = SetRecord<T>>,
        S: ValueSentinel<T>,
    {
        let mut staged = Vec::new();
        for record in records {
            // also dedupes within `records`, keeping the first
            if self.members.insert(record.value.clone()) {
                staged.push(record);
            }
        }

        if let Some(e) = staged.iter().find_map(|r| sentinel.set(&r.value).err()) {
            for record in &staged {
                self.members.remove(&record.value);
            }
            return Err(e);
        }

        if !staged.is_empty() {
            debug!(site = %self.site, added = staged.len(), "merged new members");
            self.records.extend(staged);
            self.cached.take();
        }
        Ok(())
    }
}

impl<T> Replicated for GrowOnlySet<T>
where
    T: Hash + Eq + Clone,
{
    type Record = SetRecord<T>;
    type Value = Arc<ValueSet<T>>;

    fn state(&self) -> Vec<SetRecord<T>> {
        self.records.clone()
    }

    fn merge<I>(&mut self, records: I)
    where
        I: IntoIterator<Item = SetRecord<T>>,
    {
        let Ok(()) = self.merge_with(records, &mut DummySentinel);
    }

    /// Returns the members of the set.
    ///
    /// The result is computed once and shared until the next change in membership, so repeated
    /// calls return the same allocation.
    fn value(&self) -> Arc<ValueSet<T>> {
        Arc::clone(self.cached.get_or_init(|| Arc::new(self.members.clone())))
    }
}
