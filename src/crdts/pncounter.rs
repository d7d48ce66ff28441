// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! A replicated counter supporting increments and decrements.
//!
//! Each site owns two monotonically growing accumulators, one for increments and one for
//! decrements, and is the only writer of its own. Replicas learn other sites' accumulators through
//! [`CounterState`] records and keep the largest value seen for each, so merging is a
//! component-wise maximum. The counter's value is the sum of all increments minus the sum of all
//! decrements.
use super::Replicated;
use crate::{ConvergentRandomState, SiteId, create_map};
use std::collections::HashMap;
use tracing::{debug, trace};

/// The accumulators of a single site.
///
/// The site travels with the accumulators, so a receiver knows whose entries to update.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
pub struct CounterState {
    pub site: SiteId,
    pub positive: u64,
    pub negative: u64,
}

#[derive(Debug, Clone)]
pub struct PositiveNegativeCounter {
    site: SiteId,
    positive: HashMap<SiteId, u64, ConvergentRandomState>,
    negative: HashMap<SiteId, u64, ConvergentRandomState>,
}

impl PositiveNegativeCounter {
    pub fn new(site: SiteId) -> Self {
        Self {
            site,
            positive: create_map(),
            negative: create_map(),
        }
    }

    /// The site whose accumulators this replica owns.
    pub fn site(&self) -> &SiteId {
        &self.site
    }

    /// Adds `n` to this site's increments.
    ///
    /// Accumulators saturate at `u64::MAX`.
    pub fn increment(&mut self, n: u64) {
        let total = self.positive.entry(self.site.clone()).or_default();
        *total = total.saturating_add(n);
    }

    /// Adds `n` to this site's decrements.
    pub fn decrement(&mut self, n: u64) {
        let total = self.negative.entry(self.site.clone()).or_default();
        *total = total.saturating_add(n);
    }

    /// Returns the accumulators known for `site`.
    pub fn state_of(&self, site: &SiteId) -> CounterState {
        CounterState {
            site: site.clone(),
            positive: self.positive.get(site).copied().unwrap_or(0),
            negative: self.negative.get(site).copied().unwrap_or(0),
        }
    }

    /// Returns the accumulators of every site this replica knows about, sorted by site.
    ///
    /// Unlike [`Replicated::state`], this lets a replica relay what it learned from others.
    /// Merging it elsewhere is always safe: the receiver ignores its own site's record.
    pub fn states(&self) -> Vec<CounterState> {
        let mut sites: Vec<&SiteId> = self.positive.keys().chain(self.negative.keys()).collect();
        sites.sort_unstable();
        sites.dedup();
        sites.into_iter().map(|site| self.state_of(site)).collect()
    }
}

impl Replicated for PositiveNegativeCounter {
    type Record = CounterState;
    type Value = i64;

    /// Returns this site's own accumulators.
    fn state(&self) -> Vec<CounterState> {
        vec![self.state_of(&self.site)]
    }

    /// Raises every other site's accumulators to at least the incoming ones.
    ///
    /// Records about this replica's own site are ignored, since no one else writes them.
    fn merge<I>(&mut self, records: I)
    where
        I: IntoIterator<Item = CounterState>,
    {
        let mut raised = 0;
        for record in records {
            if record.site == self.site {
                trace!(site = %self.site, "ignoring record about own site");
                continue;
            }
            raised += usize::from(raise(&mut self.positive, &record.site, record.positive));
            raised += usize::from(raise(&mut self.negative, &record.site, record.negative));
        }
        if raised > 0 {
            debug!(site = %self.site, raised, "merged counter states");
        }
    }

    /// Returns the sum of all increments minus the sum of all decrements.
    ///
    /// Saturates at the bounds of `i64`.
    fn value(&self) -> i64 {
        let positive: i128 = self.positive.values().map(|&n| i128::from(n)).sum();
        let negative: i128 = self.negative.values().map(|&n| i128::from(n)).sum();
        let value = (positive - negative).clamp(i128::from(i64::MIN), i128::from(i64::MAX));
        value as i64
    }
}

/// Raises `accumulators[site]` to `incoming`, returning true if that changed anything.
fn raise(
    accumulators: &mut HashMap<SiteId, u64, ConvergentRandomState>,
    site: &SiteId,
    incoming: u64,
) -> bool {
    match accumulators.get_mut(site) {
        Some(current) if *current >= incoming => false,
        Some(current) => {
            *current = incoming;
            true
        }
        None if incoming == 0 => false,
        None => {
            accumulators.insert(site.clone(), incoming);
            true
        }
    }
}
