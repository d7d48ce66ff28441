// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! This module implements Arbitrary for sequences of operations.

use crate::{
    GrowOnlySet, LastWriterWinsSet, PositiveNegativeCounter, Replicated, SiteId,
    clock::ManualClock,
};
use quickcheck::{Arbitrary, Gen};
use std::{collections::HashMap, fmt};
use tracing::debug;

/// A replicated type that the trace simulator knows how to drive.
pub(crate) trait Simulated: Replicated + Sized {
    /// A local mutation.
    type Op: Clone + fmt::Debug + 'static;

    /// Creates an empty replica for `site`, reading time from `clock` if it needs to.
    fn fresh(site: SiteId, clock: ManualClock) -> Self;

    /// Produces an arbitrary local mutation, given the replica's current view of the world.
    fn arbitrary_op(&self, g: &mut Gen) -> Self::Op;

    fn apply(&mut self, op: &Self::Op);
}

impl Simulated for GrowOnlySet<u8> {
    type Op = u8;

    fn fresh(site: SiteId, _: ManualClock) -> Self {
        Self::new(site)
    }

    fn arbitrary_op(&self, g: &mut Gen) -> u8 {
        // a small domain, so that sites often add the same values
        u8::arbitrary(g) % 16
    }

    fn apply(&mut self, op: &u8) {
        self.add(*op);
    }
}

#[derive(Debug, Clone)]
pub(crate) enum LwwOp {
    Add(u8),
    Remove(u8),
}

impl Simulated for LastWriterWinsSet<u8, ManualClock> {
    type Op = LwwOp;

    fn fresh(site: SiteId, clock: ManualClock) -> Self {
        Self::with_clock(site, clock)
    }

    fn arbitrary_op(&self, g: &mut Gen) -> LwwOp {
        let mut members: Vec<u8> = self.value().iter().copied().collect();
        members.sort_unstable();
        // mostly remove things that are there, but sometimes remove things that aren't
        if !members.is_empty() && bool::arbitrary(g) {
            LwwOp::Remove(*g.choose(&members).unwrap())
        } else if u8::arbitrary(g) < 32 {
            LwwOp::Remove(u8::arbitrary(g) % 16)
        } else {
            LwwOp::Add(u8::arbitrary(g) % 16)
        }
    }

    fn apply(&mut self, op: &LwwOp) {
        match *op {
            LwwOp::Add(v) => self.add(v),
            LwwOp::Remove(v) => self.remove(v),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) enum CounterOp {
    Increment(u8),
    Decrement(u8),
}

impl Simulated for PositiveNegativeCounter {
    type Op = CounterOp;

    fn fresh(site: SiteId, _: ManualClock) -> Self {
        Self::new(site)
    }

    fn arbitrary_op(&self, g: &mut Gen) -> CounterOp {
        if bool::arbitrary(g) {
            CounterOp::Increment(u8::arbitrary(g))
        } else {
            CounterOp::Decrement(u8::arbitrary(g))
        }
    }

    fn apply(&mut self, op: &CounterOp) {
        match *op {
            CounterOp::Increment(n) => self.increment(u64::from(n)),
            CounterOp::Decrement(n) => self.decrement(u64::from(n)),
        }
    }
}

/// A single operation that a node may perform during a distributed systems trace.
#[derive(Debug, Clone)]
struct Op<O> {
    /// The index of the node that should perform this action.
    by: usize,
    /// How many milliseconds the node's clock moves forward before it acts.
    tick: u8,
    /// The action the node should take.
    action: Action<O>,
}

/// An action a distributed node can take with respects to its current state.
#[derive(Debug, Clone)]
enum Action<O> {
    /// Merge the snapshot of the node with the given index.
    Sync(usize),
    /// Apply the given local mutation.
    Data(O),
}

fn node_site(i: usize) -> SiteId {
    SiteId::new(format!("s{i}")).unwrap()
}

/// A fleet of replicas, each with its own clock.
struct Nodes<C> {
    clocks: Vec<ManualClock>,
    replicas: Vec<C>,
}

impl<C> Nodes<C>
where
    C: Simulated,
{
    fn new(n: usize) -> Self {
        let clocks: Vec<ManualClock> = (0..n).map(|_| ManualClock::default()).collect();
        let replicas = clocks
            .iter()
            .enumerate()
            .map(|(i, clock)| C::fresh(node_site(i), clock.clone()))
            .collect();
        Self { clocks, replicas }
    }

    /// Makes node `by` merge the snapshot of node `from`.
    fn sync(&mut self, by: usize, from: usize) {
        let snapshot = self.replicas[from].state();
        self.replicas[by].merge(snapshot);
    }

    fn apply(&mut self, by: usize, tick: u8, op: &C::Op) {
        self.clocks[by].advance(i64::from(tick));
        self.replicas[by].apply(op);
    }
}

/// A sequence of legal per-node operations over a replicated type `C`.
///
/// Each node takes arbitrary local actions based on its own current view of the world, and
/// occasionally merges the snapshot of another node, which effectively produces a distributed
/// systems trace. Every node has its own clock, and the clocks drift apart as nodes act.
///
/// Since this type implements [`quickcheck::Arbitrary`], it can be used to fuzz-test the
/// distributed operation of any [`Simulated`] type. The most basic test to perform over any such
/// sequence is the order-invariance of merging the produced snapshots, which is done by
/// [`Ops::check_order_invariance`].
pub(crate) struct Ops<C>
where
    C: Simulated,
{
    /// The number of nodes taking part.
    nodes: usize,
    /// The sequence of operations to perform.
    ops: Vec<Op<C::Op>>,
}

// NOTE: manual impl so we don't require that C: Clone (which derive(Clone) would)
impl<C> Clone for Ops<C>
where
    C: Simulated,
{
    fn clone(&self) -> Self {
        Self {
            nodes: self.nodes,
            ops: self.ops.clone(),
        }
    }
}

impl<C> fmt::Debug for Ops<C>
where
    C: Simulated,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl<C> Arbitrary for Ops<C>
where
    C: Simulated + 'static,
{
    fn arbitrary(g: &mut Gen) -> Self {
        debug!("generate a new test case");

        // no need to have more than 4 nodes for _most_ distributed systems problems
        let n = usize::from(u8::arbitrary(g) % 4) + 1;
        let mut nodes = Nodes::<C>::new(n);

        // very few bugs require 256+ operations to reproduce
        let len = g.size().min(256);
        let mut ops = Vec::with_capacity(len);
        for _ in 0..len {
            let by = usize::arbitrary(g) % n;

            // this is u8::arbitrary not bool::arbitrary so that we can make it less than 50%
            if u8::arbitrary(g) < 64 {
                let from = usize::arbitrary(g) % n;
                // sync with self is a no-op
                if from == by {
                    continue;
                }
                nodes.sync(by, from);
                ops.push(Op {
                    by,
                    tick: 0,
                    action: Action::Sync(from),
                });
                continue;
            }

            // zero ticks are common, so that concurrent writes often share a timestamp
            let tick = u8::arbitrary(g) % 3;
            let op = nodes.replicas[by].arbitrary_op(g);
            nodes.apply(by, tick, &op);
            ops.push(Op {
                by,
                tick,
                action: Action::Data(op),
            });
        }

        let mut s = Self { nodes: n, ops };
        s.prune_unnecessary();
        s
    }

    fn shrink(&self) -> Box<dyn Iterator<Item = Self>> {
        if self.ops.is_empty() {
            return quickcheck::empty_shrinker();
        }

        Box::new(OpsShrinker {
            seed: self.clone(),
            size: 0,
        })
    }
}

impl<C> Ops<C>
where
    C: Simulated,
{
    /// Removes syncs that have no observable effect.
    fn prune_unnecessary(&mut self) {
        // keep track of what a node last did to see if sync is useful
        let mut previous_for_node: HashMap<usize, (usize, Option<usize>)> = HashMap::new();

        let mut i = 0;
        self.ops.retain(|op| {
            i += 1;
            let mut keep = true;
            let synced_from = match op.action {
                Action::Data(_) => None,
                Action::Sync(from) if from == op.by => {
                    keep = false;
                    None
                }
                Action::Sync(from) => {
                    let other_last = previous_for_node.get(&from).map(|&(lasti, _)| lasti);
                    // a repeated sync from the same node, which did nothing in between
                    if let Some(&(synci, Some(last_from))) = previous_for_node.get(&op.by) {
                        if last_from == from && other_last.is_none_or(|lasti| lasti < synci) {
                            keep = false;
                        }
                    }
                    Some(from)
                }
            };
            if keep {
                previous_for_node.insert(op.by, (i, synced_from));
            }
            keep
        });
    }

    /// Executes the trace, and checks that merging the snapshots it produces yields the same
    /// value no matter how they are combined.
    pub fn check_order_invariance(self, seed: u64) -> quickcheck::TestResult
    where
        C::Value: PartialEq + fmt::Debug,
        C::Record: Clone,
    {
        debug!("running test case:\n{self}");

        if self.ops.is_empty() {
            return quickcheck::TestResult::passed();
        }

        let mut nodes = Nodes::<C>::new(self.nodes);
        let observer = || C::fresh(SiteId::new("observer").unwrap(), ManualClock::default());

        // every snapshot any node could have sent after each step
        let mut snapshots = Vec::with_capacity(self.ops.len());
        for op in &self.ops {
            match &op.action {
                Action::Data(data) => nodes.apply(op.by, op.tick, data),
                Action::Sync(from) => nodes.sync(op.by, *from),
            }
            snapshots.push(nodes.replicas[op.by].state());
        }

        // compute a final state that merges the final state of all the nodes
        let mut final_state = observer();
        for replica in &nodes.replicas {
            final_state.merge(replica.state());
        }

        // merge all snapshots one by one, in order
        let mut state_ordered = observer();
        for snapshot in snapshots.clone() {
            state_ordered.merge(snapshot);
        }

        // merge all snapshots at once
        let mut state_merged = observer();
        state_merged.merge(snapshots.iter().flatten().cloned());

        // merge all snapshots one by one in random order, twice
        let mut state_shuffled = observer();
        {
            use rand::{SeedableRng, seq::SliceRandom};
            let mut rng = rand::rngs::SmallRng::seed_from_u64(seed);

            let mut tmp = snapshots;
            tmp.shuffle(&mut rng);
            for snapshot in tmp.iter().chain(tmp.iter()) {
                state_shuffled.merge(snapshot.iter().cloned());
            }
        }

        // one round of full gossip makes all nodes agree
        let finals: Vec<_> = nodes.replicas.iter().map(|r| r.state()).collect();
        for replica in &mut nodes.replicas {
            for snapshot in &finals {
                replica.merge(snapshot.iter().cloned());
            }
        }
        let expected = final_state.value();
        let gossiped = nodes.replicas.iter().all(|r| r.value() == expected);

        // moment of truth -- are they all the same (ie, eventually consistent)?
        quickcheck::TestResult::from_bool(
            dbg!(expected == state_ordered.value())
                && dbg!(expected == state_merged.value())
                && dbg!(expected == state_shuffled.value())
                && dbg!(gossiped),
        )
    }
}

impl<C> fmt::Display for Ops<C>
where
    C: Simulated,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} nodes", self.nodes)?;
        for (i, op) in self.ops.iter().enumerate() {
            if i != 0 && i % 10 == 0 {
                writeln!(f, "--- {i} ---")?;
            }
            let by = node_site(op.by);
            match &op.action {
                Action::Data(data) => writeln!(f, " -> {by:?} +{}ms {data:?}", op.tick)?,
                Action::Sync(from) => writeln!(f, " -> {by:?} syncs from {:?}", node_site(*from))?,
            }
        }

        Ok(())
    }
}

/// An iterator that produces smaller-but-still-legal versions of an [`Ops`].
///
/// Every prefix of a trace is legal by construction, so this shrinks along the length of the
/// operational sequence only.
struct OpsShrinker<C>
where
    C: Simulated,
{
    /// The original `Ops` that we're shrinking.
    seed: Ops<C>,
    /// The subset of ops ([..size]) we're currently including.
    size: usize,
}

impl<C> Iterator for OpsShrinker<C>
where
    C: Simulated,
{
    type Item = Ops<C>;

    fn next(&mut self) -> Option<Self::Item> {
        // produce the "most reduced" candidates first. we never yield `seed` itself again, as
        // that would just lead to infinite recursion.

        // try to see how an empty set of ops does first
        if self.size == 0 {
            self.size = 1;
            return Some(Ops {
                nodes: self.seed.nodes,
                ops: Vec::new(),
            });
        }

        if self.size < self.seed.ops.len() {
            let ops = Vec::from(&self.seed.ops[..self.size]);
            // NOTE: grow by 2x to avoid very slow shrinking
            self.size *= 2;
            let mut s = Ops {
                nodes: self.seed.nodes,
                ops,
            };
            s.prune_unnecessary();
            return Some(s);
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(by: usize, action: Action<CounterOp>) -> Op<CounterOp> {
        Op { by, tick: 0, action }
    }

    #[test]
    fn shrink_empty() {
        let ops = Ops::<PositiveNegativeCounter> {
            nodes: 1,
            ops: vec![],
        };
        assert_eq!(ops.shrink().count(), 0);
    }

    #[test]
    fn shrink_prefixes() {
        let ops = Ops::<PositiveNegativeCounter> {
            nodes: 2,
            ops: vec![
                op(0, Action::Data(CounterOp::Increment(1))),
                op(1, Action::Data(CounterOp::Increment(2))),
                op(1, Action::Sync(0)),
            ],
        };

        let shrinks: Vec<_> = ops.shrink().collect();
        // first, an empty set of ops
        assert_eq!(shrinks[0].ops.len(), 0);
        // then, 1 and 2 of the 3 ops
        assert_eq!(shrinks[1].ops.len(), 1);
        assert_eq!(shrinks[2].ops.len(), 2);
        // then, no more (3/3 ops wouldn't be a shrink)
        assert_eq!(shrinks.len(), 3);
    }

    #[test]
    fn prunes_repeated_syncs() {
        let mut ops = Ops::<PositiveNegativeCounter> {
            nodes: 2,
            ops: vec![
                op(0, Action::Data(CounterOp::Increment(1))),
                op(1, Action::Sync(0)),
                op(1, Action::Sync(0)),
                op(0, Action::Data(CounterOp::Decrement(1))),
                op(1, Action::Sync(0)),
                op(1, Action::Sync(1)),
            ],
        };
        ops.prune_unnecessary();
        let kept: Vec<_> = ops
            .ops
            .iter()
            .map(|op| matches!(op.action, Action::Sync(_)))
            .collect();
        assert_eq!(kept, [false, true, false, true]);
    }

    #[test]
    fn executes_a_known_trace() {
        let ops = Ops::<PositiveNegativeCounter> {
            nodes: 2,
            ops: vec![
                op(0, Action::Data(CounterOp::Increment(3))),
                op(1, Action::Data(CounterOp::Decrement(1))),
                op(1, Action::Sync(0)),
            ],
        };
        assert!(!ops.check_order_invariance(7).is_failure());
    }
}
