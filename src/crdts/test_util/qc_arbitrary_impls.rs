// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Implementation of the quickcheck::Arbitrary trait for sites, positions and records.

use crate::{
    CounterState, LwwRecord, SetRecord, SiteId, Timestamp,
    position::{Position, Segment, codec},
};
use quickcheck::{Arbitrary, Gen};

impl Arbitrary for SiteId {
    fn arbitrary(g: &mut Gen) -> Self {
        // Skew the distribution to increase the likelihood of triggering bugs.
        // Most interesting behavior occurs when the same site occurs multiple times in the same
        // test, or when one site is a prefix of another.
        const CHARS: &[u8] = b"abz09_";
        let random = {
            let len = usize::from(u8::arbitrary(g) % 4) + 1;
            (0..len)
                .map(|_| char::from(*g.choose(CHARS).unwrap()))
                .collect::<String>()
        };
        let choices = ["a", "a", "a", "b", "b", "ab", "a_", "z", random.as_str()];
        SiteId::new(*g.choose(&choices).unwrap()).unwrap()
    }

    fn shrink(&self) -> Box<dyn Iterator<Item = Self>> {
        if self.as_str() == "a" {
            quickcheck::empty_shrinker()
        } else {
            Box::new(std::iter::once(SiteId::new("a").unwrap()))
        }
    }
}

impl Arbitrary for Position {
    fn arbitrary(g: &mut Gen) -> Self {
        // few widths, so that pairs of positions are often comparable byte-wise
        let width = *g.choose(&[1, 2, 4]).unwrap();
        let top = codec::max_magnitude(width);
        let depth = usize::from(u8::arbitrary(g) % 4) + 1;
        let segments: Vec<_> = (0..depth)
            .map(|_| {
                // Skew towards the edges of the range, where the allocator has the least room.
                let magnitude = match u8::arbitrary(g) % 6 {
                    0 => 0,
                    1 => 1,
                    2 => top - 1,
                    3 => top,
                    _ => u64::arbitrary(g) & top,
                };
                let creator = (u8::arbitrary(g) % 4 != 0).then(|| SiteId::arbitrary(g));
                Segment::new(magnitude, creator)
            })
            .collect();
        Position::from_parts(width, segments)
    }

    fn shrink(&self) -> Box<dyn Iterator<Item = Self>> {
        let (width, segments) = (self.width(), self.segments().to_vec());
        Box::new((1..segments.len()).rev().map(move |depth| {
            Position::from_parts(width, segments[..depth].iter().cloned())
        }))
    }
}

impl Arbitrary for Timestamp {
    fn arbitrary(g: &mut Gen) -> Self {
        // Ties are where last-writer-wins gets interesting.
        let any = i64::arbitrary(g);
        let ms = *g.choose(&[0, 1, 1, 2, 3, any]).unwrap();
        Timestamp::from_millis(ms)
    }

    fn shrink(&self) -> Box<dyn Iterator<Item = Self>> {
        Box::new(self.as_millis().shrink().map(Timestamp::from_millis))
    }
}

impl<T> Arbitrary for SetRecord<T>
where
    T: Arbitrary,
{
    fn arbitrary(g: &mut Gen) -> Self {
        Self {
            value: T::arbitrary(g),
            origin: SiteId::arbitrary(g),
        }
    }
}

impl<T> Arbitrary for LwwRecord<T>
where
    T: Arbitrary,
{
    fn arbitrary(g: &mut Gen) -> Self {
        Self {
            value: T::arbitrary(g),
            present: bool::arbitrary(g),
            timestamp: Timestamp::arbitrary(g),
            site: SiteId::arbitrary(g),
        }
    }
}

impl Arbitrary for CounterState {
    fn arbitrary(g: &mut Gen) -> Self {
        Self {
            site: SiteId::arbitrary(g),
            positive: u64::from(u32::arbitrary(g)),
            negative: u64::from(u32::arbitrary(g)),
        }
    }

    fn shrink(&self) -> Box<dyn Iterator<Item = Self>> {
        let site = self.site.clone();
        Box::new(
            (self.positive, self.negative)
                .shrink()
                .map(move |(positive, negative)| Self {
                    site: site.clone(),
                    positive,
                    negative,
                }),
        )
    }
}
