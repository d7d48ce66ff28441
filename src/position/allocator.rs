// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Allocation of new positions between two bounds.
//!
//! The allocator walks both bounds depth by depth. At each depth it looks at the magnitude of the
//! lower bound's segment (or `0` once the lower bound is used up) and of the upper bound's segment
//! (or the largest magnitude once the result has moved strictly below the upper bound). If there
//! is an integer strictly between the two, it draws one at random and stops. Otherwise it copies a
//! segment into the result and descends:
//!
//! - if both bounds have the same segment, that segment is shared and both bounds continue;
//! - otherwise it follows the lower bound, after which the upper bound no longer constrains the
//!   deeper segments;
//! - if the lower bound is used up, a segment just below the upper bound's one is opened under
//!   the requesting site.
//!
//! Every descent either consumes a segment of a (finite) bound or frees the result from the upper
//! bound, after which the full magnitude range is available, so allocation always terminates.
use super::{Position, PositionError, Segment, codec};
use crate::site::SiteId;
use rand::Rng;
use smallvec::SmallVec;
use tracing::trace;

impl Position {
    /// Returns a new position strictly between `lower` and `upper`, minted by `site`.
    ///
    /// A missing `lower` stands for [`Position::min`], a missing `upper` for [`Position::max`], so
    /// the result always sorts strictly between those sentinels. Newly minted segments use `width`
    /// digits, and both bounds must have been created with that same width.
    ///
    /// The magnitude of the new segment is drawn uniformly from the available room using the
    /// thread-local random number generator. See [`Position::between_with`] to supply your own.
    ///
    /// # Errors
    ///
    /// - [`PositionError::InvalidWidth`] if `width` is not supported.
    /// - [`PositionError::WidthMismatch`] if a bound has a different width.
    /// - [`PositionError::InvalidInterval`] if `lower` is not strictly below `upper`, or nothing
    ///   fits between them (for example `lower` is [`Position::max`]).
    ///
    /// ```rust
    /// # use convergent::{Position, SiteId};
    /// let site = SiteId::new("a").unwrap();
    /// let (min, max) = (Position::min(4).unwrap(), Position::max(4).unwrap());
    /// let p = Position::between(&site, 4, Some(&min), Some(&max)).unwrap();
    /// assert!(min < p && p < max);
    /// assert!(Position::between(&site, 4, Some(&max), None).is_err());
    /// ```
    pub fn between(
        site: &SiteId,
        width: usize,
        lower: Option<&Position>,
        upper: Option<&Position>,
    ) -> Result<Self, PositionError> {
        Self::between_with(&mut rand::rng(), site, width, lower, upper)
    }

    /// Like [`Position::between`], but draws magnitudes from `rng`.
    pub fn between_with<R>(
        rng: &mut R,
        site: &SiteId,
        width: usize,
        lower: Option<&Position>,
        upper: Option<&Position>,
    ) -> Result<Self, PositionError>
    where
        R: Rng + ?Sized,
    {
        codec::check_width(width)?;
        for bound in lower.iter().chain(upper.iter()) {
            if bound.width() != width {
                return Err(PositionError::WidthMismatch {
                    expected: width,
                    found: bound.width(),
                });
            }
        }

        let min;
        let lower = match lower {
            Some(lower) => lower,
            None => {
                min = Position::sentinel(width, 0);
                &min
            }
        };
        let max;
        let upper = match upper {
            Some(upper) => upper,
            None => {
                max = Position::sentinel(width, codec::max_magnitude(width));
                &max
            }
        };
        if lower >= upper {
            return Err(PositionError::InvalidInterval);
        }

        let position = descend(rng, site, width, &lower.segments, &upper.segments)?;
        debug_assert!(lower < &position && &position < upper);
        Ok(position)
    }
}

fn descend<R>(
    rng: &mut R,
    site: &SiteId,
    width: usize,
    mut lower: &[Segment],
    upper: &[Segment],
) -> Result<Position, PositionError>
where
    R: Rng + ?Sized,
{
    let top = codec::max_magnitude(width);
    let mut prefix = SmallVec::<[Segment; 4]>::new();
    // `None` once the result is known to sort below the upper bound whatever follows.
    let mut upper = Some(upper);

    loop {
        let lo = lower.first().map_or(0, |s| s.magnitude);
        let hi = match upper {
            None => top,
            Some([first, ..]) => first.magnitude,
            // the result so far equals the upper bound; nothing can follow it and stay below
            Some([]) => return Err(PositionError::InvalidInterval),
        };

        if hi > lo + 1 {
            prefix.push(Segment {
                magnitude: rng.random_range(lo + 1..hi),
                creator: Some(site.clone()),
            });
            return Ok(Position {
                width: width as u8,
                segments: prefix,
            });
        }
        trace!(depth = prefix.len(), lo, hi, "no room between bounds, descending");

        match (lower.split_first(), upper.and_then(<[Segment]>::split_first)) {
            (Some((l, lower_rest)), Some((u, upper_rest))) => {
                prefix.push(l.clone());
                lower = lower_rest;
                upper = (l == u).then_some(upper_rest);
            }
            (Some((l, lower_rest)), None) => {
                prefix.push(l.clone());
                lower = lower_rest;
            }
            (None, Some((u, upper_rest))) => {
                // the lower bound equals the prefix, so any extension of it is above it
                if u.magnitude > 0 {
                    prefix.push(Segment {
                        magnitude: u.magnitude - 1,
                        creator: Some(site.clone()),
                    });
                    upper = None;
                } else if u.creator.is_some() {
                    prefix.push(Segment {
                        magnitude: 0,
                        creator: None,
                    });
                    upper = None;
                } else {
                    prefix.push(u.clone());
                    upper = Some(upper_rest);
                }
            }
            (None, None) => {
                // both sides unconstrained always leaves room (top >= 63)
                debug_assert!(false, "no room in an unconstrained depth");
                return Err(PositionError::InvalidInterval);
            }
        }
    }
}
