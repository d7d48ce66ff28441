// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! # Dense positions for replicated sequences
//!
//! A [`Position`] is a stable, totally ordered identifier for an element of a replicated ordered
//! sequence (for example, an item in a collaboratively edited list). Between any two distinct
//! positions there always exists a third, so an element can be inserted between two neighbours
//! without renumbering anything else, and concurrent inserts from different sites never collide.
//!
//! A position is a non-empty path of [`Segment`]s. Each segment holds a fixed-width magnitude and
//! optionally the [`SiteId`] that minted it. Positions compare segment by segment: magnitude
//! first, then creator (an absent creator sorts first), and a path sorts before every extension of
//! itself. Positions of different widths compare by their canonical strings. New positions are produced with [`Position::between`].
//!
//! ## Canonical string form
//!
//! Every position has a canonical string: each segment renders as its digit string (see
//! [`codec`]), followed by [`SITE_SEPARATOR`] and the creator if there is one, followed by
//! [`PATH_SEPARATOR`]. For example `"0000/"`, `"3Fa:~site_b/"` or `"zzzy~a/0Q0b~b/"`.
//!
//! Byte-wise comparison of canonical strings is the same as comparison of the positions
//! themselves, whatever their widths, so the strings can be used directly as sort keys in external
//! storage:
//!
//! ```rust
//! # use convergent::{Position, SiteId};
//! let site = SiteId::new("a").unwrap();
//! let first = Position::between(&site, 4, None, None).unwrap();
//! let second = Position::between(&site, 4, Some(&first), None).unwrap();
//! assert!(first < second);
//! assert!(first.to_string() < second.to_string());
//! assert_eq!(second.to_string().parse::<Position>().unwrap(), second);
//! ```
use crate::site::SiteId;
use smallvec::SmallVec;
use std::{cmp::Ordering, fmt, str::FromStr};

mod allocator;
pub mod codec;

/// Terminates every segment of a canonical position string.
pub const PATH_SEPARATOR: char = '/';

/// Separates a segment's digits from its creator in a canonical position string.
pub const SITE_SEPARATOR: char = '~';

/// Error returned when creating, parsing or allocating a [`Position`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PositionError {
    /// The lower bound is not strictly below the upper bound, or no position fits between them.
    InvalidInterval,

    /// The digit width is outside of `1..=`[`codec::MAX_WIDTH`].
    InvalidWidth(usize),

    /// A bound was minted with a different width than the one requested.
    WidthMismatch { expected: usize, found: usize },

    /// The magnitude does not fit in the given number of digits.
    MagnitudeOutOfRange { magnitude: u64, width: usize },

    /// The character is not part of the digit alphabet.
    InvalidDigit(char),

    /// The string is not a canonical position.
    Malformed(String),
}

impl fmt::Display for PositionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionError::InvalidInterval => {
                write!(f, "no position exists strictly between the given bounds")
            }
            PositionError::InvalidWidth(width) => write!(
                f,
                "invalid width {width}, supported widths are between 1 and {} included",
                codec::MAX_WIDTH
            ),
            PositionError::WidthMismatch { expected, found } => {
                write!(f, "expected a position of width {expected}, found width {found}")
            }
            PositionError::MagnitudeOutOfRange { magnitude, width } => {
                write!(f, "magnitude {magnitude} does not fit in {width} digits")
            }
            PositionError::InvalidDigit(c) => write!(f, "invalid digit {c:?}"),
            PositionError::Malformed(reason) => write!(f, "malformed position: {reason}"),
        }
    }
}

impl std::error::Error for PositionError {}

/// One step of a [`Position`]'s path.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Segment {
    magnitude: u64,
    creator: Option<SiteId>,
}

impl Segment {
    #[cfg(any(test, feature = "arbitrary"))]
    pub(crate) fn new(magnitude: u64, creator: Option<SiteId>) -> Self {
        Self { magnitude, creator }
    }

    /// The numeric value of this segment's digit string.
    pub fn magnitude(&self) -> u64 {
        self.magnitude
    }

    /// The site that minted this segment, if any.
    ///
    /// The [`Position::min`] and [`Position::max`] sentinels carry no creator.
    pub fn creator(&self) -> Option<&SiteId> {
        self.creator.as_ref()
    }
}

impl fmt::Debug for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.creator {
            Some(creator) => write!(f, "{}{creator:?}", self.magnitude),
            None => write!(f, "{}", self.magnitude),
        }
    }
}

/// A position in a replicated sequence.
///
/// Positions are immutable values. See the [module documentation](self) for the ordering rules
/// and the canonical string form.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Position {
    /// Number of digits of every segment's magnitude.
    width: u8,
    /// Never empty.
    segments: SmallVec<[Segment; 4]>,
}

impl Position {
    /// Returns the single-segment position with the smallest magnitude and no creator.
    ///
    /// Every position allocated with width `width` sorts after it.
    pub fn min(width: usize) -> Result<Self, PositionError> {
        codec::check_width(width)?;
        Ok(Self::sentinel(width, 0))
    }

    /// Returns the single-segment position with the largest magnitude and no creator.
    ///
    /// Every position allocated with width `width` sorts before it.
    pub fn max(width: usize) -> Result<Self, PositionError> {
        codec::check_width(width)?;
        Ok(Self::sentinel(width, codec::max_magnitude(width)))
    }

    /// Assembles a position without validation.
    ///
    /// Callers guarantee a valid width, at least one segment, and magnitudes that fit the width.
    #[cfg(any(test, feature = "arbitrary"))]
    pub(crate) fn from_parts(width: usize, segments: impl IntoIterator<Item = Segment>) -> Self {
        let position = Self {
            width: width as u8,
            segments: segments.into_iter().collect(),
        };
        debug_assert!(!position.segments.is_empty());
        position
    }

    fn sentinel(width: usize, magnitude: u64) -> Self {
        Self {
            width: width as u8,
            segments: SmallVec::from_elem(
                Segment {
                    magnitude,
                    creator: None,
                },
                1,
            ),
        }
    }

    /// The number of digits of each segment.
    pub fn width(&self) -> usize {
        usize::from(self.width)
    }

    /// The number of segments in this position's path.
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// The segments of this position's path, shallowest first.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }
}

impl Position {
    /// The bytes of the canonical string, without allocating it.
    fn canonical_bytes(&self) -> impl Iterator<Item = u8> + '_ {
        self.segments.iter().flat_map(move |segment| {
            let creator = segment.creator.as_ref().map(|c| {
                std::iter::once(SITE_SEPARATOR as u8).chain(c.as_str().bytes())
            });
            codec::digits(segment.magnitude, self.width())
                .chain(creator.into_iter().flatten())
                .chain(std::iter::once(PATH_SEPARATOR as u8))
        })
    }
}

impl Ord for Position {
    fn cmp(&self, other: &Self) -> Ordering {
        // digit strings of different widths may be prefixes of one another, so only the rendered
        // bytes decide
        if self.width != other.width {
            return self.canonical_bytes().cmp(other.canonical_bytes());
        }
        for (a, b) in self.segments.iter().zip(&other.segments) {
            let by_segment = a
                .magnitude
                .cmp(&b.magnitude)
                .then_with(|| a.creator.cmp(&b.creator));
            if by_segment.is_ne() {
                return by_segment;
            }
        }
        self.segments.len().cmp(&other.segments.len())
    }
}

impl PartialOrd for Position {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::with_capacity(self.segments.len() * (self.width() + 8));
        for segment in &self.segments {
            codec::push_digits(&mut out, segment.magnitude, self.width());
            if let Some(creator) = &segment.creator {
                out.push(SITE_SEPARATOR);
                out.push_str(creator.as_str());
            }
            out.push(PATH_SEPARATOR);
        }
        f.write_str(&out)
    }
}

impl fmt::Debug for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl FromStr for Position {
    type Err = PositionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some(path) = s.strip_suffix(PATH_SEPARATOR) else {
            return Err(PositionError::Malformed(format!(
                "{s:?} does not end in {PATH_SEPARATOR:?}"
            )));
        };

        let mut width = None;
        let mut segments = SmallVec::new();
        for part in path.split(PATH_SEPARATOR) {
            let (digits, creator) = match part.split_once(SITE_SEPARATOR) {
                Some((digits, creator)) => {
                    let creator = SiteId::new(creator).map_err(|e| {
                        PositionError::Malformed(format!("creator of segment {part:?}: {e}"))
                    })?;
                    (digits, Some(creator))
                }
                None => (part, None),
            };
            if digits.is_empty() {
                return Err(PositionError::Malformed(format!(
                    "segment {part:?} of {s:?} has no digits"
                )));
            }
            match width {
                None => width = Some(digits.len()),
                Some(width) if width != digits.len() => {
                    return Err(PositionError::WidthMismatch {
                        expected: width,
                        found: digits.len(),
                    });
                }
                Some(_) => {}
            }
            segments.push(Segment {
                magnitude: codec::decode(digits)?,
                creator,
            });
        }

        // `str::split` yields at least one part, so a successful loop set the width
        let width = width.ok_or_else(|| PositionError::Malformed(format!("{s:?} is empty")))?;
        Ok(Self {
            width: width as u8,
            segments,
        })
    }
}

#[cfg(feature = "serde")]
impl ::serde::Serialize for Position {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: ::serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

#[cfg(feature = "serde")]
impl<'de> ::serde::Deserialize<'de> for Position {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: ::serde::Deserializer<'de>,
    {
        let s = <std::borrow::Cow<'de, str>>::deserialize(deserializer)?;
        s.parse().map_err(::serde::de::Error::custom)
    }
}

// the canonical string order relies on these, and on every creator character sorting after `/`
const _: () = {
    assert!(SITE_SEPARATOR as u32 > PATH_SEPARATOR as u32);
    assert!((PATH_SEPARATOR as u32) < b'0' as u32);
};
