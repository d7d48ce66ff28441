// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Wall-clock timestamps for last-writer-wins resolution.
//!
//! A [`Timestamp`] is a 64-bit integer of milliseconds since the UNIX epoch. Replicas read it
//! through a [`Clock`], which is the [`SystemClock`] unless a test or simulation supplies its own
//! (for example a [`ManualClock`]).
//!
//! Clocks of different sites are not assumed to be synchronized. Skew only affects _which_ write
//! wins a conflict, never whether replicas agree on the winner.
use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicI64, Ordering},
    },
};

#[cfg(feature = "chrono")]
use chrono::{DateTime, Utc};

/// A UTC point in time with millisecond precision.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Timestamp(i64);

impl Timestamp {
    /// Creates a `Timestamp` from a number of milliseconds since the UNIX epoch.
    pub const fn from_millis(milliseconds: i64) -> Self {
        Self(milliseconds)
    }

    /// Returns the number of milliseconds since the UNIX epoch.
    pub const fn as_millis(&self) -> i64 {
        self.0
    }

    /// The smallest timestamp strictly after this one.
    pub(crate) fn successor(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Converts the `Timestamp` to a `chrono::DateTime<Utc>`.
    ///
    /// Returns `None` if the timestamp is outside the range `chrono` can represent.
    #[cfg(feature = "chrono")]
    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.0)
    }
}

#[cfg(feature = "chrono")]
impl From<DateTime<Utc>> for Timestamp {
    // truncates to millisecond precision
    fn from(datetime: DateTime<Utc>) -> Self {
        Self(datetime.timestamp_millis())
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        #[cfg(feature = "chrono")]
        if let Some(datetime) = self.as_datetime() {
            return write!(
                f,
                "{}",
                datetime.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
            );
        }
        write!(f, "{}ms", self.0)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

/// A source of the current time.
pub trait Clock {
    fn now(&self) -> Timestamp;
}

/// Reads the system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[cfg(feature = "chrono")]
    fn now(&self) -> Timestamp {
        Utc::now().into()
    }

    #[cfg(not(feature = "chrono"))]
    fn now(&self) -> Timestamp {
        use std::time::{SystemTime, UNIX_EPOCH};
        let millis = match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(since) => i64::try_from(since.as_millis()).unwrap_or(i64::MAX),
            Err(before) => i64::try_from(before.duration().as_millis()).map_or(i64::MIN, |ms| -ms),
        };
        Timestamp(millis)
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same time, so one handle can drive the clocks of several replicas.
///
/// ```rust
/// # use convergent::clock::{Clock, ManualClock, Timestamp};
/// let clock = ManualClock::new(Timestamp::from_millis(10));
/// let handle = clock.clone();
/// handle.advance(5);
/// assert_eq!(clock.now(), Timestamp::from_millis(15));
/// ```
#[derive(Debug, Clone, Default)]
pub struct ManualClock(Arc<AtomicI64>);

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self(Arc::new(AtomicI64::new(start.as_millis())))
    }

    pub fn set(&self, now: Timestamp) {
        self.0.store(now.as_millis(), Ordering::Release);
    }

    /// Moves the clock forward (or backward, if negative) by `millis`.
    pub fn advance(&self, millis: i64) {
        self.0.fetch_add(millis, Ordering::AcqRel);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp(self.0.load(Ordering::Acquire))
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Timestamp {
        (**self).now()
    }
}
