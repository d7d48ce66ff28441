// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! # Site identity
//!
//! Every replica that mutates shared state does so under a stable [`SiteId`]. The site id is
//! attached to every record a replica writes, and it is the deterministic tie-breaker whenever
//! two replicas produce otherwise indistinguishable data: a last-writer-wins timestamp tie, or two
//! positions minted with the same magnitude at the same depth.
//!
//! Site ids end up embedded in the canonical string form of a
//! [`Position`](crate::position::Position), so the alphabet they may use is restricted. Every
//! permitted character sorts after the path separator (`/`), which is what keeps byte-wise
//! comparison of canonical strings in line with the structured order of positions.
use std::{fmt, str::FromStr};

/// Characters other than `a-z` and `0-9` that may appear in a [`SiteId`].
pub const SITE_PUNCTUATION: &[char] = &['_'];

/// Error returned when a string is not a valid [`SiteId`].
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum SiteIdError {
    /// Site ids must contain at least one character.
    Empty,

    /// The site id contains a character outside of `a-z`, `0-9` and [`SITE_PUNCTUATION`].
    InvalidChar(char),
}

impl fmt::Display for SiteIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SiteIdError::Empty => write!(f, "site id must not be empty"),
            SiteIdError::InvalidChar(c) => write!(f, "invalid character {c:?} in site id"),
        }
    }
}

impl std::error::Error for SiteIdError {}

/// The identifier of a replica.
///
/// Site ids are compared lexicographically (byte-wise). On a last-writer-wins timestamp tie, the
/// record written by the lexicographically _smaller_ site wins on every replica.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
#[cfg_attr(feature = "serde", serde(try_from = "String", into = "String"))]
pub struct SiteId(String);

impl SiteId {
    /// Creates a new site id, validating its alphabet.
    ///
    /// ```rust
    /// # use convergent::SiteId;
    /// assert!(SiteId::new("replica_7").is_ok());
    /// assert!(SiteId::new("").is_err());
    /// assert!(SiteId::new("Replica").is_err());
    /// ```
    pub fn new(site: impl Into<String>) -> Result<Self, SiteIdError> {
        let site = site.into();
        if site.is_empty() {
            return Err(SiteIdError::Empty);
        }
        if let Some(c) = site.chars().find(|&c| !is_site_char(c)) {
            return Err(SiteIdError::InvalidChar(c));
        }
        Ok(Self(site))
    }

    /// Returns the site id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Returns true if `c` may appear in a [`SiteId`].
pub(crate) fn is_site_char(c: char) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_digit() || SITE_PUNCTUATION.contains(&c)
}

impl fmt::Debug for SiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

impl fmt::Display for SiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SiteId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for SiteId {
    type Error = SiteIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for SiteId {
    type Error = SiteIdError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl FromStr for SiteId {
    type Err = SiteIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl From<SiteId> for String {
    fn from(value: SiteId) -> Self {
        value.0
    }
}
