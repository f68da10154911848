//! YANG module revision dates.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Error parsing a revision date.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid revision date: {0:?}")]
pub struct RevisionError(pub String);

/// A module revision date, stored as YYYYMMDD for cheap ordering.
///
/// Revision zero means "not present in the system" and orders before
/// every real date.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Revision(pub u32);

impl Revision {
    /// The absent revision.
    pub const NONE: Revision = Revision(0);

    /// Parse a revision from `YYYY-MM-DD` form.
    pub fn parse(s: &str) -> Result<Self, RevisionError> {
        let digits: String = s.chars().filter(|c| *c != '-').collect();
        if digits.len() != 8 || s.len() != 10 {
            return Err(RevisionError(s.to_string()));
        }
        let bytes = s.as_bytes();
        if bytes[4] != b'-' || bytes[7] != b'-' {
            return Err(RevisionError(s.to_string()));
        }
        let n: u32 = digits.parse().map_err(|_| RevisionError(s.to_string()))?;
        Ok(Revision(n))
    }

    /// True if this revision is absent.
    pub fn is_none(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            return write!(f, "0");
        }
        let y = self.0 / 10000;
        let m = (self.0 / 100) % 100;
        let d = self.0 % 100;
        write!(f, "{:04}-{:02}-{:02}", y, m, d)
    }
}
