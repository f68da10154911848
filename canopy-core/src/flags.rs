//! Node flag bitset.
//!
//! The diff pass and the validator annotate tree nodes with these flags.
//! `ADD`, `DEL` and `CHANGE` describe a node's role in a transaction
//! diff, `MARK` is a scratch bit for tree walks, and `DEFAULT` marks
//! leaves synthesized by default fill-in so they can be stripped again.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// A small bitset of per-node flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Flags(u8);

impl Flags {
    /// Node is new in the target tree.
    pub const ADD: Flags = Flags(0x01);
    /// Node exists only in the source tree.
    pub const DEL: Flags = Flags(0x02);
    /// Node or one of its descendants changed.
    pub const CHANGE: Flags = Flags(0x04);
    /// Scratch bit used by tree walks.
    pub const MARK: Flags = Flags(0x08);
    /// Leaf value was filled in from a YANG default.
    pub const DEFAULT: Flags = Flags(0x10);

    /// The empty flag set.
    pub fn empty() -> Self {
        Flags(0)
    }

    /// True if no flag is set.
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// True if all bits of `other` are set in `self`.
    pub fn contains(&self, other: Flags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Set the bits of `other`.
    pub fn set(&mut self, other: Flags) {
        self.0 |= other.0;
    }

    /// Clear the bits of `other`.
    pub fn clear(&mut self, other: Flags) {
        self.0 &= !other.0;
    }
}

impl BitOr for Flags {
    type Output = Flags;

    fn bitor(self, rhs: Flags) -> Flags {
        Flags(self.0 | rhs.0)
    }
}

impl BitOrAssign for Flags {
    fn bitor_assign(&mut self, rhs: Flags) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        if self.contains(Flags::ADD) {
            names.push("add");
        }
        if self.contains(Flags::DEL) {
            names.push("del");
        }
        if self.contains(Flags::CHANGE) {
            names.push("change");
        }
        if self.contains(Flags::MARK) {
            names.push("mark");
        }
        if self.contains(Flags::DEFAULT) {
            names.push("default");
        }
        write!(f, "{}", names.join("|"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_contains() {
        // GIVEN
        let mut flags = Flags::empty();

        // WHEN
        flags.set(Flags::ADD | Flags::CHANGE);

        // THEN
        assert!(flags.contains(Flags::ADD));
        assert!(flags.contains(Flags::CHANGE));
        assert!(!flags.contains(Flags::DEL));
        assert!(flags.contains(Flags::ADD | Flags::CHANGE));
    }

    #[test]
    fn test_clear() {
        // GIVEN
        let mut flags = Flags::ADD | Flags::MARK;

        // WHEN
        flags.clear(Flags::MARK);

        // THEN
        assert!(flags.contains(Flags::ADD));
        assert!(!flags.contains(Flags::MARK));
    }

    #[test]
    fn test_display() {
        assert_eq!((Flags::ADD | Flags::CHANGE).to_string(), "add|change");
        assert_eq!(Flags::empty().to_string(), "");
    }
}
