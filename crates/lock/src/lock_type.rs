//! Lock modes and their algebra.
//!
//! "No lock" is represented as `None`. The free functions in this module are
//! total over `Option<LockType>`; the methods on [`LockType`] cover the
//! cases where both sides hold a lock.

use std::fmt;

/// Lock mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LockType {
    /// Shared lock (read).
    S,
    /// Exclusive lock (write).
    X,
    /// Intention shared: S locks will be taken on descendants.
    IS,
    /// Intention exclusive: X locks will be taken on descendants.
    IX,
    /// Shared, plus intention to take X locks on descendants.
    SIX,
}

impl LockType {
    /// Every lock mode.
    pub const ALL: [LockType; 5] = [LockType::S, LockType::X, LockType::IS, LockType::IX, LockType::SIX];

    /// Returns true if one transaction may hold `self` on a resource while
    /// another holds `other` on the same resource.
    pub fn is_compatible_with(self, other: LockType) -> bool {
        use LockType::*;
        match (self, other) {
            (X, _) | (_, X) => false,
            (IS, _) | (_, IS) => true,
            (S, S) | (IX, IX) => true,
            _ => false,
        }
    }

    /// Returns the least permissive lock the parent must hold for `self` to
    /// be granted on a child.
    pub fn parent_lock(self) -> LockType {
        match self {
            LockType::S | LockType::IS => LockType::IS,
            LockType::X | LockType::IX | LockType::SIX => LockType::IX,
        }
    }

    /// Returns true if holding `self` allows everything `required` allows.
    pub fn can_substitute(self, required: LockType) -> bool {
        use LockType::*;
        match required {
            IS => true,
            S => matches!(self, S | SIX | X),
            IX => matches!(self, IX | SIX | X),
            SIX => matches!(self, SIX | X),
            X => self == X,
        }
    }

    /// Least upper bound under substitutability.
    pub fn join(self, other: LockType) -> LockType {
        if self.can_substitute(other) {
            self
        } else if other.can_substitute(self) {
            other
        } else {
            // S and IX are the only incomparable pair.
            LockType::SIX
        }
    }

    /// Returns true for IS and IX.
    pub fn is_intent(self) -> bool {
        matches!(self, LockType::IS | LockType::IX)
    }
}

impl fmt::Display for LockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LockType::S => "S",
            LockType::X => "X",
            LockType::IS => "IS",
            LockType::IX => "IX",
            LockType::SIX => "SIX",
        };
        f.write_str(name)
    }
}

/// Compatibility including "no lock", which is compatible with everything.
pub fn compatible(a: Option<LockType>, b: Option<LockType>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.is_compatible_with(b),
        _ => true,
    }
}

/// Parent lock including "no lock", which requires nothing of the parent.
pub fn parent_lock(lock_type: Option<LockType>) -> Option<LockType> {
    lock_type.map(LockType::parent_lock)
}

/// Substitutability including "no lock": anything substitutes for no lock,
/// and no lock substitutes for nothing else.
pub fn substitutable(substitute: Option<LockType>, required: Option<LockType>) -> bool {
    match (substitute, required) {
        (_, None) => true,
        (None, Some(_)) => false,
        (Some(sub), Some(req)) => sub.can_substitute(req),
    }
}

/// Least upper bound including "no lock" as the bottom element.
pub fn join(a: Option<LockType>, b: Option<LockType>) -> Option<LockType> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.join(b)),
        (a, None) => a,
        (None, b) => b,
    }
}
