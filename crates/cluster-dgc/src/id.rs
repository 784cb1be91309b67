//! Identifiers for managed objects, connected clients and shards.

use std::collections::BTreeSet;
use std::fmt;

/// Opaque, globally unique, totally ordered handle for a managed object.
///
/// `ObjectId::NULL` denotes "no reference" and is never traced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(u64);

impl ObjectId {
    /// The reserved "no reference" value.
    pub const NULL: Self = Self(u64::MAX);

    /// Create an identifier from its raw value.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw 64-bit value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Returns `true` for [`ObjectId::NULL`].
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == u64::MAX
    }
}

impl From<u64> for ObjectId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            f.write_str("ObjectId(NULL)")
        } else {
            write!(f, "ObjectId({})", self.0)
        }
    }
}

/// Ordered set of object identifiers.
///
/// Ordered so that garbage sets, candidate sets and per-shard partitions
/// iterate deterministically.
pub type ObjectIdSet = BTreeSet<ObjectId>;

/// Identifier of a connected client process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClientId(pub u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClientId({})", self.0)
    }
}

/// Index of a shard in an active-active routing table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ShardId(pub usize);

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "shard-{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_is_distinct() {
        assert!(ObjectId::NULL.is_null());
        assert!(!ObjectId::new(0).is_null());
        assert_eq!(ObjectId::NULL.to_string(), "ObjectId(NULL)");
        assert_eq!(ObjectId::new(7).to_string(), "ObjectId(7)");
    }

    #[test]
    fn test_ordering_follows_raw_value() {
        let set: ObjectIdSet = [3, 1, 2].into_iter().map(ObjectId::new).collect();
        let raw: Vec<u64> = set.iter().map(|id| id.raw()).collect();
        assert_eq!(raw, vec![1, 2, 3]);
    }
}
