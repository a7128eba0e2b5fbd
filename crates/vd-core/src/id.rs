//! Interned node identifiers.
//!
//! Ids are unique among siblings, not globally: instance expansion copies a
//! prototype's child ids verbatim, so the same id legitimately appears under
//! many parents. Nodes are addressed globally by slash-delimited paths of
//! ids from the viewport root (see `Scene::node_by_path`).

use lasso::{Spur, ThreadedRodeo};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::sync::LazyLock;

/// Global string interner — fast comparisons, low memory.
static INTERNER: LazyLock<ThreadedRodeo> = LazyLock::new(ThreadedRodeo::default);

/// A lightweight interned identifier. Internally a `Spur` index — 4 bytes,
/// Copy, Eq, Hash in O(1).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(Spur);

impl NodeId {
    /// Intern a string, or return the existing id if already interned.
    pub fn intern(s: &str) -> Self {
        NodeId(INTERNER.get_or_intern(s))
    }

    /// Resolve back to a string slice.
    pub fn as_str(&self) -> &str {
        INTERNER.resolve(&self.0)
    }

    /// Generate a fresh id with a type prefix (e.g. `rectangle_7`).
    pub fn fresh(prefix: &str) -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        Self::intern(&format!("{prefix}_{n}"))
    }

    /// Derive an id not present in `taken` by appending `_2`, `_3`, …
    /// Returns `self` unchanged when it is already free.
    pub fn dedup_against(self, taken: &[NodeId]) -> Self {
        if !taken.contains(&self) {
            return self;
        }
        let base = self.as_str();
        for n in 2u32.. {
            let candidate = Self::intern(&format!("{base}_{n}"));
            if !taken.contains(&candidate) {
                return candidate;
            }
        }
        unreachable!("u32 suffix space exhausted");
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.as_str())
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for NodeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(NodeId::intern(&s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_roundtrip() {
        let a = NodeId::intern("hero_frame");
        let b = NodeId::intern("hero_frame");
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "hero_frame");
    }

    #[test]
    fn fresh_ids_are_unique() {
        assert_ne!(NodeId::fresh("rect"), NodeId::fresh("rect"));
    }

    #[test]
    fn dedup_appends_numeric_suffix() {
        let a = NodeId::intern("card");
        let taken = vec![a, NodeId::intern("card_2")];
        assert_eq!(a.dedup_against(&taken).as_str(), "card_3");
        assert_eq!(NodeId::intern("badge").dedup_against(&taken).as_str(), "badge");
    }
}
