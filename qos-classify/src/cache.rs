use std::sync::Arc;

use parking_lot::RwLock;
use qos_common::IsdAs;
use rustc_hash::FxHashMap;

use crate::rule::ClassRule;

/// Key identifying a classification verdict.
///
/// Extension headers are deliberately absent from the key: rules with a
/// non-wildcard extension constraint are re-validated on every hit by the
/// classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub src_ia: IsdAs,
    pub dst_ia: IsdAs,
    pub ingress_if_id: u64,
    pub l4_protocol: u8,
}

struct CacheSlot {
    rule: Arc<ClassRule>,
    epoch: u64,
}

/// Concurrency-safe memoisation of classifier verdicts.
///
/// Entries are tagged with the rule-index epoch they were computed against;
/// reads reject entries from other epochs, so a cached rule never outlives
/// the index it came from. Writers may race, the last one wins, and cloning
/// the `Arc` under the lock guarantees readers never observe a torn rule
/// reference.
pub struct ClassificationCache {
    entries: RwLock<FxHashMap<CacheKey, CacheSlot>>,
    max_entries: usize,
}

impl ClassificationCache {
    pub const DEFAULT_MAX_ENTRIES: usize = 65_536;

    /// A cache holding at most `max_entries` verdicts. When the bound is
    /// reached the whole map is dropped rather than tracking recency; the
    /// classifier repopulates it within a handful of packets per flow.
    pub fn new(max_entries: usize) -> Self {
        Self { entries: RwLock::new(FxHashMap::default()), max_entries: max_entries.max(1) }
    }

    /// The verdict stored for `key` in `epoch`, if any.
    pub fn get(&self, key: &CacheKey, epoch: u64) -> Option<Arc<ClassRule>> {
        let entries = self.entries.read();
        let slot = entries.get(key)?;
        (slot.epoch == epoch).then(|| slot.rule.clone())
    }

    /// Stores a verdict, replacing any prior mapping for `key`.
    pub fn put(&self, key: CacheKey, rule: Arc<ClassRule>, epoch: u64) {
        let mut entries = self.entries.write();
        if entries.len() >= self.max_entries && !entries.contains_key(&key) {
            entries.clear();
        }
        entries.insert(key, CacheSlot { rule, epoch });
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Default for ClassificationCache {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_ENTRIES)
    }
}
