use std::sync::Arc;

use qos_common::{
    packet::{ExtHeader, Packet},
    IsdAs,
};

use crate::{
    cache::{CacheKey, ClassificationCache},
    index::RuleIndex,
    rule::ClassRule,
};

/// Resolves the best-matching traffic class rule for each packet.
///
/// A classifier carries per-call scratch state and is therefore not shared
/// between threads: give every worker its own instance. The cache behind it
/// is concurrency-safe and meant to be shared.
pub struct Classifier {
    cache: Option<Arc<ClassificationCache>>,
    /// Scratch buffer for the source x destination intersection, cleared on
    /// every call and reused to keep the hot path allocation-free.
    matched: Vec<Arc<ClassRule>>,
}

impl Classifier {
    /// A classifier that memoises verdicts in `cache`.
    pub fn new(cache: Arc<ClassificationCache>) -> Self {
        Self { cache: Some(cache), matched: Vec::new() }
    }

    /// A classifier that runs the full match on every packet.
    pub fn cacheless() -> Self {
        Self { cache: None, matched: Vec::new() }
    }

    /// Returns the highest-priority rule matching `packet`, or the index's
    /// default rule when no user rule matches. Total: never fails, never
    /// returns nothing.
    pub fn classify<P: Packet>(&mut self, index: &RuleIndex, packet: &P) -> Arc<ClassRule> {
        let src = packet.src_ia();
        let dst = packet.dst_ia();
        let ingress = packet.ingress_if_id();
        let l4 = packet.l4_protocol();
        let extensions = packet.extensions();

        let key =
            CacheKey { src_ia: src, dst_ia: dst, ingress_if_id: ingress, l4_protocol: l4 };

        if let Some(cache) = &self.cache {
            if let Some(rule) = cache.get(&key, index.epoch()) {
                // The key does not cover extension headers; rules with an
                // extension constraint must be re-validated against this
                // packet's extensions.
                if rule.matches_extensions(extensions) {
                    return rule;
                }
            }
        }

        let rule = self.full_match(index, src, dst, ingress, l4, extensions);

        if let Some(cache) = &self.cache {
            cache.put(key, rule.clone(), index.epoch());
        }
        rule
    }

    fn full_match(
        &mut self,
        index: &RuleIndex,
        src: IsdAs,
        dst: IsdAs,
        ingress: u64,
        l4: u8,
        extensions: &[ExtHeader],
    ) -> Arc<ClassRule> {
        self.matched.clear();
        intersect_by_identity(
            index.source_buckets(src),
            index.destination_buckets(dst),
            &mut self.matched,
        );

        // Candidate sets are scanned in a fixed order with a strict
        // greater-than comparison, so ties resolve to the first rule
        // encountered and the winner is stable across calls.
        let mut best = best_of(None, &self.matched, l4, extensions);
        best = best_of(best, index.any_source_bucket(dst), l4, extensions);
        best = best_of(best, index.any_destination_bucket(src), l4, extensions);
        best = best_of(best, index.interface_bucket(ingress), l4, extensions);
        best = best_of(best, index.l4_only_bucket(), l4, extensions);

        best.cloned().unwrap_or_else(|| index.default_rule().clone())
    }
}

/// Scans `list` for rules whose l4 disjunction accepts the packet and keeps
/// the one with the greatest priority.
fn best_of<'a>(
    mut best: Option<&'a Arc<ClassRule>>,
    list: &'a [Arc<ClassRule>],
    l4: u8,
    extensions: &[ExtHeader],
) -> Option<&'a Arc<ClassRule>> {
    for rule in list {
        if rule.matches_l4(l4, extensions) && best.map_or(true, |b| rule.priority > b.priority) {
            best = Some(rule);
        }
    }
    best
}

/// Collects rules present in at least one source bucket and at least one
/// destination bucket, compared by identity. A rule occupies exactly one
/// bucket per side, so the result is duplicate-free.
fn intersect_by_identity(
    sources: [&[Arc<ClassRule>]; 3],
    destinations: [&[Arc<ClassRule>]; 3],
    out: &mut Vec<Arc<ClassRule>>,
) {
    for source_bucket in sources {
        for rule in source_bucket {
            let in_destinations =
                destinations.iter().any(|d| d.iter().any(|other| Arc::ptr_eq(rule, other)));
            if in_destinations {
                out.push(rule.clone());
            }
        }
    }
}
