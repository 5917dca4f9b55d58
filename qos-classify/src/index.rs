use std::{hash::Hash, sync::Arc};

use qos_common::addr::{Asn, Isd, IsdAs};
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::rule::{ClassRule, MatchMode, RuleMatch};

/// Errors raised while building the rule index. Fatal at startup.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("rule {rule:?}: degenerate range {low}||{high}")]
    DegenerateRange { rule: String, low: IsdAs, high: IsdAs },
}

type RuleList = Vec<Arc<ClassRule>>;

/// Pre-built multi-map index of rules by match axis.
///
/// Built once per configuration epoch, then only read: every table is
/// populated before the index is published, so concurrent readers observe a
/// consistent snapshot for the index's whole lifetime.
///
/// Rules whose source (or destination) is `Any` while the other side is not
/// are indexed under the constrained side's identifier and looked up with
/// the corresponding packet field; rules where both sides are `Any` live on
/// the flat l4-only list.
pub struct RuleIndex {
    epoch: u64,
    rules: RuleList,
    default_rule: Arc<ClassRule>,
    /// Exact and enumerated-range source identifiers.
    source_rules: FxHashMap<IsdAs, RuleList>,
    /// Exact and enumerated-range destination identifiers.
    destination_rules: FxHashMap<IsdAs, RuleList>,
    as_only_source_rules: FxHashMap<Asn, RuleList>,
    as_only_dest_rules: FxHashMap<Asn, RuleList>,
    isd_only_source_rules: FxHashMap<Isd, RuleList>,
    isd_only_dest_rules: FxHashMap<Isd, RuleList>,
    /// Rules with an `Any` source, keyed by their destination identifier.
    any_source_rules: FxHashMap<IsdAs, RuleList>,
    /// Rules with an `Any` destination, keyed by their source identifier.
    any_destination_rules: FxHashMap<IsdAs, RuleList>,
    /// Rules matched purely by ingress interface.
    interface_incoming_rules: FxHashMap<u64, RuleList>,
    /// Rules with `Any` on both sides.
    l4_only_rules: RuleList,
}

impl RuleIndex {
    /// Builds the index for one configuration epoch. Rule order within each
    /// cell is the insertion order of the rule list.
    pub fn build(rules: Vec<ClassRule>, epoch: u64) -> Result<Self, IndexError> {
        let rules: RuleList = rules.into_iter().map(Arc::new).collect();

        let mut source_rules: FxHashMap<IsdAs, RuleList> = FxHashMap::default();
        let mut destination_rules: FxHashMap<IsdAs, RuleList> = FxHashMap::default();
        let mut as_only_source_rules: FxHashMap<Asn, RuleList> = FxHashMap::default();
        let mut as_only_dest_rules: FxHashMap<Asn, RuleList> = FxHashMap::default();
        let mut isd_only_source_rules: FxHashMap<Isd, RuleList> = FxHashMap::default();
        let mut isd_only_dest_rules: FxHashMap<Isd, RuleList> = FxHashMap::default();
        let mut any_source_rules: FxHashMap<IsdAs, RuleList> = FxHashMap::default();
        let mut any_destination_rules: FxHashMap<IsdAs, RuleList> = FxHashMap::default();
        let mut interface_incoming_rules: FxHashMap<u64, RuleList> = FxHashMap::default();
        let mut l4_only_rules: RuleList = Vec::new();

        for rule in &rules {
            match rule.source.mode {
                MatchMode::Exact => {
                    source_rules.entry(rule.source.ia).or_default().push(rule.clone());
                }
                MatchMode::Range => {
                    for cell in range_cells(rule, &rule.source)? {
                        source_rules.entry(cell).or_default().push(rule.clone());
                    }
                }
                MatchMode::AsOnly => {
                    as_only_source_rules.entry(rule.source.ia.asn).or_default().push(rule.clone());
                }
                MatchMode::IsdOnly => {
                    isd_only_source_rules.entry(rule.source.ia.isd).or_default().push(rule.clone());
                }
                MatchMode::Any => {
                    if rule.destination.mode != MatchMode::Any {
                        any_source_rules
                            .entry(rule.destination.ia)
                            .or_default()
                            .push(rule.clone());
                    } else {
                        l4_only_rules.push(rule.clone());
                    }
                }
                MatchMode::Intf => {
                    interface_incoming_rules
                        .entry(rule.source.intf)
                        .or_default()
                        .push(rule.clone());
                }
            }

            match rule.destination.mode {
                MatchMode::Exact => {
                    destination_rules.entry(rule.destination.ia).or_default().push(rule.clone());
                }
                MatchMode::Range => {
                    for cell in range_cells(rule, &rule.destination)? {
                        destination_rules.entry(cell).or_default().push(rule.clone());
                    }
                }
                MatchMode::AsOnly => {
                    as_only_dest_rules
                        .entry(rule.destination.ia.asn)
                        .or_default()
                        .push(rule.clone());
                }
                MatchMode::IsdOnly => {
                    isd_only_dest_rules
                        .entry(rule.destination.ia.isd)
                        .or_default()
                        .push(rule.clone());
                }
                MatchMode::Any => {
                    if rule.source.mode != MatchMode::Any {
                        any_destination_rules
                            .entry(rule.source.ia)
                            .or_default()
                            .push(rule.clone());
                    }
                    // (Any, Any) is already on the l4-only list.
                }
                // Rejected at conversion time; never indexed.
                MatchMode::Intf => {}
            }
        }

        tracing::debug!(epoch, rules = rules.len(), "rule index built");

        Ok(Self {
            epoch,
            rules,
            default_rule: ClassRule::default_rule(),
            source_rules,
            destination_rules,
            as_only_source_rules,
            as_only_dest_rules,
            isd_only_source_rules,
            isd_only_dest_rules,
            any_source_rules,
            any_destination_rules,
            interface_incoming_rules,
            l4_only_rules,
        })
    }

    /// The epoch this index was built for; cache entries are tagged with it.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// The rule returned when nothing else matches. Shared so verdicts from
    /// the same epoch compare equal by identity.
    pub fn default_rule(&self) -> &Arc<ClassRule> {
        &self.default_rule
    }

    pub fn rules(&self) -> &[Arc<ClassRule>] {
        &self.rules
    }

    pub(crate) fn source_buckets(&self, src: IsdAs) -> [&[Arc<ClassRule>]; 3] {
        [
            bucket(&self.source_rules, &src),
            bucket(&self.as_only_source_rules, &src.asn),
            bucket(&self.isd_only_source_rules, &src.isd),
        ]
    }

    pub(crate) fn destination_buckets(&self, dst: IsdAs) -> [&[Arc<ClassRule>]; 3] {
        [
            bucket(&self.destination_rules, &dst),
            bucket(&self.as_only_dest_rules, &dst.asn),
            bucket(&self.isd_only_dest_rules, &dst.isd),
        ]
    }

    /// `Any`-source rules applicable to a packet with this destination.
    pub(crate) fn any_source_bucket(&self, dst: IsdAs) -> &[Arc<ClassRule>] {
        bucket(&self.any_source_rules, &dst)
    }

    /// `Any`-destination rules applicable to a packet with this source.
    pub(crate) fn any_destination_bucket(&self, src: IsdAs) -> &[Arc<ClassRule>] {
        bucket(&self.any_destination_rules, &src)
    }

    pub(crate) fn interface_bucket(&self, ingress_if_id: u64) -> &[Arc<ClassRule>] {
        bucket(&self.interface_incoming_rules, &ingress_if_id)
    }

    pub(crate) fn l4_only_bucket(&self) -> &[Arc<ClassRule>] {
        &self.l4_only_rules
    }
}

fn bucket<'a, K: Eq + Hash>(map: &'a FxHashMap<K, RuleList>, key: &K) -> &'a [Arc<ClassRule>] {
    map.get(key).map(Vec::as_slice).unwrap_or(&[])
}

/// Enumerates every `(ISD, AS)` cell of the inclusive rectangle spanned by a
/// range predicate. Quadratic in the range extent; operators are expected to
/// configure small ranges.
fn range_cells(
    rule: &ClassRule,
    side: &RuleMatch,
) -> Result<impl Iterator<Item = IsdAs>, IndexError> {
    let (low, high) = (side.low, side.high);
    if low.isd > high.isd || low.asn > high.asn {
        return Err(IndexError::DegenerateRange { rule: rule.name.clone(), low, high });
    }
    Ok((low.isd..=high.isd).flat_map(move |isd| (low.asn..=high.asn).map(move |asn| IsdAs::new(isd, asn))))
}
