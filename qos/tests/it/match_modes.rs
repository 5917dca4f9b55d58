//! Table-driven coverage of every rule match mode, for the cached and the
//! cacheless classifier alike.

use std::sync::Arc;

use bytes::Bytes;
use qos::{
    conf::{ExternalClassRule, ExternalProtocolMatch},
    ClassRule, ClassificationCache, Classifier, QPacket, RuleIndex,
};

fn rule(
    name: &str,
    priority: i32,
    source: (&str, u8),
    destination: (&str, u8),
    l4: &[(u8, i16)],
    queue_number: u16,
) -> ExternalClassRule {
    ExternalClassRule {
        name: name.to_string(),
        priority,
        source_as: source.0.to_string(),
        source_match_mode: source.1,
        destination_as: destination.0.to_string(),
        destination_match_mode: destination.1,
        l4_type: l4
            .iter()
            .map(|&(base_protocol, extension)| ExternalProtocolMatch { base_protocol, extension })
            .collect(),
        queue_number,
    }
}

/// The match-mode exercise rule set: one rule per predicate combination,
/// priorities descending from the most specific to the broadest match.
fn match_mode_rules() -> Vec<ExternalClassRule> {
    const TCP: &[(u8, i16)] = &[(6, -1)];
    const SCMP: &[(u8, i16)] = &[(1, -1)];

    vec![
        rule("Exact - Exact", 8, ("11-ff00:0:299", 0), ("22-ff00:0:188", 0), TCP, 1),
        rule("Exact - ISDONLY", 7, ("33-ff00:0:277", 0), ("44-0", 1), TCP, 2),
        rule("Exact - ASONLY", 6, ("55-ff00:0:055", 0), ("0-ff00:0:344", 2), TCP, 3),
        rule(
            "Exact - RANGE",
            5,
            ("77-ff00:0:233", 0),
            ("85-ff00:0:222||89-ff00:0:222", 3),
            TCP,
            4,
        ),
        rule("Exact - ANY", 4, ("2-ff00:0:011", 0), ("0-0", 4), TCP, 5),
        rule("ANY - Exact", 3, ("0-0", 4), ("2-ff00:0:011", 0), TCP, 6),
        rule("ANY - ANY", 1, ("0-0", 4), ("0-0", 4), SCMP, 7),
        rule("INTF - Exact 77", 2, ("77", 5), ("223-9f33:783:011", 0), SCMP, 9),
    ]
}

fn build_index() -> RuleIndex {
    let rules: Vec<ClassRule> = match_mode_rules()
        .iter()
        .map(|external| ClassRule::from_external(external).unwrap())
        .collect();
    RuleIndex::build(rules, 1).unwrap()
}

fn packet(src: &str, dst: &str, l4: u8, ingress: u64) -> QPacket {
    QPacket::new(src.parse().unwrap(), dst.parse().unwrap(), ingress, l4, Bytes::from_static(b"x"))
}

#[test]
fn rule_match_modes() {
    let _ = tracing_subscriber::fmt::try_init();

    let index = build_index();
    let mut classifiers =
        [Classifier::new(Arc::new(ClassificationCache::default())), Classifier::cacheless()];

    // (src, dst, l4, ingress interface, rule name, expect that rule).
    let table = [
        ("11-ff00:0:299", "22-ff00:0:188", 6, 1, "Exact - Exact", true),
        ("33-ff00:0:277", "44-ff00:0:166", 6, 1, "Exact - ISDONLY", true),
        ("33-ff00:0:277", "44-ff00:0:165", 6, 1, "Exact - ISDONLY", true),
        ("33-ff00:0:277", "44-ff00:0:000", 6, 1, "Exact - ISDONLY", true),
        ("55-ff00:0:055", "66-ff00:0:344", 6, 1, "Exact - ASONLY", true),
        ("55-ff00:0:055", "12-ff00:0:344", 6, 1, "Exact - ASONLY", true),
        ("55-ff00:0:055", "13-ff00:0:344", 6, 1, "Exact - ASONLY", true),
        ("77-ff00:0:233", "85-ff00:0:222", 6, 1, "Exact - RANGE", true),
        ("77-ff00:0:233", "89-ff00:0:222", 6, 1, "Exact - RANGE", true),
        ("2-ff00:0:011", "89-ff00:0:222", 6, 1, "Exact - RANGE", false),
        ("2-ff00:0:011", "89-ff00:0:222", 6, 1, "Exact - ANY", true),
        ("2-ff00:0:011", "89-ff00:0:344", 6, 1, "Exact - ANY", true),
        ("2-ff00:0:011", "344-ff00:0:222", 6, 1, "Exact - ANY", true),
        ("2-ff00:0:011", "123-ff00:344:222", 6, 1, "Exact - ANY", true),
        ("123-ff00:344:222", "2-ff00:0:011", 6, 1, "ANY - Exact", true),
        ("123-ff00:344:222", "2-ff00:0:011", 1, 1, "ANY - ANY", true),
        ("123-ff00:344:222", "223-9f33:783:011", 6, 77, "ANY - ANY", false),
        ("123-ff00:344:222", "223-9f33:783:011", 1, 77, "INTF - Exact 77", true),
    ];

    for classifier in &mut classifiers {
        for (row, &(src, dst, l4, ingress, rule_name, should_match)) in table.iter().enumerate() {
            let verdict = classifier.classify(&index, &packet(src, dst, l4, ingress));
            assert_eq!(
                verdict.name == rule_name,
                should_match,
                "row {row}: got rule {:?}, expected {rule_name:?} match = {should_match}",
                verdict.name
            );
        }
    }
}

#[test]
fn repeated_classification_is_idempotent() {
    let index = build_index();
    let mut classifier = Classifier::new(Arc::new(ClassificationCache::default()));

    let pkt = packet("11-ff00:0:299", "22-ff00:0:188", 6, 1);
    let first = classifier.classify(&index, &pkt);
    let second = classifier.classify(&index, &pkt);
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.queue_number, 1);
}

#[test]
fn cached_and_cacheless_agree_by_identity() {
    let index = build_index();
    let mut cached = Classifier::new(Arc::new(ClassificationCache::default()));
    let mut cacheless = Classifier::cacheless();

    for (src, dst, l4, ingress) in [
        ("11-ff00:0:299", "22-ff00:0:188", 6, 1),
        ("2-ff00:0:011", "89-ff00:0:222", 6, 1),
        ("123-ff00:344:222", "223-9f33:783:011", 1, 77),
        ("9-9", "8-8", 99, 0),
    ] {
        let pkt = packet(src, dst, l4, ingress);
        let warm = cached.classify(&index, &pkt);
        let hit = cached.classify(&index, &pkt);
        let full = cacheless.classify(&index, &pkt);
        assert!(Arc::ptr_eq(&warm, &hit), "{src} -> {dst}");
        assert!(Arc::ptr_eq(&hit, &full), "{src} -> {dst}");
    }
}
