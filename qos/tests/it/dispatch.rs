//! End-to-end dispatcher flows: classify, police, admit, enqueue.

use bytes::Bytes;
use qos::{
    conf::{
        ExternalClassRule, ExternalProtocolMatch, PoliceAction, ProfileEntry, QosConfig,
        QueueDescriptor,
    },
    DispatcherOptions, PacketQueue as _, QPacket, QosDispatcher, QosError, QueueKind,
};

fn rule(name: &str, priority: i32, l4: u8, queue_number: u16) -> ExternalClassRule {
    ExternalClassRule {
        name: name.to_string(),
        priority,
        source_as: "0-0".to_string(),
        source_match_mode: 4,
        destination_as: "0-0".to_string(),
        destination_match_mode: 4,
        l4_type: vec![ExternalProtocolMatch { base_protocol: l4, extension: -1 }],
        queue_number,
    }
}

fn queue(id: u16, max_length: usize, police_rate: u64) -> QueueDescriptor {
    QueueDescriptor {
        id,
        name: format!("class-{id}"),
        max_length,
        police_rate,
        over_rate_action: PoliceAction::Drop,
        min_bandwidth: 0,
        max_bandwidth: 0,
        priority: 0,
        profile: Vec::new(),
        congestion_warning: Default::default(),
    }
}

fn packet(l4: u8) -> QPacket {
    QPacket::new(
        "1-ff00:0:110".parse().unwrap(),
        "2-ff00:0:220".parse().unwrap(),
        1,
        l4,
        Bytes::from_static(b"payload!"),
    )
}

#[test]
fn passed_packets_land_on_their_class_queue() {
    let _ = tracing_subscriber::fmt::try_init();

    let config = QosConfig {
        rules: vec![rule("tcp", 5, 6, 1), rule("best-effort", 1, 17, 0)],
        queues: vec![queue(0, 64, 1 << 20), queue(1, 64, 1 << 20)],
    };
    let dispatcher = QosDispatcher::from_config(&config, DispatcherOptions::default()).unwrap();
    let mut worker = dispatcher.worker();

    assert_eq!(worker.process(packet(6)), (PoliceAction::Pass, 1));
    assert_eq!(worker.process(packet(17)), (PoliceAction::Pass, 0));
    // No rule matches l4 99; the default rule selects queue 0.
    assert_eq!(worker.process(packet(99)), (PoliceAction::Pass, 0));

    assert_eq!(dispatcher.queue(1).unwrap().len(), 1);
    assert_eq!(dispatcher.queue(0).unwrap().len(), 2);

    let queued = dispatcher.queue(1).unwrap().pop().unwrap();
    assert_eq!(queued.payload().as_ref(), b"payload!");
}

#[test]
fn policer_rejects_with_the_configured_action() {
    let mut over_rate = queue(0, 64, 1);
    over_rate.over_rate_action = PoliceAction::DropNotify;
    let config = QosConfig { rules: vec![rule("all", 1, 6, 0)], queues: vec![over_rate] };
    let dispatcher = QosDispatcher::from_config(&config, DispatcherOptions::default()).unwrap();
    let mut worker = dispatcher.worker();

    // An 8-byte packet against a bucket holding a single token.
    assert_eq!(worker.process(packet(6)), (PoliceAction::DropNotify, 0));
    assert!(dispatcher.queue(0).unwrap().is_empty());
}

#[test]
fn full_queues_reject_before_enqueue() {
    let config = QosConfig { rules: vec![rule("all", 1, 6, 0)], queues: vec![queue(0, 1, 1 << 20)] };
    let dispatcher = QosDispatcher::from_config(&config, DispatcherOptions::default()).unwrap();
    let mut worker = dispatcher.worker();

    assert_eq!(worker.process(packet(6)), (PoliceAction::Pass, 0));
    assert_eq!(worker.process(packet(6)), (PoliceAction::DropNotify, 0));
    // The queue never grew past its capacity.
    assert_eq!(dispatcher.queue(0).unwrap().len(), 1);
}

#[test]
fn admission_profile_fires_before_enqueue() {
    let mut lossy = queue(0, 64, 1 << 20);
    lossy.profile = vec![ProfileEntry { fill_level: 0, prob: 100, action: PoliceAction::Drop }];
    let config = QosConfig { rules: vec![rule("all", 1, 6, 0)], queues: vec![lossy] };
    let dispatcher = QosDispatcher::from_config(&config, DispatcherOptions::default()).unwrap();
    let mut worker = dispatcher.worker();

    assert_eq!(worker.process(packet(6)), (PoliceAction::Drop, 0));
    assert!(dispatcher.queue(0).unwrap().is_empty());
}

#[test]
fn out_of_range_queue_numbers_fall_back_to_the_default_queue() {
    let config = QosConfig { rules: vec![rule("all", 1, 6, 9)], queues: vec![queue(0, 64, 1 << 20)] };
    let dispatcher = QosDispatcher::from_config(&config, DispatcherOptions::default()).unwrap();
    let mut worker = dispatcher.worker();

    assert_eq!(worker.process(packet(6)), (PoliceAction::Pass, 0));
    assert_eq!(dispatcher.queue(0).unwrap().len(), 1);
}

#[test]
fn ring_queues_are_interchangeable() {
    let config = QosConfig {
        rules: vec![rule("tcp", 5, 6, 1)],
        queues: vec![queue(0, 64, 1 << 20), queue(1, 64, 1 << 20)],
    };
    let options = DispatcherOptions::default().queue_kind(QueueKind::Ring);
    let dispatcher = QosDispatcher::from_config(&config, options).unwrap();
    let mut worker = dispatcher.worker();

    assert_eq!(worker.process(packet(6)), (PoliceAction::Pass, 1));
    assert_eq!(dispatcher.queue(1).unwrap().len(), 1);
}

#[test]
fn installing_rules_invalidates_cached_verdicts() {
    let config = QosConfig {
        rules: vec![rule("coarse", 1, 6, 0)],
        queues: vec![queue(0, 64, 1 << 20), queue(1, 64, 1 << 20)],
    };
    let dispatcher = QosDispatcher::from_config(&config, DispatcherOptions::default()).unwrap();
    let mut worker = dispatcher.worker();

    let pkt = packet(6);
    assert_eq!(worker.classify(&pkt).name, "coarse");
    // Warm the cache a second time for good measure.
    assert_eq!(worker.classify(&pkt).name, "coarse");

    dispatcher.install_rules(&[rule("coarse", 1, 6, 0), rule("fine", 9, 6, 1)]).unwrap();

    assert_eq!(worker.classify(&pkt).name, "fine");
    assert_eq!(worker.process(pkt), (PoliceAction::Pass, 1));
}

#[test]
fn bad_configurations_are_rejected() {
    let no_queues = QosConfig { rules: vec![], queues: vec![] };
    assert!(matches!(
        QosDispatcher::from_config(&no_queues, DispatcherOptions::default()),
        Err(QosError::NoQueues)
    ));

    let duplicate_ids =
        QosConfig { rules: vec![], queues: vec![queue(0, 64, 1), queue(0, 32, 1)] };
    assert!(matches!(
        QosDispatcher::from_config(&duplicate_ids, DispatcherOptions::default()),
        Err(QosError::QueueIds(_))
    ));

    let gap = QosConfig { rules: vec![], queues: vec![queue(0, 64, 1), queue(2, 64, 1)] };
    assert!(matches!(
        QosDispatcher::from_config(&gap, DispatcherOptions::default()),
        Err(QosError::QueueIds(_))
    ));

    let bad_rule = QosConfig {
        rules: vec![ExternalClassRule {
            name: "broken".to_string(),
            priority: 1,
            source_as: "not-an-ia".to_string(),
            source_match_mode: 0,
            destination_as: "0-0".to_string(),
            destination_match_mode: 4,
            l4_type: vec![],
            queue_number: 0,
        }],
        queues: vec![queue(0, 64, 1)],
    };
    assert!(matches!(
        QosDispatcher::from_config(&bad_rule, DispatcherOptions::default()),
        Err(QosError::Rule(_))
    ));
}
