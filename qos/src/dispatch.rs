use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use arc_swap::ArcSwap;
use qos_classify::{ClassRule, ClassificationCache, Classifier, IndexError, RuleError, RuleIndex};
use qos_common::{
    conf::{ExternalClassRule, PoliceAction, QosConfig, QueueDescriptor},
    packet::{Packet, QPacket},
};
use qos_queue::{ChannelQueue, PacketQueue, QueueError, RingQueue};
use thiserror::Error;

/// Errors raised while assembling the dispatcher from a configuration
/// record. All fatal at startup; the datapath itself never returns errors.
#[derive(Debug, Error)]
pub enum QosError {
    #[error(transparent)]
    Rule(#[from] RuleError),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error("no queues configured")]
    NoQueues,
    #[error("queue ids must be unique and contiguous from 0, got {0:?}")]
    QueueIds(Vec<u16>),
}

/// Which queue implementation the dispatcher builds for every class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum QueueKind {
    /// Lock-free enqueue path, the default.
    #[default]
    Channel,
    /// Internally locked ring buffer.
    Ring,
}

/// Build-time options for the dispatcher.
#[derive(Debug, Clone)]
pub struct DispatcherOptions {
    queue_kind: QueueKind,
    classification_cache: bool,
    cache_entries: usize,
}

impl Default for DispatcherOptions {
    fn default() -> Self {
        Self {
            queue_kind: QueueKind::Channel,
            classification_cache: true,
            cache_entries: ClassificationCache::DEFAULT_MAX_ENTRIES,
        }
    }
}

impl DispatcherOptions {
    /// Selects the queue implementation.
    pub fn queue_kind(mut self, queue_kind: QueueKind) -> Self {
        self.queue_kind = queue_kind;
        self
    }

    /// Disables verdict memoisation; every packet runs the full match.
    pub fn cacheless(mut self) -> Self {
        self.classification_cache = false;
        self
    }

    /// Bounds the verdict cache to `cache_entries` keys.
    pub fn cache_entries(mut self, cache_entries: usize) -> Self {
        self.cache_entries = cache_entries;
        self
    }
}

/// Wires the classifier, the verdict cache and the per-class queues behind
/// a single entry point.
///
/// The dispatcher is shared between worker threads; each worker obtains its
/// own [`Worker`] handle, which carries the thread-local classifier scratch.
pub struct QosDispatcher {
    index: ArcSwap<RuleIndex>,
    cache: Arc<ClassificationCache>,
    queues: Vec<Arc<dyn PacketQueue>>,
    options: DispatcherOptions,
    /// Epoch of the currently installed index.
    epoch: AtomicU64,
}

impl QosDispatcher {
    /// Builds the dispatcher from an already-validated configuration
    /// record. Rule conversion, index construction and queue validation
    /// failures are fatal.
    pub fn from_config(
        config: &QosConfig,
        options: DispatcherOptions,
    ) -> Result<Arc<Self>, QosError> {
        let rules = convert_rules(&config.rules)?;
        let index = RuleIndex::build(rules, 1)?;
        let queues = build_queues(&config.queues, options.queue_kind)?;
        let cache = Arc::new(ClassificationCache::new(options.cache_entries));

        tracing::info!(
            rules = config.rules.len(),
            queues = queues.len(),
            queue_kind = ?options.queue_kind,
            "dispatcher assembled"
        );

        Ok(Arc::new(Self {
            index: ArcSwap::from_pointee(index),
            cache,
            queues,
            options,
            epoch: AtomicU64::new(1),
        }))
    }

    /// Atomically installs a new rule set for the next epoch.
    ///
    /// In-flight classifications keep the index snapshot they loaded; cache
    /// entries from earlier epochs are rejected on read, so no drained
    /// cache or stop-the-world step is needed.
    pub fn install_rules(&self, rules: &[ExternalClassRule]) -> Result<(), QosError> {
        let converted = convert_rules(rules)?;
        let epoch = self.epoch.fetch_add(1, Ordering::Relaxed) + 1;
        let index = RuleIndex::build(converted, epoch)?;
        self.index.store(Arc::new(index));
        tracing::info!(epoch, rules = rules.len(), "installed new rule index");
        Ok(())
    }

    /// A datapath handle for one worker thread.
    pub fn worker(self: &Arc<Self>) -> Worker {
        let classifier = if self.options.classification_cache {
            Classifier::new(self.cache.clone())
        } else {
            Classifier::cacheless()
        };
        Worker { shared: self.clone(), classifier }
    }

    /// The queue serving `queue_number`, if configured.
    pub fn queue(&self, queue_number: u16) -> Option<&Arc<dyn PacketQueue>> {
        self.queues.get(usize::from(queue_number))
    }

    pub fn queues(&self) -> &[Arc<dyn PacketQueue>] {
        &self.queues
    }
}

/// Per-thread datapath handle.
///
/// Holds the worker's classifier (and with it the per-call scratch state,
/// which must not be shared between threads) plus the shared dispatcher.
pub struct Worker {
    shared: Arc<QosDispatcher>,
    classifier: Classifier,
}

impl Worker {
    /// Classifies and polices one packet.
    ///
    /// Returns the verdict and the queue that produced it. On `Pass` the
    /// packet has been enqueued and is owned by that queue; every other
    /// verdict releases the packet.
    pub fn process(&mut self, packet: QPacket) -> (PoliceAction, u16) {
        let index = self.shared.index.load();
        let rule = self.classifier.classify(index.as_ref(), &packet);

        // Rules pointing past the configured queues land on the default
        // queue.
        let queue_number =
            if usize::from(rule.queue_number) < self.shared.queues.len() { rule.queue_number } else { 0 };
        let queue = &self.shared.queues[usize::from(queue_number)];

        let action = queue.police(&packet);
        if action != PoliceAction::Pass {
            tracing::trace!(queue = queue_number, ?action, "policer rejected packet");
            return (action, queue_number);
        }

        let action = queue.check_action();
        if action != PoliceAction::Pass {
            tracing::trace!(queue = queue_number, ?action, "admission rejected packet");
            return (action, queue_number);
        }

        queue.enqueue(packet);
        (PoliceAction::Pass, queue_number)
    }

    /// Resolves the rule for a packet without touching its queue.
    pub fn classify(&mut self, packet: &impl Packet) -> Arc<ClassRule> {
        let index = self.shared.index.load();
        self.classifier.classify(index.as_ref(), packet)
    }
}

fn convert_rules(rules: &[ExternalClassRule]) -> Result<Vec<ClassRule>, RuleError> {
    rules.iter().map(ClassRule::from_external).collect()
}

fn build_queues(
    descriptors: &[QueueDescriptor],
    kind: QueueKind,
) -> Result<Vec<Arc<dyn PacketQueue>>, QosError> {
    if descriptors.is_empty() {
        return Err(QosError::NoQueues);
    }

    let mut sorted: Vec<&QueueDescriptor> = descriptors.iter().collect();
    sorted.sort_by_key(|descriptor| descriptor.id);
    let ids: Vec<u16> = sorted.iter().map(|descriptor| descriptor.id).collect();
    if ids.iter().enumerate().any(|(position, &id)| usize::from(id) != position) {
        return Err(QosError::QueueIds(ids));
    }

    sorted
        .into_iter()
        .map(|descriptor| {
            let queue: Arc<dyn PacketQueue> = match kind {
                QueueKind::Channel => Arc::new(ChannelQueue::new(descriptor.clone())?),
                QueueKind::Ring => Arc::new(RingQueue::new(descriptor.clone())?),
            };
            Ok(queue)
        })
        .collect()
}
