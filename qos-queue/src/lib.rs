//! Bounded per-class packet queues for the QoS datapath.
//!
//! Each traffic class owns one queue that couples a non-blocking buffer
//! with a fill-level admission profile and a token-bucket policer. Two
//! interchangeable implementations exist behind the [`PacketQueue`]
//! contract: [`ChannelQueue`] (lock-free enqueue path) and [`RingQueue`]
//! (internally locked ring buffer); they differ only in contention
//! behaviour.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

mod bucket;
mod channel;
mod profile;
mod ring;

pub use bucket::TokenBucket;
pub use channel::ChannelQueue;
pub use ring::RingQueue;

use qos_common::{
    conf::{PoliceAction, QueueDescriptor},
    packet::QPacket,
};
use thiserror::Error;

/// Errors raised while building a queue from its descriptor. Fatal at
/// startup.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue {id}: max length must be non-zero")]
    ZeroLength { id: u16 },
    #[error("queue {id}: profile entry {index} has {field} {value} above 100")]
    ProfileRange { id: u16, index: usize, field: &'static str, value: u8 },
    #[error("queue {id}: profile is not sorted ascending by fill level")]
    ProfileOrder { id: u16 },
}

/// Common contract of the per-class queues.
///
/// `enqueue` must only be called after `check_action` returned
/// [`PoliceAction::Pass`]; the admission layer rejects at `max_length`, so a
/// passed packet always finds room. `pop_multiple` may block until enough
/// packets arrive and is a single-consumer operation; everything else is
/// safe to call from any thread.
pub trait PacketQueue: Send + Sync {
    /// Appends a packet. Non-blocking; the packet is owned by the queue
    /// from here on.
    fn enqueue(&self, packet: QPacket);

    /// Removes and returns the packet at the front, if any. Non-blocking.
    fn pop(&self) -> Option<QPacket>;

    /// Removes and returns `n` packets from the front, blocking until they
    /// are available. Single-consumer.
    fn pop_multiple(&self, n: usize) -> Vec<QPacket>;

    /// Number of packets currently queued.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of packets this queue admits.
    fn capacity(&self) -> usize;

    /// Current fill level in percent of capacity.
    fn fill_percent(&self) -> usize {
        100 * self.len() / self.capacity()
    }

    /// Admission decision for the next packet, from the queue's fill level
    /// and its configured profile. Consult before every enqueue.
    fn check_action(&self) -> PoliceAction;

    /// Polices a packet against this queue's token bucket.
    fn police(&self, packet: &QPacket) -> PoliceAction;

    /// The descriptor this queue was built from (scheduling priority,
    /// bandwidth shares, congestion warning parameters).
    fn descriptor(&self) -> &QueueDescriptor;
}
