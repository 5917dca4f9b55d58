use parking_lot::Mutex;
use qos_common::{
    conf::{PoliceAction, QueueDescriptor},
    packet::{Packet as _, QPacket},
};
use tokio::sync::mpsc::{self, Receiver, Sender};

use crate::{profile, PacketQueue, QueueError, TokenBucket};

/// Packet queue backed by a bounded channel.
///
/// The enqueue path is lock-free and this variant is the default; see
/// [`RingQueue`](crate::RingQueue) for the locked alternative.
pub struct ChannelQueue {
    descriptor: QueueDescriptor,
    bucket: TokenBucket,
    tx: Sender<QPacket>,
    /// Consumer half. `pop_multiple` holds this lock across its blocking
    /// waits, which is what makes the contract single-consumer.
    rx: Mutex<Receiver<QPacket>>,
}

impl ChannelQueue {
    pub fn new(descriptor: QueueDescriptor) -> Result<Self, QueueError> {
        profile::validate(&descriptor)?;
        // One slot of headroom: admission rejects at `max_length`, so a
        // packet that passed always finds room.
        let (tx, rx) = mpsc::channel(descriptor.max_length + 1);
        let bucket = TokenBucket::new(descriptor.police_rate, descriptor.over_rate_action);
        Ok(Self { descriptor, bucket, tx, rx: Mutex::new(rx) })
    }
}

impl PacketQueue for ChannelQueue {
    fn enqueue(&self, packet: QPacket) {
        if self.tx.try_send(packet).is_err() {
            // Only reachable when the admission contract was violated
            // upstream; the packet is released.
            tracing::warn!(queue = self.descriptor.id, "enqueue on full queue, packet dropped");
        }
    }

    fn pop(&self) -> Option<QPacket> {
        self.rx.lock().try_recv().ok()
    }

    fn pop_multiple(&self, n: usize) -> Vec<QPacket> {
        let mut rx = self.rx.lock();
        let mut packets = Vec::with_capacity(n);
        while packets.len() < n {
            match rx.blocking_recv() {
                Some(packet) => packets.push(packet),
                None => break,
            }
        }
        packets
    }

    fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    fn capacity(&self) -> usize {
        self.descriptor.max_length
    }

    fn check_action(&self) -> PoliceAction {
        profile::check(&self.descriptor, self.len())
    }

    fn police(&self, packet: &QPacket) -> PoliceAction {
        self.bucket.police(packet.size_bytes())
    }

    fn descriptor(&self) -> &QueueDescriptor {
        &self.descriptor
    }
}
