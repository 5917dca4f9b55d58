use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};
use qos_common::{
    conf::{PoliceAction, QueueDescriptor},
    packet::{Packet as _, QPacket},
};

use crate::{profile, PacketQueue, QueueError, TokenBucket};

/// Packet queue backed by an internally locked ring buffer.
///
/// Interchangeable with [`ChannelQueue`](crate::ChannelQueue); the two
/// differ only in contention behaviour.
pub struct RingQueue {
    descriptor: QueueDescriptor,
    bucket: TokenBucket,
    buffer: Mutex<VecDeque<QPacket>>,
    /// Signalled on enqueue; `pop_multiple` waits on it.
    available: Condvar,
}

impl RingQueue {
    pub fn new(descriptor: QueueDescriptor) -> Result<Self, QueueError> {
        profile::validate(&descriptor)?;
        let bucket = TokenBucket::new(descriptor.police_rate, descriptor.over_rate_action);
        // Same one-slot headroom as the channel variant.
        let buffer = Mutex::new(VecDeque::with_capacity(descriptor.max_length + 1));
        Ok(Self { descriptor, bucket, buffer, available: Condvar::new() })
    }
}

impl PacketQueue for RingQueue {
    fn enqueue(&self, packet: QPacket) {
        let mut buffer = self.buffer.lock();
        if buffer.len() > self.descriptor.max_length {
            // Only reachable when the admission contract was violated
            // upstream; the packet is released.
            tracing::warn!(queue = self.descriptor.id, "enqueue on full queue, packet dropped");
            return;
        }
        buffer.push_back(packet);
        self.available.notify_one();
    }

    fn pop(&self) -> Option<QPacket> {
        self.buffer.lock().pop_front()
    }

    fn pop_multiple(&self, n: usize) -> Vec<QPacket> {
        let mut packets = Vec::with_capacity(n);
        let mut buffer = self.buffer.lock();
        while packets.len() < n {
            match buffer.pop_front() {
                Some(packet) => packets.push(packet),
                None => self.available.wait(&mut buffer),
            }
        }
        packets
    }

    fn len(&self) -> usize {
        self.buffer.lock().len()
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
