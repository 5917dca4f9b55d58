//! Fill-level admission profiles.

use qos_common::conf::{PoliceAction, QueueDescriptor};
use rand::Rng;

use crate::QueueError;

/// Validates a descriptor before a queue is built from it: non-zero
/// capacity, percentages within bounds, profile sorted ascending by fill
/// level.
pub(crate) fn validate(descriptor: &QueueDescriptor) -> Result<(), QueueError> {
    if descriptor.max_length == 0 {
        return Err(QueueError::ZeroLength { id: descriptor.id });
    }
    for (index, entry) in descriptor.profile.iter().enumerate() {
        if entry.fill_level > 100 {
            return Err(QueueError::ProfileRange {
                id: descriptor.id,
                index,
                field: "fill level",
                value: entry.fill_level,
            });
        }
        if entry.prob > 100 {
            return Err(QueueError::ProfileRange {
                id: descriptor.id,
                index,
                field: "probability",
                value: entry.prob,
            });
        }
    }
    if descriptor.profile.windows(2).any(|pair| pair[0].fill_level > pair[1].fill_level) {
        return Err(QueueError::ProfileOrder { id: descriptor.id });
    }
    Ok(())
}

/// The admission decision for a queue currently holding `len` packets.
///
/// A full queue always rejects. Below that, the profile is scanned from the
/// highest fill level downwards; the first entry whose level is reached
/// samples the configured probability, and a miss keeps scanning the lower
/// entries. The sampler runs on every packet, so it only needs to be
/// uniform, not cryptographic.
pub(crate) fn check(descriptor: &QueueDescriptor, len: usize) -> PoliceAction {
    if len >= descriptor.max_length {
        tracing::trace!(queue = descriptor.id, "queue at max capacity");
        return PoliceAction::DropNotify;
    }

    let level = 100 * len / descriptor.max_length;
    for entry in descriptor.profile.iter().rev() {
        if level >= usize::from(entry.fill_level)
            && rand::thread_rng().gen_range(0..100) < i32::from(entry.prob)
        {
            return entry.action;
        }
    }
    PoliceAction::Pass
}
