//! Per-packet traffic classification and queueing policing for a border
//! router datapath.
//!
//! A packet entering [`Worker::process`] is classified against the installed
//! rule set (memoised in a shared cache), handed to its class's queue, and
//! policed by that queue's token bucket and fill-level admission profile.
//! The outcome is a [`PoliceAction`](qos_common::conf::PoliceAction); on
//! `Pass` the packet is owned by the queue and a drain loop on the other
//! side pops it for forwarding.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

mod dispatch;

pub use dispatch::{DispatcherOptions, QosDispatcher, QosError, QueueKind, Worker};

pub use qos_classify::*;
pub use qos_common::*;
pub use qos_queue::*;
