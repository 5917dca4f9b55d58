//! Shared vocabulary for the QoS datapath crates: inter-domain network
//! identifiers, the packet accessor contract, and the external configuration
//! record handed over by the router.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

pub mod addr;
pub mod conf;
pub mod packet;

pub use addr::{AddrParseError, Asn, Isd, IsdAs};
pub use packet::{ExtHeader, Packet, QPacket};
