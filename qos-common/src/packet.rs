use bytes::Bytes;

use crate::addr::IsdAs;

/// Discriminator of an extension header, as carried in hop-by-hop or
/// end-to-end position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtHeader {
    /// The protocol class the extension belongs to.
    pub class: u8,
    /// The extension type within that class.
    pub ext_type: u8,
}

impl ExtHeader {
    pub const fn new(class: u8, ext_type: u8) -> Self {
        Self { class, ext_type }
    }
}

/// Read-only view of a parsed packet, as handed over by the packet parser.
///
/// The classifier consumes packets exclusively through this contract, so the
/// outer router can pass its own packet handle without copying.
pub trait Packet {
    fn src_ia(&self) -> IsdAs;

    fn dst_ia(&self) -> IsdAs;

    /// Id of the interface the packet arrived on.
    fn ingress_if_id(&self) -> u64;

    fn l4_protocol(&self) -> u8;

    /// Hop-by-hop and end-to-end extension headers, combined in wire order.
    fn extensions(&self) -> &[ExtHeader];

    /// Total packet size in bytes, as charged against the policer.
    fn size_bytes(&self) -> u32;
}

/// An owned packet handle.
///
/// This is what flows through the per-class queues once a packet passes
/// admission; the payload is reference-counted so handing the packet to a
/// queue is cheap.
#[derive(Debug, Clone)]
pub struct QPacket {
    src_ia: IsdAs,
    dst_ia: IsdAs,
    ingress_if_id: u64,
    l4_protocol: u8,
    extensions: Vec<ExtHeader>,
    payload: Bytes,
}

impl QPacket {
    pub fn new(
        src_ia: IsdAs,
        dst_ia: IsdAs,
        ingress_if_id: u64,
        l4_protocol: u8,
        payload: Bytes,
    ) -> Self {
        Self { src_ia, dst_ia, ingress_if_id, l4_protocol, extensions: Vec::new(), payload }
    }

    /// Attaches the packet's extension headers.
    pub fn with_extensions(mut self, extensions: Vec<ExtHeader>) -> Self {
        self.extensions = extensions;
        self
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn into_payload(self) -> Bytes {
        self.payload
    }
}

impl Packet for QPacket {
    fn src_ia(&self) -> IsdAs {
        self.src_ia
    }

    fn dst_ia(&self) -> IsdAs {
        self.dst_ia
    }

    fn ingress_if_id(&self) -> u64 {
        self.ingress_if_id
    }

    fn l4_protocol(&self) -> u8 {
        self.l4_protocol
    }

    fn extensions(&self) -> &[ExtHeader] {
        &self.extensions
    }

    fn size_bytes(&self) -> u32 {
        self.payload.len() as u32
    }
}
