//! This module defines decoded packets ([`Packet`]), the keys that group them into flows
//! ([`FlowKey`]), and the [`PacketSource`] interface through which traces are read.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use crate::units::{Bytes, Nanosecs};

/// IP protocol number of TCP.
pub const PROTO_TCP: u8 = 6;
/// IP protocol number of UDP.
pub const PROTO_UDP: u8 = 17;

/// A decoded packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Capture timestamp.
    pub timestamp: Nanosecs,
    /// Total length of the packet on the wire.
    pub wire_len: Bytes,
    /// Length of the network-layer payload.
    pub payload_len: Bytes,
    /// The key of the flow this packet belongs to.
    pub key: FlowKey,
    /// True if this is an IPv4 fragment.
    pub fragmented: bool,
}

/// The source and destination addresses of a flow. Both endpoints always belong to the same
/// address family.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub enum Addrs {
    V4 { src: Ipv4Addr, dst: Ipv4Addr },
    V6 { src: Ipv6Addr, dst: Ipv6Addr },
}

/// A unidirectional 5-tuple flow key. Ports are zero for protocols other than TCP and UDP.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub struct FlowKey {
    pub addrs: Addrs,
    pub proto: u8,
    pub src_port: u16,
    pub dst_port: u16,
}

impl FlowKey {
    pub fn v4(src: Ipv4Addr, dst: Ipv4Addr, proto: u8, src_port: u16, dst_port: u16) -> Self {
        Self {
            addrs: Addrs::V4 { src, dst },
            proto,
            src_port,
            dst_port,
        }
    }

    pub fn v6(src: Ipv6Addr, dst: Ipv6Addr, proto: u8, src_port: u16, dst_port: u16) -> Self {
        Self {
            addrs: Addrs::V6 { src, dst },
            proto,
            src_port,
            dst_port,
        }
    }

    /// Returns true if the transport protocol carries ports that are part of the key.
    pub fn has_ports(&self) -> bool {
        matches!(self.proto, PROTO_TCP | PROTO_UDP)
    }
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.addrs {
            Addrs::V4 { src, dst } => write!(
                f,
                "{src}:{} -> {dst}:{} ({})",
                self.src_port, self.dst_port, self.proto
            ),
            Addrs::V6 { src, dst } => write!(
                f,
                "[{src}]:{} -> [{dst}]:{} ({})",
                self.src_port, self.dst_port, self.proto
            ),
        }
    }
}

/// A replayable sequence of decoded packets.
///
/// Every call to [`PacketSource::packets`] must yield the same packets in the same order. The
/// flow table is built from one pass and the per-packet export reads a second one.
pub trait PacketSource {
    /// The error produced while reading or decoding packets.
    type Error: std::error::Error + Send + Sync + 'static;

    /// An iterator over the packets of one pass.
    type Packets<'a>: Iterator<Item = Result<Packet, Self::Error>>
    where
        Self: 'a;

    /// Starts a new pass over the trace.
    fn packets(&self) -> Result<Self::Packets<'_>, Self::Error>;
}

/// An in-memory trace.
#[derive(Debug, Clone, Default, derive_new::new)]
pub struct VecSource {
    packets: Vec<Packet>,
}

impl VecSource {
    delegate::delegate! {
        to self.packets {
            #[call(len)]
            pub fn nr_packets(&self) -> usize;

            pub fn is_empty(&self) -> bool;
        }
    }
}

impl FromIterator<Packet> for VecSource {
    fn from_iter<T: IntoIterator<Item = Packet>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl PacketSource for VecSource {
    type Error = std::convert::Infallible;
    type Packets<'a> = VecPackets<'a> where Self: 'a;

    fn packets(&self) -> Result<Self::Packets<'_>, Self::Error> {
        Ok(VecPackets {
            inner: self.packets.iter(),
        })
    }
}

/// A pass over a [`VecSource`].
#[derive(Debug)]
pub struct VecPackets<'a> {
    inner: std::slice::Iter<'a, Packet>,
}

impl<'a> Iterator for VecPackets<'a> {
    type Item = Result<Packet, std::convert::Infallible>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().cloned().map(Ok)
    }
}
