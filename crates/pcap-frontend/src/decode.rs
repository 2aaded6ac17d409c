//! Decoding of captured frames into core packets.

use std::error::Error as StdError;

use etherparse::{LaxNetSlice, LaxSlicedPacket, TransportSlice};
use nfassign_core::{Bytes, FlowKey, Nanosecs, Packet};

/// The link-layer header type of a capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkType {
    /// Ethernet II, optionally VLAN tagged.
    Ethernet,
    /// Raw IP, version taken from the first nibble.
    Raw,
    /// Raw IPv4.
    Ipv4,
    /// Raw IPv6.
    Ipv6,
}

impl LinkType {
    /// Maps a pcap `LINKTYPE_*` value.
    pub fn from_u32(val: u32) -> Option<Self> {
        match val {
            1 => Some(Self::Ethernet),
            // LINKTYPE_RAW and the two historic DLT_RAW values
            12 | 14 | 101 => Some(Self::Raw),
            228 => Some(Self::Ipv4),
            229 => Some(Self::Ipv6),
            _ => None,
        }
    }

    /// The pcap `LINKTYPE_*` value.
    pub fn into_u32(self) -> u32 {
        match self {
            Self::Ethernet => 1,
            Self::Raw => 101,
            Self::Ipv4 => 228,
            Self::Ipv6 => 229,
        }
    }

    fn ip_version(self) -> Option<u8> {
        match self {
            Self::Ipv4 => Some(4),
            Self::Ipv6 => Some(6),
            Self::Ethernet | Self::Raw => None,
        }
    }
}

/// Decodes one captured frame. `orig_len`, the length of the frame on the wire, may exceed the
/// captured `data`; it is the packet's wire length. Payload lengths come from the IP header, so
/// snapped captures still count every payload byte.
pub fn decode(
    link_type: LinkType,
    data: &[u8],
    orig_len: u32,
    timestamp: Nanosecs,
) -> Result<Packet, DecodeError> {
    let sliced = match link_type {
        LinkType::Ethernet => {
            LaxSlicedPacket::from_ethernet(data).map_err(|e| DecodeError::Malformed {
                layer: "Ethernet",
                source: Box::new(e),
            })?
        }
        LinkType::Raw | LinkType::Ipv4 | LinkType::Ipv6 => {
            LaxSlicedPacket::from_ip(data).map_err(|e| DecodeError::Malformed {
                layer: "IP",
                source: Box::new(e),
            })?
        }
    };
    // Only the first fragment carries the transport header, and etherparse leaves fragmented
    // payloads unsliced, so fragments have no ports.
    let (src_port, dst_port) = match &sliced.transport {
        Some(TransportSlice::Tcp(tcp)) => (tcp.source_port(), tcp.destination_port()),
        Some(TransportSlice::Udp(udp)) => (udp.source_port(), udp.destination_port()),
        _ => (0, 0),
    };
    let (version, key, payload_len, fragmented) = match &sliced.net {
        Some(LaxNetSlice::Ipv4(ipv4)) => {
            let header = ipv4.header();
            let payload = ipv4.payload();
            let header_len = u64::from(header.ihl()) * 4;
            (
                4,
                FlowKey::v4(
                    header.source_addr(),
                    header.destination_addr(),
                    payload.ip_number.0,
                    src_port,
                    dst_port,
                ),
                u64::from(header.total_len()).saturating_sub(header_len),
                payload.fragmented,
            )
        }
        Some(LaxNetSlice::Ipv6(ipv6)) => {
            let header = ipv6.header();
            let payload = ipv6.payload();
            (
                6,
                FlowKey::v6(
                    header.source_addr(),
                    header.destination_addr(),
                    payload.ip_number.0,
                    src_port,
                    dst_port,
                ),
                u64::from(header.payload_length()),
                payload.fragmented,
            )
        }
        _ => {
            return Err(match sliced.stop_err {
                Some((e, _)) => DecodeError::Malformed {
                    layer: "IP",
                    source: Box::new(e),
                },
                None => DecodeError::NotIp,
            })
        }
    };
    if link_type.ip_version().is_some_and(|v| v != version) {
        return Err(DecodeError::UnsupportedVersion(version));
    }
    Ok(Packet {
        timestamp,
        wire_len: Bytes::new(u64::from(orig_len)),
        payload_len: Bytes::new(payload_len),
        key,
        fragmented,
    })
}

/// Errors decoding a captured frame.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// A header could not be sliced.
    #[error("malformed {layer} header")]
    Malformed {
        /// The layer being decoded.
        layer: &'static str,
        /// The slicing error.
        source: Box<dyn StdError + Send + Sync>,
    },

    /// The frame carries neither IPv4 nor IPv6.
    #[error("frame does not carry IP")]
    NotIp,

    /// An IP version other than the capture's link type announces.
    #[error("unexpected IP version {0}")]
    UnsupportedVersion(u8),
}

#[cfg(test)]
mod tests {
    use std::net::{Ipv4Addr, Ipv6Addr};

    use nfassign_core::{Addrs, PROTO_TCP, PROTO_UDP};

    use super::*;
    use crate::frames;

    #[test]
    fn ipv4_tcp_decodes() -> anyhow::Result<()> {
        let src = Ipv4Addr::new(10, 1, 2, 3);
        let dst = Ipv4Addr::new(192, 168, 7, 9);
        let frame = frames::ipv4(src, dst, PROTO_TCP, 40_000, 443, 100)?;
        let pkt = decode(LinkType::Raw, &frame, frame.len() as u32, Nanosecs::new(5))?;
        assert_eq!(pkt.key, FlowKey::v4(src, dst, PROTO_TCP, 40_000, 443));
        assert_eq!(pkt.wire_len, Bytes::new(120));
        assert_eq!(pkt.payload_len, Bytes::new(100));
        assert_eq!(pkt.timestamp, Nanosecs::new(5));
        assert!(!pkt.fragmented);
        Ok(())
    }

    #[test]
    fn ipv6_udp_decodes() -> anyhow::Result<()> {
        let (src, dst) = (Ipv6Addr::LOCALHOST, "2001:db8::7".parse()?);
        let frame = frames::ipv6(src, dst, PROTO_UDP, 53, 5353, 60)?;
        let pkt = decode(LinkType::Ipv6, &frame, frame.len() as u32, Nanosecs::ZERO)?;
        assert_eq!(pkt.key, FlowKey::v6(src, dst, PROTO_UDP, 53, 5353));
        assert_eq!(pkt.wire_len, Bytes::new(100));
        assert_eq!(pkt.payload_len, Bytes::new(60));
        Ok(())
    }

    #[test]
    fn payload_length_comes_from_header_not_capture() -> anyhow::Result<()> {
        // A snapped capture keeps only the first 34 bytes of a 1500-byte packet.
        let frame = frames::ipv4(
            Ipv4Addr::LOCALHOST,
            Ipv4Addr::LOCALHOST,
            PROTO_UDP,
            1,
            2,
            1480,
        )?;
        let pkt = decode(LinkType::Raw, &frame[..34], 1500, Nanosecs::ZERO)?;
        assert_eq!(pkt.wire_len, Bytes::new(1500));
        assert_eq!(pkt.payload_len, Bytes::new(1480));
        assert_eq!((pkt.key.src_port, pkt.key.dst_port), (1, 2));
        Ok(())
    }

    #[test]
    fn non_transport_protocols_have_no_ports() -> anyhow::Result<()> {
        let frame = frames::ipv4(Ipv4Addr::LOCALHOST, Ipv4Addr::BROADCAST, 1, 9, 9, 8)?;
        let pkt = decode(LinkType::Raw, &frame, frame.len() as u32, Nanosecs::ZERO)?;
        assert_eq!((pkt.key.proto, pkt.key.src_port, pkt.key.dst_port), (1, 0, 0));
        Ok(())
    }

    #[test]
    fn fragments_have_no_ports() -> anyhow::Result<()> {
        let mut frame =
            frames::ipv4(Ipv4Addr::LOCALHOST, Ipv4Addr::LOCALHOST, PROTO_TCP, 1, 2, 64)?;
        // Fragment offset 8 (64 bytes)
        frame[6] = 0x00;
        frame[7] = 0x08;
        let pkt = decode(LinkType::Raw, &frame, frame.len() as u32, Nanosecs::ZERO)?;
        assert!(pkt.fragmented);
        assert_eq!(pkt.key.proto, PROTO_TCP);
        assert_eq!((pkt.key.src_port, pkt.key.dst_port), (0, 0));
        Ok(())
    }

    #[test]
    fn ethernet_frames_count_link_bytes() -> anyhow::Result<()> {
        let ip = frames::ipv4(Ipv4Addr::LOCALHOST, Ipv4Addr::LOCALHOST, PROTO_UDP, 7, 8, 10)?;
        let mut frame = vec![0u8; 12];
        // One VLAN tag, then IPv4
        frame.extend_from_slice(&[0x81, 0x00, 0x00, 0x2a, 0x08, 0x00]);
        frame.extend_from_slice(&ip);
        let pkt = decode(
            LinkType::Ethernet,
            &frame,
            frame.len() as u32,
            Nanosecs::ZERO,
        )?;
        assert!(matches!(pkt.key.addrs, Addrs::V4 { .. }));
        assert_eq!((pkt.key.src_port, pkt.key.dst_port), (7, 8));
        assert_eq!(pkt.wire_len, Bytes::new(frame.len() as u64));
        assert_eq!(pkt.payload_len, Bytes::new(10));
        Ok(())
    }

    #[test]
    fn ipv6_extension_headers_are_skipped() -> anyhow::Result<()> {
        // Next header 0 is hop-by-hop.
        let mut frame = frames::ipv6(Ipv6Addr::LOCALHOST, Ipv6Addr::LOCALHOST, 0, 0, 0, 16)?;
        frame.truncate(40);
        // Eight-byte hop-by-hop header pointing at UDP, then the UDP header
        frame.extend_from_slice(&[PROTO_UDP, 0, 0, 0, 0, 0, 0, 0]);
        frame.extend_from_slice(&[0x00, 0x35, 0x14, 0xe9, 0, 8, 0, 0]);
        let pkt = decode(LinkType::Raw, &frame, frame.len() as u32, Nanosecs::ZERO)?;
        assert_eq!(pkt.key.proto, PROTO_UDP);
        assert_eq!((pkt.key.src_port, pkt.key.dst_port), (53, 5353));
        assert_eq!(pkt.payload_len, Bytes::new(16));
        Ok(())
    }

    #[test]
    fn malformed_frames_fail() -> anyhow::Result<()> {
        assert!(matches!(
            decode(LinkType::Raw, &[0x45, 0, 0], 3, Nanosecs::ZERO),
            Err(DecodeError::Malformed { layer: "IP", .. })
        ));
        assert!(matches!(
            decode(LinkType::Raw, &[0x20; 40], 40, Nanosecs::ZERO),
            Err(DecodeError::Malformed { .. })
        ));
        let v4 = frames::ipv4(Ipv4Addr::LOCALHOST, Ipv4Addr::LOCALHOST, 1, 0, 0, 0)?;
        assert!(matches!(
            decode(LinkType::Ipv6, &v4, v4.len() as u32, Nanosecs::ZERO),
            Err(DecodeError::UnsupportedVersion(4))
        ));
        // Local experimental ethertype
        let mut other = vec![0u8; 42];
        other[12] = 0x88;
        other[13] = 0xb5;
        assert!(matches!(
            decode(LinkType::Ethernet, &other, 42, Nanosecs::ZERO),
            Err(DecodeError::NotIp)
        ));
        Ok(())
    }
}
