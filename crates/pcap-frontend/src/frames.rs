//! Synthetic raw-IP frames, for writing test traces.
//!
//! `payload_len` is always the IP payload length. For TCP and UDP it includes the transport
//! header, so it must be large enough to hold one.

use std::error::Error as StdError;
use std::net::{Ipv4Addr, Ipv6Addr};

use etherparse::{IpHeaders, IpNumber, PacketBuilder, PacketBuilderStep, TcpHeader, UdpHeader};
use nfassign_core::{PROTO_TCP, PROTO_UDP};

/// An IPv4 packet whose payload is zero bytes behind the transport header, if any.
pub fn ipv4(
    src: Ipv4Addr,
    dst: Ipv4Addr,
    proto: u8,
    src_port: u16,
    dst_port: u16,
    payload_len: usize,
) -> Result<Vec<u8>, FrameError> {
    let ip = PacketBuilder::ipv4(src.octets(), dst.octets(), 64);
    build(ip, proto, src_port, dst_port, payload_len)
}

/// An IPv6 packet, laid out as in [`ipv4`].
pub fn ipv6(
    src: Ipv6Addr,
    dst: Ipv6Addr,
    next_header: u8,
    src_port: u16,
    dst_port: u16,
    payload_len: usize,
) -> Result<Vec<u8>, FrameError> {
    let ip = PacketBuilder::ipv6(src.octets(), dst.octets(), 64);
    build(ip, next_header, src_port, dst_port, payload_len)
}

fn build(
    ip: PacketBuilderStep<IpHeaders>,
    proto: u8,
    src_port: u16,
    dst_port: u16,
    payload_len: usize,
) -> Result<Vec<u8>, FrameError> {
    let header_len = match proto {
        PROTO_TCP => TcpHeader::MIN_LEN,
        PROTO_UDP => UdpHeader::LEN,
        _ => 0,
    };
    let data_len = payload_len
        .checked_sub(header_len)
        .ok_or(FrameError::TooShort {
            payload_len,
            header_len,
        })?;
    let data = vec![0; data_len];
    let mut frame = Vec::new();
    match proto {
        PROTO_TCP => ip
            .tcp(src_port, dst_port, 0, u16::MAX)
            .write(&mut frame, &data)
            .map_err(|e| FrameError::Build(Box::new(e)))?,
        PROTO_UDP => ip
            .udp(src_port, dst_port)
            .write(&mut frame, &data)
            .map_err(|e| FrameError::Build(Box::new(e)))?,
        _ => ip
            .write(&mut frame, IpNumber(proto), &data)
            .map_err(|e| FrameError::Build(Box::new(e)))?,
    }
    Ok(frame)
}

/// Errors building a frame.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The payload cannot hold the transport header.
    #[error("{payload_len} payload bytes cannot hold a {header_len}-byte transport header")]
    TooShort {
        /// The requested IP payload length.
        payload_len: usize,
        /// The transport header length.
        header_len: usize,
    },

    /// The packet could not be serialized.
    #[error("failed to build frame")]
    Build(#[source] Box<dyn StdError + Send + Sync>),
}
