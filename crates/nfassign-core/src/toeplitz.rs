//! Toeplitz hashing as performed by receive-side scaling NICs.
//!
//! The hash input is a sequence of 32-bit words: the source address, the destination address,
//! the ports (TCP and UDP only) and a trace ID that lets several traces replayed on the same NIC
//! hash differently.

use std::io::{self, Write};

use crate::packet::{Addrs, Packet, PacketSource};

/// The default RSS key of Intel i40e NICs.
pub const I40E_KEY: [u32; 13] = [
    0x4439796b, 0xb54c5023, 0xb675ea5b, 0x124f9f30, 0xb8a2c03d, 0xdfdc4d02, 0xa08c9b33,
    0x4af64a4c, 0x05c6fa34, 0x3958d855, 0x7d99583a, 0xe138c92e, 0x81150366,
];

/// IP protocol number of IPv6 encapsulated in IPv4.
const PROTO_IPV6_IN_IPV4: u8 = 41;

/// Hashes `words` under `key`.
///
/// PRECONDITION: `key` holds at least one word more than `words`.
pub fn hash(key: &[u32], words: &[u32]) -> u32 {
    assert!(key.len() > words.len(), "hash key too short");
    let mut ret = 0;
    for (j, &word) in words.iter().enumerate() {
        for i in 0..32 {
            if word & (1 << (31 - i)) != 0 {
                ret ^= key[j] << i | ((key[j + 1] as u64) >> (32 - i)) as u32;
            }
        }
    }
    ret
}

/// The hash input words of a packet.
pub fn packet_words(pkt: &Packet, trace_id: u8) -> Result<Vec<u32>, ToeplitzError> {
    let key = &pkt.key;
    let mut words = match key.addrs {
        Addrs::V4 { src, dst } => {
            if pkt.fragmented {
                return Err(ToeplitzError::Fragmented);
            }
            if key.proto == PROTO_IPV6_IN_IPV4 {
                return Err(ToeplitzError::Tunneled);
            }
            vec![u32::from(src), u32::from(dst)]
        }
        Addrs::V6 { src, dst } => {
            let (src, dst) = (u128::from(src), u128::from(dst));
            (0..4)
                .rev()
                .map(|i| (src >> (32 * i)) as u32)
                .chain((0..4).rev().map(|i| (dst >> (32 * i)) as u32))
                .collect()
        }
    };
    if key.has_ports() {
        words.push(u32::from(key.dst_port) | u32::from(key.src_port) << 16);
    }
    words.push(u32::from(trace_id));
    Ok(words)
}

/// The i40e hash of a packet.
pub fn packet_hash(pkt: &Packet, trace_id: u8) -> Result<u32, ToeplitzError> {
    Ok(hash(&I40E_KEY, &packet_words(pkt, trace_id)?))
}

/// Writes the hash of every packet of `source`, one per line. Returns the number of packets.
pub fn write_hashes<S, W>(source: &S, trace_id: u8, mut w: W) -> Result<u64, ToeplitzError>
where
    S: PacketSource,
    W: Write,
{
    let mut nr_pkts = 0;
    for (i, pkt) in source
        .packets()
        .map_err(|e| ToeplitzError::Source(Box::new(e)))?
        .enumerate()
    {
        let pkt = pkt.map_err(|e| ToeplitzError::Source(Box::new(e)))?;
        let hash = packet_hash(&pkt, trace_id)
            .map_err(|e| ToeplitzError::Packet(i, Box::new(e)))?;
        writeln!(w, "{hash}")?;
        nr_pkts += 1;
    }
    w.flush()?;
    Ok(nr_pkts)
}

#[derive(Debug, thiserror::Error)]
pub enum ToeplitzError {
    #[error("fragmented IPv4 packets cannot be hashed")]
    Fragmented,

    #[error("IPv6-in-IPv4 packets cannot be hashed")]
    Tunneled,

    #[error("failed to hash packet {0}")]
    Packet(usize, #[source] Box<ToeplitzError>),

    #[error("failed to read packets")]
    Source(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error(transparent)]
    Io(#[from] io::Error),
}
