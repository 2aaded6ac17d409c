use std::net::Ipv4Addr;

use rand::prelude::*;
use rand_distr::{Exp, Uniform};

use crate::action::{ActionSet, ActionSpec};
use crate::packet::{FlowKey, Packet, VecSource, PROTO_TCP};
use crate::units::{Bytes, Nanosecs};

pub(crate) fn key(i: u32) -> FlowKey {
    FlowKey::v4(
        Ipv4Addr::from(0x0a00_0000 + i),
        Ipv4Addr::new(192, 168, 0, 1),
        PROTO_TCP,
        (1024 + i % 60_000) as u16,
        80,
    )
}

pub(crate) fn packet(key: FlowKey, ts: u64, wire: u64, payload: u64) -> Packet {
    Packet {
        timestamp: Nanosecs::new(ts),
        wire_len: Bytes::new(wire),
        payload_len: Bytes::new(payload),
        key,
        fragmented: false,
    }
}

/// A trace with one packet of `bytes` wire length per flow.
pub(crate) fn single_packet_flows(sizes: &[u64]) -> VecSource {
    sizes
        .iter()
        .enumerate()
        .map(|(i, &bytes)| packet(key(i as u32), i as u64 * 1_000, bytes, bytes - 20))
        .collect()
}

/// A trace of `nr_pkts` packets spread over `nr_flows` flows with exponentially distributed
/// inter-arrival times and uniformly distributed packet sizes.
pub(crate) fn random_trace(nr_flows: u32, nr_pkts: usize, seed: u64) -> VecSource {
    let mut rng = StdRng::seed_from_u64(seed);
    let gaps = Exp::new(1e-3_f64).unwrap();
    let sizes = Uniform::new_inclusive(64, 1500);
    let mut ts = 0;
    (0..nr_pkts)
        .map(|_| {
            ts += gaps.sample(&mut rng).round() as u64;
            let wire = sizes.sample(&mut rng);
            packet(key(rng.gen_range(0..nr_flows)), ts, wire, wire - 20)
        })
        .collect()
}

pub(crate) fn actions(specs: &[(u64, u64, f64)]) -> ActionSet {
    let specs = specs
        .iter()
        .map(|&(ipp_base, ipp_payload, share)| ActionSpec {
            ipp_base,
            ipp_payload,
            share,
        })
        .collect();
    ActionSet::new(specs).unwrap()
}

/// Four actions with unequal shares.
pub(crate) fn four_actions() -> ActionSet {
    actions(&[(100, 2, 0.4), (250, 0, 0.3), (80, 5, 0.2), (1000, 1, 0.1)])
}
