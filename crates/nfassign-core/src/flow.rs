//! This module defines the [`FlowTable`], which aggregates the packets of one trace into
//! [`Flow`]s and carries the actions each flow was assigned in every committed run.

use rustc_hash::FxHashMap;

use crate::assign::Assignment;
use crate::ident::{ActionId, FlowId, RunId};
use crate::packet::{FlowKey, Packet, PacketSource};
use crate::units::{Bytes, Nanosecs};

/// A traffic aggregate.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Flow {
    /// Position of the flow in first-seen order.
    pub id: FlowId,
    pub key: FlowKey,
    pub nr_pkts: u64,
    /// Total wire bytes.
    pub bytes: Bytes,
    /// Total network-layer payload bytes.
    pub payload_bytes: Bytes,
    // One entry per committed run
    actions: Vec<ActionId>,
}

impl Flow {
    fn new(id: FlowId, key: FlowKey) -> Self {
        Self {
            id,
            key,
            nr_pkts: 0,
            bytes: Bytes::ZERO,
            payload_bytes: Bytes::ZERO,
            actions: Vec::new(),
        }
    }

    /// The actions assigned to this flow, indexed by run.
    pub fn actions(&self) -> &[ActionId] {
        &self.actions
    }

    /// The action assigned to this flow in `run`.
    pub fn action(&self, run: RunId) -> Option<ActionId> {
        self.actions.get(run.inner()).copied()
    }
}

/// The position of a packet within its flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketRef {
    pub flow: FlowId,
    /// Zero for the first packet of a flow.
    pub seq: u64,
}

/// The flows of a single trace.
#[derive(Debug, Clone, Default)]
pub struct FlowTable {
    flows: Vec<Flow>,
    index: FxHashMap<FlowKey, FlowId>,
    first_seen: Option<Nanosecs>,
    last_seen: Option<Nanosecs>,
    nr_runs: usize,
}

impl FlowTable {
    /// Creates an empty flow table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a flow table from one pass over `source`.
    pub fn from_source<S>(source: &S) -> Result<Self, FlowTableError>
    where
        S: PacketSource,
    {
        let mut table = Self::new();
        for (i, pkt) in source.packets().map_err(FlowTableError::from_source)?.enumerate() {
            let pkt = pkt.map_err(FlowTableError::from_source)?;
            table.push(&pkt).map_err(|e| e.at(i))?;
        }
        Ok(table)
    }

    /// Accounts a packet to its flow, creating the flow if this is the first packet with its key.
    ///
    /// Correctness properties:
    ///
    /// - A packet's payload must be strictly shorter than the packet itself.
    pub fn push(&mut self, pkt: &Packet) -> Result<PacketRef, FlowTableError> {
        // CORRECTNESS: A packet's payload must be strictly shorter than the packet itself.
        if pkt.payload_len >= pkt.wire_len {
            return Err(FlowTableError::InvalidLength {
                index: None,
                payload: pkt.payload_len,
                wire: pkt.wire_len,
            });
        }
        let next_id = FlowId::new(self.flows.len());
        let id = *self.index.entry(pkt.key).or_insert(next_id);
        if id == next_id {
            self.flows.push(Flow::new(id, pkt.key));
        }
        let flow = &mut self.flows[id.inner()];
        let seq = flow.nr_pkts;
        flow.nr_pkts += 1;
        flow.bytes += pkt.wire_len;
        flow.payload_bytes += pkt.payload_len;
        self.first_seen.get_or_insert(pkt.timestamp);
        self.last_seen = Some(pkt.timestamp);
        Ok(PacketRef { flow: id, seq })
    }

    /// All flows, in first-seen order.
    pub fn flows(&self) -> &[Flow] {
        &self.flows
    }

    /// Looks up the flow a key belongs to.
    pub fn get(&self, key: &FlowKey) -> Option<&Flow> {
        self.index.get(key).map(|&id| &self.flows[id.inner()])
    }

    /// Sum of wire bytes over all flows.
    pub fn total_bytes(&self) -> Bytes {
        self.flows.iter().map(|f| f.bytes).sum()
    }

    /// Time between the first and the last packet. Zero for traces with fewer than two packets.
    pub fn duration(&self) -> Nanosecs {
        match (self.first_seen, self.last_seen) {
            (Some(first), Some(last)) => last.saturating_sub(first),
            _ => Nanosecs::ZERO,
        }
    }

    /// The number of committed runs. Every flow holds exactly this many actions.
    pub fn nr_runs(&self) -> usize {
        self.nr_runs
    }

    /// Appends an accepted assignment as the next run.
    ///
    /// PRECONDITION: `assignment` was produced from this table.
    pub(crate) fn commit(&mut self, assignment: Assignment) -> RunId {
        // CORRECTNESS: An assignment holds one choice per flow of the table it was drawn from.
        // Committing a shorter one would leave flows with fewer actions than there are runs.
        assert_eq!(
            assignment.choices.len(),
            self.flows.len(),
            "assignment does not match the flow table"
        );
        // Choices are indexed by flow ID, not by the order in which flows were assigned.
        for (flow, action) in self.flows.iter_mut().zip(assignment.choices) {
            flow.actions.push(action);
        }
        let run = RunId::new(self.nr_runs);
        self.nr_runs += 1;
        run
    }

    delegate::delegate! {
        to self.flows {
            #[call(len)]
            pub fn nr_flows(&self) -> usize;

            pub fn is_empty(&self) -> bool;
        }
    }
}

/// Errors raised while building a flow table.
#[derive(Debug, thiserror::Error)]
pub enum FlowTableError {
    /// A packet's payload is not shorter than the packet.
    #[error(
        "packet {} has payload length {} but wire length {}",
        display_index(.index),
        .payload,
        .wire
    )]
    InvalidLength {
        /// Position of the packet in the trace, if known.
        index: Option<usize>,
        payload: Bytes,
        wire: Bytes,
    },

    /// The packet source failed.
    #[error("failed to read packets")]
    Source(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl FlowTableError {
    fn from_source<E>(e: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Source(Box::new(e))
    }

    fn at(self, i: usize) -> Self {
        match self {
            Self::InvalidLength { payload, wire, .. } => Self::InvalidLength {
                index: Some(i),
                payload,
                wire,
            },
            e => e,
        }
    }
}

fn display_index(index: &Option<usize>) -> String {
    index.map_or_else(|| "?".to_owned(), |i| i.to_string())
}

#[cfg(test)]
mod tests {
    use crate::packet::VecSource;
    use crate::testing;

    use super::*;

    #[test]
    fn packets_aggregate_into_flows() -> anyhow::Result<()> {
        let (a, b) = (testing::key(1), testing::key(2));
        let source = VecSource::new(vec![
            testing::packet(a, 0, 100, 80),
            testing::packet(b, 10, 200, 180),
            testing::packet(a, 20, 300, 280),
        ]);
        let table = FlowTable::from_source(&source)?;
        assert_eq!(table.nr_flows(), 2);
        let fa = table.get(&a).unwrap();
        assert_eq!(fa.id, FlowId::ZERO);
        assert_eq!(fa.nr_pkts, 2);
        assert_eq!(fa.bytes, Bytes::new(400));
        assert_eq!(fa.payload_bytes, Bytes::new(360));
        let fb = table.get(&b).unwrap();
        assert_eq!(fb.id, FlowId::ONE);
        assert_eq!(fb.nr_pkts, 1);
        assert_eq!(table.total_bytes(), Bytes::new(600));
        assert_eq!(table.duration(), Nanosecs::new(20));
        Ok(())
    }

    #[test]
    fn byte_totals_are_consistent() -> anyhow::Result<()> {
        let source = testing::random_trace(50, 2_000, 0);
        let table = FlowTable::from_source(&source)?;
        let sum = table.flows().iter().map(|f| f.bytes).sum::<Bytes>();
        assert_eq!(sum, table.total_bytes());
        assert!(table.flows().iter().all(|f| f.payload_bytes <= f.bytes));
        let nr_pkts = table.flows().iter().map(|f| f.nr_pkts).sum::<u64>();
        assert_eq!(nr_pkts as usize, source.nr_packets());
        Ok(())
    }

    #[test]
    fn packet_refs_count_per_flow() {
        let (a, b) = (testing::key(1), testing::key(2));
        let mut table = FlowTable::new();
        let refs = [a, b, a, a, b]
            .into_iter()
            .map(|k| table.push(&testing::packet(k, 0, 100, 60)).unwrap())
            .map(|r| (r.flow.inner(), r.seq))
            .collect::<Vec<_>>();
        assert_eq!(refs, vec![(0, 0), (1, 0), (0, 1), (0, 2), (1, 1)]);
    }

    #[test]
    fn payload_not_below_wire_length_fails() {
        let key = testing::key(1);
        let source = VecSource::new(vec![
            testing::packet(key, 0, 100, 60),
            testing::packet(key, 1, 100, 100),
        ]);
        assert!(matches!(
            FlowTable::from_source(&source),
            Err(FlowTableError::InvalidLength { index: Some(1), .. })
        ));
    }

    #[test]
    fn short_traces_have_zero_duration() -> anyhow::Result<()> {
        assert_eq!(FlowTable::new().duration(), Nanosecs::ZERO);
        let source = VecSource::new(vec![testing::packet(testing::key(1), 42, 100, 60)]);
        assert_eq!(FlowTable::from_source(&source)?.duration(), Nanosecs::ZERO);
        Ok(())
    }

    #[test]
    fn commits_append_in_flow_order() -> anyhow::Result<()> {
        let mut table = FlowTable::from_source(&testing::single_packet_flows(&[100, 200]))?;
        let choices = vec![ActionId::new(1), ActionId::new(0)];
        let bytes = vec![Bytes::new(200), Bytes::new(100)];
        assert_eq!(table.commit(Assignment { choices, bytes }), RunId::ZERO);
        assert_eq!(table.nr_runs(), 1);
        assert_eq!(table.flows()[0].actions(), &[ActionId::new(1)]);
        assert_eq!(table.flows()[1].actions(), &[ActionId::new(0)]);
        Ok(())
    }

    #[test]
    #[should_panic(expected = "assignment does not match the flow table")]
    fn foreign_assignment_is_not_committed() {
        let mut table = FlowTable::new();
        table
            .push(&testing::packet(testing::key(1), 0, 100, 60))
            .unwrap();
        table.commit(Assignment {
            choices: vec![ActionId::ZERO, ActionId::ZERO],
            bytes: vec![Bytes::new(100)],
        });
    }
}
