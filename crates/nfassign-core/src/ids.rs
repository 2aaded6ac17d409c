//! Flow and packet identification. Every packet of a trace is labeled with the ID of its flow
//! (flows numbered in first-seen order) and its position within that flow.

use std::io::{self, Write};

use crate::flow::{FlowTable, FlowTableError, PacketRef};
use crate::packet::PacketSource;

/// Writes one `<flow id>:<packet id>` line per packet of `source`. Returns the table built along
/// the way.
pub fn write_packet_ids<S, W>(source: &S, mut w: W) -> Result<FlowTable, IdsError>
where
    S: PacketSource,
    W: Write,
{
    let mut table = FlowTable::new();
    let packets = source
        .packets()
        .map_err(|e| FlowTableError::Source(Box::new(e)))?;
    for (i, pkt) in packets.enumerate() {
        let pkt = pkt.map_err(|e| FlowTableError::Source(Box::new(e)))?;
        let PacketRef { flow, seq } = table.push(&pkt).map_err(|e| IdsError::Packet(i, e))?;
        writeln!(w, "{flow}:{seq}")?;
    }
    w.flush()?;
    Ok(table)
}

#[derive(Debug, thiserror::Error)]
pub enum IdsError {
    #[error("failed to identify packet {0}")]
    Packet(usize, #[source] FlowTableError),

    #[error(transparent)]
    Table(#[from] FlowTableError),

    #[error(transparent)]
    Io(#[from] io::Error),
}
