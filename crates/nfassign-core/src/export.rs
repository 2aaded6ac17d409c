//! Metrics derived from committed runs: per-packet instruction counts, the processing capacity a
//! run requires ("dimensioning"), and how a run distributes the trace's bytes over actions.

use std::io::{self, Write};

use itertools::Itertools;
use rayon::prelude::*;

use crate::action::ActionSet;
use crate::flow::FlowTable;
use crate::ident::RunId;
use crate::packet::{FlowKey, Packet, PacketSource};
use crate::units::{Bytes, Instructions};

/// Label of the lines written by [`Exporter::write_info`].
pub const INFO_LABEL: &str = "n_bytes_per_action";

/// Derives metrics from a flow table with committed runs.
#[derive(Debug, Clone, Copy)]
pub struct Exporter<'a> {
    table: &'a FlowTable,
    actions: &'a ActionSet,
}

impl<'a> Exporter<'a> {
    /// Creates an exporter. Every action assigned in `table` must exist in `actions`.
    pub fn new(table: &'a FlowTable, actions: &'a ActionSet) -> Result<Self, ExportError> {
        let unknown = table
            .flows()
            .iter()
            .flat_map(|f| f.actions())
            .find(|&&id| actions.get(id).is_none());
        if let Some(&id) = unknown {
            return Err(ExportError::UnknownAction(id.inner()));
        }
        Ok(Self { table, actions })
    }

    pub fn nr_runs(&self) -> usize {
        self.table.nr_runs()
    }

    /// Instructions needed to process `pkt`, one entry per run.
    pub fn packet_instructions(&self, pkt: &Packet) -> Result<Vec<Instructions>, ExportError> {
        if pkt.payload_len >= pkt.wire_len {
            return Err(ExportError::InvalidLength {
                payload: pkt.payload_len,
                wire: pkt.wire_len,
            });
        }
        let flow = self
            .table
            .get(&pkt.key)
            .ok_or(ExportError::UnknownFlow(pkt.key))?;
        Ok(flow
            .actions()
            .iter()
            .map(|&id| self.actions[id].instructions(pkt.payload_len))
            .collect())
    }

    /// Replays `source` and writes one instruction count per packet and line to `sinks[i]` for
    /// run `i`. Returns the number of packets written.
    pub fn write_instructions<S, W>(&self, source: &S, sinks: &mut [W]) -> Result<u64, ExportError>
    where
        S: PacketSource,
        W: Write,
    {
        if sinks.len() != self.nr_runs() {
            return Err(ExportError::SinkCount {
                sinks: sinks.len(),
                runs: self.nr_runs(),
            });
        }
        let mut nr_pkts = 0;
        for pkt in source.packets().map_err(ExportError::from_source)? {
            let pkt = pkt.map_err(ExportError::from_source)?;
            let instrs = self.packet_instructions(&pkt)?;
            for (sink, instr) in sinks.iter_mut().zip(instrs) {
                writeln!(sink, "{instr}")?;
            }
            nr_pkts += 1;
        }
        for sink in sinks.iter_mut() {
            sink.flush()?;
        }
        Ok(nr_pkts)
    }

    /// The processing capacity required by `run`.
    pub fn dimensioning(&self, run: RunId) -> Result<Dimensioning, ExportError> {
        self.check_run(run)?;
        Ok(self.dimensioning_of(run))
    }

    fn check_run(&self, run: RunId) -> Result<(), ExportError> {
        if run.inner() >= self.nr_runs() {
            return Err(ExportError::UnknownRun {
                run: run.inner(),
                runs: self.nr_runs(),
            });
        }
        Ok(())
    }

    // PRECONDITION: `run` has been committed.
    fn dimensioning_of(&self, run: RunId) -> Dimensioning {
        // CORRECTNESS: Every flow holds one action per committed run.
        let instructions = self
            .table
            .flows()
            .iter()
            .map(|f| {
                let action = &self.actions[f.actions()[run.inner()]];
                action.instructions_bulk(f.nr_pkts, f.payload_bytes)
            })
            .sum::<Instructions>();
        let secs = self.table.duration().into_secs_f64();
        let capacity = (secs > 0.0).then(|| instructions.into_f64() / secs);
        Dimensioning {
            run,
            instructions,
            capacity,
        }
    }

    /// The dimensioning of every run, computed in parallel.
    pub fn dimensionings(&self) -> Vec<Dimensioning> {
        (0..self.nr_runs())
            .into_par_iter()
            .map(|i| self.dimensioning_of(RunId::new(i)))
            .collect()
    }

    /// Bytes assigned to each action in `run`, indexed by action ID.
    pub fn traffic_distribution(&self, run: RunId) -> Result<Vec<Bytes>, ExportError> {
        self.check_run(run)?;
        Ok(self.distribution_of(run))
    }

    // PRECONDITION: `run` has been committed.
    fn distribution_of(&self, run: RunId) -> Vec<Bytes> {
        let mut bytes = vec![Bytes::ZERO; self.actions.nr_actions()];
        for flow in self.table.flows() {
            bytes[flow.actions()[run.inner()].inner()] += flow.bytes;
        }
        bytes
    }

    /// Writes the required capacity of every run, one line per run. Runs of traces without a
    /// measurable duration are written as `nan`.
    pub fn write_dimensioning<W: Write>(&self, mut w: W) -> Result<(), ExportError> {
        for dim in self.dimensionings() {
            match dim.capacity {
                Some(capacity) => writeln!(w, "{capacity:.6}")?,
                None => writeln!(w, "nan")?,
            }
        }
        w.flush()?;
        Ok(())
    }

    /// Writes the traffic distribution of every run as
    /// `n_bytes_per_action,<run>,<bytes of action 0>,<bytes of action 1>,...`.
    pub fn write_info<W: Write>(&self, mut w: W) -> Result<(), ExportError> {
        let lines = (0..self.nr_runs())
            .into_par_iter()
            .map(|i| {
                let bytes = self.distribution_of(RunId::new(i));
                format!(
                    "{INFO_LABEL},{i},{}",
                    bytes.iter().map(|b| b.into_u64()).join(",")
                )
            })
            .collect::<Vec<_>>();
        for line in lines {
            writeln!(w, "{line}")?;
        }
        w.flush()?;
        Ok(())
    }
}

/// The processing capacity required by one run.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct Dimensioning {
    pub run: RunId,
    /// Instructions needed to process the whole trace.
    pub instructions: Instructions,
    /// Mean instructions per second over the trace duration. `None` if the trace duration is zero.
    pub capacity: Option<f64>,
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("no flow with key {0}")]
    UnknownFlow(FlowKey),

    #[error("action {0} is not configured")]
    UnknownAction(usize),

    #[error("packet has payload length {payload} but wire length {wire}")]
    InvalidLength { payload: Bytes, wire: Bytes },

    #[error("run {run} is not committed ({runs} runs)")]
    UnknownRun { run: usize, runs: usize },

    #[error("got {sinks} outputs for {runs} runs")]
    SinkCount { sinks: usize, runs: usize },

    #[error("failed to read packets")]
    Source(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl ExportError {
    fn from_source<E>(e: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Source(Box::new(e))
    }
}
