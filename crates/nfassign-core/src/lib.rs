#![warn(unreachable_pub, missing_debug_implementations)]

//! The core `nfassign` library. This crate defines [the routine](run::run) that groups the
//! packets of a trace into [flows](FlowTable) and assigns every flow one [action](Action) per
//! run, so that each action handles its target share of the trace's bytes. The
//! [`Exporter`] then derives per-packet instruction counts, required capacities and traffic
//! distributions from the committed runs.

#[macro_use]
mod ident;

mod action;
mod assign;
mod collect;
mod constants;
mod export;
mod flow;
mod ids;
mod packet;
mod run;
pub mod toeplitz;
mod units;

#[cfg(test)]
pub(crate) mod testing;

pub use action::{Action, ActionError, ActionSet, ActionSpec};
pub use assign::{AssignError, Assignment, Attempt, Rejection, ShareAssigner};
pub use collect::{CollectError, CollectStats, RunCollector, RunOpts};
pub use constants::SHARE_EPSILON;
pub use export::{Dimensioning, ExportError, Exporter, INFO_LABEL};
pub use flow::{Flow, FlowTable, FlowTableError, PacketRef};
pub use ident::{ActionId, FlowId, RunId};
pub use ids::{write_packet_ids, IdsError};
pub use packet::{
    Addrs, FlowKey, Packet, PacketSource, VecPackets, VecSource, PROTO_TCP, PROTO_UDP,
};
pub use run::{run, run_with, Collection, Error};
pub use units::{Bytes, Instructions, Nanosecs};
