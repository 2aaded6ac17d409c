//! `nfassign` turns captured packet traces into synthetic network-function workloads. Every flow
//! of a trace is assigned a processing action, a per-packet instruction cost model, so that each
//! action handles a target share of the trace's bytes. Many such assignments ("runs") are
//! collected, and for each run the per-packet instruction counts, the required processing
//! capacity and the bytes handled by every action are reported.

#![warn(unreachable_pub, missing_docs)]

pub mod core;
pub mod pcap;
pub mod utils;
