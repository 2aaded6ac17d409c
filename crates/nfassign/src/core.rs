//! Core `nfassign` data structures and routines. The most common entry point is [run()], which
//! commits action assignments to the [flow table](FlowTable) of a trace.

pub use nfassign_core::*;
