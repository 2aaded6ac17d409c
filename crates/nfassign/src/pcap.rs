//! Reading pcap traces.

pub use pcap_frontend::*;
