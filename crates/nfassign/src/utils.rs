//! Configuration files and the per-trace driver.

pub use nfassign_utils::*;
