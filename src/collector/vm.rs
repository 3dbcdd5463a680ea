//! Host collectors reading local OS state.
//!
//! - [`VmStatsCollector`]: CPU, memory, disk, network and system info snapshot

mod collector;

pub use collector::{VmStatsCollector, VmStatsConfig};
