//! Synthetic application event generator.
//!
//! - [`AppEventCollector`]: random user actions, for demos and pipeline tests

mod collector;

pub use collector::{AppEventCollector, AppEventConfig};
