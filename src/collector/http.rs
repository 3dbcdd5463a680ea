//! HTTP collectors for probing web application health.
//!
//! - [`HttpHealthCollector`]: HTTP GET probe with rolling response-time statistics

mod collector;

pub use collector::{HttpHealthCollector, HttpHealthConfig, ResponseWindow};
