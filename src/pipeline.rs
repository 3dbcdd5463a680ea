//! Pipeline Supervisor
//!
//! Ties one collector, one retry buffer and one publisher together:
//!
//! - [`Pipeline`]: Collection loop and delivery loop over a shared buffer
//! - [`PipelineState`]: `Idle → Running → Draining → Stopped`
//! - [`PipelineSettings`]: Schedule, retry policy, fan-out and drain timeout
//! - [`Supervisor`]: Owns every pipeline and the shutdown token

mod runner;
mod settings;
mod state;
mod stats;
mod supervisor;

pub use runner::{Pipeline, PipelineFailure, PipelineHandle, PipelineReport};
pub use settings::{
    DEFAULT_DRAIN_TIMEOUT, DEFAULT_FAN_OUT, DEFAULT_INTERVAL, PipelineSettings, RandomInterval,
};
pub use state::PipelineState;
pub use stats::{PipelineStats, StatsSnapshot};
pub use supervisor::{EXIT_CLEAN, EXIT_DEGRADED, Supervisor, SupervisorReport};
