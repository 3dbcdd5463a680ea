//! Pipeline lifecycle states.

use serde::Serialize;
use strum_macros::{AsRefStr, Display};

/// Lifecycle of one pipeline: `Idle → Running → Draining → Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PipelineState {
    /// Built, not started.
    Idle,
    /// Collecting and delivering.
    Running,
    /// No new collections; delivering what is buffered until the drain timeout.
    Draining,
    /// Finished; anything left was discarded.
    Stopped,
}

impl PipelineState {
    /// Whether `next` is the state that legally follows `self`.
    pub fn can_transition_to(self, next: PipelineState) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Running)
                | (Self::Running, Self::Draining)
                | (Self::Draining, Self::Stopped)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_transitions() {
        use PipelineState::*;
        assert!(Idle.can_transition_to(Running));
        assert!(Running.can_transition_to(Draining));
        assert!(Draining.can_transition_to(Stopped));
        assert!(!Idle.can_transition_to(Stopped));
        assert!(!Stopped.can_transition_to(Running));
        assert!(!Running.can_transition_to(Stopped));
    }

    #[test]
    fn test_state_display() {
        assert_eq!(PipelineState::Draining.to_string(), "draining");
    }
}
