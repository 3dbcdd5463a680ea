//! Local Buffer
//!
//! Per-pipeline retry queue between the collector and the publisher:
//!
//! - [`RetryBuffer`]: Bounded FIFO with in-flight tracking and tail-drop on overflow
//! - [`RetryPolicy`]: Attempt budget and capped exponential backoff
//! - [`DeadLetterLog`]: Where exhausted or rejected records end up

mod backoff;
mod dead_letter;
mod queue;

pub use backoff::{
    DEFAULT_BACKOFF_BASE, DEFAULT_BACKOFF_CAP, DEFAULT_BACKOFF_FACTOR, DEFAULT_MAX_ATTEMPTS,
    RetryPolicy,
};
pub use dead_letter::{DeadLetter, DeadLetterLog};
pub use queue::{BufferError, BufferedRecord, DEFAULT_BUFFER_CAPACITY, NackOutcome, RetryBuffer};
