//! Collection scheduling.
//!
//! A [`Scheduler`] fires ticks for a single collector according to a
//! [`Schedule`]. The first tick fires immediately; later ticks wait for the
//! next delay drawn from the schedule. Cancellation stops new ticks but never
//! interrupts the caller's work between ticks, so a collection that is already
//! running always completes.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio_util::sync::CancellationToken;

/// Minimum allowed delay between two cycles of one collector.
pub const MIN_INTERVAL: Duration = Duration::from_millis(10);

/// Delay policy between collection cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// Exact period.
    Fixed(Duration),

    /// Period with a uniform offset in `[-jitter, +jitter]`.
    Jittered { period: Duration, jitter: Duration },

    /// Uniform random delay in `[min, max]`.
    Random { min: Duration, max: Duration },
}

impl Schedule {
    /// Create a fixed schedule.
    ///
    /// Period is clamped to [`MIN_INTERVAL`].
    pub fn fixed(period: Duration) -> Self {
        Self::Fixed(clamp_interval(period))
    }

    /// Create a jittered schedule; zero jitter degrades to [`Schedule::Fixed`].
    pub fn jittered(period: Duration, jitter: Duration) -> Self {
        if jitter.is_zero() {
            return Self::fixed(period);
        }
        Self::Jittered {
            period: clamp_interval(period),
            jitter,
        }
    }

    /// Create a random schedule. Bounds are swapped if given in reverse.
    pub fn random(min: Duration, max: Duration) -> Self {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        Self::Random {
            min: clamp_interval(min),
            max: clamp_interval(max),
        }
    }

    /// Draw the delay before the next cycle.
    pub fn next_delay<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        match *self {
            Self::Fixed(period) => period,
            Self::Jittered { period, jitter } => {
                let lo = period.saturating_sub(jitter);
                let hi = period + jitter;
                rng.gen_range(lo..=hi).max(MIN_INTERVAL)
            }
            Self::Random { min, max } => rng.gen_range(min..=max),
        }
    }

    /// Nominal delay, used for capacity hints and status output.
    pub fn nominal(&self) -> Duration {
        match *self {
            Self::Fixed(period) | Self::Jittered { period, .. } => period,
            Self::Random { min, max } => (min + max) / 2,
        }
    }
}

impl std::fmt::Display for Schedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fixed(d) => write!(f, "every {:?}", d),
            Self::Jittered { period, jitter } => write!(f, "every {:?} ± {:?}", period, jitter),
            Self::Random { min, max } => write!(f, "random {:?}..{:?}", min, max),
        }
    }
}

fn clamp_interval(duration: Duration) -> Duration {
    if duration < MIN_INTERVAL {
        tracing::warn!(min_interval = ?MIN_INTERVAL, requested = ?duration,
            "Interval duration is less than minimum allowed. Using minimum duration."
        );
        MIN_INTERVAL
    } else {
        duration
    }
}

/// Tick source for one collector.
#[derive(Debug)]
pub struct Scheduler {
    schedule: Schedule,
    cancel: CancellationToken,
    rng: StdRng,
    first: bool,
}

impl Scheduler {
    pub fn new(schedule: Schedule, cancel: CancellationToken) -> Self {
        Self {
            schedule,
            cancel,
            rng: StdRng::from_entropy(),
            first: true,
        }
    }

    /// Use a deterministic RNG for the jitter and random modes.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    /// Wait for the next tick.
    ///
    /// Returns `false` once cancellation has been requested; no tick is
    /// issued after that.
    pub async fn tick(&mut self) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        if self.first {
            self.first = false;
            return true;
        }

        let delay = self.schedule.next_delay(&mut self.rng);
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[test]
    fn test_schedule_fixed_minimum() {
        assert_eq!(
            Schedule::fixed(Duration::from_millis(1)),
            Schedule::Fixed(MIN_INTERVAL)
        );
    }

    #[test]
    fn test_schedule_jittered_zero_is_fixed() {
        assert_eq!(
            Schedule::jittered(Duration::from_secs(1), Duration::ZERO),
            Schedule::Fixed(Duration::from_secs(1))
        );
    }

    #[test]
    fn test_schedule_random_swaps_bounds() {
        let schedule = Schedule::random(Duration::from_secs(3), Duration::from_millis(500));
        assert_eq!(
            schedule,
            Schedule::Random {
                min: Duration::from_millis(500),
                max: Duration::from_secs(3)
            }
        );
    }

    #[test]
    fn test_next_delay_within_bounds() {
        let mut rng = StdRng::seed_from_u64(1);

        let jittered = Schedule::jittered(Duration::from_secs(10), Duration::from_secs(2));
        let random = Schedule::random(Duration::from_millis(500), Duration::from_secs(3));
        for _ in 0..1000 {
            let d = jittered.next_delay(&mut rng);
            assert!(d >= Duration::from_secs(8) && d <= Duration::from_secs(12));
            let d = random.next_delay(&mut rng);
            assert!(d >= Duration::from_millis(500) && d <= Duration::from_secs(3));
        }
    }

    #[test]
    fn test_next_delay_jitter_larger_than_period() {
        let mut rng = StdRng::seed_from_u64(9);
        let schedule = Schedule::jittered(Duration::from_millis(100), Duration::from_secs(1));
        for _ in 0..100 {
            assert!(schedule.next_delay(&mut rng) >= MIN_INTERVAL);
        }
    }

    #[test]
    fn test_schedule_display() {
        assert_eq!(Schedule::fixed(Duration::from_secs(5)).to_string(), "every 5s");
        assert!(
            Schedule::random(Duration::from_millis(500), Duration::from_secs(3))
                .to_string()
                .starts_with("random")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_fixed_cadence() {
        let cancel = CancellationToken::new();
        let mut scheduler = Scheduler::new(Schedule::fixed(Duration::from_secs(5)), cancel);

        let start = Instant::now();
        assert!(scheduler.tick().await);
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert!(scheduler.tick().await);
        assert!(scheduler.tick().await);
        assert_eq!(start.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_stops_on_cancel() {
        let cancel = CancellationToken::new();
        let mut scheduler =
            Scheduler::new(Schedule::fixed(Duration::from_secs(60)), cancel.clone());
        assert!(scheduler.tick().await);

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            canceller.cancel();
        });

        let start = Instant::now();
        assert!(!scheduler.tick().await);
        assert!(start.elapsed() < Duration::from_secs(60));
        assert!(!scheduler.tick().await);
    }

    #[tokio::test]
    async fn test_scheduler_cancelled_before_first_tick() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut scheduler = Scheduler::new(Schedule::fixed(Duration::from_secs(1)), cancel);
        assert!(!scheduler.tick().await);
    }
}
