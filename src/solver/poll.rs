//! Decode polling schedule.

use std::time::Duration;

/// Wait intervals used while polling an uploaded job: the steps are consumed
/// in order, then the fallback interval repeats indefinitely.
#[derive(Debug, Clone)]
pub struct PollSchedule {
    steps: Vec<Duration>,
    fallback: Duration,
}

/// The vendor-recommended cadence: quick early polls, settling at 3s.
const DEFAULT_STEPS: [u64; 9] = [1, 1, 2, 3, 2, 2, 3, 2, 2];
const DEFAULT_FALLBACK_SECS: u64 = 3;

impl Default for PollSchedule {
    fn default() -> Self {
        Self {
            steps: DEFAULT_STEPS.iter().copied().map(Duration::from_secs).collect(),
            fallback: Duration::from_secs(DEFAULT_FALLBACK_SECS),
        }
    }
}

impl PollSchedule {
    pub fn new(steps: Vec<Duration>, fallback: Duration) -> Self {
        Self { steps, fallback }
    }

    /// Wait duration before poll `n` (0-indexed).
    pub fn interval(&self, n: usize) -> Duration {
        self.steps.get(n).copied().unwrap_or(self.fallback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_range_intervals_follow_the_steps() {
        let schedule = PollSchedule::default();
        for (n, secs) in DEFAULT_STEPS.iter().enumerate() {
            assert_eq!(schedule.interval(n), Duration::from_secs(*secs));
        }
    }

    #[test]
    fn out_of_range_intervals_use_the_fallback() {
        let schedule = PollSchedule::default();
        for n in DEFAULT_STEPS.len()..DEFAULT_STEPS.len() + 20 {
            assert_eq!(schedule.interval(n), Duration::from_secs(DEFAULT_FALLBACK_SECS));
        }
    }

    #[test]
    fn custom_schedules_keep_their_fallback() {
        let schedule = PollSchedule::new(vec![Duration::from_millis(10)], Duration::from_millis(50));
        assert_eq!(schedule.interval(0), Duration::from_millis(10));
        assert_eq!(schedule.interval(1), Duration::from_millis(50));
        assert_eq!(schedule.interval(99), Duration::from_millis(50));
    }
}
