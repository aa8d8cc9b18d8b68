//! Jittered exponential backoff
//!
//! The n-th delay (n starting at 0) is `min(initial * 2^n, ceiling) * jitter`
//! with `jitter` drawn uniformly from `[0.9, 1.1)` on every call. Each retry
//! chain owns its own `Backoff`, so concurrent operations never share
//! exponent state.

use std::time::Duration;

use rand::Rng;

/// Lower bound of the jitter factor (inclusive)
pub const JITTER_MIN: f64 = 0.9;
/// Upper bound of the jitter factor (exclusive)
pub const JITTER_MAX: f64 = 1.1;

/// Delay for a given attempt index with an explicit jitter factor
///
/// `2^attempt` saturates, so very large indexes stay at the ceiling. A zero
/// floor stays zero, and results past `Duration::MAX` clamp to it.
pub fn delay_for_attempt(
    initial: Duration,
    ceiling: Duration,
    attempt: u32,
    jitter: f64,
) -> Duration {
    if initial.is_zero() {
        return initial;
    }
    let exponent = attempt.min(i32::MAX as u32) as i32;
    let raw = initial.as_secs_f64() * 2f64.powi(exponent);
    let capped = raw.min(ceiling.as_secs_f64());
    Duration::try_from_secs_f64((capped * jitter).max(0.0)).unwrap_or(Duration::MAX)
}

/// Draw a jitter factor from `[JITTER_MIN, JITTER_MAX)`
pub fn jitter() -> f64 {
    rand::thread_rng().gen_range(JITTER_MIN..JITTER_MAX)
}

/// Stateful backoff sequence
///
/// Also an infinite iterator: `next()` never returns `None`.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    ceiling: Duration,
    attempt: u32,
}

impl Backoff {
    /// Create a sequence starting at `initial` and capped at `ceiling`
    pub fn new(initial: Duration, ceiling: Duration) -> Self {
        Self {
            initial,
            ceiling,
            attempt: 0,
        }
    }

    /// Next delay in the sequence
    pub fn next_delay(&mut self) -> Duration {
        let delay = delay_for_attempt(self.initial, self.ceiling, self.attempt, jitter());
        self.attempt = self.attempt.saturating_add(1);
        delay
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        Some(self.next_delay())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn test_delay_without_jitter_doubles_until_ceiling() {
        let delays: Vec<Duration> = (0..8)
            .map(|n| delay_for_attempt(ms(250), ms(10_000), n, 1.0))
            .collect();

        assert_eq!(
            delays,
            vec![
                ms(250),
                ms(500),
                ms(1_000),
                ms(2_000),
                ms(4_000),
                ms(8_000),
                ms(10_000),
                ms(10_000)
            ]
        );
    }

    #[test]
    fn test_delays_stay_within_jitter_bounds() {
        let mut backoff = Backoff::new(ms(250), ms(10_000));

        for n in 0..40u32 {
            let base = (250.0 * 2f64.powi(n as i32)).min(10_000.0);
            let delay = backoff.next_delay().as_secs_f64() * 1_000.0;
            assert!(delay >= base * JITTER_MIN - 1e-6, "attempt {n}: {delay} < {base}*0.9");
            assert!(delay <= base * JITTER_MAX + 1e-6, "attempt {n}: {delay} > {base}*1.1");
        }
    }

    #[test]
    fn test_never_exceeds_jittered_ceiling() {
        let ceiling = ms(10_000);
        for n in [0, 10, 63, 64, 1_000, u32::MAX] {
            let delay = delay_for_attempt(ms(250), ceiling, n, jitter());
            assert!(delay <= ceiling.mul_f64(JITTER_MAX));
        }
    }

    #[test]
    fn test_iterator_is_infinite() {
        let backoff = Backoff::new(ms(1), ms(5));
        assert_eq!(backoff.take(1_000).count(), 1_000);
    }

    #[test]
    fn test_instances_do_not_share_state() {
        let mut first = Backoff::new(ms(250), ms(10_000));
        first.next_delay();
        first.next_delay();

        let mut second = Backoff::new(ms(250), ms(10_000));
        assert!(first.next_delay() >= ms(900));
        assert!(second.next_delay() <= ms(275));
    }

    #[test]
    fn test_huge_delays_clamp_instead_of_panicking() {
        let mut backoff = Backoff::new(Duration::MAX, Duration::MAX);
        let delay = backoff.next_delay();
        assert!(delay.as_secs_f64() >= Duration::MAX.as_secs_f64() * (JITTER_MIN - 0.01));
        assert_eq!(
            delay_for_attempt(Duration::MAX, Duration::MAX, u32::MAX, JITTER_MAX),
            Duration::MAX
        );
    }

    #[test]
    fn test_zero_floor_stays_zero() {
        for n in [0, 10, 1_024, 2_000, u32::MAX] {
            assert_eq!(delay_for_attempt(Duration::ZERO, ms(10_000), n, 1.0), Duration::ZERO);
        }
    }

    #[test]
    fn test_jitter_range() {
        for _ in 0..1_000 {
            let j = jitter();
            assert!((JITTER_MIN..JITTER_MAX).contains(&j));
        }
    }
}
