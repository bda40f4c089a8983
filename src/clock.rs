use embassy_time::{Duration, Instant};

/// Monotonic time source. Every wait in the sampling loop goes through this
/// trait so cycles, timeouts and backoff can be driven by a fake clock.
pub trait Clock {
    fn now(&self) -> Instant;

    async fn sleep_until(&self, deadline: Instant);

    async fn sleep(&self, duration: Duration) {
        let deadline = self.now() + duration;
        self.sleep_until(deadline).await
    }
}

/// Clock backed by the embassy time driver.
#[cfg(feature = "firmware")]
#[derive(Clone, Copy, Default)]
pub struct EmbassyClock;

#[cfg(feature = "firmware")]
impl Clock for EmbassyClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep_until(&self, deadline: Instant) {
        embassy_time::Timer::at(deadline).await
    }
}

/// Maps monotonic instants to Unix time, anchored by an SNTP sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WallClock {
    anchor: Instant,
    unix_secs: u64,
}

impl WallClock {
    pub fn new(anchor: Instant, unix_secs: u64) -> Self {
        Self { anchor, unix_secs }
    }

    /// Unix seconds at `at`. Instants before the anchor are counted backwards.
    pub fn unix_at(&self, at: Instant) -> u64 {
        if at >= self.anchor {
            self.unix_secs + (at - self.anchor).as_secs()
        } else {
            self.unix_secs.saturating_sub((self.anchor - at).as_secs())
        }
    }
}

/// When a reading was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
    pub monotonic: Instant,
    /// Seconds since the Unix epoch, absent until the wall clock is synced
    pub unix_secs: Option<u64>,
}

impl Timestamp {
    pub fn at(monotonic: Instant, wall_clock: Option<&WallClock>) -> Self {
        Self {
            monotonic,
            unix_secs: wall_clock.map(|w| w.unix_at(monotonic)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wall_clock_follows_monotonic_time() {
        let wall = WallClock::new(Instant::from_secs(100), 1_700_000_000);

        assert_eq!(wall.unix_at(Instant::from_secs(100)), 1_700_000_000);
        assert_eq!(wall.unix_at(Instant::from_secs(130)), 1_700_000_030);
        assert_eq!(wall.unix_at(Instant::from_secs(40)), 1_699_999_940);
    }

    #[test]
    fn timestamp_without_wall_clock_has_no_unix_time() {
        let ts = Timestamp::at(Instant::from_secs(5), None);
        assert_eq!(ts.unix_secs, None);
        assert_eq!(ts.monotonic, Instant::from_secs(5));
    }
}
