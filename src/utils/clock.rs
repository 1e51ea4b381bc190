use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::time::Instant;

/// Source of time for the timer. Wall clock time is what ends up in committed intervals, the
/// instant is only used to schedule ticks. Tests swap it for [TestClock].
#[async_trait]
pub trait Clock: Sync + Send + 'static {
    fn time(&self) -> DateTime<Utc>;

    fn instant(&self) -> Instant;

    async fn sleep_until(&self, instant: tokio::time::Instant);
}

pub struct DefaultClock;

#[async_trait]
impl Clock for DefaultClock {
    fn time(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn instant(&self) -> Instant {
        Instant::now()
    }

    async fn sleep_until(&self, instant: tokio::time::Instant) {
        tokio::time::sleep_until(instant).await;
    }
}

/// Wall clock that follows tokio's clock, so `start_paused` tests move both together.
#[cfg(test)]
#[derive(Clone)]
pub struct TestClock {
    start_time: DateTime<Utc>,
    reference: Instant,
}

#[cfg(test)]
impl TestClock {
    pub fn new() -> Self {
        use chrono::TimeZone;

        Self {
            start_time: Utc.with_ymd_and_hms(2018, 7, 4, 9, 0, 0).unwrap(),
            reference: Instant::now(),
        }
    }
}

#[cfg(test)]
#[async_trait]
impl Clock for TestClock {
    fn time(&self) -> DateTime<Utc> {
        self.start_time + self.reference.elapsed()
    }

    fn instant(&self) -> Instant {
        Instant::now()
    }

    async fn sleep_until(&self, instant: tokio::time::Instant) {
        tokio::time::sleep_until(instant).await;
    }
}
