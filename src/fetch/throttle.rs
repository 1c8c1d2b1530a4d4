use crate::fetch::{FetchResult, StopSignal};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Process-wide request pacing
///
/// Spacing is measured between request *starts*. A caller arriving early
/// waits out the remainder while holding the lock, so concurrent callers
/// are released one interval apart no matter how many there are.
#[derive(Debug)]
pub struct Throttle {
    min_interval: Duration,
    last_start: Mutex<Option<Instant>>,
}

impl Throttle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_start: Mutex::new(None),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Waits for the next request slot and claims it
    ///
    /// Fails with `Interrupted` if a stop is requested while waiting; the
    /// slot is not claimed in that case.
    pub async fn acquire(&self, stop: &StopSignal) -> FetchResult<()> {
        let mut last_start = self.last_start.lock().await;

        if let Some(previous) = *last_start {
            let ready_at = previous + self.min_interval;
            let now = Instant::now();
            if ready_at > now {
                stop.sleep(ready_at - now).await?;
            }
        }

        *last_start = Some(Instant::now());
        Ok(())
    }
}
