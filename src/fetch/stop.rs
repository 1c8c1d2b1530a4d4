use crate::fetch::{FetchError, FetchResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Cooperative stop flag shared by the coordinator, the HTTP adapter and
/// signal handlers
///
/// Requesting a stop never aborts a request in flight. It prevents the next
/// unit of work from starting and cuts short any throttle or retry wait.
#[derive(Debug, Clone)]
pub struct StopSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl StopSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Asks every holder of this signal to stop at the next checkpoint
    pub fn request_stop(&self) {
        self.tx.send_replace(true);
    }

    /// Clears a previous stop request so a new run can start
    pub fn reset(&self) {
        self.tx.send_replace(false);
    }

    pub fn is_requested(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once a stop has been requested
    pub async fn stopped(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in self, so the channel cannot close here
        let _ = rx.wait_for(|requested| *requested).await;
    }

    /// Sleeps for `duration` unless a stop is requested first
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The full duration elapsed
    /// * `Err(FetchError::Interrupted)` - A stop was requested
    pub async fn sleep(&self, duration: Duration) -> FetchResult<()> {
        if self.is_requested() {
            return Err(FetchError::Interrupted);
        }
        if duration.is_zero() {
            return Ok(());
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => Ok(()),
            _ = self.stopped() => Err(FetchError::Interrupted),
        }
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}
