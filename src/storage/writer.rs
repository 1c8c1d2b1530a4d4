use crate::storage::StorageResult;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;

type Sink<T> = Box<dyn Fn(T) -> StorageResult<()> + Send + Sync>;

/// Coalescing single-flight background writer
///
/// `submit` stores a value as the latest pending one and starts a worker on
/// the blocking pool only if none is running. The worker keeps taking the
/// latest pending value until nothing is left, so at most one write is in
/// flight and any value superseded before its turn is dropped. Write errors
/// are logged and swallowed.
pub struct CoalescingWriter<T> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    name: &'static str,
    slot: Mutex<Slot<T>>,
    idle: Notify,
    writes: AtomicU64,
    sink: Sink<T>,
}

struct Slot<T> {
    pending: Option<T>,
    active: bool,
}

impl<T: Send + 'static> CoalescingWriter<T> {
    /// Creates a writer feeding every accepted value to `sink`
    pub fn new<F>(name: &'static str, sink: F) -> Self
    where
        F: Fn(T) -> StorageResult<()> + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(Inner {
                name,
                slot: Mutex::new(Slot {
                    pending: None,
                    active: false,
                }),
                idle: Notify::new(),
                writes: AtomicU64::new(0),
                sink: Box::new(sink),
            }),
        }
    }

    /// Queues `value`, replacing any value still waiting
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit(&self, value: T) {
        let start_worker = {
            let mut slot = self.inner.lock_slot();
            if slot.pending.replace(value).is_some() {
                tracing::trace!("{}: superseded a pending write", self.inner.name);
            }
            !std::mem::replace(&mut slot.active, true)
        };

        if start_worker {
            let inner = Arc::clone(&self.inner);
            tokio::task::spawn_blocking(move || inner.drain());
        }
    }

    /// Waits until no write is pending or running
    pub async fn flush(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if !self.inner.lock_slot().active {
                return;
            }
            notified.await;
        }
    }

    /// Number of writes performed so far
    pub fn writes(&self) -> u64 {
        self.inner.writes.load(Ordering::Relaxed)
    }
}

impl<T> Inner<T> {
    fn lock_slot(&self) -> MutexGuard<'_, Slot<T>> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn drain(&self) {
        loop {
            let next = {
                let mut slot = self.lock_slot();
                match slot.pending.take() {
                    Some(value) => value,
                    None => {
                        slot.active = false;
                        break;
                    }
                }
            };

            if let Err(e) = (self.sink)(next) {
                tracing::warn!("{}: background write failed: {}", self.name, e);
            }
            self.writes.fetch_add(1, Ordering::Relaxed);
        }
        self.idle.notify_waiters();
    }
}

impl<T> Clone for CoalescingWriter<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}
