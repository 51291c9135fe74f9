//! # Message Processing Strategies
//!
//! A processing strategy decides when the dispatcher may fetch and start more
//! work. The dispatcher asks it to wait for capacity before every receive and
//! hands it one unit of work per received message.
//!
//! [`Throttled`] is the standard strategy: it caps the number of handler
//! invocations running at once and pauses fetching while the gate is full.

use crate::monitoring::MessageMonitor;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::debug;

#[cfg(test)]
#[path = "processing_tests.rs"]
mod tests;

/// Admission control for handler invocations.
#[async_trait]
pub trait MessageProcessingStrategy: Send + Sync {
    /// Suspend until a worker is available.
    ///
    /// Returns `false` if `cancel` fired before capacity became available.
    async fn wait_for_available_workers(&self, cancel: &CancellationToken) -> bool;

    /// Number of additional units of work that may start right now
    fn available_workers(&self) -> usize;

    /// Start one unit of work in the background
    fn start_worker(&self, work: BoxFuture<'static, ()>);

    /// Stop accepting work and wait for everything started to finish
    async fn drain(&self);
}

/// Upper bound on concurrently running handlers.
#[derive(Clone)]
pub enum MaxInFlight {
    Fixed(usize),
    /// Re-evaluated on every admission check
    Dynamic(Arc<dyn Fn() -> usize + Send + Sync>),
}

impl MaxInFlight {
    pub fn current(&self) -> usize {
        match self {
            Self::Fixed(max) => *max,
            Self::Dynamic(f) => f(),
        }
    }
}

impl fmt::Debug for MaxInFlight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(max) => f.debug_tuple("Fixed").field(max).finish(),
            Self::Dynamic(_) => f.write_str("Dynamic"),
        }
    }
}

/// In-flight count at which fetching pauses.
///
/// Leaves room for a full batch below the maximum, but never drops below one
/// so that a misconfigured maximum still makes progress.
pub fn blocking_threshold(max_in_flight: usize, max_batch_size: usize) -> usize {
    max_in_flight.saturating_sub(max_batch_size).max(1)
}

/// Concurrency gate keyed on the number of in-flight handler invocations.
///
/// # Examples
///
/// ```rust
/// use queue_dispatch::monitoring::NoOpMessageMonitor;
/// use queue_dispatch::processing::{MessageProcessingStrategy, Throttled};
/// use std::sync::Arc;
///
/// let gate = Throttled::new(20, 10, Arc::new(NoOpMessageMonitor));
/// assert_eq!(gate.blocking_threshold(), 10);
/// assert_eq!(gate.available_workers(), 20);
/// ```
pub struct Throttled {
    max_in_flight: MaxInFlight,
    max_batch_size: usize,
    in_flight: Arc<AtomicUsize>,
    completed: Arc<Notify>,
    tasks: TaskTracker,
    monitor: Arc<dyn MessageMonitor>,
}

impl Throttled {
    /// Gate with a fixed maximum
    pub fn new(
        max_in_flight: usize,
        max_batch_size: usize,
        monitor: Arc<dyn MessageMonitor>,
    ) -> Self {
        Self::with_max_in_flight(MaxInFlight::Fixed(max_in_flight), max_batch_size, monitor)
    }

    /// Gate whose maximum is read from `max_in_flight` on every check
    pub fn dynamic<F>(
        max_in_flight: F,
        max_batch_size: usize,
        monitor: Arc<dyn MessageMonitor>,
    ) -> Self
    where
        F: Fn() -> usize + Send + Sync + 'static,
    {
        Self::with_max_in_flight(
            MaxInFlight::Dynamic(Arc::new(max_in_flight)),
            max_batch_size,
            monitor,
        )
    }

    pub fn with_max_in_flight(
        max_in_flight: MaxInFlight,
        max_batch_size: usize,
        monitor: Arc<dyn MessageMonitor>,
    ) -> Self {
        Self {
            max_in_flight,
            max_batch_size,
            in_flight: Arc::new(AtomicUsize::new(0)),
            completed: Arc::new(Notify::new()),
            tasks: TaskTracker::new(),
            monitor,
        }
    }

    /// Current blocking threshold
    pub fn blocking_threshold(&self) -> usize {
        blocking_threshold(self.max_in_flight.current(), self.max_batch_size)
    }

    /// Handler invocations currently running
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageProcessingStrategy for Throttled {
    async fn wait_for_available_workers(&self, cancel: &CancellationToken) -> bool {
        let mut stalled_at: Option<Instant> = None;

        let available = loop {
            // Register for completions before checking so none are missed
            let notified = self.completed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let in_flight = self.in_flight();
            let threshold = self.blocking_threshold();
            if in_flight < threshold {
                break true;
            }

            if stalled_at.is_none() {
                debug!(
                    in_flight,
                    threshold,
                    "Concurrency limit reached; pausing fetch"
                );
                self.monitor.increment_throttling_statistic();
                stalled_at = Some(Instant::now());
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = cancel.cancelled() => break false,
            }
        };

        if let Some(started) = stalled_at {
            self.monitor.handle_throttling_time(started.elapsed());
        }
        available
    }

    fn available_workers(&self) -> usize {
        let max_in_flight = self.max_in_flight.current();
        max_in_flight.saturating_sub(self.in_flight())
    }

    fn start_worker(&self, work: BoxFuture<'static, ()>) {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let guard = InFlightGuard {
            in_flight: Arc::clone(&self.in_flight),
            completed: Arc::clone(&self.completed),
        };

        self.tasks.spawn(async move {
            let _guard = guard;
            work.await;
        });
    }

    async fn drain(&self) {
        self.tasks.close();
        self.tasks.wait().await;
    }
}

impl fmt::Debug for Throttled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Throttled")
            .field("max_in_flight", &self.max_in_flight)
            .field("max_batch_size", &self.max_batch_size)
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

/// Releases one in-flight slot when the work finishes, panics or is aborted
struct InFlightGuard {
    in_flight: Arc<AtomicUsize>,
    completed: Arc<Notify>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.completed.notify_waiters();
    }
}
