//! Periodic event publisher.
//!
//! One generic [`EventPublisher`] drives both host events: it owns a tokio
//! interval, generates a fresh payload on every tick and fans it out to its
//! subscribers.
//!
//! # Dispatch
//!
//! The subscriber list is copied under the lock and the lock is released before
//! any handler runs, so handlers may subscribe or unsubscribe re-entrantly.
//! Each handler call is wrapped in `catch_unwind`; an `Err` or a panic is
//! logged and delivery continues with the next subscriber.
//!
//! # Lifecycle
//!
//! ```text
//! Created ──start()──▶ Running ──stop()──▶ Stopped
//!    └──────────────────stop()─────────────────┘
//! ```
//!
//! `stop()` is terminal and idempotent.  It cancels the timer, waits for a
//! dispatch running on another thread to finish (including dropping its
//! snapshot), and drops every subscriber handle.  Once it returns, no
//! subscriber code runs on behalf of this publisher again, so the modules
//! that provided the handlers can be unloaded.  Calling `stop()` from inside
//! a subscriber deadlocks.
//!
//! The tick task only holds a `Weak` reference, so dropping the last `Arc`
//! ends it as well.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use anvil_core::{EventArgs, EventHandler, EventSource};
use chrono::Local;
use parking_lot::{Mutex, RwLock};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::error::{RuntimeError, RuntimeResult, panic_message};

type PayloadFn = Box<dyn Fn() -> String + Send + Sync>;

/// Lifecycle state of a publisher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublisherState {
    Created,
    Running,
    Stopped,
}

/// Outcome of one dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Handlers that returned `Ok`.
    pub delivered: usize,
    /// Handlers that returned `Err` or panicked.
    pub failed: usize,
}

/// A recurring timer fanning generated events out to subscribers.
pub struct EventPublisher<A: EventArgs> {
    source: EventSource,
    interval: Duration,
    payload: PayloadFn,
    subscribers: Mutex<Vec<EventHandler<A>>>,
    state: Mutex<PublisherState>,
    /// Held shared by every dispatch, exclusively by `stop`.
    dispatching: RwLock<()>,
    cancel: CancellationToken,
    ticks: AtomicU64,
}

impl<A: EventArgs> EventPublisher<A> {
    /// Creates a publisher in the `Created` state.
    ///
    /// `payload` is called once per tick to produce the event payload.
    pub fn new<F>(name: &'static str, interval: Duration, payload: F) -> Arc<Self>
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        Arc::new(Self {
            source: EventSource::new(name),
            interval,
            payload: Box::new(payload),
            subscribers: Mutex::new(Vec::new()),
            state: Mutex::new(PublisherState::Created),
            dispatching: RwLock::new(()),
            cancel: CancellationToken::new(),
            ticks: AtomicU64::new(0),
        })
    }

    /// Creates and starts a publisher; the first tick fires immediately.
    pub fn spawn<F>(name: &'static str, interval: Duration, payload: F) -> RuntimeResult<Arc<Self>>
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        let publisher = Self::new(name, interval, payload);
        publisher.start()?;
        Ok(publisher)
    }

    /// Starts ticking on the current tokio runtime.
    ///
    /// Starting a running publisher does nothing; a stopped one cannot be
    /// restarted.
    pub fn start(self: &Arc<Self>) -> RuntimeResult<()> {
        let handle = Handle::try_current().map_err(|_| RuntimeError::NoAsyncRuntime {
            publisher: self.source.name(),
        })?;

        {
            let mut state = self.state.lock();
            match *state {
                PublisherState::Created => *state = PublisherState::Running,
                PublisherState::Running => return Ok(()),
                PublisherState::Stopped => {
                    warn!(publisher = %self.source, "Publisher is stopped and cannot be restarted");
                    return Ok(());
                }
            }
        }

        let weak = Arc::downgrade(self);
        let token = self.cancel.clone();
        let period = self.interval.max(Duration::from_millis(1));
        handle.spawn(tick_loop(weak, token, period));

        info!(
            publisher = %self.source,
            interval_ms = period.as_millis() as u64,
            "Event publisher started"
        );
        Ok(())
    }

    /// Stops the timer and releases every subscriber.
    pub fn stop(&self) {
        {
            let mut state = self.state.lock();
            if *state == PublisherState::Stopped {
                return;
            }
            *state = PublisherState::Stopped;
        }

        self.cancel.cancel();
        let released = {
            let _idle = self.dispatching.write();
            std::mem::take(&mut *self.subscribers.lock())
        };
        info!(
            publisher = %self.source,
            subscribers = released.len(),
            ticks = self.ticks(),
            "Event publisher stopped"
        );
    }

    /// Appends a subscriber.  Duplicates are allowed and fire once each.
    pub fn subscribe(&self, handler: EventHandler<A>) {
        // Checked under the list lock so a racing `stop` cannot miss it.
        let mut subscribers = self.subscribers.lock();
        if self.state() == PublisherState::Stopped {
            warn!(publisher = %self.source, "Ignoring subscription to a stopped publisher");
            return;
        }
        subscribers.push(handler);
        debug!(
            publisher = %self.source,
            subscribers = subscribers.len(),
            "Subscriber added"
        );
    }

    /// Removes the first occurrence of `handler`.
    ///
    /// Returns `false` when the handler was not subscribed.
    pub fn unsubscribe(&self, handler: &EventHandler<A>) -> bool {
        let mut subscribers = self.subscribers.lock();
        match subscribers.iter().position(|h| Arc::ptr_eq(h, handler)) {
            Some(index) => {
                subscribers.remove(index);
                debug!(
                    publisher = %self.source,
                    subscribers = subscribers.len(),
                    "Subscriber removed"
                );
                true
            }
            None => false,
        }
    }

    /// Generates a payload and dispatches it; this is what each tick does.
    pub fn publish(&self) -> DispatchSummary {
        let args = A::from_payload((self.payload)(), Local::now());
        self.ticks.fetch_add(1, Ordering::Relaxed);
        self.dispatch(&args)
    }

    /// Delivers `args` to a snapshot of the current subscribers, in order.
    pub fn dispatch(&self, args: &A) -> DispatchSummary {
        // Recursive so a subscriber may publish again while `stop` waits.
        let _running = self.dispatching.read_recursive();
        let snapshot = self.subscribers.lock().clone();
        let mut summary = DispatchSummary::default();

        for (index, handler) in snapshot.iter().enumerate() {
            let reason = match catch_unwind(AssertUnwindSafe(|| handler(&self.source, args))) {
                Ok(Ok(())) => {
                    summary.delivered += 1;
                    continue;
                }
                Ok(Err(e)) => e.to_string(),
                Err(payload) => format!("panicked: {}", panic_message(payload)),
            };

            summary.failed += 1;
            let err = RuntimeError::SubscriberDispatch {
                publisher: self.source.name(),
                index,
                reason,
            };
            error!(publisher = %self.source, index, error = %err, "Subscriber failed to handle event");
        }

        trace!(
            publisher = %self.source,
            payload = args.payload(),
            delivered = summary.delivered,
            failed = summary.failed,
            "Event dispatched"
        );
        summary
    }

    /// Identity passed to handlers as the event source.
    pub fn source(&self) -> EventSource {
        self.source
    }

    /// Configured tick interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Current lifecycle state.
    pub fn state(&self) -> PublisherState {
        *self.state.lock()
    }

    /// Number of subscribers, counting duplicates.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Number of payloads generated so far.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }
}

impl<A: EventArgs> Drop for EventPublisher<A> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn tick_loop<A: EventArgs>(
    publisher: Weak<EventPublisher<A>>,
    cancel: CancellationToken,
    period: Duration,
) {
    let mut ticker = tokio::time::interval(period);
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let Some(publisher) = publisher.upgrade() else {
                    break;
                };
                publisher.publish();
            }
        }
    }
}
