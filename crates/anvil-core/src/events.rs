//! Periodic host events and the services that publish them.
//!
//! The host runs two publishers:
//!
//! | Service | Args | Cadence | Payload |
//! |---------|------|---------|---------|
//! | [`HelloEventService`] | [`TimerEventArgs`] | 3 s | `"Hello"` |
//! | [`WorldEventService`] | [`WorldEventArgs`] | 5 s | random word |
//!
//! Plugins look the services up in their initializer and subscribe with an
//! [`EventHandler`].  A handler may fail; the publisher logs the failure and
//! keeps delivering to the other subscribers.
//!
//! ```rust,ignore
//! let hello = services.get::<dyn HelloEventService>().unwrap();
//! hello.subscribe_to_timer(handler(|_source, args: &TimerEventArgs| {
//!     info!(text = %args.message(), "tick");
//!     Ok(())
//! }));
//! ```

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Local};

use crate::error::BoxError;

/// Payload carried by every periodic event.
pub trait EventArgs: fmt::Debug + Send + Sync + 'static {
    /// Builds the args for one firing.
    fn from_payload(payload: String, timestamp: DateTime<Local>) -> Self
    where
        Self: Sized;

    /// The generated payload.
    fn payload(&self) -> &str;

    /// When the event fired.
    fn timestamp(&self) -> DateTime<Local>;
}

/// Arguments of a "Hello" timer event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerEventArgs {
    message: String,
    timestamp: DateTime<Local>,
}

impl TimerEventArgs {
    /// Creates timer event args.
    pub fn new(message: impl Into<String>, timestamp: DateTime<Local>) -> Self {
        Self {
            message: message.into(),
            timestamp,
        }
    }

    /// The timer message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl EventArgs for TimerEventArgs {
    fn from_payload(payload: String, timestamp: DateTime<Local>) -> Self {
        Self::new(payload, timestamp)
    }

    fn payload(&self) -> &str {
        &self.message
    }

    fn timestamp(&self) -> DateTime<Local> {
        self.timestamp
    }
}

/// Arguments of a "World" update event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorldEventArgs {
    world_message: String,
    timestamp: DateTime<Local>,
}

impl WorldEventArgs {
    /// Creates world event args.
    pub fn new(world_message: impl Into<String>, timestamp: DateTime<Local>) -> Self {
        Self {
            world_message: world_message.into(),
            timestamp,
        }
    }

    /// The world word picked for this update.
    pub fn world_message(&self) -> &str {
        &self.world_message
    }
}

impl EventArgs for WorldEventArgs {
    fn from_payload(payload: String, timestamp: DateTime<Local>) -> Self {
        Self::new(payload, timestamp)
    }

    fn payload(&self) -> &str {
        &self.world_message
    }

    fn timestamp(&self) -> DateTime<Local> {
        self.timestamp
    }
}

/// Identifies the publisher an event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventSource {
    name: &'static str,
}

impl EventSource {
    /// Creates a source with the given publisher name.
    pub const fn new(name: &'static str) -> Self {
        Self { name }
    }

    /// Publisher name, e.g. `"hello"`.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Display for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Subscriber callback for events carrying `A`.
///
/// Identity is `Arc` pointer identity: keep a clone of the handler to
/// unsubscribe it later.
pub type EventHandler<A> = Arc<dyn Fn(&EventSource, &A) -> Result<(), BoxError> + Send + Sync>;

/// Wraps a closure into an [`EventHandler`].
pub fn handler<A, F>(f: F) -> EventHandler<A>
where
    A: EventArgs,
    F: Fn(&EventSource, &A) -> Result<(), BoxError> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Service publishing the "Hello" timer event.
pub trait HelloEventService: Send + Sync {
    /// Adds `handler` to the subscriber list.  The same handler may be added
    /// more than once; each occurrence fires.
    fn subscribe_to_timer(&self, handler: EventHandler<TimerEventArgs>);

    /// Removes one occurrence of `handler`.  Unknown handlers are ignored.
    fn unsubscribe_from_timer(&self, handler: &EventHandler<TimerEventArgs>);
}

/// Service publishing "World" updates.
pub trait WorldEventService: Send + Sync {
    /// Picks a world word on demand.
    fn get_world_message(&self) -> String;

    /// Adds `handler` to the subscriber list.
    fn subscribe_to_world_updates(&self, handler: EventHandler<WorldEventArgs>);

    /// Removes one occurrence of `handler`.  Unknown handlers are ignored.
    fn unsubscribe_from_world_updates(&self, handler: &EventHandler<WorldEventArgs>);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_expose_payload() {
        let now = Local::now();
        let timer = TimerEventArgs::from_payload("Hello".to_string(), now);
        assert_eq!(timer.message(), "Hello");
        assert_eq!(timer.payload(), "Hello");
        assert_eq!(timer.timestamp(), now);

        let world = WorldEventArgs::from_payload("Cosmos".to_string(), now);
        assert_eq!(world.world_message(), "Cosmos");
        assert_eq!(world.payload(), "Cosmos");
    }

    #[test]
    fn test_handler_identity() {
        let a = handler(|_: &EventSource, _: &TimerEventArgs| Ok(()));
        let b = a.clone();
        let c = handler(|_: &EventSource, _: &TimerEventArgs| Ok(()));
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }
}
