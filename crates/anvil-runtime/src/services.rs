//! The two event services the host registers for plugins.
//!
//! | Service | Publisher name | Default interval | Payload |
//! |---------|----------------|------------------|---------|
//! | [`HelloEvents`] | `hello` | 3 s | `"Hello"` |
//! | [`WorldEvents`] | `world` | 5 s | random pick from [`WORLD_MESSAGES`] |

use std::sync::Arc;
use std::time::Duration;

use anvil_core::{
    EventHandler, HelloEventService, TimerEventArgs, WorldEventArgs, WorldEventService,
};
use rand::seq::SliceRandom;
use tracing::{debug, info};

use crate::error::RuntimeResult;
use crate::publisher::EventPublisher;

/// Payload of every Hello timer event.
pub const HELLO_MESSAGE: &str = "Hello";

/// Vocabulary of World updates.
pub const WORLD_MESSAGES: [&str; 7] = [
    "World", "Universe", "Galaxy", "Planet", "Earth", "Globe", "Cosmos",
];

pub const DEFAULT_HELLO_INTERVAL: Duration = Duration::from_secs(3);
pub const DEFAULT_WORLD_INTERVAL: Duration = Duration::from_secs(5);

/// Picks a word from [`WORLD_MESSAGES`] uniformly at random.
pub fn random_world_message() -> String {
    WORLD_MESSAGES
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(WORLD_MESSAGES[0])
        .to_string()
}

// =============================================================================
// HelloEvents
// =============================================================================

/// Publishes `"Hello"` on a fixed interval.
pub struct HelloEvents {
    publisher: Arc<EventPublisher<TimerEventArgs>>,
}

impl HelloEvents {
    /// Creates the service without starting its timer.
    pub fn new(interval: Duration) -> Self {
        info!(interval_ms = interval.as_millis() as u64, "Hello event service created");
        Self {
            publisher: EventPublisher::new("hello", interval, || HELLO_MESSAGE.to_string()),
        }
    }

    /// Creates the service and starts its timer.
    pub fn spawn(interval: Duration) -> RuntimeResult<Self> {
        let service = Self::new(interval);
        service.publisher.start()?;
        Ok(service)
    }

    /// The underlying publisher.
    pub fn publisher(&self) -> &Arc<EventPublisher<TimerEventArgs>> {
        &self.publisher
    }

    /// Stops the timer and releases all subscribers.
    pub fn stop(&self) {
        self.publisher.stop();
    }
}

impl Default for HelloEvents {
    fn default() -> Self {
        Self::new(DEFAULT_HELLO_INTERVAL)
    }
}

impl HelloEventService for HelloEvents {
    fn subscribe_to_timer(&self, handler: EventHandler<TimerEventArgs>) {
        self.publisher.subscribe(handler);
        info!(
            subscribers = self.publisher.subscriber_count(),
            "Subscribed to Hello timer events"
        );
    }

    fn unsubscribe_from_timer(&self, handler: &EventHandler<TimerEventArgs>) {
        if self.publisher.unsubscribe(handler) {
            info!("Unsubscribed from Hello timer events");
        } else {
            debug!("Unsubscribe from Hello timer ignored: handler not subscribed");
        }
    }
}

// =============================================================================
// WorldEvents
// =============================================================================

/// Publishes a random world word on a fixed interval.
pub struct WorldEvents {
    publisher: Arc<EventPublisher<WorldEventArgs>>,
}

impl WorldEvents {
    /// Creates the service without starting its timer.
    pub fn new(interval: Duration) -> Self {
        info!(interval_ms = interval.as_millis() as u64, "World event service created");
        Self {
            publisher: EventPublisher::new("world", interval, random_world_message),
        }
    }

    /// Creates the service and starts its timer.
    pub fn spawn(interval: Duration) -> RuntimeResult<Self> {
        let service = Self::new(interval);
        service.publisher.start()?;
        Ok(service)
    }

    /// The underlying publisher.
    pub fn publisher(&self) -> &Arc<EventPublisher<WorldEventArgs>> {
        &self.publisher
    }

    /// Stops the timer and releases all subscribers.
    pub fn stop(&self) {
        self.publisher.stop();
    }
}

impl Default for WorldEvents {
    fn default() -> Self {
        Self::new(DEFAULT_WORLD_INTERVAL)
    }
}

impl WorldEventService for WorldEvents {
    fn get_world_message(&self) -> String {
        random_world_message()
    }

    fn subscribe_to_world_updates(&self, handler: EventHandler<WorldEventArgs>) {
        self.publisher.subscribe(handler);
        info!(
            subscribers = self.publisher.subscriber_count(),
            "Subscribed to World update events"
        );
    }

    fn unsubscribe_from_world_updates(&self, handler: &EventHandler<WorldEventArgs>) {
        if self.publisher.unsubscribe(handler) {
            info!("Unsubscribed from World update events");
        } else {
            debug!("Unsubscribe from World updates ignored: handler not subscribed");
        }
    }
}
