//! Bounded fan-out
//!
//! Deliveries run as independent tasks so a slow subscriber cannot hold up
//! the others or the publisher, but the number of deliveries in flight at
//! once is capped process-wide by a semaphore.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::trace;

use crate::protocol::Message;
use crate::session::Session;

/// Default cap on concurrent deliveries
pub const DEFAULT_MAX_INFLIGHT: usize = 1024;

/// Dispatches deliveries with a bounded number in flight
#[derive(Clone)]
pub struct FanoutPool {
    permits: Arc<Semaphore>,
    max_inflight: usize,
}

impl FanoutPool {
    /// `max_inflight == 0` means unbounded.
    pub fn new(max_inflight: usize) -> Self {
        let max_inflight = if max_inflight == 0 {
            Semaphore::MAX_PERMITS
        } else {
            max_inflight
        };
        Self {
            permits: Arc::new(Semaphore::new(max_inflight)),
            max_inflight,
        }
    }

    pub fn max_inflight(&self) -> usize {
        self.max_inflight
    }

    /// Deliveries currently holding a permit
    pub fn in_flight(&self) -> usize {
        self.max_inflight - self.permits.available_permits()
    }

    /// Hand `message` to every target without waiting for any write.
    ///
    /// One dispatcher task walks the targets and starts each delivery once a
    /// permit is free; the permit is released when that delivery finishes.
    pub fn dispatch(&self, topic: Arc<str>, message: Arc<Message>, targets: Vec<Arc<Session>>) {
        if targets.is_empty() {
            return;
        }
        let permits = self.permits.clone();

        tokio::spawn(async move {
            for target in targets {
                let permit = match permits.clone().acquire_owned().await {
                    Ok(permit) => permit,
                    // Semaphore is never closed
                    Err(_) => return,
                };
                let topic = topic.clone();
                let message = message.clone();
                tokio::spawn(async move {
                    trace!("Delivering on {:?} to {}", topic, target.id());
                    target.send(&topic, &message).await;
                    drop(permit);
                });
            }
        });
    }
}

impl Default for FanoutPool {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_INFLIGHT)
    }
}
