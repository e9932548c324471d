//! A single topic: its subscriber and publisher sets and the fan-out of
//! published messages.

use std::sync::{Arc, Weak};
use std::time::SystemTime;

use ahash::AHashMap;
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::fanout::FanoutPool;
use super::TopicStatus;
use crate::metrics::Metrics;
use crate::protocol::{Message, Outbound};
use crate::replay::ReplayBuffer;
use crate::session::{Session, SessionId};

/// Member sets of a topic, guarded by the topic's lock
struct Members {
    subscribers: AHashMap<SessionId, Weak<Session>>,
    publishers: AHashMap<SessionId, Weak<Session>>,
    updated_at: SystemTime,
}

/// A named channel. Created lazily by its hub and never removed.
pub struct Topic {
    name: Arc<str>,
    created_at: SystemTime,
    members: Mutex<Members>,
    replay: Arc<ReplayBuffer>,
    fanout: FanoutPool,
    metrics: Option<Arc<Metrics>>,
}

impl Topic {
    pub(crate) fn new(
        name: Arc<str>,
        replay: Arc<ReplayBuffer>,
        fanout: FanoutPool,
        metrics: Option<Arc<Metrics>>,
    ) -> Self {
        let now = SystemTime::now();
        Self {
            name,
            created_at: now,
            members: Mutex::new(Members {
                subscribers: AHashMap::new(),
                publishers: AHashMap::new(),
                updated_at: now,
            }),
            replay,
            fanout,
            metrics,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add a subscriber (idempotent) and acknowledge it.
    ///
    /// Returns whether the session was newly added. A closed session is
    /// never added and gets no acknowledgement.
    pub async fn subscribe(&self, session: &Arc<Session>) -> bool {
        let inserted = {
            let mut members = self.members.lock();
            // Checked under the lock: teardown marks the session closed
            // before it takes this lock to remove it.
            if session.is_closed() {
                return false;
            }
            if members.subscribers.contains_key(&session.id()) {
                false
            } else {
                members
                    .subscribers
                    .insert(session.id(), Arc::downgrade(session));
                members.updated_at = SystemTime::now();
                true
            }
        };

        if inserted {
            if let Some(ref m) = self.metrics {
                m.subscription_added();
            }
        }

        session
            .push(&Outbound::feedback(format!(
                "subscribed to topic \"{}\"",
                self.name
            )))
            .await;
        inserted
    }

    /// Publish to every current subscriber except `source`.
    ///
    /// The subscriber snapshot is taken under the topic lock; deliveries run
    /// on the fan-out pool after the lock is released. Returns the number of
    /// subscribers the message was dispatched to.
    pub async fn publish(&self, message: &Arc<Message>, source: Option<&Arc<Session>>) -> usize {
        let source_id = source.map(|s| s.id());

        let targets: Vec<Arc<Session>> = {
            let mut members = self.members.lock();

            if let Some(source) = source.filter(|s| !s.is_closed()) {
                if !members.publishers.contains_key(&source.id()) {
                    members
                        .publishers
                        .insert(source.id(), Arc::downgrade(source));
                    members.updated_at = SystemTime::now();
                }
            }

            match message.to_json() {
                Ok(payload) => {
                    let buffered = self.replay.publish(&self.name, payload);
                    debug!("Buffered on topic {:?}: {}", self.name, buffered);
                }
                Err(e) => warn!("Failed to serialize message for {:?}: {}", self.name, e),
            }

            members
                .subscribers
                .iter()
                .filter(|(id, _)| Some(**id) != source_id)
                .filter_map(|(_, weak)| weak.upgrade())
                .collect()
        };

        let count = targets.len();
        if let Some(ref m) = self.metrics {
            m.message_published(count);
        }
        self.fanout
            .dispatch(self.name.clone(), message.clone(), targets);

        if let Some(source) = source {
            source
                .push(&Outbound::feedback(format!(
                    "sent to total {} subscribers on topic \"{}\"",
                    count, self.name
                )))
                .await;
        }
        count
    }

    /// Forget a session in both roles. Safe for sessions that never joined.
    pub fn remove_session(&self, id: SessionId) {
        let mut members = self.members.lock();
        members.subscribers.remove(&id);
        members.publishers.remove(&id);
    }

    pub fn is_subscriber(&self, id: SessionId) -> bool {
        self.members.lock().subscribers.contains_key(&id)
    }

    pub fn is_publisher(&self, id: SessionId) -> bool {
        self.members.lock().publishers.contains_key(&id)
    }

    pub fn subscriber_count(&self) -> usize {
        self.members.lock().subscribers.len()
    }

    pub(crate) fn status(&self) -> TopicStatus {
        let members = self.members.lock();
        let mut subscribers: Vec<String> =
            members.subscribers.keys().map(|id| id.to_string()).collect();
        let mut publishers: Vec<String> =
            members.publishers.keys().map(|id| id.to_string()).collect();
        subscribers.sort();
        publishers.sort();

        TopicStatus {
            topic: self.name.to_string(),
            subscribers,
            publishers,
            created_at: self.created_at,
            updated_at: members.updated_at,
        }
    }
}
