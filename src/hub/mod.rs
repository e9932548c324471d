//! Topic registry
//!
//! A [`Hub`] is one isolated broker instance: its own topics, its own replay
//! buffer. Several hubs share the process fan-out pool; [`TenantHubMap`]
//! hands out one hub per tenant key.

mod fanout;
mod tenants;
mod topic;

pub use fanout::{FanoutPool, DEFAULT_MAX_INFLIGHT};
pub use tenants::TenantHubMap;
pub use topic::Topic;

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use ahash::AHashMap;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

use crate::metrics::Metrics;
use crate::protocol::Message;
use crate::replay::{self, ReplayBuffer};
use crate::session::{Session, SessionId};


/// Per-hub behaviour knobs
#[derive(Debug, Clone)]
pub struct HubOptions {
    /// Messages kept per topic in the replay buffer
    pub replay_capacity: usize,
    /// Cap on concurrent deliveries (0 = unbounded)
    pub max_inflight_deliveries: usize,
    /// Upper bound on a single write to a session's transport
    pub write_timeout: Duration,
    /// Topic every new connection joins
    pub global_topic: String,
}

impl Default for HubOptions {
    fn default() -> Self {
        Self {
            replay_capacity: replay::DEFAULT_CAPACITY,
            max_inflight_deliveries: DEFAULT_MAX_INFLIGHT,
            write_timeout: Duration::from_secs(10),
            global_topic: "global".to_string(),
        }
    }
}

/// Result of reading the replay buffer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplayBatch {
    pub data: Vec<String>,
    pub count: usize,
}

/// Snapshot of one topic for the status endpoint
#[derive(Debug, Clone, Serialize)]
pub struct TopicStatus {
    pub topic: String,
    pub subscribers: Vec<String>,
    pub publishers: Vec<String>,
    #[serde(with = "humantime_serde")]
    pub created_at: SystemTime,
    #[serde(with = "humantime_serde")]
    pub updated_at: SystemTime,
}

/// Snapshot of a hub for the status endpoint
#[derive(Debug, Clone, Serialize)]
pub struct HubStatus {
    pub topics: Vec<TopicStatus>,
}

/// A tenant-scoped registry of topics
pub struct Hub {
    topics: Mutex<AHashMap<Arc<str>, Arc<Topic>>>,
    replay: Arc<ReplayBuffer>,
    fanout: FanoutPool,
    options: HubOptions,
    metrics: Option<Arc<Metrics>>,
}

impl Hub {
    /// Create a standalone hub with its own fan-out pool
    pub fn new(options: HubOptions) -> Self {
        let fanout = FanoutPool::new(options.max_inflight_deliveries);
        Self::with_shared(options, fanout, None)
    }

    /// Create a hub that shares a fan-out pool and metrics with others
    pub fn with_shared(
        options: HubOptions,
        fanout: FanoutPool,
        metrics: Option<Arc<Metrics>>,
    ) -> Self {
        let replay =
            Arc::new(ReplayBuffer::new(options.replay_capacity).with_metrics(metrics.clone()));
        Self {
            topics: Mutex::new(AHashMap::new()),
            replay,
            fanout,
            options,
            metrics,
        }
    }

    pub fn options(&self) -> &HubOptions {
        &self.options
    }

    pub fn metrics(&self) -> Option<&Arc<Metrics>> {
        self.metrics.as_ref()
    }

    /// Existing topic, or a new empty one registered under `name`
    pub fn get_or_create_topic(&self, name: &str) -> Arc<Topic> {
        let mut topics = self.topics.lock();
        if let Some(topic) = topics.get(name) {
            return topic.clone();
        }

        let name: Arc<str> = Arc::from(name);
        let topic = Arc::new(Topic::new(
            name.clone(),
            self.replay.clone(),
            self.fanout.clone(),
            self.metrics.clone(),
        ));
        topics.insert(name, topic.clone());
        debug!("Created topic {:?}", topic.name());
        if let Some(ref m) = self.metrics {
            m.topic_created();
        }
        topic
    }

    /// Existing topic only
    pub fn topic(&self, name: &str) -> Option<Arc<Topic>> {
        self.topics.lock().get(name).cloned()
    }

    pub fn topic_count(&self) -> usize {
        self.topics.lock().len()
    }

    pub async fn subscribe(&self, topic: &str, session: &Arc<Session>) -> bool {
        self.get_or_create_topic(topic).subscribe(session).await
    }

    /// Publish on `topic`; `source` is `None` for HTTP publishers.
    pub async fn publish(
        &self,
        topic: &str,
        message: &Arc<Message>,
        source: Option<&Arc<Session>>,
    ) -> usize {
        self.get_or_create_topic(topic)
            .publish(message, source)
            .await
    }

    /// Detach a session from every topic of this hub
    pub fn remove_session(&self, id: SessionId) {
        let topics: Vec<Arc<Topic>> = self.topics.lock().values().cloned().collect();
        for topic in topics {
            topic.remove_session(id);
        }
    }

    /// Destructively read up to `amount` buffered messages of a topic
    pub fn drain(&self, topic: &str, amount: usize) -> ReplayBatch {
        let data: Vec<String> = self
            .replay
            .drain(topic, amount)
            .into_iter()
            .map(|payload| String::from_utf8_lossy(&payload).into_owned())
            .collect();
        ReplayBatch {
            count: data.len(),
            data,
        }
    }

    pub fn status(&self) -> HubStatus {
        let topics: Vec<Arc<Topic>> = self.topics.lock().values().cloned().collect();
        let mut topics: Vec<TopicStatus> = topics.iter().map(|t| t.status()).collect();
        topics.sort_by(|a, b| a.topic.cmp(&b.topic));
        HubStatus { topics }
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(HubOptions::default())
    }
}
