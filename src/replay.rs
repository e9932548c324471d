//! Bounded replay buffer
//!
//! Keeps the most recent serialized messages of every topic in a hub so that
//! HTTP readers can pick up what they missed. Each topic gets a fixed-size
//! lock-free queue; publishing into a full queue evicts the oldest entry.
//! Reads are destructive: concurrent readers split the backlog between them.

use std::sync::Arc;

use bytes::Bytes;
use crossbeam_queue::ArrayQueue;
use dashmap::DashMap;
use tracing::{debug, warn};

use crate::metrics::Metrics;

/// Default number of messages kept per topic
pub const DEFAULT_CAPACITY: usize = 1000;

/// Per-topic replay queues for one hub
pub struct ReplayBuffer {
    queues: DashMap<Arc<str>, Arc<ArrayQueue<Bytes>>>,
    capacity: usize,
    metrics: Option<Arc<Metrics>>,
}

impl ReplayBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            queues: DashMap::new(),
            // ArrayQueue cannot be empty-sized
            capacity: capacity.max(1),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Option<Arc<Metrics>>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn queue(&self, topic: &str) -> Arc<ArrayQueue<Bytes>> {
        if let Some(queue) = self.queues.get(topic) {
            return queue.clone();
        }
        self.queues
            .entry(Arc::from(topic))
            .or_insert_with(|| Arc::new(ArrayQueue::new(self.capacity)))
            .clone()
    }

    /// Buffer a payload without blocking.
    ///
    /// When the queue is full the oldest entry is dropped and the push is
    /// retried once. Returns `false` if a concurrent writer took the freed
    /// slot first.
    pub fn publish(&self, topic: &str, payload: Bytes) -> bool {
        let queue = self.queue(topic);
        let payload = match queue.push(payload) {
            Ok(()) => return true,
            Err(payload) => payload,
        };

        if let Some(dropped) = queue.pop() {
            debug!(
                "Replay buffer for {:?} full, dropped {}",
                topic,
                String::from_utf8_lossy(&dropped)
            );
            if let Some(ref m) = self.metrics {
                m.replay_dropped();
            }
        }

        match queue.push(payload) {
            Ok(()) => true,
            Err(_) => {
                warn!("Replay buffer for {:?} lost a race, message not buffered", topic);
                if let Some(ref m) = self.metrics {
                    m.replay_rejected();
                }
                false
            }
        }
    }

    /// Remove and return up to `max` of the oldest payloads of a topic.
    pub fn drain(&self, topic: &str, max: usize) -> Vec<Bytes> {
        let queue = match self.queues.get(topic) {
            Some(queue) => queue.clone(),
            None => return Vec::new(),
        };

        let mut out = Vec::with_capacity(max.min(queue.len()));
        while out.len() < max {
            match queue.pop() {
                Some(payload) => out.push(payload),
                None => break,
            }
        }
        out
    }

    /// Number of payloads currently buffered for a topic
    pub fn len(&self, topic: &str) -> usize {
        self.queues.get(topic).map(|q| q.len()).unwrap_or(0)
    }
}

impl Default for ReplayBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn payload(i: usize) -> Bytes {
        Bytes::from(format!("m{}", i))
    }

    #[test]
    fn test_publish_and_drain_in_order() {
        let buffer = ReplayBuffer::new(4);
        for i in 0..3 {
            assert!(buffer.publish("t", payload(i)));
        }
        assert_eq!(buffer.drain("t", 10), vec![payload(0), payload(1), payload(2)]);
        assert!(buffer.drain("t", 10).is_empty());
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let buffer = ReplayBuffer::new(3);
        for i in 0..5 {
            assert!(buffer.publish("t", payload(i)));
        }
        assert_eq!(buffer.len("t"), 3);
        assert_eq!(buffer.drain("t", 3), vec![payload(2), payload(3), payload(4)]);
    }

    #[test]
    fn test_drain_respects_max() {
        let buffer = ReplayBuffer::new(10);
        for i in 0..6 {
            buffer.publish("t", payload(i));
        }
        assert_eq!(buffer.drain("t", 2), vec![payload(0), payload(1)]);
        assert_eq!(buffer.len("t"), 4);
        assert_eq!(buffer.drain("t", 0), Vec::<Bytes>::new());
    }

    #[test]
    fn test_topics_are_independent() {
        let buffer = ReplayBuffer::new(2);
        buffer.publish("a", payload(1));
        buffer.publish("b", payload(2));
        assert_eq!(buffer.drain("a", 5), vec![payload(1)]);
        assert_eq!(buffer.drain("b", 5), vec![payload(2)]);
    }

    #[test]
    fn test_drain_unknown_topic_does_not_allocate() {
        let buffer = ReplayBuffer::new(2);
        assert!(buffer.drain("missing", 5).is_empty());
        assert!(buffer.queues.is_empty());
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let buffer = ReplayBuffer::new(0);
        assert_eq!(buffer.capacity(), 1);
        buffer.publish("t", payload(1));
        buffer.publish("t", payload(2));
        assert_eq!(buffer.drain("t", 5), vec![payload(2)]);
    }

    #[test]
    fn test_concurrent_drains_partition_entries() {
        let buffer = Arc::new(ReplayBuffer::new(1000));
        for i in 0..1000 {
            buffer.publish("t", payload(i));
        }

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let buffer = buffer.clone();
                std::thread::spawn(move || buffer.drain("t", 1000))
            })
            .collect();

        let mut seen: Vec<Bytes> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 1000);
    }

    proptest! {
        #[test]
        fn prop_keeps_last_capacity_entries(capacity in 1usize..32, extra in 1usize..32) {
            let buffer = ReplayBuffer::new(capacity);
            let total = capacity + extra;
            for i in 0..total {
                prop_assert!(buffer.publish("t", payload(i)));
            }

            let expected: Vec<Bytes> = (extra..total).map(payload).collect();
            prop_assert_eq!(buffer.drain("t", capacity), expected);
            prop_assert!(buffer.drain("t", capacity).is_empty());
        }
    }
}
