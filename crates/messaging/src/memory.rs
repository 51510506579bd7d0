use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::{BrokerError, DelayQueue, Delivery, Message, MessageBroker, Result};

#[derive(Debug)]
struct Parked {
    message: Message,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct BrokerState {
    ready: HashMap<String, VecDeque<Message>>,
    parked: HashMap<String, VecDeque<Parked>>,
    delay_queues: HashMap<String, DelayQueue>,
    in_flight: HashMap<i64, Delivery>,
    next_tag: i64,
    fail_publish: bool,
}

impl BrokerState {
    /// Moves every expired parked message to its dead-letter target.
    fn promote_expired(&mut self, now: Instant) {
        for (name, delay) in &self.delay_queues {
            let Some(parked) = self.parked.get_mut(name) else {
                continue;
            };
            // Constant TTL keeps each delay queue ordered by expiry
            while parked.front().is_some_and(|p| p.expires_at <= now) {
                if let Some(p) = parked.pop_front() {
                    self.ready
                        .entry(delay.dead_letter_to.clone())
                        .or_default()
                        .push_back(p.message);
                }
            }
        }
    }
}

/// In-memory broker for testing and single-process runs.
///
/// Uses `tokio::time::Instant`, so tests can drive delay expiry with a
/// paused clock.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl InMemoryBroker {
    /// Creates a new broker with no delay queues.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a queue whose messages expire into another queue.
    pub async fn declare_delay_queue(&self, queue: DelayQueue) {
        let mut state = self.state.lock().await;
        state.delay_queues.insert(queue.name.clone(), queue);
    }

    /// Returns the messages currently held by a queue without consuming them.
    pub async fn messages(&self, queue: &str) -> Vec<Message> {
        let mut state = self.state.lock().await;
        state.promote_expired(Instant::now());

        let ready = state.ready.get(queue).into_iter().flatten().cloned();
        let parked = state
            .parked
            .get(queue)
            .into_iter()
            .flatten()
            .map(|p| p.message.clone());
        ready.chain(parked).collect()
    }

    /// Returns the number of messages currently held by a queue.
    pub async fn len(&self, queue: &str) -> usize {
        self.messages(queue).await.len()
    }

    /// Returns true if the queue holds no messages.
    pub async fn is_empty(&self, queue: &str) -> bool {
        self.len(queue).await == 0
    }

    /// Makes every subsequent publish fail, simulating a lost connection.
    pub async fn set_fail_publish(&self, fail: bool) {
        self.state.lock().await.fail_publish = fail;
    }

    /// Returns the number of deliveries awaiting acknowledgement.
    pub async fn in_flight_count(&self) -> usize {
        self.state.lock().await.in_flight.len()
    }
}

#[async_trait]
impl MessageBroker for InMemoryBroker {
    async fn publish(&self, queue: &str, message: Message) -> Result<()> {
        let mut state = self.state.lock().await;

        if state.fail_publish {
            return Err(BrokerError::Unavailable(format!("cannot publish to {queue}")));
        }

        if let Some(ttl) = state.delay_queues.get(queue).map(|d| d.ttl) {
            state
                .parked
                .entry(queue.to_string())
                .or_default()
                .push_back(Parked {
                    message,
                    expires_at: Instant::now() + ttl,
                });
        } else {
            state
                .ready
                .entry(queue.to_string())
                .or_default()
                .push_back(message);
        }

        tracing::trace!(queue, "message published");
        Ok(())
    }

    async fn receive(&self, queue: &str) -> Result<Option<Delivery>> {
        let mut state = self.state.lock().await;
        state.promote_expired(Instant::now());

        if state.delay_queues.contains_key(queue) {
            return Ok(None);
        }

        let Some(message) = state.ready.get_mut(queue).and_then(VecDeque::pop_front) else {
            return Ok(None);
        };

        state.next_tag += 1;
        let delivery = Delivery {
            tag: state.next_tag,
            queue: queue.to_string(),
            // Tags are never reused here, so the tag alone identifies the lease
            lease: 0,
            message,
        };
        state.in_flight.insert(delivery.tag, delivery.clone());

        Ok(Some(delivery))
    }

    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        let mut state = self.state.lock().await;
        state
            .in_flight
            .remove(&delivery.tag)
            .map(|_| ())
            .ok_or(BrokerError::UnknownDelivery(delivery.tag))
    }

    async fn requeue(&self, delivery: &Delivery) -> Result<()> {
        let mut state = self.state.lock().await;
        let delivery = state
            .in_flight
            .remove(&delivery.tag)
            .ok_or(BrokerError::UnknownDelivery(delivery.tag))?;

        state
            .ready
            .entry(delivery.queue)
            .or_default()
            .push_front(delivery.message);
        Ok(())
    }
}
