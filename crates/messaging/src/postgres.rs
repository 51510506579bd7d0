use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::{DelayQueue, Delivery, Message, MessageBroker, MessageHeaders, Result};

/// PostgreSQL-backed broker.
///
/// Every queue lives in the `broker_messages` table. A received row is
/// leased for `visibility_timeout`; if the worker dies before acking, the
/// lease runs out and the row is handed out again.
#[derive(Clone)]
pub struct PostgresBroker {
    pool: PgPool,
    delay_queues: HashMap<String, DelayQueue>,
    visibility_timeout: Duration,
}

impl PostgresBroker {
    /// Creates a new broker with a 30 second visibility timeout.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            delay_queues: HashMap::new(),
            visibility_timeout: Duration::from_secs(30),
        }
    }

    /// Declares a queue whose messages expire into another queue.
    pub fn with_delay_queue(mut self, queue: DelayQueue) -> Self {
        self.delay_queues.insert(queue.name.clone(), queue);
        self
    }

    /// Sets how long a received message stays invisible to other workers.
    pub fn with_visibility_timeout(mut self, timeout: Duration) -> Self {
        self.visibility_timeout = timeout;
        self
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Returns the messages currently held by a queue without consuming them.
    pub async fn peek(&self, queue: &str) -> Result<Vec<Message>> {
        let rows = sqlx::query(
            r#"
            SELECT payload, headers
            FROM broker_messages
            WHERE queue = $1
            ORDER BY id ASC
            "#,
        )
        .bind(queue)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_message).collect()
    }

    fn row_to_message(row: PgRow) -> Result<Message> {
        let headers: serde_json::Value = row.try_get("headers")?;
        Ok(Message {
            payload: row.try_get("payload")?,
            headers: serde_json::from_value::<MessageHeaders>(headers)?,
        })
    }

    /// Moves expired delay-queue rows into the queue they dead-letter to.
    async fn promote_expired(&self, target: &str) -> Result<u64> {
        let promoted = sqlx::query(
            r#"
            UPDATE broker_messages
            SET queue = dead_letter_to, dead_letter_to = NULL, visible_at = NOW()
            WHERE dead_letter_to = $1 AND visible_at <= NOW()
            "#,
        )
        .bind(target)
        .execute(&self.pool)
        .await?;

        Ok(promoted.rows_affected())
    }
}

#[async_trait]
impl MessageBroker for PostgresBroker {
    async fn publish(&self, queue: &str, message: Message) -> Result<()> {
        let headers = serde_json::to_value(&message.headers)?;
        let (delay, dead_letter_to) = match self.delay_queues.get(queue) {
            Some(delay) => (delay.ttl, Some(delay.dead_letter_to.as_str())),
            None => (Duration::ZERO, None),
        };

        sqlx::query(
            r#"
            INSERT INTO broker_messages (queue, payload, headers, dead_letter_to, visible_at)
            VALUES ($1, $2, $3, $4, NOW() + make_interval(secs => $5))
            "#,
        )
        .bind(queue)
        .bind(&message.payload)
        .bind(headers)
        .bind(dead_letter_to)
        .bind(delay.as_secs_f64())
        .execute(&self.pool)
        .await?;

        tracing::trace!(queue, "message published");
        Ok(())
    }

    async fn receive(&self, queue: &str) -> Result<Option<Delivery>> {
        if self.delay_queues.contains_key(queue) {
            return Ok(None);
        }

        let promoted = self.promote_expired(queue).await?;
        if promoted > 0 {
            tracing::debug!(queue, promoted, "delayed messages released");
        }

        let row: Option<PgRow> = sqlx::query(
            r#"
            UPDATE broker_messages
            SET visible_at = NOW() + make_interval(secs => $2), read_count = read_count + 1
            WHERE id = (
                SELECT id FROM broker_messages
                WHERE queue = $1 AND dead_letter_to IS NULL AND visible_at <= NOW()
                ORDER BY id ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, read_count, payload, headers
            "#,
        )
        .bind(queue)
        .bind(self.visibility_timeout.as_secs_f64())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let tag: i64 = row.try_get("id")?;
                let lease: i32 = row.try_get("read_count")?;
                Ok(Some(Delivery {
                    tag,
                    queue: queue.to_string(),
                    lease,
                    message: Self::row_to_message(row)?,
                }))
            }
            None => Ok(None),
        }
    }

    /// Deletes the row if this delivery still holds its lease.
    ///
    /// A consumer whose lease expired while it was working gets a no-op: the
    /// message belongs to whoever received it next.
    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        let result = sqlx::query("DELETE FROM broker_messages WHERE id = $1 AND read_count = $2")
            .bind(delivery.tag)
            .bind(delivery.lease)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            tracing::warn!(tag = delivery.tag, lease = delivery.lease, "ack after lease expired");
        }
        Ok(())
    }

    /// Makes the row visible again if this delivery still holds its lease.
    async fn requeue(&self, delivery: &Delivery) -> Result<()> {
        let result = sqlx::query(
            "UPDATE broker_messages SET visible_at = NOW() WHERE id = $1 AND read_count = $2",
        )
        .bind(delivery.tag)
        .bind(delivery.lease)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            tracing::warn!(
                tag = delivery.tag,
                lease = delivery.lease,
                "requeue after lease expired"
            );
        }
        Ok(())
    }
}
