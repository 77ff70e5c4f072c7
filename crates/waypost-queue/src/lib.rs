//! Durable queue plumbing chaining the three pipeline stages (spec §4.8):
//! `staging -> prepare -> transfer`. Every queue is durable, non-exclusive,
//! consumed with `prefetch_count=1` and manual acknowledgement. Messages
//! carry nothing but the UTF-8 `transfer_id`.

use deadpool_lapin::{Config, Pool, Runtime};
use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicQosOptions,
    QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel};
use waypost_core::error::{Result, WaypostError};

/// A connected pool of AMQP channels. Cheap to clone; each publish/consume
/// call obtains its own channel from the pool.
#[derive(Clone)]
pub struct Broker {
    pool: Pool,
}

impl Broker {
    pub fn connect(amqp_url: &str) -> Result<Self> {
        let cfg = Config {
            url: Some(amqp_url.to_string()),
            ..Default::default()
        };
        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| WaypostError::InvalidConfig(format!("failed to build AMQP pool: {e}")))?;
        Ok(Self { pool })
    }

    async fn channel(&self) -> Result<Channel> {
        let conn = self
            .pool
            .get()
            .await
            .map_err(|e| WaypostError::InvalidConfig(format!("failed to get AMQP connection: {e}")))?;
        Ok(conn.create_channel().await?)
    }

    pub fn producer(&self, queue: impl Into<String>) -> QueueProducer {
        QueueProducer {
            broker: self.clone(),
            queue: queue.into(),
        }
    }

    pub fn consumer(&self, queue: impl Into<String>, consumer_tag: impl Into<String>) -> QueueConsumer {
        QueueConsumer {
            broker: self.clone(),
            queue: queue.into(),
            consumer_tag: consumer_tag.into(),
        }
    }
}

async fn declare(channel: &Channel, queue: &str) -> Result<()> {
    channel
        .queue_declare(
            queue,
            QueueDeclareOptions {
                durable: true,
                exclusive: false,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await?;
    Ok(())
}

/// Publishes `transfer_id`s onto a single durable queue.
#[derive(Clone)]
pub struct QueueProducer {
    broker: Broker,
    queue: String,
}

impl QueueProducer {
    /// Publish a transfer id with persistent delivery mode (spec §4.8).
    pub async fn publish(&self, transfer_id: &str) -> Result<()> {
        let channel = self.broker.channel().await?;
        declare(&channel, &self.queue).await?;

        channel
            .basic_publish(
                "",
                &self.queue,
                BasicPublishOptions::default(),
                transfer_id.as_bytes(),
                BasicProperties::default().with_delivery_mode(2),
            )
            .await?
            .await?;

        Ok(())
    }
}

/// Consumes `transfer_id`s from a single durable queue, prefetch=1, manual ack.
pub struct QueueConsumer {
    broker: Broker,
    queue: String,
    consumer_tag: String,
}

impl QueueConsumer {
    /// Run `handler` once per delivered message, acking on `Ok(())` and
    /// nack-ing (without requeue — the handler is responsible for recording
    /// `ERROR` before returning) on `Err`.
    ///
    /// This loops forever; callers `tokio::spawn` it as a long-running driver
    /// task (spec §9, "implement each driver as a long-running task").
    pub async fn run<F, Fut>(&self, mut handler: F) -> Result<()>
    where
        F: FnMut(String) -> Fut,
        Fut: std::future::Future<Output = Result<()>>,
    {
        let channel = self.broker.channel().await?;
        declare(&channel, &self.queue).await?;
        channel
            .basic_qos(1, BasicQosOptions::default())
            .await?;

        let mut consumer = channel
            .basic_consume(
                &self.queue,
                &self.consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        while let Some(delivery) = consumer.next().await {
            let delivery = delivery?;
            let transfer_id = String::from_utf8_lossy(&delivery.data).to_string();

            match handler(transfer_id.clone()).await {
                Ok(()) => {
                    delivery.ack(BasicAckOptions::default()).await?;
                }
                Err(e) => {
                    tracing::error!(transfer_id, error = %e, "driver handler failed, nacking message");
                    delivery
                        .nack(lapin::options::BasicNackOptions {
                            requeue: false,
                            ..Default::default()
                        })
                        .await?;
                }
            }
        }

        Ok(())
    }
}
