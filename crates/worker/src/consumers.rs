//! Spawning and stopping the consumer tasks.

use std::sync::Arc;

use decrease::{
    ConsumerWorker, OrderCreatedTranslator, RetryPolicy, StockDecreaseConsumer,
    StockEventPublisher,
};
use ledger::StockLedger;
use messaging::MessageBroker;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::Config;

/// The running consumer tasks: `worker_count` decrement consumers sharing
/// one handler, plus one order-created translator.
pub struct ConsumerSet {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl ConsumerSet {
    /// Spawns every consumer onto the current runtime.
    pub fn spawn<L, B, P>(config: &Config, ledger: L, broker: B, publisher: P) -> Self
    where
        L: StockLedger + 'static,
        B: MessageBroker + Clone + 'static,
        P: StockEventPublisher + Clone + 'static,
    {
        let (shutdown, rx) = watch::channel(false);
        let mut handles = Vec::with_capacity(config.worker_count + 1);

        let consumer = Arc::new(StockDecreaseConsumer::new(
            ledger,
            publisher.clone(),
            broker.clone(),
            config.channels.clone(),
            RetryPolicy::new(config.retry_max),
        ));
        for id in 0..config.worker_count {
            let worker =
                ConsumerWorker::new(id, consumer.clone(), broker.clone(), config.poll_interval);
            handles.push(tokio::spawn(worker.run(rx.clone())));
        }

        let translator = Arc::new(OrderCreatedTranslator::new(
            broker.clone(),
            publisher,
            config.channels.clone(),
        ));
        let worker = ConsumerWorker::new(
            config.worker_count,
            translator,
            broker,
            config.poll_interval,
        );
        handles.push(tokio::spawn(worker.run(rx)));

        tracing::info!(
            workers = config.worker_count,
            retry_max = config.retry_max,
            "consumers spawned"
        );
        Self { shutdown, handles }
    }

    /// Returns the number of running tasks, translator included.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Signals every task to stop and waits for in-flight deliveries to finish.
    pub async fn shutdown(self) {
        // Receivers only go away when their task has already ended
        let _ = self.shutdown.send(true);

        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "consumer task failed");
            }
        }
        tracing::info!("consumers stopped");
    }
}
