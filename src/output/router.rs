use super::subscribers::SubscriberRegistry;
use crate::dispatch::Dispatcher;
use crate::record::{Ack, Batch};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::sleep;
use tracing::{error, info};

/// Delivery retry policy: a fixed delay between attempts, no backoff
/// growth and no retry cap. A persistently failing endpoint blocks the
/// router on the current batch, which backpressures every tailer once
/// the queue fills. Partial progress is never lost because the batch is
/// never dropped.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn fixed(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(Duration::from_secs(5))
    }
}

/// Handle for producers and the supervisor: the shared queue sender and
/// the per-source ack subscriptions.
#[derive(Clone)]
pub struct RouterHandle {
    queue: mpsc::Sender<Batch>,
    subscribers: Arc<SubscriberRegistry>,
}

impl RouterHandle {
    pub fn queue(&self) -> mpsc::Sender<Batch> {
        self.queue.clone()
    }

    pub fn subscribe(&self, source: &str) -> mpsc::Receiver<Ack> {
        self.subscribers.subscribe(source)
    }

    pub fn unsubscribe(&self, source: &str) {
        self.subscribers.unsubscribe(source)
    }
}

/// Single worker owning the shared inbound queue. Pulls one batch at a
/// time, delivers it through the dispatcher with blocking retries, and
/// routes the resulting ack back to the originating tailer.
pub struct OutputRouter {
    dispatcher: Box<dyn Dispatcher>,
    retry: RetryPolicy,
    queue: mpsc::Receiver<Batch>,
    subscribers: Arc<SubscriberRegistry>,
}

impl OutputRouter {
    pub fn new(
        dispatcher: Box<dyn Dispatcher>,
        retry: RetryPolicy,
        queue_capacity: usize,
    ) -> (Self, RouterHandle) {
        let (tx, rx) = mpsc::channel(queue_capacity);
        let subscribers = Arc::new(SubscriberRegistry::new());

        let router = Self {
            dispatcher,
            retry,
            queue: rx,
            subscribers: subscribers.clone(),
        };
        let handle = RouterHandle {
            queue: tx,
            subscribers,
        };
        (router, handle)
    }

    /// Run until stopped or the queue closes. A dispatcher setup failure
    /// stops the router before any batch is consumed; the output path is
    /// then dead for the rest of the process lifetime.
    pub async fn run(mut self, mut stop: watch::Receiver<bool>) {
        if let Err(e) = self.dispatcher.setup().await {
            error!(error = %e, "could not set up dispatcher, output path disabled");
            // Hold the queue open without consuming: producers block once
            // it fills instead of erroring on a closed channel.
            let _ = stop.changed().await;
            return;
        }

        loop {
            tokio::select! {
                _ = stop.changed() => {
                    info!("output router stopped");
                    return;
                }
                batch = self.queue.recv() => {
                    match batch {
                        Some(batch) => self.deliver(batch).await,
                        None => {
                            info!("output queue closed");
                            return;
                        }
                    }
                }
            }
        }
    }

    /// Deliver one batch, retrying the identical batch on failure until
    /// it goes through. Stop requests do not interrupt an in-flight
    /// delivery or the retry delay.
    async fn deliver(&self, batch: Batch) {
        loop {
            match self.dispatcher.send(&batch).await {
                Ok(ack) => {
                    self.subscribers.route(ack);
                    return;
                }
                Err(e) => {
                    error!(error = %e, "dispatch failed, retrying");
                    sleep(self.retry.delay).await;
                }
            }
        }
    }
}
