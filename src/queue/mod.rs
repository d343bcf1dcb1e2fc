//! Upstream Work Queue Module
//!
//! The crawler consumes annotated resources from three queues and republishes
//! directory children back into them. The [`Queue`] trait is the producer
//! interface; the broker itself is an external collaborator. An in-memory
//! implementation backs the in-process daemon and the tests.
//!
//! ## Connection supervision
//! A broker connection emits [`ConnectionEvent`]s. The monitor spawned by
//! [`spawn_connection_monitor`] redials on close with a fixed backoff and a
//! bounded retry budget; exhausting the budget posts a fatal error on the
//! supervisor channel so the daemon can shut down cleanly instead of
//! panicking mid-flight.


use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::types::AnnotatedResource;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue '{0}' is closed")]
    Closed(String),
}

/// Producer side of an upstream work queue.
#[async_trait]
pub trait Queue: Send + Sync {
    async fn publish(&self, r: &AnnotatedResource) -> Result<(), QueueError>;
}

/// The queue triple the crawler publishes to, routed by entry type.
#[derive(Clone)]
pub struct Queues {
    pub files: Arc<dyn Queue>,
    pub directories: Arc<dyn Queue>,
    pub hashes: Arc<dyn Queue>,
}

/// Bounded in-memory queue. Publishing blocks once the buffer is full, which
/// is the back-pressure the directory walker relies on.
pub struct MemoryQueue {
    name: String,
    tx: mpsc::Sender<AnnotatedResource>,
}

impl MemoryQueue {
    pub fn channel(
        name: impl Into<String>,
        capacity: usize,
    ) -> (Arc<Self>, mpsc::Receiver<AnnotatedResource>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Arc::new(Self {
                name: name.into(),
                tx,
            }),
            rx,
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl Queue for MemoryQueue {
    async fn publish(&self, r: &AnnotatedResource) -> Result<(), QueueError> {
        self.tx
            .send(r.clone())
            .await
            .map_err(|_| QueueError::Closed(self.name.clone()))
    }
}

/// Lifecycle notifications of a broker connection.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    Blocked(String),
    Unblocked,
    Closed(String),
}

#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub reconnect_time: Duration,
    pub max_reconnect: u32,
}

/// Watch a connection's event stream and keep it alive.
///
/// On `Closed`, `reconnect` is retried with `reconnect_time` backoff until it
/// succeeds or the budget is spent; exhaustion reports on `fatal` and the
/// monitor stops. The monitor also stops when the event stream ends.
pub fn spawn_connection_monitor<F, Fut>(
    mut events: mpsc::Receiver<ConnectionEvent>,
    mut reconnect: F,
    policy: ReconnectPolicy,
    fatal: mpsc::Sender<anyhow::Error>,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                ConnectionEvent::Blocked(reason) => {
                    tracing::warn!("Queue connection blocked: {}", reason);
                }
                ConnectionEvent::Unblocked => {
                    tracing::info!("Queue connection unblocked");
                }
                ConnectionEvent::Closed(reason) => {
                    tracing::warn!(
                        "Queue connection lost ({}), reconnecting in {:?}",
                        reason,
                        policy.reconnect_time
                    );

                    let mut attempts = 0u32;
                    loop {
                        tokio::time::sleep(policy.reconnect_time).await;
                        match reconnect().await {
                            Ok(()) => {
                                tracing::info!("Queue connection re-established");
                                break;
                            }
                            Err(e) => {
                                attempts += 1;
                                if attempts > policy.max_reconnect {
                                    let _ = fatal
                                        .send(anyhow::anyhow!(
                                            "queue reconnect budget exhausted: {}",
                                            e
                                        ))
                                        .await;
                                    return;
                                }
                                tracing::warn!(
                                    "Queue reconnect {}/{} failed: {}",
                                    attempts,
                                    policy.max_reconnect,
                                    e
                                );
                            }
                        }
                    }
                }
            }
        }
    })
}
