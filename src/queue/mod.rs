//! Bounded-concurrency FIFO lane for outbound network calls.
//!
//! Every call that may reach the network goes through a [`RequestQueue`] so
//! that a burst of UI-triggered lookups becomes an orderly trickle. Tasks start
//! as soon as they are enqueued (no explicit start), begin in FIFO order, and
//! at most `concurrency` run at once. A task that fails or panics settles only
//! its own handle.

mod error;

pub use error::QueueError;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tracing::debug;

/// Default lane name used by the API orchestrator.
pub const DEFAULT_LANE: &str = "github";

type Job = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// Lane configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub name: String,
    /// Maximum tasks running at once. Zero is treated as one.
    pub concurrency: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_LANE.to_string(),
            concurrency: 1,
        }
    }
}

/// Handle to a named request lane. Cloning shares the lane.
#[derive(Debug, Clone)]
pub struct RequestQueue {
    name: Arc<str>,
    concurrency: usize,
    sender: mpsc::UnboundedSender<Job>,
}

impl RequestQueue {
    /// Create a lane and start its dispatcher. Must be called inside a tokio
    /// runtime.
    pub fn new(config: QueueConfig) -> Self {
        let concurrency = config.concurrency.max(1);
        let name: Arc<str> = Arc::from(config.name.as_str());
        let (sender, receiver) = mpsc::unbounded_channel();

        tokio::spawn(dispatch(name.clone(), receiver, concurrency));
        debug!("Started request queue '{}' (concurrency {})", name, concurrency);

        Self {
            name,
            concurrency,
            sender,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Submit a task. It starts as soon as a slot frees up, whether or not
    /// the returned handle is awaited.
    pub fn enqueue<F, Fut, T>(&self, task: F) -> QueuedTask<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: Job = Box::new(move || {
            Box::pin(async move {
                let output = task().await;
                // The caller may have stopped listening; that is fine.
                let _ = tx.send(output);
            })
        });

        let receiver = match self.sender.send(job) {
            Ok(()) => Some(rx),
            Err(_) => None,
        };

        QueuedTask {
            lane: self.name.clone(),
            receiver,
        }
    }
}

async fn dispatch(name: Arc<str>, mut receiver: mpsc::UnboundedReceiver<Job>, concurrency: usize) {
    let slots = Arc::new(Semaphore::new(concurrency));

    while let Some(job) = receiver.recv().await {
        let permit = match slots.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };
        tokio::spawn(async move {
            job().await;
            drop(permit);
        });
    }

    debug!("Request queue '{}' stopped", name);
}

/// Pending result of a queued task.
#[derive(Debug)]
pub struct QueuedTask<T> {
    lane: Arc<str>,
    receiver: Option<oneshot::Receiver<T>>,
}

impl<T> Future for QueuedTask<T> {
    type Output = Result<T, QueueError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let lane = self.lane.clone();
        match self.receiver.as_mut() {
            Some(receiver) => Pin::new(receiver)
                .poll(cx)
                .map(|result| result.map_err(|_| QueueError::TaskDropped(lane.to_string()))),
            None => Poll::Ready(Err(QueueError::Closed(lane.to_string()))),
        }
    }
}
