use std::fmt;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::{EmailMessage, Notifier, NotifyError};

struct Job {
    message: EmailMessage,
    reply: oneshot::Sender<Result<(), NotifyError>>,
}

#[derive(Debug, Default)]
struct Counters {
    delivered: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

/// Snapshot of the worker counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub delivered: u64,
    pub failed: u64,
    pub dropped: u64,
}

/// Outcome of one queued message. Dropping the receipt does not cancel
/// delivery.
#[derive(Debug)]
pub struct DeliveryReceipt {
    rx: oneshot::Receiver<Result<(), NotifyError>>,
}

impl DeliveryReceipt {
    fn resolved(result: Result<(), NotifyError>) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(result);
        Self { rx }
    }

    pub async fn wait(self) -> Result<(), NotifyError> {
        self.rx.await.unwrap_or(Err(NotifyError::Closed))
    }
}

/// Bounded queue in front of a [`Notifier`], drained by one worker task.
pub struct NotificationDispatcher {
    tx: mpsc::Sender<Job>,
    counters: Arc<Counters>,
    shutdown_token: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for NotificationDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationDispatcher")
            .field("stats", &self.stats())
            .field("capacity", &self.tx.max_capacity())
            .field("shutdown_cancelled", &self.shutdown_token.is_cancelled())
            .finish()
    }
}

impl NotificationDispatcher {
    /// Spawn the worker on the current runtime.
    pub fn spawn(notifier: Arc<dyn Notifier>, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let counters = Arc::new(Counters::default());
        let shutdown_token = CancellationToken::new();

        let handle = tokio::spawn(run_worker(
            notifier,
            rx,
            Arc::clone(&counters),
            shutdown_token.clone(),
        ));

        Self {
            tx,
            counters,
            shutdown_token,
            worker: Mutex::new(Some(handle)),
        }
    }

    /// Queue a message without waiting. A full or closed queue resolves the
    /// receipt immediately with an error.
    pub fn dispatch(&self, message: EmailMessage) -> DeliveryReceipt {
        let (reply, rx) = oneshot::channel();
        match self.tx.try_send(Job { message, reply }) {
            Ok(()) => DeliveryReceipt { rx },
            Err(mpsc::error::TrySendError::Full(job)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(subject = %job.message.subject, "notification queue full; dropping message");
                DeliveryReceipt::resolved(Err(NotifyError::QueueFull))
            }
            Err(mpsc::error::TrySendError::Closed(job)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(subject = %job.message.subject, "notification dispatcher closed; dropping message");
                DeliveryReceipt::resolved(Err(NotifyError::Closed))
            }
        }
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .ok()
            .and_then(|guard| guard.as_ref().map(|handle| !handle.is_finished()))
            .unwrap_or(false)
    }

    /// Stop accepting work, deliver what is already queued, then join the
    /// worker.
    pub async fn shutdown(&self) {
        self.shutdown_token.cancel();
        let handle = self.worker.lock().ok().and_then(|mut guard| guard.take());
        if let Some(handle) = handle
            && let Err(err) = handle.await
        {
            error!(error = %err, "notification worker terminated abnormally");
        }
    }
}

async fn run_worker(
    notifier: Arc<dyn Notifier>,
    mut rx: mpsc::Receiver<Job>,
    counters: Arc<Counters>,
    shutdown_token: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown_token.cancelled() => break,
            job = rx.recv() => match job {
                Some(job) => deliver(notifier.as_ref(), &counters, job).await,
                None => return,
            },
        }
    }

    rx.close();
    while let Some(job) = rx.recv().await {
        deliver(notifier.as_ref(), &counters, job).await;
    }
    debug!("notification worker stopped");
}

async fn deliver(notifier: &dyn Notifier, counters: &Counters, job: Job) {
    let Job { message, reply } = job;
    let result = notifier
        .send(&message.to, &message.cc, &message.subject, &message.body)
        .await;

    match &result {
        Ok(()) => {
            counters.delivered.fetch_add(1, Ordering::Relaxed);
            debug!(to = ?message.to, subject = %message.subject, "notification delivered");
        }
        Err(err) => {
            counters.failed.fetch_add(1, Ordering::Relaxed);
            error!(to = ?message.to, subject = %message.subject, error = %err, "notification delivery failed");
        }
    }

    let _ = reply.send(result);
}
