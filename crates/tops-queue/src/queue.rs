use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::jobs::{JobId, Task};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum QueueError {
    #[error("Task queue is full ({capacity} pending tasks)")]
    Full { capacity: usize },

    #[error("Task queue is shut down")]
    Closed,
}

/// Submission side of the task system.
pub trait TaskQueue: Send + Sync {
    fn submit(&self, task: Box<dyn Task>) -> Result<JobId, QueueError>;
}

struct QueuedTask {
    id: JobId,
    task: Box<dyn Task>,
}

/// Fixed set of workers draining a bounded channel.
pub struct WorkerPool {
    sender: std::sync::RwLock<Option<mpsc::Sender<QueuedTask>>>,
    receiver: Arc<Mutex<mpsc::Receiver<QueuedTask>>>,
    capacity: usize,
    cancel: CancellationToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new(workers: usize, queue_depth: usize) -> Arc<Self> {
        let workers = workers.max(1);
        let capacity = queue_depth.max(1);
        let (sender, receiver) = mpsc::channel::<QueuedTask>(capacity);
        let receiver = Arc::new(Mutex::new(receiver));
        let cancel = CancellationToken::new();

        let handles = (0..workers)
            .map(|index| {
                let receiver = receiver.clone();
                let cancel = cancel.clone();
                tokio::spawn(async move { worker_loop(index, receiver, cancel).await })
            })
            .collect();

        info!("started worker pool: {} workers, queue depth {}", workers, capacity);

        Arc::new(Self {
            sender: std::sync::RwLock::new(Some(sender)),
            receiver,
            capacity,
            cancel,
            workers: Mutex::new(handles),
        })
    }

    /// Stop accepting tasks, cancel running ones and wait for the workers.
    /// Tasks still queued are then run once with a cancelled token so they
    /// can record that they never started.
    pub async fn shutdown(&self) {
        if let Ok(mut sender) = self.sender.write() {
            sender.take();
        }
        self.cancel.cancel();

        let handles: Vec<JoinHandle<()>> = self.workers.lock().await.drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                error!("worker terminated abnormally: {}", e);
            }
        }

        let mut receiver = self.receiver.lock().await;
        receiver.close();
        let mut drained = 0usize;
        while let Ok(QueuedTask { id, task }) = receiver.try_recv() {
            let name = task.name();
            debug!("task {} ({}) cancelled before it started", id, name);
            if let Err(e) = tokio::spawn(task.run(self.cancel.child_token())).await {
                warn!("task {} ({}) aborted: {}", id, name, e);
            }
            drained += 1;
        }
        if drained > 0 {
            warn!("{} queued task(s) were cancelled before they started", drained);
        }
        info!("worker pool stopped");
    }

    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl TaskQueue for WorkerPool {
    fn submit(&self, task: Box<dyn Task>) -> Result<JobId, QueueError> {
        let sender = self
            .sender
            .read()
            .ok()
            .and_then(|guard| guard.clone())
            .ok_or(QueueError::Closed)?;

        let id = JobId::new();
        let name = task.name();
        sender
            .try_send(QueuedTask { id, task })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => QueueError::Full {
                    capacity: self.capacity,
                },
                mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
            })?;

        debug!("queued task {} ({})", id, name);
        Ok(id)
    }
}

async fn worker_loop(
    index: usize,
    receiver: Arc<Mutex<mpsc::Receiver<QueuedTask>>>,
    cancel: CancellationToken,
) {
    loop {
        let next = {
            let mut receiver = receiver.lock().await;
            tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                task = receiver.recv() => task,
            }
        };

        let Some(QueuedTask { id, task }) = next else {
            debug!("worker {} exiting", index);
            return;
        };

        let name = task.name();
        info!("worker {} running task {} ({})", index, id, name);
        let scope = cancel.child_token();
        let handle = tokio::spawn(task.run(scope));
        match handle.await {
            Ok(()) => debug!("task {} ({}) finished", id, name),
            Err(e) if e.is_panic() => error!("task {} ({}) panicked", id, name),
            Err(e) => warn!("task {} ({}) aborted: {}", id, name, e),
        }
    }
}
