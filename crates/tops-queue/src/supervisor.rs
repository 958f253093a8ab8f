use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Work a CDN worker performs each time it is signalled.
#[async_trait]
pub trait CdnJob: Send + Sync {
    async fn run(&self, cdn: &str) -> anyhow::Result<()>;
}

struct CdnWorker {
    signal: Arc<Notify>,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl CdnWorker {
    fn is_alive(&self) -> bool {
        !self.handle.is_finished() && !self.cancel.is_cancelled()
    }
}

/// Owns one worker per CDN. Workers are reachable only through this type:
/// signals to a busy worker coalesce into a single extra run, and a worker
/// whose CDN no longer exists is stopped by [`stop_if_orphaned`].
///
/// [`stop_if_orphaned`]: CdnWorkerSupervisor::stop_if_orphaned
pub struct CdnWorkerSupervisor {
    job: Arc<dyn CdnJob>,
    workers: Mutex<HashMap<String, CdnWorker>>,
    cancel: CancellationToken,
}

impl CdnWorkerSupervisor {
    pub fn new(job: Arc<dyn CdnJob>) -> Self {
        Self {
            job,
            workers: Mutex::new(HashMap::new()),
            cancel: CancellationToken::new(),
        }
    }

    /// Start a worker for `cdn`, or signal the existing one to run again.
    pub async fn start_or_signal(&self, cdn: &str) {
        let mut workers = self.workers.lock().await;

        if let Some(worker) = workers.get(cdn) {
            if worker.is_alive() {
                debug!("signalling cleanup worker for CDN {}", cdn);
                worker.signal.notify_one();
                return;
            }
        }

        let signal = Arc::new(Notify::new());
        let cancel = self.cancel.child_token();
        signal.notify_one();

        let handle = tokio::spawn(run_worker(
            cdn.to_string(),
            self.job.clone(),
            signal.clone(),
            cancel.clone(),
        ));
        info!("started cleanup worker for CDN {}", cdn);
        workers.insert(
            cdn.to_string(),
            CdnWorker {
                signal,
                cancel,
                handle,
            },
        );
    }

    /// Stop every worker whose CDN is not in `existing`. Returns the stopped CDN names.
    pub async fn stop_if_orphaned(&self, existing: &HashSet<String>) -> Vec<String> {
        let mut workers = self.workers.lock().await;
        let orphaned: Vec<String> = workers
            .keys()
            .filter(|cdn| !existing.contains(*cdn))
            .cloned()
            .collect();

        for cdn in &orphaned {
            if let Some(worker) = workers.remove(cdn) {
                worker.cancel.cancel();
                info!("stopped cleanup worker for removed CDN {}", cdn);
            }
        }
        orphaned
    }

    pub async fn is_running(&self, cdn: &str) -> bool {
        self.workers
            .lock()
            .await
            .get(cdn)
            .is_some_and(CdnWorker::is_alive)
    }

    pub async fn worker_count(&self) -> usize {
        self.workers.lock().await.len()
    }

    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let workers: Vec<CdnWorker> = self.workers.lock().await.drain().map(|(_, w)| w).collect();
        for worker in workers {
            if let Err(e) = worker.handle.await {
                error!("cleanup worker terminated abnormally: {}", e);
            }
        }
    }
}

async fn run_worker(
    cdn: String,
    job: Arc<dyn CdnJob>,
    signal: Arc<Notify>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("cleanup worker for CDN {} exiting", cdn);
                return;
            }
            _ = signal.notified() => {}
        }

        if let Err(e) = job.run(&cdn).await {
            error!("cleanup for CDN {} failed: {:#}", cdn, e);
        }
    }
}
