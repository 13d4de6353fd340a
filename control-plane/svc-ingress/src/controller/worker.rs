use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::errors::{ReconcileErr, report_error};
use super::queue::WorkQueue;
use super::reconcile::{ControllerContext, sync};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry,
    GaveUp,
}

/// Fixed set of workers draining one queue until it is shut down.
pub struct WorkerPool {
    ctx: Arc<ControllerContext>,
    queue: WorkQueue<String>,
    workers: usize,
    max_retry: u32,
}

impl WorkerPool {
    pub fn new(
        ctx: Arc<ControllerContext>,
        queue: WorkQueue<String>,
        workers: usize,
        max_retry: u32,
    ) -> Self {
        Self {
            ctx,
            queue,
            workers,
            max_retry,
        }
    }

    /// Run until `stop` fires, then shut the queue down and wait for
    /// in-flight items to finish.
    pub async fn run(self, stop: CancellationToken) {
        let mut set = JoinSet::new();
        for id in 0..self.workers {
            let ctx = self.ctx.clone();
            let queue = self.queue.clone();
            let max_retry = self.max_retry;
            set.spawn(async move { run_worker(id, ctx, queue, max_retry).await });
        }
        info!(workers = self.workers, "worker pool started");

        stop.cancelled().await;
        self.queue.shut_down();
        while let Some(res) = set.join_next().await {
            if let Err(e) = res {
                report_error("worker task failed", &e);
            }
        }
        info!("worker pool stopped");
    }
}

async fn run_worker(
    id: usize,
    ctx: Arc<ControllerContext>,
    queue: WorkQueue<String>,
    max_retry: u32,
) {
    debug!(worker = id, "worker started");
    while process_next_item(&ctx, &queue, max_retry).await {}
    debug!(worker = id, "worker exiting");
}

/// Process one key. Returns `false` once the queue is shut down.
pub async fn process_next_item(
    ctx: &ControllerContext,
    queue: &WorkQueue<String>,
    max_retry: u32,
) -> bool {
    let Some(lease) = queue.get().await else {
        return false;
    };
    let key = lease.item();
    match sync(ctx, key).await {
        Ok(outcome) => {
            debug!(%key, ?outcome, "sync succeeded");
            queue.forget(key);
        }
        Err(err) => {
            handle_error(queue, key, &err, max_retry);
        }
    }
    true
}

pub fn handle_error(
    queue: &WorkQueue<String>,
    key: &str,
    err: &ReconcileErr,
    max_retry: u32,
) -> RetryDecision {
    let item = key.to_owned();
    let requeues = queue.num_requeues(&item);
    if requeues <= max_retry {
        warn!(%key, requeues, error = %err, "sync failed; retrying");
        queue.add_rate_limited(item);
        return RetryDecision::Retry;
    }
    report_error(&format!("giving up on {key} after {requeues} retries"), err);
    queue.forget(&item);
    RetryDecision::GaveUp
}
