//! Concurrency seam for the load driver.

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::error;

/// Body of one worker, called with the worker index.
pub type WorkerTask = Arc<dyn Fn(usize) -> BoxFuture<'static, ()> + Send + Sync>;

/// Runs `workers` copies of a task concurrently and waits for all of them.
#[async_trait]
pub trait WorkerPool: Send + Sync {
    async fn run_concurrently(&self, workers: usize, task: WorkerTask);
}

/// One tokio task per worker on the ambient runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioWorkerPool;

#[async_trait]
impl WorkerPool for TokioWorkerPool {
    async fn run_concurrently(&self, workers: usize, task: WorkerTask) {
        let mut set = JoinSet::new();
        for worker in 0..workers {
            set.spawn(task(worker));
        }

        while let Some(result) = set.join_next().await {
            if let Err(e) = result {
                error!("Load worker terminated abnormally: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_runs_every_worker_once() {
        let seen = Arc::new(AtomicUsize::new(0));
        let indices = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let task: WorkerTask = {
            let seen = Arc::clone(&seen);
            let indices = Arc::clone(&indices);
            Arc::new(move |worker: usize| {
                let seen = Arc::clone(&seen);
                let indices = Arc::clone(&indices);
                async move {
                    seen.fetch_add(1, Ordering::SeqCst);
                    indices.lock().push(worker);
                }
                .boxed()
            })
        };

        TokioWorkerPool.run_concurrently(5, task).await;

        assert_eq!(seen.load(Ordering::SeqCst), 5);
        let mut indices = indices.lock().clone();
        indices.sort_unstable();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_panicking_worker_does_not_abort_the_rest() {
        let finished = Arc::new(AtomicUsize::new(0));
        let task: WorkerTask = {
            let finished = Arc::clone(&finished);
            Arc::new(move |worker: usize| {
                let finished = Arc::clone(&finished);
                async move {
                    if worker == 0 {
                        panic!("worker 0 fails");
                    }
                    finished.fetch_add(1, Ordering::SeqCst);
                }
                .boxed()
            })
        };

        TokioWorkerPool.run_concurrently(3, task).await;
        assert_eq!(finished.load(Ordering::SeqCst), 2);
    }
}
