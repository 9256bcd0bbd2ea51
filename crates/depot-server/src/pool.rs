use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::error::{ServerError, ServerResult};

/// Fixed number of worker slots; each spawned task holds one slot until it
/// finishes.
#[derive(Clone, Debug)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Slots not currently held by a task.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Wait for a free slot, then spawn `task` on it.
    pub async fn execute<F>(&self, task: F) -> ServerResult<JoinHandle<F::Output>>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ServerError::PoolClosed)?;
        Ok(tokio::spawn(async move {
            let _permit = permit;
            task.await
        }))
    }

    /// Resolve once every running task has finished.
    pub async fn wait_idle(&self) {
        let all = u32::try_from(self.size).unwrap_or(u32::MAX);
        // Only fails if the semaphore was closed, which also means idle.
        let _ = self.permits.acquire_many(all).await;
    }
}
