//! Bounded pool for blocking work (OCR, PDF rendering).
//!
//! Jobs run on tokio's blocking threads; a semaphore caps how many of ours
//! run at once so a burst of uploads cannot starve the rest of the runtime.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::trace;

#[derive(Error, Debug)]
pub enum BlockingError {
    #[error("blocking pool is closed")]
    Closed,
    #[error("blocking task panicked or was cancelled: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Clone)]
pub struct BlockingPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl BlockingPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Submit `job` and wait for its result.
    pub async fn run<F, T>(&self, job: F) -> Result<T, BlockingError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| BlockingError::Closed)?;
        trace!(available = self.permits.available_permits(), "blocking job started");

        let out = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            job()
        })
        .await?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn returns_job_output() {
        let pool = BlockingPool::new(2);
        let v = pool.run(|| 21 * 2).await.unwrap();
        assert_eq!(v, 42);
    }

    #[tokio::test]
    async fn zero_size_is_clamped() {
        assert_eq!(BlockingPool::new(0).size(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn never_exceeds_size() {
        let pool = BlockingPool::new(2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let pool = pool.clone();
            let running = running.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                pool.run(move || {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(20));
                    running.fetch_sub(1, Ordering::SeqCst);
                })
                .await
                .unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn panic_surfaces_as_join_error() {
        let pool = BlockingPool::new(1);
        let err = pool.run(|| -> u32 { panic!("boom") }).await.unwrap_err();
        assert!(matches!(err, BlockingError::Join(_)));
        // permit was released
        assert_eq!(pool.run(|| 1).await.unwrap(), 1);
    }
}
