//! Token-bucket rate limiting
//!
//! A bucket holds at most `capacity` permits. Each permit taken from the
//! bucket is returned one window after it was granted, so at most `capacity`
//! grants fall within any rolling window and unused capacity never
//! accumulates beyond the bucket size.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::sleep;

use crate::metrics::RateLimiterMetrics;

/// Rate limiter shared by all workers of one stage
#[derive(Clone)]
pub struct RateLimiter {
    name: &'static str,
    semaphore: Arc<Semaphore>,
    capacity: usize,
    window: Duration,
}

impl RateLimiter {
    /// Create a limiter granting at most `permits` acquisitions per second
    ///
    /// # Arguments
    /// * `name` - Stage label used in metrics and logs
    /// * `permits` - Bucket capacity (N); values below 1 are raised to 1
    pub fn per_second(name: &'static str, permits: usize) -> Self {
        Self::new(name, permits, Duration::from_secs(1))
    }

    /// Create a limiter granting at most `permits` acquisitions per `window`
    pub fn new(name: &'static str, permits: usize, window: Duration) -> Self {
        let capacity = permits.clamp(1, Semaphore::MAX_PERMITS);
        Self {
            name,
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            window,
        }
    }

    /// Bucket capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Permits currently available without waiting
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Wait for a permit
    ///
    /// The permit is held by a background task for one window and then
    /// returned to the bucket; callers never release it themselves.
    pub async fn acquire(&self) -> Result<(), RateLimitError> {
        let mut metrics = RateLimiterMetrics::new(self.name);
        metrics.start_acquire();

        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| RateLimitError::AcquireError(e.to_string()))?;

        metrics.record_acquired();
        metrics.update_available_permits(self.available());

        let window = self.window;
        tokio::spawn(async move {
            sleep(window).await;
            drop(permit);
        });

        Ok(())
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("window", &self.window)
            .field("available", &self.available())
            .finish()
    }
}

/// Rate limiter errors
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    /// Failed to acquire a permit (the bucket was closed)
    #[error("failed to acquire rate limit permit: {0}")]
    AcquireError(String),
}
