//! Bounded multi-consumer work queues
//!
//! `tokio::sync::mpsc` channels have a single receiver; [`WorkQueue`] shares
//! it between the workers of one stage. Producers hold ordinary
//! [`mpsc::Sender`] clones and the queue closes once every sender is dropped.

use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// Create a bounded queue with room for `capacity` items
///
/// A capacity of 1 makes every send wait until a worker has taken the
/// previous item.
pub fn work_queue<T>(capacity: usize) -> (mpsc::Sender<T>, WorkQueue<T>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        tx,
        WorkQueue {
            rx: Arc::new(Mutex::new(rx)),
        },
    )
}

/// Receiving half shared by a worker pool
#[derive(Debug)]
pub struct WorkQueue<T> {
    rx: Arc<Mutex<mpsc::Receiver<T>>>,
}

impl<T> Clone for WorkQueue<T> {
    fn clone(&self) -> Self {
        Self {
            rx: self.rx.clone(),
        }
    }
}

impl<T> WorkQueue<T> {
    /// Take the next item; `None` once the queue is closed and drained
    pub async fn recv(&self) -> Option<T> {
        self.rx.lock().await.recv().await
    }
}
