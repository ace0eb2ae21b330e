//! Bounded hand-off queues between pipeline workers.

use crate::error::BootError;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("Queue {0} closed")]
    Closed(&'static str),
}

/// Fixed-capacity multi-producer, multi-consumer FIFO.
///
/// `push` waits while the queue is full and `pop` waits while it is empty;
/// nothing is ever dropped. Clones are handles onto the same queue.
pub struct BoundedQueue<T> {
    name: &'static str,
    capacity: usize,
    tx: async_channel::Sender<T>,
    rx: async_channel::Receiver<T>,
}

/// Upstream work from the pool client, consumed by job dispatch.
pub type WorkQueue<W> = BoundedQueue<W>;

/// Device jobs from job dispatch, consumed by hardware polling.
pub type JobQueue<J> = BoundedQueue<J>;

impl<T> BoundedQueue<T> {
    pub fn new(name: &'static str, capacity: usize) -> Result<Self, BootError> {
        if capacity == 0 {
            return Err(BootError::InvalidQueueCapacity { queue: name });
        }
        let (tx, rx) = async_channel::bounded(capacity);
        Ok(Self {
            name,
            capacity,
            tx,
            rx,
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.tx.is_full()
    }

    /// Enqueue, waiting for space if the queue is full.
    pub async fn push(&self, item: T) -> Result<(), QueueError> {
        self.tx
            .send(item)
            .await
            .map_err(|_| QueueError::Closed(self.name))
    }

    /// Dequeue, waiting for an item if the queue is empty.
    pub async fn pop(&self) -> Result<T, QueueError> {
        self.rx
            .recv()
            .await
            .map_err(|_| QueueError::Closed(self.name))
    }
}

impl<T> Clone for BoundedQueue<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            capacity: self.capacity,
            tx: self.tx.clone(),
            rx: self.rx.clone(),
        }
    }
}

impl<T> std::fmt::Debug for BoundedQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedQueue")
            .field("name", &self.name)
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}
