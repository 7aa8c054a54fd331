//! A fixed-capacity FIFO buffer with non-blocking operations.

use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_queue::ArrayQueue;
use parking_lot::RwLock;

use crate::{BufferError, BufferResult, PutError};

/// A single fixed-capacity FIFO queue.
///
/// `put` and `get` never block. Admitters and withdrawers hold the shared side
/// of `closing_lock`; `close` takes the exclusive side, so an item can never be
/// admitted into a buffer that is being torn down.
pub struct BoundedBuffer<T> {
    queue: ArrayQueue<T>,
    closed: AtomicBool,
    closing_lock: RwLock<()>,
}

impl<T> BoundedBuffer<T> {
    /// Creates a buffer holding at most `capacity` items.
    ///
    /// # Examples
    ///
    /// ```
    /// use elasticpool::BoundedBuffer;
    ///
    /// let buffer: BoundedBuffer<u32> = BoundedBuffer::new(8).expect("Failed to create buffer");
    /// assert_eq!(buffer.capacity(), 8);
    /// ```
    pub fn new(capacity: usize) -> BufferResult<Self> {
        if capacity == 0 {
            return Err(BufferError::InvalidConfiguration(format!(
                "illegal capacity for buffer: {}",
                capacity
            )));
        }
        Ok(Self {
            queue: ArrayQueue::new(capacity),
            closed: AtomicBool::new(false),
            closing_lock: RwLock::new(()),
        })
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Snapshot of the occupied count.
    pub fn size(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.queue.is_full()
    }

    /// Admits `item` if there is room.
    ///
    /// Fails with [`BufferError::ClosedBuffer`] after `close`, or with
    /// [`BufferError::Overload`] when the buffer is momentarily full. The item
    /// is handed back inside the error either way.
    ///
    /// # Examples
    ///
    /// ```
    /// # use elasticpool::{BoundedBuffer, BufferError};
    /// let buffer = BoundedBuffer::new(1).unwrap();
    /// buffer.put(1).unwrap();
    /// let rejected = buffer.put(2).unwrap_err();
    /// assert_eq!(rejected.error(), &BufferError::Overload);
    /// assert_eq!(rejected.into_inner(), 2);
    /// ```
    pub fn put(&self, item: T) -> Result<(), PutError<T>> {
        let _guard = self.closing_lock.read();
        if self.closed() {
            return Err(PutError::new(item, BufferError::ClosedBuffer));
        }
        self.queue
            .push(item)
            .map_err(|item| PutError::new(item, BufferError::Overload))
    }

    /// Withdraws the oldest item.
    ///
    /// Fails with [`BufferError::ClosedBuffer`] after `close` (items still
    /// queued at that point are dropped) and with [`BufferError::Empty`] when
    /// nothing is available right now.
    pub fn get(&self) -> BufferResult<T> {
        let _guard = self.closing_lock.read();
        if self.closed() {
            return Err(BufferError::ClosedBuffer);
        }
        self.queue.pop().ok_or(BufferError::Empty)
    }

    /// Closes the buffer and drops whatever it still holds.
    ///
    /// Returns `true` only for the call that performed the transition.
    pub fn close(&self) -> bool {
        let _guard = self.closing_lock.write();
        if self
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        while self.queue.pop().is_some() {}
        true
    }

    pub fn closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl<T> std::fmt::Debug for BoundedBuffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedBuffer")
            .field("capacity", &self.capacity())
            .field("size", &self.size())
            .field("closed", &self.closed())
            .finish()
    }
}
