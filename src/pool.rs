//! A self-scaling pool of [`BoundedBuffer`]s.
//!
//! Every `put`/`get` borrows one buffer from the rotation, makes a single
//! attempt on it and then either hands it back or retires it. The pool grows by
//! one buffer when a `put` finds every buffer full and shrinks by one when a
//! `get` keeps finding buffers empty.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use crossbeam_channel::{Receiver, SendError, Sender};
use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::{BoundedBuffer, BufferError, BufferResult, PoolConfig, PutError};

/// Exclusive ownership of one live buffer. Exactly one of these exists per
/// live buffer: it is either queued in the rotation or held by a single caller.
struct BufferHandle<T> {
    id: u64,
    buffer: BoundedBuffer<T>,
}

/// Point-in-time counters for an [`AdaptiveBufferPool`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoolStats {
    pub pool_capacity: usize,
    pub live_buffers: usize,
    pub buffer_capacity: usize,
    pub total_items: u64,
    pub items_put: u64,
    pub items_taken: u64,
    /// Items discarded because their buffer was closed with the pool.
    pub items_dropped: u64,
    pub buffers_created: usize,
    pub buffers_retired: usize,
}

impl fmt::Display for PoolStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cap({}) len({}) bufCap({}) total({}) put({}) taken({}) dropped({}) created({}) retired({})",
            self.pool_capacity,
            self.live_buffers,
            self.buffer_capacity,
            self.total_items,
            self.items_put,
            self.items_taken,
            self.items_dropped,
            self.buffers_created,
            self.buffers_retired,
        )
    }
}

/// A capacity-bounded, auto-scaling item queue built from fixed-size buffers.
///
/// There is no global FIFO order: each buffer is FIFO, but callers are routed
/// to whichever buffer the rotation hands them.
pub struct AdaptiveBufferPool<T> {
    config: PoolConfig,
    live: AtomicUsize,
    total: AtomicU64,
    closed: AtomicBool,
    /// Sending half of the rotation. Also the structural lock: growth, shrink
    /// and close take it exclusively, returning a buffer takes it shared.
    /// `None` once the pool is closed.
    rotation: RwLock<Option<Sender<BufferHandle<T>>>>,
    available: Receiver<BufferHandle<T>>,
    next_id: AtomicU64,
    items_put: AtomicU64,
    items_taken: AtomicU64,
    items_dropped: AtomicU64,
    buffers_created: AtomicUsize,
    buffers_retired: AtomicUsize,
}

impl<T> AdaptiveBufferPool<T> {
    /// Creates a pool of at most `pool_capacity` buffers, each holding
    /// `buffer_capacity` items. The pool starts with a single buffer.
    ///
    /// # Examples
    ///
    /// ```
    /// use elasticpool::AdaptiveBufferPool;
    ///
    /// let pool: AdaptiveBufferPool<u64> = AdaptiveBufferPool::new(4, 128).expect("Failed to create pool");
    /// assert_eq!(pool.capacity(), 4);
    /// assert_eq!(pool.size(), 1);
    /// ```
    pub fn new(pool_capacity: usize, buffer_capacity: usize) -> BufferResult<Self> {
        Self::with_config(
            PoolConfig::default()
                .with_pool_capacity(pool_capacity)
                .with_buffer_capacity(buffer_capacity),
        )
    }

    pub fn with_config(config: PoolConfig) -> BufferResult<Self> {
        config.validate()?;
        let buffer = BoundedBuffer::new(config.buffer_capacity)?;

        // The rotation never holds more handles than there are live buffers,
        // so sends into it never block.
        let (sender, available) = crossbeam_channel::bounded(config.pool_capacity);
        sender
            .send(BufferHandle { id: 0, buffer })
            .map_err(|_| BufferError::ClosedPool)?;

        Ok(Self {
            config,
            live: AtomicUsize::new(1),
            total: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            rotation: RwLock::new(Some(sender)),
            available,
            next_id: AtomicU64::new(1),
            items_put: AtomicU64::new(0),
            items_taken: AtomicU64::new(0),
            items_dropped: AtomicU64::new(0),
            buffers_created: AtomicUsize::new(1),
            buffers_retired: AtomicUsize::new(0),
        })
    }

    /// Maximum number of buffers.
    pub fn capacity(&self) -> usize {
        self.config.pool_capacity
    }

    /// Current number of live buffers.
    pub fn size(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    pub fn buffer_capacity(&self) -> usize {
        self.config.buffer_capacity
    }

    /// Best-effort count of items across all live buffers.
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    pub fn closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            pool_capacity: self.capacity(),
            live_buffers: self.size(),
            buffer_capacity: self.buffer_capacity(),
            total_items: self.total(),
            items_put: self.items_put.load(Ordering::Relaxed),
            items_taken: self.items_taken.load(Ordering::Relaxed),
            items_dropped: self.items_dropped.load(Ordering::Relaxed),
            buffers_created: self.buffers_created.load(Ordering::Relaxed),
            buffers_retired: self.buffers_retired.load(Ordering::Relaxed),
        }
    }

    /// Puts `item` into the pool.
    ///
    /// Walks the rotation until the item is admitted or the retry budget is
    /// spent. In the latter case the pool grows by one buffer, the item goes
    /// straight into it, and the new buffer is queued in the rotation before
    /// the last full buffer tried. If the pool is already at capacity the call
    /// fails with [`BufferError::Overload`] and the item is handed back.
    ///
    /// # Examples
    ///
    /// ```
    /// # use elasticpool::{AdaptiveBufferPool, BufferError};
    /// let pool = AdaptiveBufferPool::new(2, 1).unwrap();
    /// pool.put('a').unwrap();
    /// pool.put('b').unwrap(); // grows to a second buffer
    /// assert_eq!(pool.size(), 2);
    ///
    /// let rejected = pool.put('c').unwrap_err();
    /// assert_eq!(rejected.error(), &BufferError::Overload);
    /// ```
    pub fn put(&self, item: T) -> Result<(), PutError<T>> {
        if self.closed() {
            return Err(PutError::new(item, BufferError::ClosedPool));
        }

        let try_times = self.config.retry_budget.resolve(self.size());
        let mut attempts = 0;
        let mut item = item;
        loop {
            let handle = match self.borrow() {
                Ok(handle) => handle,
                Err(error) => return Err(PutError::new(item, error)),
            };
            if self.closed() {
                self.recycle(handle);
                return Err(PutError::new(item, BufferError::ClosedPool));
            }

            // Counted before the item becomes visible so `total` never
            // undercounts what a concurrent `get` can observe.
            self.total.fetch_add(1, Ordering::AcqRel);
            match handle.buffer.put(item) {
                Ok(()) => {
                    self.recycle(handle);
                    self.items_put.fetch_add(1, Ordering::Relaxed);
                    return Ok(());
                }
                Err(rejected) => {
                    self.total.fetch_sub(1, Ordering::AcqRel);
                    if rejected.error.is_closed() {
                        self.recycle(handle);
                        return Err(PutError::new(rejected.item, BufferError::ClosedPool));
                    }
                    item = rejected.item;
                }
            }

            attempts += 1;
            if attempts > try_times {
                // The new buffer enters the rotation ahead of the full one.
                let grown = self.grow(item);
                self.recycle(handle);
                return grown;
            }
            self.recycle(handle);
        }
    }

    /// Takes an item from the pool.
    ///
    /// Fails with [`BufferError::Empty`] once the retry budget is spent
    /// without finding an item. The buffer examined on that final attempt is
    /// retired if it is empty and more than one buffer is live.
    pub fn get(&self) -> BufferResult<T> {
        if self.closed() {
            return Err(BufferError::ClosedPool);
        }

        let try_times = self.config.retry_budget.resolve(self.size());
        let mut attempts = 0;
        loop {
            let handle = self.borrow()?;
            if self.closed() {
                self.recycle(handle);
                return Err(BufferError::ClosedPool);
            }

            match handle.buffer.get() {
                Ok(item) => {
                    self.recycle(handle);
                    self.total.fetch_sub(1, Ordering::AcqRel);
                    self.items_taken.fetch_add(1, Ordering::Relaxed);
                    return Ok(item);
                }
                Err(BufferError::Empty) => {
                    attempts += 1;
                    if attempts > try_times {
                        self.recycle_or_shrink(handle);
                        trace!(attempts, "no items found in rotation");
                        return Err(BufferError::Empty);
                    }
                    self.recycle(handle);
                }
                Err(_) => {
                    self.recycle(handle);
                    return Err(BufferError::ClosedPool);
                }
            }
        }
    }

    /// Closes the pool and every buffer in it.
    ///
    /// Buffers checked out by in-flight calls are closed as those calls hand
    /// them back. Returns `true` only for the call that performed the
    /// transition.
    pub fn close(&self) -> bool {
        let mut rotation = self.rotation.write();
        if self
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        // Dropping the only sender disconnects the rotation once it drains,
        // which wakes every caller blocked in `borrow`.
        *rotation = None;
        let mut retired = 0;
        for handle in self.available.try_iter() {
            self.retire(handle);
            retired += 1;
        }
        debug!(retired, in_flight = self.size(), "pool closed");
        true
    }

    /// Takes the next buffer out of the rotation, waiting while every live
    /// buffer is checked out.
    fn borrow(&self) -> BufferResult<BufferHandle<T>> {
        self.available.recv().map_err(|_| BufferError::ClosedPool)
    }

    /// Hands a buffer back to the rotation, or retires it if the pool closed
    /// while it was checked out.
    fn recycle(&self, handle: BufferHandle<T>) {
        let rotation = self.rotation.read();
        match &*rotation {
            Some(sender) => self.enqueue(sender, handle),
            None => self.retire(handle),
        }
    }

    /// Like [`recycle`](Self::recycle), but retires the buffer instead when it
    /// is empty and is not the last live buffer.
    fn recycle_or_shrink(&self, handle: BufferHandle<T>) {
        let rotation = self.rotation.write();
        let Some(sender) = &*rotation else {
            self.retire(handle);
            return;
        };

        if handle.buffer.is_empty() && self.size() > 1 {
            let id = handle.id;
            self.retire(handle);
            debug!(buffer_id = id, live = self.size(), "retired idle buffer");
        } else {
            self.enqueue(sender, handle);
        }
    }

    /// Adds a fresh buffer holding `item`, provided the pool has room.
    fn grow(&self, item: T) -> Result<(), PutError<T>> {
        let rotation = self.rotation.write();
        let Some(sender) = &*rotation else {
            return Err(PutError::new(item, BufferError::ClosedPool));
        };

        if self.size() >= self.capacity() {
            trace!(live = self.size(), "pool saturated");
            return Err(PutError::new(item, BufferError::Overload));
        }

        let buffer = match BoundedBuffer::new(self.config.buffer_capacity) {
            Ok(buffer) => buffer,
            Err(error) => return Err(PutError::new(item, error)),
        };
        buffer.put(item)?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.live.fetch_add(1, Ordering::AcqRel);
        self.total.fetch_add(1, Ordering::AcqRel);
        self.items_put.fetch_add(1, Ordering::Relaxed);
        self.buffers_created.fetch_add(1, Ordering::Relaxed);
        self.enqueue(sender, BufferHandle { id, buffer });
        debug!(buffer_id = id, live = self.size(), "grew pool");
        Ok(())
    }

    fn enqueue(&self, sender: &Sender<BufferHandle<T>>, handle: BufferHandle<T>) {
        // The pool holds the receiver, so the rotation cannot disconnect
        // underneath a live sender.
        if let Err(SendError(handle)) = sender.send(handle) {
            self.retire(handle);
        }
    }

    /// Closes a buffer for good and removes it from the live count.
    fn retire(&self, handle: BufferHandle<T>) {
        let dropped = handle.buffer.size() as u64;
        handle.buffer.close();
        if dropped > 0 {
            self.total.fetch_sub(dropped, Ordering::AcqRel);
            self.items_dropped.fetch_add(dropped, Ordering::Relaxed);
        }
        self.live.fetch_sub(1, Ordering::AcqRel);
        self.buffers_retired.fetch_add(1, Ordering::Relaxed);
    }
}

impl<T> fmt::Debug for AdaptiveBufferPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdaptiveBufferPool")
            .field("stats", &self.stats())
            .field("closed", &self.closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RetryBudget;

    #[test]
    fn test_invalid_configuration() {
        assert!(matches!(
            AdaptiveBufferPool::<i32>::new(0, 4),
            Err(BufferError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            AdaptiveBufferPool::<i32>::new(4, 0),
            Err(BufferError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_starts_with_one_buffer() {
        let pool = AdaptiveBufferPool::<i32>::new(3, 8).unwrap();
        assert_eq!(pool.capacity(), 3);
        assert_eq!(pool.size(), 1);
        assert_eq!(pool.buffer_capacity(), 8);
        assert_eq!(pool.total(), 0);
        assert!(pool.is_empty());
        assert!(!pool.closed());
    }

    #[test]
    fn test_grow_then_drain_scenario() {
        let pool = AdaptiveBufferPool::new(2, 2).unwrap();
        pool.put('A').unwrap();
        pool.put('B').unwrap();
        assert_eq!(pool.size(), 1);

        pool.put('C').unwrap();
        assert_eq!(pool.size(), 2);
        assert_eq!(pool.total(), 3);

        // The grown buffer is handed out first, then the first buffer in FIFO
        // order.
        let drained: Vec<char> = (0..3).map(|_| pool.get().unwrap()).collect();
        assert_eq!(drained, vec!['C', 'A', 'B']);
        assert_eq!(pool.size(), 2);
        assert_eq!(pool.total(), 0);
    }

    #[test]
    fn test_saturated_pool_overloads() {
        let pool = AdaptiveBufferPool::new(2, 1).unwrap();
        pool.put(1).unwrap();
        pool.put(2).unwrap();
        assert_eq!(pool.size(), 2);

        let rejected = pool.put(3).unwrap_err();
        assert_eq!(rejected.error(), &BufferError::Overload);
        assert_eq!(rejected.into_inner(), 3);
        assert_eq!(pool.size(), 2);
        assert_eq!(pool.total(), 2);
    }

    #[test]
    fn test_get_on_empty_pool() {
        let pool = AdaptiveBufferPool::<i32>::new(4, 4).unwrap();
        assert_eq!(pool.get(), Err(BufferError::Empty));
        assert_eq!(pool.size(), 1, "the last buffer is never retired");
    }

    #[test]
    fn test_idle_buffers_are_retired() {
        let pool = AdaptiveBufferPool::new(3, 1).unwrap();
        for i in 0..3 {
            pool.put(i).unwrap();
        }
        assert_eq!(pool.size(), 3);

        let mut drained = Vec::new();
        while let Ok(item) = pool.get() {
            drained.push(item);
        }
        drained.sort();
        assert_eq!(drained, vec![0, 1, 2]);

        for _ in 0..4 {
            assert_eq!(pool.get(), Err(BufferError::Empty));
        }
        assert_eq!(pool.size(), 1);

        let stats = pool.stats();
        assert_eq!(stats.buffers_created, 3);
        assert_eq!(stats.buffers_retired, 2);
    }

    #[test]
    fn test_fixed_retry_budget_still_visits_every_buffer() {
        let config = PoolConfig::default()
            .with_pool_capacity(3)
            .with_buffer_capacity(1)
            .with_retry_budget(RetryBudget::Fixed(1));
        let pool = AdaptiveBufferPool::with_config(config).unwrap();
        for i in 0..3 {
            pool.put(i).unwrap();
        }
        assert_eq!(pool.size(), 3);

        // One slot is free somewhere, so a saturated pool must still find it.
        pool.get().unwrap();
        pool.put(99).unwrap();
        assert_eq!(pool.total(), 3);

        for _ in 0..3 {
            pool.get().unwrap();
        }
        pool.put(3).unwrap();
        assert_eq!(pool.get(), Ok(3));
        assert_eq!(pool.size(), 3, "no buffer retired while one held an item");
    }

    #[test]
    fn test_fixed_retry_budget_grows_after_budget() {
        let config = PoolConfig::default()
            .with_pool_capacity(4)
            .with_buffer_capacity(1)
            .with_retry_budget(RetryBudget::Fixed(1));
        let pool = AdaptiveBufferPool::with_config(config).unwrap();
        for i in 0..4 {
            pool.put(i).unwrap();
        }
        assert_eq!(pool.size(), 4);
        assert!(pool.put(4).is_err());
    }

    #[test]
    fn test_close_is_idempotent() {
        let pool = AdaptiveBufferPool::new(2, 2).unwrap();
        pool.put(1).unwrap();
        pool.put(2).unwrap();
        pool.put(3).unwrap();

        assert!(pool.close());
        assert!(pool.closed());
        assert!(!pool.close());

        assert_eq!(pool.size(), 0);
        assert_eq!(pool.total(), 0);
        assert_eq!(pool.get(), Err(BufferError::ClosedPool));
        let rejected = pool.put(4).unwrap_err();
        assert_eq!(rejected.error(), &BufferError::ClosedPool);
        assert_eq!(rejected.into_inner(), 4);

        let stats = pool.stats();
        assert_eq!(stats.items_dropped, 3);
        assert_eq!(stats.buffers_retired, 2);
    }

    #[test]
    fn test_stats_display() {
        let pool = AdaptiveBufferPool::new(2, 4).unwrap();
        pool.put(1u8).unwrap();
        assert_eq!(
            pool.stats().to_string(),
            "cap(2) len(1) bufCap(4) total(1) put(1) taken(0) dropped(0) created(1) retired(0)"
        );
        assert!(format!("{:?}", pool).contains("AdaptiveBufferPool"));
    }
}
