//! A thread-safe, capacity-bounded pool of ring buffers.
//!
//! [`AdaptiveBufferPool`] spreads items over up to `pool_capacity`
//! [`BoundedBuffer`]s. It adds a buffer when producers find every buffer full
//! and retires one when consumers keep finding buffers empty, so memory follows
//! the load without ever exceeding `pool_capacity * buffer_capacity` items.
//!
//! ```
//! use elasticpool::{AdaptiveBufferPool, BufferError};
//!
//! let pool = AdaptiveBufferPool::new(2, 2).unwrap();
//! for i in 0..4 {
//!     pool.put(i).unwrap();
//! }
//! assert_eq!(pool.size(), 2);
//! assert_eq!(pool.put(4).unwrap_err().error(), &BufferError::Overload);
//!
//! let mut items: Vec<_> = (0..4).map(|_| pool.get().unwrap()).collect();
//! items.sort();
//! assert_eq!(items, vec![0, 1, 2, 3]);
//! ```

mod buffer;
pub use buffer::BoundedBuffer;

mod config;
pub use config::{PoolConfig, RetryBudget};

mod error;
pub use error::{BufferError, BufferResult, PutError};

mod pool;
pub use pool::{AdaptiveBufferPool, PoolStats};

/// A pool shared between producer and consumer threads.
pub type SharedBufferPool<T> = std::sync::Arc<AdaptiveBufferPool<T>>;
