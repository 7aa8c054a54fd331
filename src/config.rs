use crate::BufferError;

/// How many buffer attempts a single `put`/`get` makes before it grows,
/// shrinks or gives up.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum RetryBudget {
    /// The live buffer count observed when the call starts.
    #[default]
    LiveBuffers,
    /// A fixed number of attempts. Never fewer than the live buffer count,
    /// so every buffer is still visited before the pool grows, shrinks or
    /// gives up.
    Fixed(usize),
}

impl RetryBudget {
    pub(crate) fn resolve(self, live_buffers: usize) -> usize {
        match self {
            RetryBudget::LiveBuffers => live_buffers,
            RetryBudget::Fixed(n) => n.max(live_buffers),
        }
    }
}

#[derive(Clone, Debug)]
pub struct PoolConfig {
    pub pool_capacity: usize,
    pub buffer_capacity: usize,
    pub retry_budget: RetryBudget,
}

impl PoolConfig {
    pub fn validate(&self) -> Result<(), BufferError> {
        if self.pool_capacity == 0 {
            return Err(BufferError::InvalidConfiguration(
                "pool_capacity must be greater than zero".to_string(),
            ));
        }
        if self.buffer_capacity == 0 {
            return Err(BufferError::InvalidConfiguration(
                "buffer_capacity must be greater than zero".to_string(),
            ));
        }
        if self.retry_budget == RetryBudget::Fixed(0) {
            return Err(BufferError::InvalidConfiguration(
                "a fixed retry budget must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_pool_capacity(mut self, capacity: usize) -> Self {
        self.pool_capacity = capacity;
        self
    }

    pub fn with_buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity;
        self
    }

    pub fn with_retry_budget(mut self, budget: RetryBudget) -> Self {
        self.retry_budget = budget;
        self
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            pool_capacity: 16,
            buffer_capacity: 1024,
            retry_budget: RetryBudget::LiveBuffers,
        }
    }
}
