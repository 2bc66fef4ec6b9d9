//! Configuration for the reactor runtime

use crate::error::{ReactorError, Result};

/// Reactor configuration builder
#[derive(Debug, Clone)]
pub struct ReactorConfig {
    /// Number of back-to-back reads performed per readiness notification
    pub read_aggressiveness: usize,
    /// Number of back-to-back writes performed per write round
    pub write_aggressiveness: usize,
    /// Size of the buffer acquired for each read dispatch
    pub read_buffer_size: usize,
    /// Worker threads interpreting decoded bytes
    pub worker_threads: usize,
    /// Maximum number of idle buffers retained by the pool
    pub buffer_pool_capacity: usize,
    /// Disable Nagle's algorithm on accepted/connected sockets
    pub nodelay: bool,
}

impl Default for ReactorConfig {
    fn default() -> Self {
        Self {
            read_aggressiveness: 2,
            write_aggressiveness: 2,
            read_buffer_size: 4096,
            worker_threads: 4,
            buffer_pool_capacity: 64,
            nodelay: true,
        }
    }
}

impl ReactorConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set how many reads are attempted per readiness notification
    pub fn read_aggressiveness(mut self, n: usize) -> Self {
        self.read_aggressiveness = n;
        self
    }

    /// Set how many writes are attempted per write round
    pub fn write_aggressiveness(mut self, n: usize) -> Self {
        self.write_aggressiveness = n;
        self
    }

    /// Set the per-read buffer size
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    /// Set the worker pool size
    pub fn worker_threads(mut self, n: usize) -> Self {
        self.worker_threads = n;
        self
    }

    /// Set the buffer pool capacity
    pub fn buffer_pool_capacity(mut self, n: usize) -> Self {
        self.buffer_pool_capacity = n;
        self
    }

    /// Enable or disable TCP_NODELAY on managed sockets
    pub fn nodelay(mut self, enabled: bool) -> Self {
        self.nodelay = enabled;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.read_aggressiveness == 0 || self.write_aggressiveness == 0 {
            return Err(ReactorError::config(
                "aggressiveness must be greater than 0",
            ));
        }

        if self.read_buffer_size == 0 {
            return Err(ReactorError::config(
                "read buffer size must be greater than 0",
            ));
        }

        if self.worker_threads == 0 {
            return Err(ReactorError::config(
                "worker pool needs at least one thread",
            ));
        }

        Ok(())
    }
}

/// Preset configurations for common deployments
impl ReactorConfig {
    /// Many small messages, low latency: single read per notification keeps
    /// per-channel latency flat under fan-in.
    pub fn low_latency() -> Self {
        Self::default()
            .read_aggressiveness(1)
            .read_buffer_size(1500)
            .nodelay(true)
    }

    /// Bulk transfer: larger buffers and deeper aggressive loops amortize
    /// selector round-trips.
    pub fn throughput() -> Self {
        Self::default()
            .read_aggressiveness(4)
            .write_aggressiveness(4)
            .read_buffer_size(64 * 1024)
            .buffer_pool_capacity(128)
    }
}
