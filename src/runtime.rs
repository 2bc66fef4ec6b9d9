//! Runtime: one selector, one worker pool, one buffer pool

use crate::buffer_pool::BufferPool;
use crate::config::ReactorConfig;
use crate::error::Result;
use crate::metrics::ReactorMetrics;
use crate::reactor::selector::Selector;
use crate::workers::WorkerPool;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// The shared infrastructure every connection of a process plugs into.
/// Cheap to clone; all clones drive the same selector and pools.
#[derive(Clone)]
pub struct Runtime {
    config: ReactorConfig,
    selector: Selector,
    workers: Arc<WorkerPool>,
    buffers: Arc<BufferPool>,
    metrics: Arc<ReactorMetrics>,
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime").finish_non_exhaustive()
    }
}

impl Runtime {
    /// Validate the configuration and start the selector and worker threads.
    pub fn new(config: ReactorConfig) -> Result<Runtime> {
        config.validate()?;

        let selector = Selector::new()?;
        let workers = Arc::new(WorkerPool::new(config.worker_threads));
        let buffers = Arc::new(BufferPool::new(
            config.buffer_pool_capacity,
            config.read_buffer_size,
        ));
        let metrics = Arc::new(ReactorMetrics::new());

        info!(workers = config.worker_threads, "reactor runtime started");
        Ok(Runtime {
            config,
            selector,
            workers,
            buffers,
            metrics,
        })
    }

    pub fn config(&self) -> &ReactorConfig {
        &self.config
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    pub fn workers(&self) -> &Arc<WorkerPool> {
        &self.workers
    }

    pub fn buffers(&self) -> &Arc<BufferPool> {
        &self.buffers
    }

    pub fn metrics(&self) -> &Arc<ReactorMetrics> {
        &self.metrics
    }

    /// Close the selector, wait for its loop to exit, then drain the worker
    /// pool. Returns false if the selector thread did not exit in time.
    pub fn shutdown(&self, timeout: Duration) -> bool {
        self.selector.close();
        let joined = self.selector.join(timeout);
        self.workers.shutdown();
        joined
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReactorError;

    #[test]
    fn rejects_invalid_config() {
        let err = Runtime::new(ReactorConfig::new().worker_threads(0)).unwrap_err();
        assert!(matches!(err, ReactorError::Config { .. }));
    }

    #[test]
    fn starts_and_shuts_down() {
        let runtime = Runtime::new(ReactorConfig::default()).expect("runtime");
        assert!(runtime.selector().is_open());
        assert!(runtime.shutdown(Duration::from_secs(5)));
    }
}
