//! Application-facing extension point: per-connection byte consumers

use crate::reactor::channel::ChannelEvents;
use crate::reactor::coordinator::Coordinator;
use std::sync::{Arc, Weak};
use tracing::warn;

/// Consumer of decoded bytes, created once per connection.
pub trait Interpreter: Send + Sync {
    /// Consume one batch of bytes. The slice is valid only for the duration
    /// of this call; copy anything that must outlive it.
    ///
    /// READ interest stays disabled while a batch is being delivered: call
    /// `needs_read(true)` on the coordinator when ready for the next one.
    fn read(&self, bytes: &[u8]);

    /// End of stream; at most once, after every prior `read`.
    fn on_close(&self) {}
}

/// Creates one interpreter per accepted or connected channel.
pub trait InterpreterFactory: Send + Sync {
    fn new_interpreter(&self, coordinator: &Arc<Coordinator>) -> Arc<dyn Interpreter>;
}

impl<F> InterpreterFactory for F
where
    F: Fn(&Arc<Coordinator>) -> Arc<dyn Interpreter> + Send + Sync,
{
    fn new_interpreter(&self, coordinator: &Arc<Coordinator>) -> Arc<dyn Interpreter> {
        self(coordinator)
    }
}

/// Writes every batch back to the peer, then asks for more.
pub struct EchoInterpreter {
    coordinator: Weak<Coordinator>,
}

impl EchoInterpreter {
    pub fn new(coordinator: &Arc<Coordinator>) -> Arc<dyn Interpreter> {
        Arc::new(Self {
            coordinator: Arc::downgrade(coordinator),
        })
    }

    /// Factory wiring an echo interpreter per connection
    pub fn factory() -> impl InterpreterFactory {
        EchoInterpreter::new
    }
}

impl Interpreter for EchoInterpreter {
    fn read(&self, bytes: &[u8]) {
        let Some(coordinator) = self.coordinator.upgrade() else {
            return;
        };
        if let Err(e) = coordinator.write(bytes) {
            warn!(error = %e, "echo write failed");
            return;
        }
        coordinator.needs_read(true);
    }
}
