//! Coordinator: per-connection policy between readiness and the interpreter
//!
//! The coordinator is the listener the selector dispatches to and the event
//! sink the channel reports into. It owns the channel and the interpreter,
//! translates readiness into worker-pool read tasks, and issues interest-set
//! requests back to the selector.

use crate::error::ReactorError;
use crate::interpreter::Interpreter;
use crate::metrics::ReactorMetrics;
use crate::reactor::channel::{Channel, ChannelEvents};
use crate::reactor::ops::Ops;
use crate::reactor::selector::{Listener, Selector};
use crate::workers::WorkerPool;

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use tracing::{debug, error, trace};

pub struct Coordinator {
    selector: Selector,
    workers: Arc<WorkerPool>,
    metrics: Arc<ReactorMetrics>,
    read_buffer_size: usize,
    weak_self: Weak<Coordinator>,
    channel: OnceLock<Arc<Channel>>,
    // Interest requests are routed through this sink so a wrapper can
    // interpose on the whole callback stream; defaults to the coordinator
    // itself.
    events: OnceLock<Weak<dyn ChannelEvents>>,
    interpreter: RwLock<Option<Arc<dyn Interpreter>>>,
    closed: AtomicBool,
}

impl Coordinator {
    pub fn new(
        selector: Selector,
        workers: Arc<WorkerPool>,
        read_buffer_size: usize,
        metrics: Arc<ReactorMetrics>,
    ) -> Arc<Coordinator> {
        Arc::new_cyclic(|weak_self| Coordinator {
            selector,
            workers,
            metrics,
            read_buffer_size,
            weak_self: weak_self.clone(),
            channel: OnceLock::new(),
            events: OnceLock::new(),
            interpreter: RwLock::new(None),
            closed: AtomicBool::new(false),
        })
    }

    /// Attach the channel this coordinator drives. Must happen before the
    /// channel is registered with the selector.
    pub fn set_channel(&self, channel: Arc<Channel>) {
        let _ = self.channel.set(channel);
    }

    /// Route interest requests through a custom sink instead of this
    /// coordinator. The channel must be built against the same sink.
    pub fn set_events(&self, events: Weak<dyn ChannelEvents>) {
        let _ = self.events.set(events);
    }

    pub fn set_interpreter(&self, interpreter: Arc<dyn Interpreter>) {
        *self.interpreter.write() = Some(interpreter);
    }

    pub fn channel(&self) -> Option<Arc<Channel>> {
        self.channel.get().cloned()
    }

    pub fn read_buffer_size(&self) -> usize {
        self.read_buffer_size
    }

    /// Write through the attached channel; blocks on backpressure.
    pub fn write(&self, data: &[u8]) -> crate::error::Result<()> {
        match self.channel() {
            Some(channel) => channel.write(data),
            None => Err(ReactorError::SocketClosed),
        }
    }

    /// Close the connection: end-of-stream to the interpreter, then the
    /// channel. Idempotent; shared by the listener and channel close paths.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        trace!("closing connection");
        // Taking the interpreter out breaks any reference cycle through
        // interpreters that hold their coordinator
        let interpreter = self.interpreter.write().take();
        if let Some(interpreter) = interpreter {
            interpreter.on_close();
        }
        if let Some(channel) = self.channel() {
            channel.close();
        }
        self.metrics.record_connection_closed();
    }

    fn sink(&self) -> Option<Arc<dyn ChannelEvents>> {
        if let Some(events) = self.events.get() {
            return events.upgrade();
        }
        let coordinator = self.weak_self.upgrade()?;
        Some(coordinator)
    }
}

impl Listener for Coordinator {
    fn open(&self) {
        trace!("connection open, enabling reads");
        // Interest is enabled directly rather than through needs_read;
        // readiness accounting starts at the first dispatch
        if let Some(channel) = self.channel() {
            self.selector.update(&channel, Ops::READ, true);
        }
    }

    fn read_ready(&self) {
        // Clear READ before dispatching so no second read task can be in
        // flight; re-arming is explicit
        if let Some(sink) = self.sink() {
            sink.needs_read(false);
        }
        let Some(coordinator) = self.weak_self.upgrade() else {
            return;
        };
        let Some(channel) = self.channel() else {
            return;
        };
        self.metrics.record_read_dispatch();
        let read_buffer_size = self.read_buffer_size;
        self.workers
            .execute(move || match channel.read(read_buffer_size) {
                Ok(()) => {}
                Err(ReactorError::SocketClosed) => {
                    // End of stream as seen from the read path
                    coordinator.close();
                }
                Err(e) => {
                    error!(error = %e, "read failed, closing connection");
                    coordinator.close();
                }
            });
    }

    fn write_ready(&self) {
        if let Some(sink) = self.sink() {
            sink.needs_write(false);
        }
        // Notify-only: no worker dispatch for waking the writer
        if let Some(channel) = self.channel() {
            channel.write_ready();
        }
    }

    fn close(&self) {
        Coordinator::close(self);
    }
}

impl ChannelEvents for Coordinator {
    fn on_read(&self, bytes: &[u8]) {
        trace!(bytes = bytes.len(), "delivering read");
        let interpreter = self.interpreter.read().clone();
        match interpreter {
            Some(interpreter) => interpreter.read(bytes),
            None => debug!("read delivered after close, dropping"),
        }
        // No automatic READ re-arm: the interpreter asks for more data with
        // needs_read(true) once it is ready
    }

    fn on_close(&self) {
        Coordinator::close(self);
    }

    fn needs_read(&self, on: bool) {
        if let Some(channel) = self.channel() {
            self.selector.update(&channel, Ops::READ, on);
        }
    }

    fn needs_write(&self, on: bool) {
        if let Some(channel) = self.channel() {
            self.selector.update(&channel, Ops::WRITE, on);
        }
    }
}
