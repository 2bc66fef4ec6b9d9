//! Connector scaffolding: accepting and initiating sockets for the core

pub mod client;
pub mod server;

pub use client::ClientConnector;
pub use server::ServerConnector;

use crate::error::Result;
use crate::interpreter::InterpreterFactory;
use crate::reactor::channel::{Channel, ChannelEvents};
use crate::reactor::coordinator::Coordinator;
use crate::runtime::Runtime;
use std::net::TcpStream;
use std::sync::Arc;

/// An established connection: the channel doing the I/O and the coordinator
/// owning the policy. Dropping the handle does not close the connection —
/// the selector keeps it alive until it is closed or hits end-of-stream.
pub struct Connection {
    channel: Arc<Channel>,
    coordinator: Arc<Coordinator>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").finish_non_exhaustive()
    }
}

impl Connection {
    /// Wire a socket into the runtime: coordinator, channel, interpreter,
    /// then the selector registration (last, so `open` sees a complete
    /// connection).
    pub fn establish(
        socket: TcpStream,
        runtime: &Runtime,
        factory: &dyn InterpreterFactory,
    ) -> Result<Connection> {
        socket.set_nonblocking(true)?;
        if runtime.config().nodelay {
            let _ = socket.set_nodelay(true);
        }

        let coordinator = Coordinator::new(
            runtime.selector().clone(),
            runtime.workers().clone(),
            runtime.config().read_buffer_size,
            runtime.metrics().clone(),
        );
        let sink: Arc<dyn ChannelEvents> = coordinator.clone();
        let channel = Arc::new(Channel::new(
            socket,
            Arc::downgrade(&sink),
            runtime.buffers().clone(),
            runtime.config(),
            runtime.metrics().clone(),
        ));
        coordinator.set_channel(channel.clone());
        coordinator.set_interpreter(factory.new_interpreter(&coordinator));

        runtime
            .selector()
            .register(channel.clone(), coordinator.clone());
        runtime.metrics().record_connection_opened();

        Ok(Connection {
            channel,
            coordinator,
        })
    }

    pub fn channel(&self) -> &Arc<Channel> {
        &self.channel
    }

    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    /// Write to the peer; blocks on backpressure.
    pub fn write(&self, data: &[u8]) -> Result<()> {
        self.channel.write(data)
    }

    /// Close the connection: end-of-stream to the interpreter, then the
    /// channel. Idempotent.
    pub fn close(&self) {
        self.coordinator.close();
    }
}
