//! Initiating side: blocking connect wired into the core

use crate::connector::Connection;
use crate::error::{ReactorError, Result};
use crate::interpreter::InterpreterFactory;
use crate::runtime::Runtime;
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use tracing::debug;

/// Creates outbound connections and hands them to the reactor.
pub struct ClientConnector {
    runtime: Runtime,
    factory: Arc<dyn InterpreterFactory>,
}

impl ClientConnector {
    pub fn new(runtime: &Runtime, factory: Arc<dyn InterpreterFactory>) -> Self {
        Self {
            runtime: runtime.clone(),
            factory,
        }
    }

    /// Connect to `addr` and wire the socket into the runtime.
    pub fn connect(&self, addr: SocketAddr) -> Result<Connection> {
        let socket = TcpStream::connect(addr).map_err(ReactorError::Connect)?;
        debug!(peer = %addr, "connected");
        Connection::establish(socket, &self.runtime, self.factory.as_ref())
    }
}
