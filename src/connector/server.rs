//! Accepting side: a blocking acceptor thread feeding sockets to the core

use crate::connector::Connection;
use crate::error::Result;
use crate::interpreter::InterpreterFactory;
use crate::runtime::Runtime;

use parking_lot::{Condvar, Mutex};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

struct AcceptorDone {
    flag: Mutex<bool>,
    cv: Condvar,
}

/// Accepts TCP connections on a dedicated thread and hands each socket to
/// the reactor.
pub struct ServerConnector {
    local_addr: SocketAddr,
    closed: Arc<AtomicBool>,
    done: Arc<AcceptorDone>,
    acceptor: Mutex<Option<JoinHandle<()>>>,
}

impl ServerConnector {
    /// Bind `addr` and start accepting; every accepted socket is wired
    /// through `Connection::establish` with an interpreter from `factory`.
    pub fn bind(
        addr: SocketAddr,
        runtime: &Runtime,
        factory: Arc<dyn InterpreterFactory>,
    ) -> Result<ServerConnector> {
        let listener = TcpListener::bind(addr)?;
        let local_addr = listener.local_addr()?;
        let closed = Arc::new(AtomicBool::new(false));
        let done = Arc::new(AcceptorDone {
            flag: Mutex::new(false),
            cv: Condvar::new(),
        });

        let acceptor_runtime = runtime.clone();
        let acceptor_closed = closed.clone();
        let acceptor_done = done.clone();
        let handle = thread::Builder::new()
            .name("acceptor".into())
            .spawn(move || {
                accept_loop(listener, acceptor_runtime, factory, acceptor_closed);
                *acceptor_done.flag.lock() = true;
                acceptor_done.cv.notify_all();
            })?;

        info!(addr = %local_addr, "server connector listening");
        Ok(ServerConnector {
            local_addr,
            closed,
            done,
            acceptor: Mutex::new(Some(handle)),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting. Established connections stay with the selector.
    /// Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        // Unblock the acceptor with a throwaway connection to ourselves
        let _ = TcpStream::connect(self.local_addr);
        if let Some(handle) = self.acceptor.lock().take() {
            let _ = handle.join();
        }
        info!(addr = %self.local_addr, "server connector closed");
    }

    /// Wait for the acceptor thread to exit. Returns false on timeout.
    pub fn await_closed(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut flag = self.done.flag.lock();
        while !*flag {
            if self.done.cv.wait_until(&mut flag, deadline).timed_out() {
                return *flag;
            }
        }
        true
    }
}

impl Drop for ServerConnector {
    fn drop(&mut self) {
        self.close();
    }
}

fn accept_loop(
    listener: TcpListener,
    runtime: Runtime,
    factory: Arc<dyn InterpreterFactory>,
    closed: Arc<AtomicBool>,
) {
    loop {
        match listener.accept() {
            Ok((socket, peer)) => {
                if closed.load(Ordering::Acquire) {
                    break;
                }
                debug!(peer = %peer, "accepted connection");
                if let Err(e) = Connection::establish(socket, &runtime, factory.as_ref()) {
                    warn!(peer = %peer, error = %e, "failed to establish connection");
                }
            }
            Err(e) => {
                if closed.load(Ordering::Acquire) {
                    break;
                }
                warn!(error = %e, "accept failed");
                thread::sleep(Duration::from_millis(10));
            }
        }
    }
    debug!("acceptor loop exited");
}
