//! Channel: byte-level I/O on one non-blocking socket
//!
//! The channel performs the actual reads and writes and translates transport
//! events into coordinator notifications. Reads run on worker threads, one at
//! a time per channel; writes may come from any application thread and are
//! serialized against the selector through the per-channel monitor.

use crate::buffer_pool::BufferPool;
use crate::config::ReactorConfig;
use crate::error::{from_channel_io, ReactorError, Result};
use crate::metrics::ReactorMetrics;
use crate::reactor::ops::Ops;
use crate::reactor::selector::Registration;

use parking_lot::{Condvar, Mutex, RwLock};
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::thread::{self, ThreadId};
use tracing::{debug, trace};

/// Callbacks a channel raises toward its coordinator.
pub trait ChannelEvents: Send + Sync {
    /// One successful non-empty read. The bytes are valid only for the
    /// duration of this call; consumers needing longer-lived data must copy.
    fn on_read(&self, bytes: &[u8]);
    /// End-of-stream; delivered at most once per channel, after all prior
    /// `on_read`s.
    fn on_close(&self);
    /// Ask the selector to add or remove READ interest.
    fn needs_read(&self, on: bool);
    /// Ask the selector to add or remove WRITE interest.
    fn needs_write(&self, on: bool);
}

/// Read-side syscall policy. The default performs the aggressive-read loop;
/// alternative implementations inject faults in tests.
pub trait ReadHook: Send + Sync {
    /// Fill `buf` from `stream` with up to `aggressiveness` back-to-back
    /// reads. Returns the bytes filled and whether end-of-stream was
    /// observed.
    fn read_aggressively(
        &self,
        stream: &TcpStream,
        buf: &mut [u8],
        aggressiveness: usize,
    ) -> io::Result<(usize, bool)>;
}

/// Default read policy: up to N reads per readiness notification.
///
/// Readiness is edge-like in practice; a single read may leave bytes in the
/// kernel buffer at the cost of an extra selector round-trip, while a small N
/// amortizes wakeups without starving other channels.
pub struct AggressiveRead;

impl ReadHook for AggressiveRead {
    fn read_aggressively(
        &self,
        stream: &TcpStream,
        buf: &mut [u8],
        aggressiveness: usize,
    ) -> io::Result<(usize, bool)> {
        let mut reader = stream; // Read is implemented for &TcpStream
        let mut filled = 0;
        for _ in 0..aggressiveness {
            if filled == buf.len() {
                // Full buffer: a read into an empty slice would be
                // indistinguishable from EOF
                break;
            }
            match reader.read(&mut buf[filled..]) {
                Ok(0) => return Ok((filled, true)),
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok((filled, false))
    }
}

/// One non-blocking TCP socket owned by its coordinator.
pub struct Channel {
    stream: TcpStream,
    peer_addr: Option<SocketAddr>,
    events: Weak<dyn ChannelEvents>,
    pool: Arc<BufferPool>,
    metrics: Arc<ReactorMetrics>,
    registration: OnceLock<Arc<Registration>>,
    read_aggressiveness: AtomicUsize,
    write_aggressiveness: AtomicUsize,
    read_hook: RwLock<Arc<dyn ReadHook>>,
    // Monitor for the write-backpressure handshake: a single-slot suspended
    // writer woken by write_ready.
    writer: Mutex<Option<ThreadId>>,
    write_cond: Condvar,
    closed: AtomicBool,
}

impl Channel {
    pub fn new(
        stream: TcpStream,
        events: Weak<dyn ChannelEvents>,
        pool: Arc<BufferPool>,
        config: &ReactorConfig,
        metrics: Arc<ReactorMetrics>,
    ) -> Self {
        let peer_addr = stream.peer_addr().ok();
        Self {
            stream,
            peer_addr,
            events,
            pool,
            metrics,
            registration: OnceLock::new(),
            read_aggressiveness: AtomicUsize::new(config.read_aggressiveness.max(1)),
            write_aggressiveness: AtomicUsize::new(config.write_aggressiveness.max(1)),
            read_hook: RwLock::new(Arc::new(AggressiveRead)),
            writer: Mutex::new(None),
            write_cond: Condvar::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn read_aggressiveness(&self) -> usize {
        self.read_aggressiveness.load(Ordering::Relaxed)
    }

    pub fn set_read_aggressiveness(&self, n: usize) {
        self.read_aggressiveness.store(n.max(1), Ordering::Relaxed);
    }

    pub fn write_aggressiveness(&self) -> usize {
        self.write_aggressiveness.load(Ordering::Relaxed)
    }

    pub fn set_write_aggressiveness(&self, n: usize) {
        self.write_aggressiveness.store(n.max(1), Ordering::Relaxed);
    }

    /// Replace the read-side syscall policy (fault injection seam).
    pub fn set_read_hook(&self, hook: Arc<dyn ReadHook>) {
        *self.read_hook.write() = hook;
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    pub fn is_open(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }

    /// Current interest set; empty when unregistered.
    pub fn interest_ops(&self) -> Ops {
        self.registration
            .get()
            .map(|r| r.ops())
            .unwrap_or_default()
    }

    /// Attach the selector-side registration. Fails on a channel that is
    /// already closed, which makes the selector drop the registration.
    pub(crate) fn bind_registration(&self, registration: Arc<Registration>) -> Result<()> {
        if !self.is_open() {
            return Err(ReactorError::SocketClosed);
        }
        self.registration
            .set(registration)
            .map_err(|_| ReactorError::config("channel is already registered"))
    }

    /// Edit the interest mask through the current registration. Must run on
    /// the selector thread; external callers go through `Selector::update`.
    pub fn update(&self, ops: Ops, add: bool) -> Result<()> {
        let registration = self.registration.get().ok_or(ReactorError::SocketClosed)?;
        registration.apply(ops, add)
    }

    fn events(&self) -> Result<Arc<dyn ChannelEvents>> {
        self.events.upgrade().ok_or(ReactorError::SocketClosed)
    }

    /// Perform one read dispatch: acquire a pool buffer, run the aggressive
    /// read, deliver the outcome, release the buffer on every exit path.
    pub fn read(&self, read_buffer_size: usize) -> Result<()> {
        let events = self.events()?;
        let mut buffer = self.pool.acquire(read_buffer_size);
        buffer.resize(read_buffer_size, 0);

        let outcome = {
            let hook = self.read_hook.read().clone();
            hook.read_aggressively(&self.stream, &mut buffer, self.read_aggressiveness())
        };

        let result = match outcome {
            Ok((filled, eof)) => {
                trace!(peer = ?self.peer_addr, bytes = filled, eof, "channel read");
                if filled > 0 {
                    self.metrics.record_bytes_read(filled);
                    buffer.truncate(filled);
                    events.on_read(&buffer);
                    if eof {
                        events.on_close();
                    }
                    Ok(())
                } else if eof || !self.is_open() {
                    Err(ReactorError::SocketClosed)
                } else {
                    // Zero bytes on an open socket: spurious readiness, not
                    // EOF. Ask the selector to notify us again.
                    self.metrics.record_zero_read();
                    events.needs_read(true);
                    Ok(())
                }
            }
            Err(e) => Err(from_channel_io(e)),
        };

        self.pool.release(buffer);

        if result.is_err() {
            debug!(peer = ?self.peer_addr, "channel closed during read");
            self.close();
        }
        result
    }

    /// Write all of `data`, suspending on backpressure until the selector
    /// reports write readiness. Closing the channel wakes a suspended writer
    /// with `SocketClosed`.
    pub fn write(&self, data: &[u8]) -> Result<()> {
        let mut offset = 0;
        while offset < data.len() {
            let written = match self.write_aggressively(&data[offset..]) {
                Ok(n) => n,
                Err(e) => {
                    debug!(peer = ?self.peer_addr, error = %e, "channel closed during write");
                    self.close();
                    return Err(from_channel_io(e));
                }
            };
            offset += written;
            if written > 0 {
                self.metrics.record_bytes_written(written);
            }
            trace!(
                peer = ?self.peer_addr,
                written,
                remaining = data.len() - offset,
                "channel write"
            );

            if offset < data.len() {
                let mut writer = self.writer.lock();
                if !self.is_open() {
                    return Err(ReactorError::SocketClosed);
                }
                // needs_write must be issued inside the monitor: otherwise
                // write_ready could signal before this thread records itself
                // and the wakeup would be lost.
                let events = self.events()?;
                events.needs_write(true);

                debug_assert!(writer.is_none(), "channel already has a suspended writer");
                *writer = Some(thread::current().id());
                self.metrics.record_writer_suspension();

                while writer.is_some() {
                    debug!(
                        peer = ?self.peer_addr,
                        remaining = data.len() - offset,
                        "writer suspended on partial write"
                    );
                    self.write_cond.wait(&mut writer);
                }
                drop(writer);

                if !self.is_open() {
                    return Err(ReactorError::SocketClosed);
                }
            }
        }
        Ok(())
    }

    /// Wake a writer suspended on backpressure. Safe to call spuriously.
    pub fn write_ready(&self) {
        let mut writer = self.writer.lock();
        if let Some(thread_id) = writer.take() {
            trace!(peer = ?self.peer_addr, ?thread_id, "write ready, signaling writer");
            self.write_cond.notify_one();
        }
    }

    /// Up to M write calls per round; a round ends early on `WouldBlock`.
    /// An exhausted buffer still runs its iterations, each writing the empty
    /// remainder for a count of zero.
    fn write_aggressively(&self, data: &[u8]) -> io::Result<usize> {
        let mut writer = &self.stream; // Write is implemented for &TcpStream
        let mut written = 0;
        for _ in 0..self.write_aggressiveness() {
            match writer.write(&data[written..]) {
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(written)
    }

    /// Cancel the registration and shut the socket down. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!(peer = ?self.peer_addr, "channel closing");
        if let Some(registration) = self.registration.get() {
            registration.cancel();
        }
        let _ = self.stream.shutdown(Shutdown::Both);
        // A writer suspended on backpressure wakes and observes the close
        self.write_ready();
    }
}

impl AsRawFd for Channel {
    fn as_raw_fd(&self) -> RawFd {
        self.stream.as_raw_fd()
    }
}
