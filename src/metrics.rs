//! Runtime counters for connections and channel I/O

use std::sync::atomic::{AtomicU64, Ordering};

/// Global counters shared by every channel and coordinator of a runtime
#[derive(Debug, Default)]
pub struct ReactorMetrics {
    /// Connections registered with the selector
    connections_opened: AtomicU64,
    /// Connections whose close was delivered
    connections_closed: AtomicU64,
    /// Bytes delivered to interpreters
    bytes_read: AtomicU64,
    /// Bytes written to sockets
    bytes_written: AtomicU64,
    /// Read tasks handed to the worker pool
    reads_dispatched: AtomicU64,
    /// Readiness notifications that produced no bytes
    zero_reads: AtomicU64,
    /// Writer threads suspended on backpressure
    writer_suspensions: AtomicU64,
}

/// Point-in-time view of the counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub connections_opened: u64,
    pub connections_closed: u64,
    pub bytes_read: u64,
    pub bytes_written: u64,
    pub reads_dispatched: u64,
    pub zero_reads: u64,
    pub writer_suspensions: u64,
}

impl ReactorMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_connection_opened(&self) {
        self.connections_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_connection_closed(&self) {
        self.connections_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_bytes_read(&self, n: usize) {
        self.bytes_read.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_bytes_written(&self, n: usize) {
        self.bytes_written.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_read_dispatch(&self) {
        self.reads_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_zero_read(&self) {
        self.zero_reads.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_writer_suspension(&self) {
        self.writer_suspensions.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot all counters
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_opened: self.connections_opened.load(Ordering::Relaxed),
            connections_closed: self.connections_closed.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            reads_dispatched: self.reads_dispatched.load(Ordering::Relaxed),
            zero_reads: self.zero_reads.load(Ordering::Relaxed),
            writer_suspensions: self.writer_suspensions.load(Ordering::Relaxed),
        }
    }
}
