//! Shared helpers for reactor integration tests
#![allow(dead_code)]

use crossbeam_channel::{unbounded, Receiver, Sender};
use std::io;
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tcp_reactor::{
    AggressiveRead, Channel, ChannelEvents, Coordinator, Interpreter, InterpreterFactory,
    Listener, ReadHook, Runtime,
};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Spin until `cond` holds or `timeout` elapses
pub fn wait_until(cond: impl Fn() -> bool, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    cond()
}

/// Events observed by a recording interpreter
#[derive(Debug, PartialEq, Eq)]
pub enum ConnEvent {
    Read(Vec<u8>),
    Closed,
}

/// Interpreter that forwards every callback into a channel; with `rearm` it
/// re-enables READ after each batch the way a live consumer would.
pub struct RecordingInterpreter {
    tx: Sender<ConnEvent>,
    coordinator: Weak<Coordinator>,
    rearm: bool,
}

impl RecordingInterpreter {
    pub fn factory(rearm: bool) -> (impl InterpreterFactory, Receiver<ConnEvent>) {
        let (tx, rx) = unbounded();
        let factory = move |coordinator: &Arc<Coordinator>| -> Arc<dyn Interpreter> {
            Arc::new(RecordingInterpreter {
                tx: tx.clone(),
                coordinator: Arc::downgrade(coordinator),
                rearm,
            })
        };
        (factory, rx)
    }
}

impl Interpreter for RecordingInterpreter {
    fn read(&self, bytes: &[u8]) {
        let _ = self.tx.send(ConnEvent::Read(bytes.to_vec()));
        if self.rearm {
            if let Some(coordinator) = self.coordinator.upgrade() {
                coordinator.needs_read(true);
            }
        }
    }

    fn on_close(&self) {
        let _ = self.tx.send(ConnEvent::Closed);
    }
}

/// Counting wrapper interposed between the selector/channel and the real
/// coordinator, the way the original tests subclassed the coordinator.
pub struct Probe {
    inner: Arc<Coordinator>,
    pub on_reads: AtomicUsize,
    pub needs_read_calls: AtomicUsize,
    pub needs_write_on: AtomicUsize,
    pub needs_write_off: AtomicUsize,
}

impl Probe {
    pub fn new(inner: Arc<Coordinator>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            on_reads: AtomicUsize::new(0),
            needs_read_calls: AtomicUsize::new(0),
            needs_write_on: AtomicUsize::new(0),
            needs_write_off: AtomicUsize::new(0),
        })
    }
}

impl Listener for Probe {
    fn open(&self) {
        self.inner.open();
    }

    fn read_ready(&self) {
        self.inner.read_ready();
    }

    fn write_ready(&self) {
        self.inner.write_ready();
    }

    fn close(&self) {
        self.inner.close();
    }
}

impl ChannelEvents for Probe {
    fn on_read(&self, bytes: &[u8]) {
        self.on_reads.fetch_add(1, Ordering::SeqCst);
        self.inner.on_read(bytes);
    }

    fn on_close(&self) {
        self.inner.on_close();
    }

    fn needs_read(&self, on: bool) {
        self.needs_read_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.needs_read(on);
    }

    fn needs_write(&self, on: bool) {
        if on {
            self.needs_write_on.fetch_add(1, Ordering::SeqCst);
        } else {
            self.needs_write_off.fetch_add(1, Ordering::SeqCst);
        }
        self.inner.needs_write(on);
    }
}

/// Wire `socket` into the runtime with a counting probe in front of the
/// coordinator and an optional injected read hook.
pub fn establish_probed(
    socket: TcpStream,
    runtime: &Runtime,
    factory: &dyn InterpreterFactory,
    read_hook: Option<Arc<dyn ReadHook>>,
) -> (Arc<Channel>, Arc<Coordinator>, Arc<Probe>) {
    socket.set_nonblocking(true).expect("set_nonblocking");

    let coordinator = Coordinator::new(
        runtime.selector().clone(),
        runtime.workers().clone(),
        runtime.config().read_buffer_size,
        runtime.metrics().clone(),
    );
    let probe = Probe::new(coordinator.clone());
    let sink: Arc<dyn ChannelEvents> = probe.clone();

    let channel = Arc::new(Channel::new(
        socket,
        Arc::downgrade(&sink),
        runtime.buffers().clone(),
        runtime.config(),
        runtime.metrics().clone(),
    ));
    if let Some(hook) = read_hook {
        channel.set_read_hook(hook);
    }

    coordinator.set_channel(channel.clone());
    coordinator.set_events(Arc::downgrade(&sink));
    coordinator.set_interpreter(factory.new_interpreter(&coordinator));

    runtime.selector().register(channel.clone(), probe.clone());
    (channel, coordinator, probe)
}

/// Read hook whose first invocation reads nothing and reports no EOF,
/// simulating spurious readiness; later invocations use the default policy.
pub struct SkipFirstRead {
    first: AtomicBool,
}

impl SkipFirstRead {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            first: AtomicBool::new(true),
        })
    }
}

impl ReadHook for SkipFirstRead {
    fn read_aggressively(
        &self,
        stream: &TcpStream,
        buf: &mut [u8],
        aggressiveness: usize,
    ) -> io::Result<(usize, bool)> {
        if self.first.swap(false, Ordering::SeqCst) {
            Ok((0, false))
        } else {
            AggressiveRead.read_aggressively(stream, buf, aggressiveness)
        }
    }
}
