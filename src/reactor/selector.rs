//! Selector: the readiness multiplexer, its dedicated thread and task queue
//!
//! All OS registration state is mutated by the selector thread alone.
//! External callers enqueue tasks on an MPSC queue drained at the top of
//! every loop iteration; the one exception is an interest update issued from
//! the selector thread itself, which runs inline so that back-to-back edits
//! inside a dispatch stay ordered and take effect before the next poll.

use crate::error::{ReactorError, Result};
use crate::reactor::channel::Channel;
use crate::reactor::ops::Ops;

use crossbeam_queue::SegQueue;
use mio::event::Event;
use mio::unix::SourceFd;
use mio::{Events, Poll, Registry, Token, Waker};
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::io;
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

/// Token reserved for the wakeup channel
const WAKE_TOKEN: Token = Token(usize::MAX);

/// Adapter the selector invokes on readiness; one per registration, held by
/// reference for the lifetime of the registration. Usually the coordinator.
pub trait Listener: Send + Sync {
    /// Invoked exactly once, after registration succeeds and before any
    /// readiness callback for the channel.
    fn open(&self);
    /// The channel became readable.
    fn read_ready(&self);
    /// The channel became writable.
    fn write_ready(&self);
    /// The selector is shutting down or the registration was torn down.
    fn close(&self);
}

/// A channel's slot in the selector: token, interest mask and the handle
/// used to edit the OS registration. Interest mutation happens only on the
/// selector thread; `cancel` may be called from anywhere and merely marks
/// the slot dead, the removal itself is a queued task.
pub(crate) struct Registration {
    token: Token,
    fd: RawFd,
    mask: AtomicU8,
    cancelled: AtomicBool,
    registry: Registry,
    selector: Weak<Shared>,
}

impl Registration {
    pub(crate) fn ops(&self) -> Ops {
        Ops::from_bits(self.mask.load(Ordering::Acquire))
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Edit the interest mask and mirror the change into the poller.
    ///
    /// An unchanged non-empty mask is still reregistered: the poller is
    /// edge-triggered, and reissuing the registration regenerates the edge
    /// when the readiness condition already holds, which is what makes the
    /// explicit re-arm protocol equivalent to level-triggered selection.
    pub(crate) fn apply(&self, ops: Ops, add: bool) -> Result<()> {
        if self.is_cancelled() {
            return Err(ReactorError::SocketClosed);
        }

        let old = self.ops();
        let new = if add { old | ops } else { old - ops };

        let fd = self.fd;
        let outcome = match (old.to_interest(), new.to_interest()) {
            (None, None) => Ok(()),
            (None, Some(interest)) => {
                self.registry.register(&mut SourceFd(&fd), self.token, interest)
            }
            (Some(_), Some(interest)) => {
                self.registry
                    .reregister(&mut SourceFd(&fd), self.token, interest)
            }
            (Some(_), None) => self.registry.deregister(&mut SourceFd(&fd)),
        };

        match outcome {
            Ok(()) => {
                self.mask.store(new.bits(), Ordering::Release);
                trace!(token = self.token.0, ?old, ?new, "interest updated");
                Ok(())
            }
            Err(e) => {
                debug!(token = self.token.0, error = %e, "interest update failed");
                Err(ReactorError::SocketClosed)
            }
        }
    }

    /// Mark the registration dead and schedule its removal.
    pub(crate) fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(shared) = self.selector.upgrade() {
            shared.tasks.push(Task::Deregister { token: self.token });
            shared.wake();
        }
    }

    /// Drop the OS registration, if any. Selector thread only.
    fn detach(&self) {
        if !self.ops().is_empty() {
            if let Err(e) = self.registry.deregister(&mut SourceFd(&self.fd)) {
                trace!(token = self.token.0, error = %e, "deregister failed on detach");
            }
            self.mask.store(0, Ordering::Release);
        }
    }
}

enum Task {
    Register {
        channel: Arc<Channel>,
        listener: Arc<dyn Listener>,
    },
    Update {
        channel: Arc<Channel>,
        ops: Ops,
        add: bool,
    },
    Deregister {
        token: Token,
    },
    Close,
}

struct Shared {
    tasks: SegQueue<Task>,
    waker: Waker,
    registry: Registry,
    open: AtomicBool,
    next_token: AtomicUsize,
    loop_thread: OnceLock<ThreadId>,
    done: Mutex<bool>,
    done_cv: Condvar,
}

impl Shared {
    fn wake(&self) {
        if let Err(e) = self.waker.wake() {
            warn!(error = %e, "selector wakeup failed");
        }
    }
}

struct Inner {
    shared: Arc<Shared>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

/// Handle to one selector thread. Cheap to clone; all clones drive the same
/// loop.
#[derive(Clone)]
pub struct Selector {
    inner: Arc<Inner>,
}

impl Selector {
    /// Open the OS poller and start the loop thread.
    pub fn new() -> Result<Selector> {
        let poll = Poll::new()?;
        let registry = poll.registry().try_clone()?;
        let waker = Waker::new(poll.registry(), WAKE_TOKEN)?;

        let shared = Arc::new(Shared {
            tasks: SegQueue::new(),
            waker,
            registry,
            open: AtomicBool::new(true),
            next_token: AtomicUsize::new(0),
            loop_thread: OnceLock::new(),
            done: Mutex::new(false),
            done_cv: Condvar::new(),
        });

        let loop_shared = shared.clone();
        let handle = thread::Builder::new()
            .name("selector".into())
            .spawn(move || SelectorLoop::new(poll, loop_shared).run())?;

        Ok(Selector {
            inner: Arc::new(Inner {
                shared,
                handle: Mutex::new(Some(handle)),
            }),
        })
    }

    /// Asynchronously register a channel with an empty interest set and
    /// attach its listener; `listener.open()` runs once registration
    /// succeeds. Registrations of already-closed channels are dropped.
    pub fn register(&self, channel: Arc<Channel>, listener: Arc<dyn Listener>) {
        if !self.is_open() {
            debug!("ignoring registration on closed selector");
            return;
        }
        self.inner
            .shared
            .tasks
            .push(Task::Register { channel, listener });
        self.inner.shared.wake();
    }

    /// Add (`add = true`) or remove the given ops from the channel's
    /// interest set. Runs inline when called from the selector thread,
    /// otherwise it is queued and the loop is woken.
    pub fn update(&self, channel: &Arc<Channel>, ops: Ops, add: bool) {
        if self.is_selector_thread() {
            if let Err(e) = channel.update(ops, add) {
                debug!(error = %e, "ignoring update for closed channel");
            }
        } else {
            self.inner.shared.tasks.push(Task::Update {
                channel: channel.clone(),
                ops,
                add,
            });
            self.inner.shared.wake();
        }
    }

    /// Unblock a pending poll. Idempotent.
    pub fn wakeup(&self) {
        self.inner.shared.wake();
    }

    /// Post the close task: every live listener is closed exactly once, then
    /// the loop exits. Idempotent.
    pub fn close(&self) {
        if self.inner.shared.open.swap(false, Ordering::AcqRel) {
            self.inner.shared.tasks.push(Task::Close);
            self.inner.shared.wake();
        }
    }

    /// Wait for the loop thread to exit. Returns false on timeout.
    pub fn join(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        {
            let mut done = self.inner.shared.done.lock();
            while !*done {
                if self
                    .inner
                    .shared
                    .done_cv
                    .wait_until(&mut done, deadline)
                    .timed_out()
                    && !*done
                {
                    return false;
                }
            }
        }
        if let Some(handle) = self.inner.handle.lock().take() {
            let _ = handle.join();
        }
        true
    }

    pub fn is_open(&self) -> bool {
        self.inner.shared.open.load(Ordering::Acquire)
    }

    fn is_selector_thread(&self) -> bool {
        self.inner
            .shared
            .loop_thread
            .get()
            .is_some_and(|id| *id == thread::current().id())
    }
}

struct EntrySlot {
    listener: Arc<dyn Listener>,
    registration: Arc<Registration>,
}

struct SelectorLoop {
    poll: Poll,
    shared: Arc<Shared>,
    registrations: HashMap<Token, EntrySlot>,
    closing: bool,
}

impl SelectorLoop {
    fn new(poll: Poll, shared: Arc<Shared>) -> Self {
        Self {
            poll,
            shared,
            registrations: HashMap::new(),
            closing: false,
        }
    }

    fn run(mut self) {
        let _ = self.shared.loop_thread.set(thread::current().id());
        debug!("selector loop entered");

        let mut events = Events::with_capacity(1024);
        loop {
            self.process_tasks();
            if self.closing {
                break;
            }

            match self.poll.poll(&mut events, None) {
                Ok(()) => {
                    for event in events.iter() {
                        if event.token() == WAKE_TOKEN {
                            continue;
                        }
                        self.dispatch(event);
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    // Multiplexer-level fault: fatal for the selector
                    error!(error = %e, "selector poll failed, shutting down");
                    self.shared.open.store(false, Ordering::Release);
                    self.close_all();
                    break;
                }
            }
        }

        *self.shared.done.lock() = true;
        self.shared.done_cv.notify_all();
        info!("selector loop exited");
    }

    fn process_tasks(&mut self) {
        while let Some(task) = self.shared.tasks.pop() {
            match task {
                Task::Register { channel, listener } => self.register(channel, listener),
                Task::Update { channel, ops, add } => {
                    if let Err(e) = channel.update(ops, add) {
                        debug!(error = %e, "ignoring update for closed channel");
                    }
                }
                Task::Deregister { token } => self.deregister(token),
                Task::Close => {
                    debug!("processing selector close");
                    self.close_all();
                }
            }
        }
    }

    fn register(&mut self, channel: Arc<Channel>, listener: Arc<dyn Listener>) {
        let token = Token(self.shared.next_token.fetch_add(1, Ordering::Relaxed));
        let registry = match self.shared.registry.try_clone() {
            Ok(registry) => registry,
            Err(e) => {
                warn!(error = %e, "registry clone failed, dropping registration");
                return;
            }
        };

        let registration = Arc::new(Registration {
            token,
            fd: channel.as_raw_fd(),
            mask: AtomicU8::new(0),
            cancelled: AtomicBool::new(false),
            registry,
            selector: Arc::downgrade(&self.shared),
        });

        match channel.bind_registration(registration.clone()) {
            Ok(()) => {
                trace!(token = token.0, "channel registered");
                self.registrations.insert(
                    token,
                    EntrySlot {
                        listener: listener.clone(),
                        registration,
                    },
                );
                listener.open();
            }
            Err(e) => {
                debug!(error = %e, "ignoring registration of closed channel");
            }
        }
    }

    fn deregister(&mut self, token: Token) {
        if let Some(entry) = self.registrations.remove(&token) {
            entry.registration.detach();
            trace!(token = token.0, "registration removed");
        }
    }

    fn close_all(&mut self) {
        debug!(
            registrations = self.registrations.len(),
            "closing all registrations"
        );
        for (_, entry) in self.registrations.drain() {
            entry.listener.close();
            entry.registration.cancelled.store(true, Ordering::Release);
            entry.registration.detach();
        }
        self.closing = true;
    }

    fn dispatch(&self, event: &Event) {
        let Some(entry) = self.registrations.get(&event.token()) else {
            trace!(token = event.token().0, "event for unknown registration");
            return;
        };
        if entry.registration.is_cancelled() {
            trace!(
                token = event.token().0,
                "ignoring event for cancelled registration"
            );
            return;
        }

        // Readiness is gated by the current interest mask, like
        // SelectionKey's ready-ops; read takes precedence when an event
        // carries both.
        let mask = entry.registration.ops();
        if (event.is_readable() || event.is_read_closed()) && mask.contains(Ops::READ) {
            entry.listener.read_ready();
        } else if (event.is_writable() || event.is_write_closed()) && mask.contains(Ops::WRITE) {
            entry.listener.write_ready();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_times_out_while_running_then_succeeds() {
        let selector = Selector::new().expect("selector");
        assert!(selector.is_open());
        assert!(!selector.join(Duration::from_millis(50)));

        selector.close();
        assert!(selector.join(Duration::from_secs(5)));
        assert!(!selector.is_open());
    }

    #[test]
    fn close_is_idempotent() {
        let selector = Selector::new().expect("selector");
        selector.close();
        selector.close();
        assert!(selector.join(Duration::from_secs(5)));
        // A second join must not hang
        assert!(selector.join(Duration::from_millis(10)));
    }

    #[test]
    fn wakeup_is_safe_after_close() {
        let selector = Selector::new().expect("selector");
        selector.close();
        assert!(selector.join(Duration::from_secs(5)));
        selector.wakeup();
    }
}
