//! # tcp-reactor — a non-blocking TCP socket I/O runtime
//!
//! A small reactor that multiplexes many TCP connections on a single
//! selector thread and dispatches per-connection read/write activity to a
//! worker pool for application-level interpretation.
//!
//! ## Features
//!
//! - **One selector thread**: all OS registration state lives on a single
//!   thread; external mutations go through a lock-free task queue
//! - **Aggressive I/O**: up to N back-to-back syscalls per readiness
//!   notification amortize selector round-trips
//! - **Blocking-write backpressure**: application writers suspend on a
//!   per-channel monitor until the selector reports write readiness
//! - **Pluggable interpreters**: one application-supplied byte consumer per
//!   connection
//! - **Buffer reuse**: reads run out of a lock-free buffer pool
//! - **Observability**: integrated tracing and runtime counters
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tcp_reactor::{EchoInterpreter, ReactorConfig, Runtime, ServerConnector};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runtime = Runtime::new(ReactorConfig::default())?;
//!
//!     let server = ServerConnector::bind(
//!         "127.0.0.1:8080".parse()?,
//!         &runtime,
//!         Arc::new(EchoInterpreter::factory()),
//!     )?;
//!     println!("echoing on {}", server.local_addr());
//!
//!     // ... serve until shutdown ...
//!     server.close();
//!     runtime.shutdown(Duration::from_secs(5));
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────┐
//! │  Interpreter          │  application byte consumers
//! ├───────────────────────┤
//! │  Coordinator          │  readiness policy, worker dispatch
//! ├───────────────────────┤
//! │  Channel              │  aggressive reads/writes, backpressure
//! ├───────────────────────┤
//! │  Selector             │  OS readiness multiplexer, task queue
//! └───────────────────────┘
//! ```
//!
//! The selector thread detects readiness and invokes the listener (usually
//! the coordinator); the coordinator hands reads to the worker pool; workers
//! drive the channel, which reports decoded bytes back through the
//! coordinator into the interpreter. Interest-set changes flow the other
//! way, ending as tasks on the selector's queue.

pub mod buffer_pool;
pub mod config;
pub mod connector;
pub mod error;
pub mod interpreter;
pub mod metrics;
pub mod reactor;
pub mod runtime;
pub mod workers;

// Re-exports
pub use buffer_pool::{BufferPool, BufferPoolStats};
pub use config::ReactorConfig;
pub use connector::{ClientConnector, Connection, ServerConnector};
pub use error::{ReactorError, Result};
pub use interpreter::{EchoInterpreter, Interpreter, InterpreterFactory};
pub use metrics::{MetricsSnapshot, ReactorMetrics};
pub use reactor::{
    AggressiveRead, Channel, ChannelEvents, Coordinator, Listener, Ops, ReadHook, Selector,
};
pub use runtime::Runtime;
pub use workers::WorkerPool;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
