//! The background-worker collaborator used by `resilience-cache`.
//!
//! `FaultTolerantCache` needs "a way to run a task on a background worker"
//! for asynchronous refresh and for draining the refresh queue without
//! caring about the particular threading framework a host application has
//! chosen. This crate is that abstraction: the [`Executor`] trait, plus two
//! ready-made implementations.
//!
//! # Choosing an implementation
//!
//! - [`BlockingExecutor`] spins up its own small thread pool. Use this when
//!   the host application has no existing async runtime, or wants refresh
//!   work isolated from its own executor.
//! - [`CurrentRuntime`] dispatches onto an existing Tokio runtime's
//!   blocking thread pool via `spawn_blocking`. Use this to avoid running a
//!   second pool of threads when the host application already runs Tokio.
//!
//! # Example
//!
//! ```rust
//! use resilience_executor::{BlockingExecutor, Executor};
//! use std::sync::mpsc;
//!
//! let executor = BlockingExecutor::new(2);
//! let (tx, rx) = mpsc::channel();
//! executor.spawn(Box::new(move || {
//!     tx.send("done").unwrap();
//! }));
//! assert_eq!(rx.recv().unwrap(), "done");
//! ```

mod executor;

pub use executor::{BlockingExecutor, CurrentRuntime, Executor, Task};
