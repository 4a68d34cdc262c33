//! A blocking retry executor with exponential backoff.
//!
//! Unlike a Tower retry middleware, [`RetryingExecutor`] wraps no service and
//! carries no request type — it simply runs a fallible closure until it
//! succeeds, the configured [`RetryConfigBuilder::retry_if`] predicate
//! rejects an error, the retry limit is reached, or an optional wall-clock
//! `giveup_timeout` elapses. The backoff between attempts grows
//! exponentially, bounded by `max_retry_wait`.
//!
//! # Example
//!
//! ```
//! use resilience_retry::RetryConfigBuilder;
//! use std::time::Duration;
//!
//! let executor = RetryConfigBuilder::<String>::new()
//!     .retry_limit(3)
//!     .initial_retry_wait(Duration::from_millis(1))
//!     .retry_if(|e: &String| e != "fatal")
//!     .on_giveup(|event| eprintln!("giving up: {event:?}"))
//!     .build();
//!
//! let mut attempts = 0;
//! let result = executor.run(|| {
//!     attempts += 1;
//!     if attempts < 2 {
//!         Err("transient".to_string())
//!     } else {
//!         Ok(attempts)
//!     }
//! });
//! assert_eq!(result.unwrap(), 2);
//! ```
//!
//! Use [`RetryingExecutor::run_interruptible`] with a [`CancelToken`] when
//! the backoff wait needs to be cut short, e.g. on application shutdown.

mod config;
mod events;
mod executor;

pub use config::{RetryConfig, RetryConfigBuilder, RetryPredicate};
pub use events::RetryEvent;
pub use executor::{CancelToken, RetryingExecutor};
pub use resilience_core::RetryGiveup;
