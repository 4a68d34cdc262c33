//! A thread-safe leaky-bucket meter for rate limiting and admission control.
//!
//! # Example
//!
//! ```
//! use resilience_ratelimiter::{LeakyBucket, LeakyBucketConfig};
//!
//! let bucket = LeakyBucket::new(LeakyBucketConfig::new(/* capacity */ 5.0, /* leak_rate */ 1.0));
//! assert!(bucket.try_flow_in(3.0));
//! assert!(bucket.try_flow_in(2.0));
//! assert!(!bucket.try_flow_in(1.0));
//! ```

mod leaky_bucket;

pub use leaky_bucket::{LeakyBucket, LeakyBucketConfig};
