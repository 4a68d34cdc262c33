//! Admission control with a fractional-token leaky bucket.
//!
//! Unlike a fixed-window counter, the bucket leaks continuously: capacity
//! trickles back at `leak_rate` units per second rather than resetting in
//! a lump at a window boundary.

use resilience_ratelimiter::{LeakyBucket, LeakyBucketConfig};
use std::thread;
use std::time::Duration;

fn main() {
    println!("LeakyBucket Example");
    println!("====================\n");

    demo_burst_then_reject();
    println!("\n{}\n", "=".repeat(50));
    demo_leak_over_time();
    println!("\n{}\n", "=".repeat(50));
    demo_overdraft();
}

fn demo_burst_then_reject() {
    println!("1. Burst up to capacity, then reject");
    let bucket = LeakyBucket::with_burst_and_rate(5.0, 1.0);

    for i in 1..=7 {
        if bucket.try_flow_in(1.0) {
            println!("  request {i}: admitted (capacity left: {:.2})", bucket.available_capacity());
        } else {
            println!("  request {i}: rejected (capacity left: {:.2})", bucket.available_capacity());
        }
    }
}

fn demo_leak_over_time() {
    println!("2. Capacity leaks back at the configured rate");
    let bucket = LeakyBucket::with_burst_and_rate(3.0, 2.0);

    bucket.flow_in(3.0);
    println!("  drained to {:.2} after charging 3.0", bucket.available_capacity());

    println!("  waiting 500ms (leak rate: 2.0/s, so ~1.0 should return)...");
    thread::sleep(Duration::from_millis(500));
    println!("  capacity left: {:.2}", bucket.available_capacity());

    bucket.set_leak_rate(10.0);
    println!("  raised leak rate to 10.0/s, waiting 200ms...");
    thread::sleep(Duration::from_millis(200));
    println!("  capacity left: {:.2}", bucket.available_capacity());
}

fn demo_overdraft() {
    println!("3. Allowing a bounded overdraft");
    let bucket = LeakyBucket::new(LeakyBucketConfig::new(2.0, 1.0).with_allowed_negative_capacity(3.0));

    for i in 1..=5 {
        bucket.flow_in(1.0);
        println!("  charge {i}: capacity now {:.2}", bucket.available_capacity());
    }

    println!("  a 6th charge would still be admitted (floor is -3.0):");
    println!("  try_flow_in(1.0) = {}", bucket.try_flow_in(1.0));

    bucket.clear();
    println!("  after clear(): capacity is {:.2}", bucket.available_capacity());
}
