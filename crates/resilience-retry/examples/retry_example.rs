use resilience_retry::RetryConfigBuilder;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
struct TemporaryError;

impl std::fmt::Display for TemporaryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "temporary error")
    }
}

#[derive(Debug, Clone, PartialEq)]
struct PermanentError;

impl std::fmt::Display for PermanentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "permanent error")
    }
}

fn main() {
    println!("RetryingExecutor Example");
    println!("=========================\n");

    println!("Example 1: exponential backoff, eventual success");
    let call_count = Arc::new(AtomicUsize::new(0));
    let cc = Arc::clone(&call_count);

    let executor = RetryConfigBuilder::<TemporaryError>::new()
        .retry_limit(5)
        .initial_retry_wait(Duration::from_millis(50))
        .wait_grow_rate(2.0)
        .name("example-retry")
        .on_retry(|event| println!("  [retry] {event:?}"))
        .build();

    let result = executor.run(move || {
        let attempt = cc.fetch_add(1, Ordering::SeqCst);
        println!("  attempt {}", attempt + 1);
        if attempt < 2 {
            Err(TemporaryError)
        } else {
            Ok("success".to_string())
        }
    });
    println!("  result: {result:?}\n");

    println!("Example 2: selective retry with retry_if");
    call_count.store(0, Ordering::SeqCst);

    let executor = RetryConfigBuilder::<PermanentError>::new()
        .retry_limit(5)
        .initial_retry_wait(Duration::from_millis(20))
        .retry_if(|_: &PermanentError| false)
        .build();

    let result: Result<String, _> = executor.run(|| {
        println!("  called once, error is not retryable");
        Err(PermanentError)
    });
    println!("  result: {result:?}\n");

    println!("Example 3: exhausted retries, giveup carries the first cause");
    let call_count = Arc::new(AtomicUsize::new(0));
    let cc = Arc::clone(&call_count);

    let executor = RetryConfigBuilder::<TemporaryError>::new()
        .retry_limit(3)
        .initial_retry_wait(Duration::from_millis(10))
        .wait_grow_rate(1.0)
        .on_giveup(|event| println!("  [giveup] {event:?}"))
        .build();

    let result: Result<String, _> = executor.run(move || {
        cc.fetch_add(1, Ordering::SeqCst);
        Err(TemporaryError)
    });
    let giveup = result.unwrap_err();
    println!(
        "  gave up after {} attempts, first cause: {}",
        giveup.attempts, giveup.cause
    );
    println!("  total calls: {}", call_count.load(Ordering::SeqCst));
}
