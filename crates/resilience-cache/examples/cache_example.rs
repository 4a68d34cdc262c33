use resilience_cache::CacheConfigBuilder;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn main() {
    println!("FaultTolerantCache Example");
    println!("==========================\n");

    let load_count = Arc::new(AtomicUsize::new(0));
    let load_count_for_loader = Arc::clone(&load_count);

    let cache = CacheConfigBuilder::new()
        .maximum_size(3)
        .concurrency_level(1)
        .asynchronous_refresh_after_write(Duration::from_millis(500))
        .refresh_after_write(Duration::from_secs(1))
        .expire_after_write(Duration::from_secs(2))
        .name("example-cache")
        .exception_listener(|err| println!("  [listener] exception: {err}"))
        .loader(move |req: &String| {
            let count = load_count_for_loader.fetch_add(1, Ordering::SeqCst) + 1;
            println!("  loader called for {req:?} (call #{count})");
            thread::sleep(Duration::from_millis(50));
            Ok::<_, std::io::Error>(format!("response-for-{req}"))
        })
        .build();

    println!("Test 1: first call (mandatory load)");
    println!("  got: {}\n", cache.get(&"request1".to_string()).unwrap());

    println!("Test 2: same request (servable from cache)");
    println!("  got: {}\n", cache.get(&"request1".to_string()).unwrap());

    println!("Test 3: different request (mandatory load)");
    println!("  got: {}\n", cache.get(&"request2".to_string()).unwrap());

    println!("Test 4: fill the cache to capacity");
    cache.get(&"request3".to_string()).unwrap();
    cache.get(&"request4".to_string()).unwrap(); // evicts request1 (least recently touched)
    println!();

    println!("Test 5: request1 was evicted (mandatory load again)");
    println!("  got: {}\n", cache.get(&"request1".to_string()).unwrap());

    println!("Test 6: wait past the hard-expire horizon");
    println!("  waiting 2.1s...");
    thread::sleep(Duration::from_millis(2100));
    let before = cache.get_if_present(&"request2".to_string());
    println!("  get_if_present(\"request2\") after expiry: {before:?}\n");

    println!(
        "Summary: loader called {} times total",
        load_count.load(Ordering::SeqCst)
    );
}
