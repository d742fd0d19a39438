//! Integration tests for rate limiting under concurrent load

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

use market_history_ingest::downloader::RateLimiter;

async fn grant_times(limiter: RateLimiter, consumers: usize, per_consumer: usize) -> Vec<Instant> {
    let grants = Arc::new(Mutex::new(Vec::new()));
    let mut handles = Vec::new();
    for _ in 0..consumers {
        let limiter = limiter.clone();
        let grants = grants.clone();
        handles.push(tokio::spawn(async move {
            for _ in 0..per_consumer {
                limiter.acquire().await.unwrap();
                grants.lock().unwrap().push(Instant::now());
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let mut times = grants.lock().unwrap().clone();
    times.sort();
    times
}

#[tokio::test(start_paused = true)]
async fn test_no_window_exceeds_capacity() {
    let capacity = 5;
    let times = grant_times(RateLimiter::per_second("test", capacity), 12, 4).await;
    assert_eq!(times.len(), 48);

    // Any capacity + 1 consecutive grants must span at least one window
    for window in times.windows(capacity + 1) {
        let span = window[capacity] - window[0];
        assert!(span >= Duration::from_secs(1), "{} grants within {:?}", capacity + 1, span);
    }
}

#[tokio::test(start_paused = true)]
async fn test_throughput_matches_rate() {
    let started = Instant::now();
    let times = grant_times(RateLimiter::per_second("test", 10), 4, 10).await;

    // 40 grants at 10 per second: the last batch starts after 3 windows
    let elapsed = *times.last().unwrap() - started;
    assert!(elapsed >= Duration::from_secs(3));
    assert!(elapsed < Duration::from_secs(4));
}

#[tokio::test(start_paused = true)]
async fn test_initial_burst_is_immediate() {
    let limiter = RateLimiter::per_second("test", 8);
    let started = Instant::now();
    for _ in 0..8 {
        limiter.acquire().await.unwrap();
    }
    assert_eq!(started.elapsed(), Duration::ZERO);
    assert_eq!(limiter.available(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_custom_window() {
    let limiter = RateLimiter::new("test", 1, Duration::from_millis(250));
    let started = Instant::now();
    for _ in 0..4 {
        limiter.acquire().await.unwrap();
    }
    assert!(started.elapsed() >= Duration::from_millis(750));
}
