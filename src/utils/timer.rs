//! Timer utilities
//!
//! Provides a monotonic clock and timing helpers.

use std::future::Future;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

fn epoch() -> Instant {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    *EPOCH.get_or_init(Instant::now)
}

/// Milliseconds on a process-wide monotonic clock
pub fn clock() -> f64 {
    epoch().elapsed().as_secs_f64() * 1000.0
}

/// Suspend the current task for `ms` milliseconds
pub async fn sleep(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

/// Outcome of a timed operation
#[derive(Debug)]
pub struct Timed<T> {
    pub start: Instant,
    pub end: Instant,
    pub duration: Duration,
    pub result: T,
}

impl<T> Timed<T> {
    pub fn duration_ms(&self) -> f64 {
        self.duration.as_secs_f64() * 1000.0
    }
}

/// Await `future` and report how long it took
pub async fn time<F: Future>(future: F) -> Timed<F::Output> {
    let start = Instant::now();
    let result = future.await;
    let end = Instant::now();

    Timed {
        start,
        end,
        duration: end - start,
        result,
    }
}
