#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dmxp_cbus::{Cmsg, CmsgHop, Route};
use tokio::sync::Notify;
use tracing_subscriber::EnvFilter;

/// Route events to the test output; filter with `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Poll `cond` from inside a cord until it holds, panicking after 10 s.
pub async fn wait_until(what: &str, cond: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}

/// One-hop route that wakes `quit` in the consumer cord.
pub fn quit_route(quit: Arc<Notify>) -> Route {
    Route::new(vec![CmsgHop::new(
        move |_: &mut Cmsg| quit.notify_one(),
        None,
    )])
}

/// Payload that counts how many times it was freed.
pub struct Tracked {
    pub seq: u64,
    pub drops: Arc<AtomicUsize>,
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}
