// Rolling-mean counters for bus statistics.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Number of one-second buckets averaged by [`Rmean::mean`].
pub const RMEAN_WINDOW: usize = 5;

/// Bus statistics collected into an [`Rmean`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CbusStat {
    /// Cross-thread wake-ups sent to a consumer loop.
    Events = 0,
    /// Bus mutex acquisitions.
    Locks = 1,
}

pub const CBUS_STAT_LAST: usize = 2;

pub const CBUS_STAT_STRINGS: [&str; CBUS_STAT_LAST] = ["EVENTS", "LOCKS"];

impl CbusStat {
    pub fn name(self) -> &'static str {
        CBUS_STAT_STRINGS[self as usize]
    }
}

struct RmeanStat {
    total: AtomicU64,
    buckets: [AtomicU64; RMEAN_WINDOW],
    /// The second each bucket was last reset for.
    epochs: [AtomicU64; RMEAN_WINDOW],
}

impl RmeanStat {
    fn new() -> Self {
        Self {
            total: AtomicU64::new(0),
            buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            epochs: std::array::from_fn(|_| AtomicU64::new(0)),
        }
    }
}

/// A set of named counters, each with a running total and a per-second
/// rate averaged over the last [`RMEAN_WINDOW`] seconds.
///
/// Collection is lock-free so both threads of a bus can count without
/// touching the bus mutex. A bucket rotation racing with a concurrent
/// `collect` may lose that one sample from the rate (never from the total).
pub struct Rmean {
    names: &'static [&'static str],
    stats: Box<[RmeanStat]>,
    started: Instant,
}

impl Rmean {
    pub fn new(names: &'static [&'static str]) -> Self {
        Self {
            names,
            stats: names.iter().map(|_| RmeanStat::new()).collect(),
            started: Instant::now(),
        }
    }

    #[inline]
    fn now_sec(&self) -> u64 {
        self.started.elapsed().as_secs()
    }

    pub fn collect(&self, stat: usize, value: u64) {
        let stat = &self.stats[stat];
        stat.total.fetch_add(value, Ordering::Relaxed);

        let sec = self.now_sec();
        let slot = (sec as usize) % RMEAN_WINDOW;
        if stat.epochs[slot].swap(sec, Ordering::AcqRel) != sec {
            stat.buckets[slot].store(0, Ordering::Relaxed);
        }
        stat.buckets[slot].fetch_add(value, Ordering::Relaxed);
    }

    pub fn total(&self, stat: usize) -> u64 {
        self.stats[stat].total.load(Ordering::Relaxed)
    }

    /// Average per-second rate over the window.
    pub fn mean(&self, stat: usize) -> u64 {
        let stat = &self.stats[stat];
        let now = self.now_sec();
        let mut sum = 0;
        for slot in 0..RMEAN_WINDOW {
            let epoch = stat.epochs[slot].load(Ordering::Acquire);
            if epoch + (RMEAN_WINDOW as u64) > now {
                sum += stat.buckets[slot].load(Ordering::Relaxed);
            }
        }
        sum / RMEAN_WINDOW as u64
    }

    pub fn names(&self) -> &'static [&'static str] {
        self.names
    }

    /// `(name, total, mean)` for every counter.
    pub fn snapshot(&self) -> Vec<(&'static str, u64, u64)> {
        self.names
            .iter()
            .enumerate()
            .map(|(i, name)| (*name, self.total(i), self.mean(i)))
            .collect()
    }
}
