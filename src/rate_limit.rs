//! Fixed-window login throttle, keyed by caller.
//!
//! Counts only failed attempts; successful logins never move the counter.
//! Process-local and best-effort: replicas keep independent windows, so this
//! is abuse mitigation, not a correctness mechanism.
//!
//! Keys are attacker-controlled (a spoofable forwarded-for header), so the
//! map must not grow without bound: `check` discards the caller's own lapsed
//! window, and once the map reaches `SWEEP_AT` entries `record_failure`
//! sweeps every expired window before inserting.

use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Map size at which recording a failure first sweeps out expired windows.
const SWEEP_AT: usize = 1000;

pub struct LoginLimiter {
    windows: DashMap<String, Window>,
    max_failures: u32,
    window: Duration,
}

struct Window {
    started: Instant,
    failures: u32,
}

impl LoginLimiter {
    pub fn new(max_failures: u32, window: Duration) -> Self {
        Self {
            windows: DashMap::new(),
            max_failures,
            window,
        }
    }

    /// Whether the caller may attempt a login right now. A lapsed window is
    /// removed on the way through, not reset, so abandoned keys do not
    /// accumulate.
    pub fn check(&self, key: &str) -> bool {
        match self.windows.get(key) {
            None => true,
            Some(entry) => {
                if entry.started.elapsed() >= self.window {
                    drop(entry);
                    self.windows
                        .remove_if(key, |_, w| w.started.elapsed() >= self.window);
                    true
                } else {
                    entry.failures < self.max_failures
                }
            }
        }
    }

    /// Record one failed attempt for the caller.
    pub fn record_failure(&self, key: &str) {
        if self.windows.len() >= SWEEP_AT {
            self.windows
                .retain(|_, w| w.started.elapsed() < self.window);
        }
        let mut entry = self.windows.entry(key.to_string()).or_insert_with(|| Window {
            started: Instant::now(),
            failures: 0,
        });
        if entry.started.elapsed() >= self.window {
            entry.started = Instant::now();
            entry.failures = 0;
        }
        entry.failures += 1;
    }
}
