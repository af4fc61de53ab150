//! Single-crawl admission gate.
//!
//! The crawler assumes single-invocation semantics; whoever schedules crawls
//! on a background task owns one of these and acquires a permit before
//! starting. The permit releases the gate when dropped.

use std::sync::atomic::{AtomicBool, Ordering};

pub struct CrawlGate {
    running: AtomicBool,
}

impl CrawlGate {
    pub const fn new() -> Self {
        CrawlGate {
            running: AtomicBool::new(false),
        }
    }

    /// Claim the gate. Returns None if a crawl is already running.
    pub fn try_acquire(&self) -> Option<CrawlPermit<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| CrawlPermit { gate: self })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

impl Default for CrawlGate {
    fn default() -> Self {
        Self::new()
    }
}

pub struct CrawlPermit<'a> {
    gate: &'a CrawlGate,
}

impl Drop for CrawlPermit<'_> {
    fn drop(&mut self) {
        self.gate.running.store(false, Ordering::Release);
    }
}
