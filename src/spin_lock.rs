// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Test-and-test-and-set spin lock guarding the channel commit sections.
// Hold times are a few memcpys plus two atomic stores, so contention is
// short-lived and the lock never needs to sleep; it is never held across
// a park.

use std::sync::atomic::{AtomicBool, Ordering};

/// Contention backoff: exponentially longer pause bursts while the cache
/// line is hot, handing the core to the scheduler once a burst would stop
/// paying for itself.
struct Backoff {
    shift: u32,
}

impl Backoff {
    /// Longest burst is 2^MAX_SHIFT pause hints (~a few hundred cycles).
    const MAX_SHIFT: u32 = 7;

    fn new() -> Self {
        Self { shift: 0 }
    }

    fn snooze(&mut self) {
        if self.shift < Self::MAX_SHIFT {
            for _ in 0..1u32 << self.shift {
                std::hint::spin_loop();
            }
            self.shift += 1;
        } else {
            std::thread::yield_now();
        }
    }
}

/// A minimal spin lock over an `AtomicBool`.
pub(crate) struct SpinLock {
    held: AtomicBool,
}

impl SpinLock {
    pub(crate) const fn new() -> Self {
        Self {
            held: AtomicBool::new(false),
        }
    }

    /// Acquire the lock. Contenders read-spin on the flag so only the
    /// release, not every retry, bounces the cache line.
    pub(crate) fn lock(&self) {
        let mut backoff = Backoff::new();
        loop {
            if self
                .held
                .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                return;
            }
            while self.held.load(Ordering::Relaxed) {
                backoff.snooze();
            }
        }
    }

    /// Release the lock.
    pub(crate) fn unlock(&self) {
        self.held.store(false, Ordering::Release);
    }
}
