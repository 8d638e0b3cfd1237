// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Sleep/wake for channel senders and receivers, on top of the platform
// wait/wake primitive. The wait address is one of the two waiter-count
// words in the channel header: a waiter announces itself by incrementing
// the word, parks on it for a bounded slice, then retracts the count and
// rechecks the full protocol state. Wakers skip the syscall when the count
// says nobody is parked.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use crate::platform;

/// Upper bound on one park slice. Lost wake-ups therefore cost at most this
/// much latency before the waiter rechecks on its own.
pub(crate) const MAX_WAIT: Duration = Duration::from_millis(10);

/// Spin/yield attempts before falling back to the platform wait.
const SPIN_COUNT: u32 = 32;

/// Wait until `pred` returns true or one bounded park slice elapses.
///
/// Spins up to `SPIN_COUNT` yields first; the announce → recheck → park
/// sequence closes the window where a wake could slip between the last
/// predicate check and the sleep. Spurious returns are expected — the
/// caller loops and re-examines the header.
pub(crate) fn wait_for<F>(word: &AtomicU32, pred: F)
where
    F: Fn() -> bool,
{
    let mut k = 0u32;
    while !pred() {
        if k < SPIN_COUNT {
            std::thread::yield_now();
            k += 1;
            continue;
        }
        let observed = word.fetch_add(1, Ordering::SeqCst) + 1;
        if !pred() {
            platform::wait(word, observed, MAX_WAIT);
        }
        word.fetch_sub(1, Ordering::SeqCst);
        return;
    }
}

/// Wake one thread parked on `word`, if any.
pub(crate) fn notify_one(word: &AtomicU32) {
    if word.load(Ordering::SeqCst) > 0 {
        platform::wake_one(word);
    }
}

/// Wake every thread parked on `word`, if any.
pub(crate) fn notify_all(word: &AtomicU32) {
    if word.load(Ordering::SeqCst) > 0 {
        platform::wake_all(word);
    }
}
