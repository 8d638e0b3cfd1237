// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Portable wait/wake fallback: a fixed table of mutex + condvar buckets
// keyed by word address. The value recheck happens under the bucket lock,
// so a wake between recheck and sleep cannot be lost. Address collisions
// only cause spurious wake-ups, which every caller tolerates.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Condvar, Mutex, OnceLock};
use std::time::Duration;

const BUCKETS: usize = 64;

struct Bucket {
    lock: Mutex<()>,
    cond: Condvar,
}

fn table() -> &'static [Bucket; BUCKETS] {
    static TABLE: OnceLock<[Bucket; BUCKETS]> = OnceLock::new();
    TABLE.get_or_init(|| {
        std::array::from_fn(|_| Bucket {
            lock: Mutex::new(()),
            cond: Condvar::new(),
        })
    })
}

fn bucket_of(word: &AtomicU32) -> &'static Bucket {
    let addr = word as *const AtomicU32 as usize;
    // Drop the alignment bits before hashing so neighbouring words spread out.
    &table()[(addr >> 2) % BUCKETS]
}

/// Block until `word` changes from `expected`, a wake arrives, or `timeout`
/// elapses. Spurious returns are allowed; the caller rechecks its predicate.
pub(crate) fn wait(word: &AtomicU32, expected: u32, timeout: Duration) {
    let b = bucket_of(word);
    let guard = b.lock.lock().unwrap();
    if word.load(Ordering::SeqCst) != expected {
        return;
    }
    let _ = b.cond.wait_timeout(guard, timeout);
}

/// Wake one thread blocked on `word`. Collided waiters may wake too.
pub(crate) fn wake_one(word: &AtomicU32) {
    let b = bucket_of(word);
    drop(b.lock.lock().unwrap());
    b.cond.notify_all();
}

/// Wake every thread blocked on `word`.
pub(crate) fn wake_all(word: &AtomicU32) {
    wake_one(word);
}
