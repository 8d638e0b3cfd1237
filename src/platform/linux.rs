// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// futex(2) wait/wake. All waiters in this runtime live in one process,
// so FUTEX_PRIVATE_FLAG applies.

use std::sync::atomic::AtomicU32;
use std::time::Duration;

fn futex(word: &AtomicU32, op: libc::c_int, val: u32, ts: *const libc::timespec) -> libc::c_long {
    unsafe {
        libc::syscall(
            libc::SYS_futex,
            word as *const AtomicU32 as *mut u32,
            op | libc::FUTEX_PRIVATE_FLAG,
            val,
            ts,
            std::ptr::null_mut::<u32>(),
            0u32,
        )
    }
}

/// Block until `word` changes from `expected`, a wake arrives, or `timeout`
/// elapses. Returns immediately if `*word != expected`. Spurious returns are
/// allowed; the caller rechecks its predicate.
pub(crate) fn wait(word: &AtomicU32, expected: u32, timeout: Duration) {
    let ts = libc::timespec {
        tv_sec: timeout.as_secs() as libc::time_t,
        tv_nsec: libc::c_long::from(timeout.subsec_nanos()),
    };
    let _ = futex(word, libc::FUTEX_WAIT, expected, &ts);
}

/// Wake one thread blocked on `word`.
pub(crate) fn wake_one(word: &AtomicU32) {
    let _ = futex(word, libc::FUTEX_WAKE, 1, std::ptr::null());
}

/// Wake every thread blocked on `word`.
pub(crate) fn wake_all(word: &AtomicU32) {
    let _ = futex(word, libc::FUTEX_WAKE, u32::MAX, std::ptr::null());
}
