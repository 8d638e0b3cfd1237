// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// WaitOnAddress / WakeByAddress wait/wake (Windows 8+).

use std::ffi::c_void;
use std::sync::atomic::AtomicU32;
use std::time::Duration;

use windows_sys::Win32::System::Threading::{
    WaitOnAddress, WakeByAddressAll, WakeByAddressSingle,
};

/// Block until `word` changes from `expected`, a wake arrives, or `timeout`
/// elapses. Spurious returns are allowed; the caller rechecks its predicate.
pub(crate) fn wait(word: &AtomicU32, expected: u32, timeout: Duration) {
    let ms = timeout.as_millis().min(u128::from(u32::MAX)) as u32;
    unsafe {
        WaitOnAddress(
            word as *const AtomicU32 as *const c_void,
            &expected as *const u32 as *const c_void,
            std::mem::size_of::<u32>(),
            ms,
        );
    }
}

/// Wake one thread blocked on `word`.
pub(crate) fn wake_one(word: &AtomicU32) {
    unsafe { WakeByAddressSingle(word as *const AtomicU32 as *const c_void) }
}

/// Wake every thread blocked on `word`.
pub(crate) fn wake_all(word: &AtomicU32) {
    unsafe { WakeByAddressAll(word as *const AtomicU32 as *const c_void) }
}
