// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// CSP-style FIFO channel over a shared memory region.
//
// The region is a fixed header of seven 32-bit atomic words followed by a
// ring of fixed-size slots. Each slot holds a little-endian u32 length
// prefix and an opaque payload. Indices grow monotonically; the slot for
// index `i` is `i mod ring_slots`. All cross-context coordination goes
// through the header: release-stores publish an index, acquire-loads on the
// other side make the payload bytes visible, and the two waiter-count words
// double as the wait/wake addresses.
//
// capacity == 0 is a rendezvous channel: slot arithmetic uses one slot and
// a sender commits only while the buffer is empty and a receiver is
// announced in `waiting_receivers`.

use std::marker::PhantomData;
use std::ptr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec::{estimate_slot_size, Codec, JsonCodec};
use crate::error::{Error, Result};
use crate::region::SharedRegion;
use crate::spin_lock::SpinLock;
use crate::waiter;

/// Bytes taken by the length prefix at the start of every slot.
pub const LEN_PREFIX: usize = 4;

// ---------------------------------------------------------------------------
// Header layout in the shared region
// ---------------------------------------------------------------------------

/// The 28-byte channel header: seven 32-bit words at offsets 0..24.
/// `capacity` and `slot_size` are written once at creation; `closed` is
/// monotonic; the indices are published with release stores.
#[repr(C)]
struct Header {
    capacity: AtomicU32,
    write_index: AtomicU32,
    read_index: AtomicU32,
    closed: AtomicU32,
    slot_size: AtomicU32,
    waiting_senders: AtomicU32,
    waiting_receivers: AtomicU32,
}

/// Header size — the offset of slot 0.
pub const HEADER_SIZE: usize = std::mem::size_of::<Header>();

/// Get the header from the region base.
unsafe fn header(base: *mut u8) -> &'static Header {
    &*(base as *const Header)
}

// ---------------------------------------------------------------------------
// ChanInner — raw byte operations on the region
// ---------------------------------------------------------------------------

/// Untyped channel state: the shared region plus the process-local commit
/// locks. The pool's registration machinery passes this around as
/// `Arc<ChanInner>`; the typed [`Channel`] wrapper adds the codec.
pub(crate) struct ChanInner {
    region: SharedRegion,
    capacity: u32, // 0 = rendezvous
    slot_size: u32,
    send_lock: SpinLock, // serialises claim + payload write + index publish
    recv_lock: SpinLock,
}

impl ChanInner {
    /// Allocate and initialise a region for `capacity` slots of `slot_size`
    /// bytes. Rendezvous channels (`capacity == 0`) still get one slot of
    /// storage for the handshake.
    pub(crate) fn create(capacity: u32, slot_size: u32) -> Result<Self> {
        if (slot_size as usize) < LEN_PREFIX + 4 {
            return Err(Error::InvalidLayout("slot size below 8 bytes"));
        }
        let storage = (capacity.max(1) as usize)
            .checked_mul(slot_size as usize)
            .and_then(|s| s.checked_add(HEADER_SIZE))
            .ok_or(Error::InvalidLayout("region size overflows the platform word"))?;
        let region = SharedRegion::alloc(storage)?;
        let hdr = unsafe { header(region.base()) };
        hdr.capacity.store(capacity, Ordering::Relaxed);
        hdr.slot_size.store(slot_size, Ordering::Relaxed);
        // Indices, closed flag, and waiter counts start at zero from the
        // zeroed allocation.
        Ok(Self {
            region,
            capacity,
            slot_size,
            send_lock: SpinLock::new(),
            recv_lock: SpinLock::new(),
        })
    }

    fn hdr(&self) -> &Header {
        unsafe { header(self.region.base()) }
    }

    /// Number of ring slots backing the region (1 for rendezvous).
    fn ring_slots(&self) -> u32 {
        self.capacity.max(1)
    }

    /// Pointer to the slot for monotonic index `idx`.
    fn slot_ptr(&self, idx: u32) -> *mut u8 {
        let off = HEADER_SIZE + (idx % self.ring_slots()) as usize * self.slot_size as usize;
        unsafe { self.region.base().add(off) }
    }

    /// Largest payload a slot can hold.
    pub(crate) fn max_payload(&self) -> usize {
        self.slot_size as usize - LEN_PREFIX
    }

    pub(crate) fn capacity(&self) -> u32 {
        self.capacity
    }

    pub(crate) fn slot_size(&self) -> u32 {
        self.slot_size
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.hdr().closed.load(Ordering::Acquire) == 1
    }

    /// Advisory: a committed, unconsumed slot exists right now.
    pub(crate) fn has_data(&self) -> bool {
        let hdr = self.hdr();
        hdr.write_index.load(Ordering::Acquire) != hdr.read_index.load(Ordering::Acquire)
    }

    /// Advisory: committed-but-unconsumed slot count.
    pub(crate) fn len(&self) -> u32 {
        let hdr = self.hdr();
        hdr.write_index
            .load(Ordering::Acquire)
            .wrapping_sub(hdr.read_index.load(Ordering::Acquire))
    }

    /// Whether a commit would succeed at this instant.
    fn can_commit(&self) -> bool {
        let hdr = self.hdr();
        let w = hdr.write_index.load(Ordering::Relaxed);
        let r = hdr.read_index.load(Ordering::Acquire);
        if self.capacity == 0 {
            // Rendezvous: empty buffer plus an announced receiver.
            w == r && hdr.waiting_receivers.load(Ordering::SeqCst) > 0
        } else {
            w.wrapping_sub(r) < self.capacity
        }
    }

    /// Claim the next slot, write the payload, publish the index. Returns
    /// `Ok(false)` when the ring is full (or rendezvous finds no receiver).
    fn try_commit(&self, payload: &[u8]) -> Result<bool> {
        let hdr = self.hdr();
        self.send_lock.lock();
        if hdr.closed.load(Ordering::Relaxed) == 1 {
            self.send_lock.unlock();
            return Err(Error::Closed);
        }
        if !self.can_commit() {
            self.send_lock.unlock();
            return Ok(false);
        }
        let w = hdr.write_index.load(Ordering::Relaxed);
        unsafe {
            let slot = self.slot_ptr(w);
            let len = (payload.len() as u32).to_le_bytes();
            ptr::copy_nonoverlapping(len.as_ptr(), slot, LEN_PREFIX);
            ptr::copy_nonoverlapping(payload.as_ptr(), slot.add(LEN_PREFIX), payload.len());
        }
        // Release pairs with the acquire load in try_consume: a reader that
        // observes w+1 observes the payload bytes.
        hdr.write_index.store(w.wrapping_add(1), Ordering::Release);
        self.send_lock.unlock();
        Ok(true)
    }

    /// Consume the slot at `read_index`. `Ok(None)` when the buffer is
    /// empty and the channel is still open.
    fn try_consume(&self) -> Result<Option<Vec<u8>>> {
        let hdr = self.hdr();
        self.recv_lock.lock();
        let w = hdr.write_index.load(Ordering::Acquire);
        let r = hdr.read_index.load(Ordering::Relaxed);
        if w == r {
            let closed = hdr.closed.load(Ordering::Acquire) == 1;
            self.recv_lock.unlock();
            return if closed {
                Err(Error::ClosedAndEmpty)
            } else {
                Ok(None)
            };
        }
        let bytes = unsafe {
            let slot = self.slot_ptr(r);
            let mut len = [0u8; LEN_PREFIX];
            ptr::copy_nonoverlapping(slot, len.as_mut_ptr(), LEN_PREFIX);
            let len = u32::from_le_bytes(len) as usize;
            debug_assert!(len <= self.max_payload());
            std::slice::from_raw_parts(slot.add(LEN_PREFIX), len).to_vec()
        };
        hdr.read_index.store(r.wrapping_add(1), Ordering::Release);
        self.recv_lock.unlock();
        Ok(Some(bytes))
    }

    /// Blocking send of one already-encoded payload.
    pub(crate) fn send_bytes(&self, payload: &[u8]) -> Result<()> {
        if payload.len() > self.max_payload() {
            return Err(Error::PayloadTooLarge {
                len: payload.len(),
                max: self.max_payload(),
            });
        }
        let hdr = self.hdr();
        loop {
            if self.try_commit(payload)? {
                waiter::notify_one(&hdr.waiting_receivers);
                return Ok(());
            }
            // Full (or unmatched rendezvous): park on the sender word, then
            // re-run the whole protocol from the closed check.
            waiter::wait_for(&hdr.waiting_senders, || {
                self.can_commit() || hdr.closed.load(Ordering::Acquire) == 1
            });
        }
    }

    /// Non-blocking send. `Ok(false)` when the ring is full.
    pub(crate) fn try_send_bytes(&self, payload: &[u8]) -> Result<bool> {
        if payload.len() > self.max_payload() {
            return Err(Error::PayloadTooLarge {
                len: payload.len(),
                max: self.max_payload(),
            });
        }
        let sent = self.try_commit(payload)?;
        if sent {
            waiter::notify_one(&self.hdr().waiting_receivers);
        }
        Ok(sent)
    }

    /// Blocking receive of one payload.
    pub(crate) fn recv_bytes(&self) -> Result<Vec<u8>> {
        let hdr = self.hdr();
        if self.capacity == 0 {
            // Stay announced for the whole matching attempt: the receiver
            // count is the rendezvous sender's commit gate.
            hdr.waiting_receivers.fetch_add(1, Ordering::SeqCst);
            waiter::notify_all(&hdr.waiting_senders);
            let out = self.recv_loop();
            hdr.waiting_receivers.fetch_sub(1, Ordering::SeqCst);
            out
        } else {
            self.recv_loop()
        }
    }

    fn recv_loop(&self) -> Result<Vec<u8>> {
        let hdr = self.hdr();
        loop {
            if let Some(bytes) = self.try_consume()? {
                waiter::notify_one(&hdr.waiting_senders);
                return Ok(bytes);
            }
            waiter::wait_for(&hdr.waiting_receivers, || {
                self.has_data() || hdr.closed.load(Ordering::Acquire) == 1
            });
        }
    }

    /// Non-blocking receive. `Ok(None)` when the buffer is empty and open.
    pub(crate) fn try_recv_bytes(&self) -> Result<Option<Vec<u8>>> {
        let got = self.try_consume()?;
        if got.is_some() {
            waiter::notify_one(&self.hdr().waiting_senders);
        }
        Ok(got)
    }

    /// Close the channel and wake every waiter. Idempotent; `closed` never
    /// reverts.
    pub(crate) fn close(&self) {
        let hdr = self.hdr();
        hdr.closed.store(1, Ordering::Release);
        waiter::notify_all(&hdr.waiting_senders);
        waiter::notify_all(&hdr.waiting_receivers);
    }
}

// ---------------------------------------------------------------------------
// Channel<T> — typed wrapper with a codec
// ---------------------------------------------------------------------------

/// A typed, clonable handle to a shared-memory channel.
///
/// Any number of clones may send and receive concurrently; values come out
/// in commit order. Both endpoints of a channel must use the same `T` and
/// codec — the region itself is payload-opaque.
pub struct Channel<T, C: Codec = JsonCodec> {
    inner: Arc<ChanInner>,
    _marker: PhantomData<fn() -> (T, C)>,
}

impl<T, C: Codec> Clone for Channel<T, C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            _marker: PhantomData,
        }
    }
}

impl<T, C: Codec> Channel<T, C> {
    /// Create a buffered channel of `capacity` slots, each budgeted
    /// `slot_size` bytes (length prefix included).
    pub fn bounded(capacity: u32, slot_size: u32) -> Result<Self> {
        Ok(Self::from_inner(Arc::new(ChanInner::create(
            capacity, slot_size,
        )?)))
    }

    /// Create a rendezvous channel: a send completes only once a receiver
    /// is waiting for the value.
    pub fn rendezvous(slot_size: u32) -> Result<Self> {
        Self::bounded(0, slot_size)
    }

    pub(crate) fn from_inner(inner: Arc<ChanInner>) -> Self {
        Self {
            inner,
            _marker: PhantomData,
        }
    }

    pub(crate) fn inner(&self) -> &Arc<ChanInner> {
        &self.inner
    }

    /// Slot count set at creation (0 for rendezvous).
    pub fn capacity(&self) -> u32 {
        self.inner.capacity()
    }

    /// Per-slot byte budget set at creation.
    pub fn slot_size(&self) -> u32 {
        self.inner.slot_size()
    }

    /// Advisory snapshot: the channel has been closed.
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Advisory snapshot: a committed, unconsumed value exists.
    pub fn has_data(&self) -> bool {
        self.inner.has_data()
    }

    /// Advisory snapshot: committed-but-unconsumed value count.
    pub fn len(&self) -> u32 {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Close the channel and wake every blocked sender and receiver.
    /// Idempotent.
    pub fn close(&self) {
        self.inner.close();
    }
}

impl<T: Serialize, C: Codec> Channel<T, C> {
    /// Create a buffered channel whose slot size is estimated from a sample
    /// value (see [`estimate_slot_size`]).
    pub fn with_sample(capacity: u32, sample: &T) -> Result<Self> {
        Self::bounded(capacity, estimate_slot_size(sample)? as u32)
    }

    /// Encode `value` and commit it as the next slot. Blocks while the ring
    /// is full (or, for rendezvous, until a receiver is waiting).
    pub fn send(&self, value: &T) -> Result<()> {
        self.inner.send_bytes(&C::encode(value)?)
    }

    /// Non-blocking send. `Ok(false)` when the ring is full or no
    /// rendezvous receiver is waiting.
    pub fn try_send(&self, value: &T) -> Result<bool> {
        self.inner.try_send_bytes(&C::encode(value)?)
    }
}

impl<T: DeserializeOwned, C: Codec> Channel<T, C> {
    /// Consume and decode the next committed value. Blocks while the buffer
    /// is empty; fails with [`Error::ClosedAndEmpty`] once the channel is
    /// closed and drained.
    pub fn recv(&self) -> Result<T> {
        C::decode(&self.inner.recv_bytes()?)
    }

    /// Non-blocking receive. `Ok(None)` when the buffer is empty and the
    /// channel is open.
    pub fn try_recv(&self) -> Result<Option<T>> {
        match self.inner.try_recv_bytes()? {
            Some(bytes) => Ok(Some(C::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Lazy ordered traversal: yields successive receives until the channel
    /// is closed and drained. Dropping the iterator mid-way leaves the
    /// channel otherwise unchanged.
    pub fn iter(&self) -> Iter<'_, T, C> {
        Iter { chan: self }
    }
}

/// Blocking iterator over a channel; see [`Channel::iter`].
pub struct Iter<'a, T, C: Codec> {
    chan: &'a Channel<T, C>,
}

impl<T: DeserializeOwned, C: Codec> Iterator for Iter<'_, T, C> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.chan.recv() {
            Ok(v) => Some(Ok(v)),
            Err(Error::ClosedAndEmpty) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_is_28_bytes() {
        assert_eq!(HEADER_SIZE, 28);
    }

    #[test]
    fn create_rejects_tiny_slots() {
        assert!(matches!(
            ChanInner::create(4, 7),
            Err(Error::InvalidLayout(_))
        ));
        assert!(ChanInner::create(4, 8).is_ok());
    }

    #[test]
    fn create_rejects_overflowing_region() {
        assert!(matches!(
            ChanInner::create(u32::MAX, u32::MAX),
            Err(Error::InvalidLayout(_))
        ));
    }

    #[test]
    fn payload_budget_is_slot_minus_prefix() {
        let ch = ChanInner::create(1, 16).unwrap();
        assert_eq!(ch.max_payload(), 12);
        assert!(ch.send_bytes(&[0u8; 12]).is_ok());
        assert!(matches!(
            ch.send_bytes(&[0u8; 13]),
            Err(Error::PayloadTooLarge { len: 13, max: 12 })
        ));
    }
}
