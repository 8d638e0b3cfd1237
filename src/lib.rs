// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// CSP-style channels over a shared memory region, plus a task-executing
// worker pool. Channels are bounded or rendezvous FIFOs whose state lives
// in an atomic header readable by every execution context; the pool owns a
// fixed set of worker threads, dispatches registered task bodies to them,
// and replays channel registrations to replacements.

mod platform;

mod region;
mod spin_lock;
mod waiter;

mod error;
pub use error::{Error, Result};

pub mod codec;
pub use codec::{estimate_slot_size, Codec, JsonCodec};

mod channel;
pub use channel::{Channel, Iter, HEADER_SIZE, LEN_PREFIX};

mod task;
pub use task::{PlainFn, SharedFn, TaskBody, TaskHandle, TaskResult};

mod worker;
pub use worker::ChannelRegistry;

mod pool;
pub use pool::{Pool, PoolConfig};

mod wait_group;
pub use wait_group::WaitGroup;
