// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Crate-wide error type. Every failure a channel, worker, or pool can
// surface is a distinct variant so callers can match on the tag.

use thiserror::Error;

/// Errors surfaced by channels, the worker pool, and task handles.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Send attempted on a closed channel.
    #[error("channel is closed")]
    Closed,

    /// Receive attempted on a closed channel whose buffer is drained.
    #[error("channel is closed and empty")]
    ClosedAndEmpty,

    /// Serialised payload does not fit a slot (`slot_size - 4` bytes max).
    #[error("payload of {len} bytes exceeds slot budget of {max} bytes")]
    PayloadTooLarge { len: usize, max: usize },

    /// Value could not be encoded for transport.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Received bytes could not be decoded into the requested type.
    #[error("deserialization failed: {0}")]
    Deserialization(String),

    /// A worker exited abnormally while a task was assigned to it.
    #[error("worker exited abnormally while running the task")]
    WorkerFailure,

    /// A pending task was discarded by pool teardown.
    #[error("pool shut down before the task ran")]
    Shutdown,

    /// The task body reported an error.
    #[error("task failed: {0}")]
    Task(String),

    /// Submission named an entry that no worker has registered.
    #[error("no task body registered under {0:?}")]
    UnknownTask(String),

    /// A task looked up a channel id that was never registered.
    #[error("no channel registered under {0:?}")]
    UnknownChannel(String),

    /// Channel creation parameters produce an unusable region.
    #[error("invalid channel layout: {0}")]
    InvalidLayout(&'static str),

    /// A worker thread could not be created.
    #[error("failed to spawn worker: {0}")]
    Spawn(String),
}

pub type Result<T> = std::result::Result<T, Error>;
