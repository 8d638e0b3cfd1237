// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Task model for the worker pool.
//
// Task bodies are registered once, by stable string identifier, in a table
// every worker shares; a submission names an entry and carries a JSON
// argument value. Bodies that need channel access are a distinct entry
// point (`TaskBody::Shared`) that receives the worker's channel registry as
// its first argument — the two kinds are told apart by the registration,
// never by inspecting the body.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crossbeam_channel::Receiver;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::worker::ChannelRegistry;

/// What a task body returns: a JSON result value, or an error message that
/// becomes the rejection of the submission's completion handle.
pub type TaskResult = std::result::Result<Value, String>;

/// A plain task body: arguments in, result out.
pub type PlainFn = dyn Fn(Value) -> TaskResult + Send + Sync;

/// A channel-using task body: the worker's registry is injected first.
pub type SharedFn = dyn Fn(&ChannelRegistry, Value) -> TaskResult + Send + Sync;

/// A registered task body. The variant is the entry-point tag that decides
/// whether the channel registry is injected.
#[derive(Clone)]
pub enum TaskBody {
    Plain(Arc<PlainFn>),
    Shared(Arc<SharedFn>),
}

/// Identifier → body table, shared by the pool and every worker.
pub(crate) type TaskTable = Arc<RwLock<HashMap<String, TaskBody>>>;

/// One submitted unit of work, owned by the pool until a worker takes it.
#[derive(Clone)]
pub(crate) struct Task {
    /// Unique per submission; replies are correlated by it.
    pub id: u64,
    /// Entry identifier in the task table.
    pub entry: String,
    /// JSON-encoded argument value (an array for tuple arguments).
    pub args: Value,
}

// ---------------------------------------------------------------------------
// TaskHandle — per-submission completion handle
// ---------------------------------------------------------------------------

/// Completion handle for one submission. Exactly one of resolve/reject
/// happens per handle; [`TaskHandle::wait`] blocks for it.
#[derive(Debug)]
pub struct TaskHandle {
    id: u64,
    rx: Receiver<Result<Value>>,
}

impl TaskHandle {
    pub(crate) fn new(id: u64, rx: Receiver<Result<Value>>) -> Self {
        Self { id, rx }
    }

    /// The submission's unique task id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Advisory: the outcome has been delivered (or the pool is gone).
    pub fn is_finished(&self) -> bool {
        !self.rx.is_empty()
    }

    /// Block until the task resolves or rejects. A dispatcher that went
    /// away without replying counts as pool shutdown.
    pub fn wait(self) -> Result<Value> {
        match self.rx.recv() {
            Ok(outcome) => outcome,
            Err(_) => Err(Error::Shutdown),
        }
    }

    /// Non-blocking poll of the outcome.
    pub fn try_wait(self) -> std::result::Result<Result<Value>, TaskHandle> {
        match self.rx.try_recv() {
            Ok(outcome) => Ok(outcome),
            Err(crossbeam_channel::TryRecvError::Disconnected) => Ok(Err(Error::Shutdown)),
            Err(crossbeam_channel::TryRecvError::Empty) => Err(self),
        }
    }
}
