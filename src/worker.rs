// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Worker: a long-lived task-executing thread owned by the pool.
//
// A worker consumes three control messages — register a channel, execute a
// task, shut down — and sends exactly one reply per executed task. Panics
// in a task body unwind the thread; a drop guard reports the death so the
// pool can fail the in-flight task and issue a replacement.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};
use log::{debug, warn};
use serde_json::Value;

use crate::channel::{ChanInner, Channel};
use crate::codec::Codec;
use crate::error::{Error, Result};
use crate::task::{Task, TaskBody, TaskTable};

pub(crate) type WorkerId = u32;

/// Control messages a worker consumes.
pub(crate) enum WorkerMsg {
    /// Add (or replace) a channel registration.
    Register { id: String, chan: Arc<ChanInner> },
    /// Run one task and reply with its outcome.
    Execute { task: Task },
    /// Drain no further messages and exit cleanly.
    Shutdown,
}

/// Events a worker reports back to the pool dispatcher.
pub(crate) enum WorkerEvent {
    TaskDone {
        worker: WorkerId,
        task_id: u64,
        outcome: Result<Value>,
    },
    /// The worker thread exited without being asked to shut down.
    WorkerDied { worker: WorkerId },
}

// ---------------------------------------------------------------------------
// ChannelRegistry — string id → shared region handle
// ---------------------------------------------------------------------------

/// The channels a worker knows by id. Registrations are append-only within
/// a worker's lifetime; re-registering an id replaces the previous handle.
///
/// Shared task bodies receive `&ChannelRegistry` as their first argument
/// and look channels up typed: both endpoints of a registration must agree
/// on the value type and codec.
pub struct ChannelRegistry {
    map: HashMap<String, Arc<ChanInner>>,
}

impl ChannelRegistry {
    pub(crate) fn new() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    pub(crate) fn insert(&mut self, id: String, chan: Arc<ChanInner>) {
        self.map.insert(id, chan);
    }

    /// Typed view of a registered channel.
    pub fn channel<T>(&self, id: &str) -> Result<Channel<T>> {
        self.channel_with::<T, crate::codec::JsonCodec>(id)
    }

    /// Typed view with an explicit codec.
    pub fn channel_with<T, C: Codec>(&self, id: &str) -> Result<Channel<T, C>> {
        self.map
            .get(id)
            .map(|inner| Channel::from_inner(Arc::clone(inner)))
            .ok_or_else(|| Error::UnknownChannel(id.to_string()))
    }

    /// Whether `id` has been registered.
    pub fn contains(&self, id: &str) -> bool {
        self.map.contains_key(id)
    }
}

// ---------------------------------------------------------------------------
// Worker — thread handle + run loop
// ---------------------------------------------------------------------------

pub(crate) struct Worker {
    pub id: WorkerId,
    pub ctrl: Sender<WorkerMsg>,
    pub join: JoinHandle<()>,
}

impl Worker {
    /// Spawn a worker thread consuming `ctrl` and reporting on `events`.
    pub(crate) fn spawn(
        id: WorkerId,
        table: TaskTable,
        events: Sender<WorkerEvent>,
    ) -> Result<Self> {
        let (ctrl_tx, ctrl_rx) = crossbeam_channel::unbounded();
        let join = thread::Builder::new()
            .name(format!("libchan-worker-{id}"))
            .spawn(move || run(id, ctrl_rx, table, events))
            .map_err(|e| Error::Spawn(e.to_string()))?;
        Ok(Self {
            id,
            ctrl: ctrl_tx,
            join,
        })
    }
}

/// Sends `WorkerDied` when the run loop is left any way other than a clean
/// shutdown — including a panic unwinding a task body.
struct DeathGuard {
    worker: WorkerId,
    events: Sender<WorkerEvent>,
    armed: bool,
}

impl Drop for DeathGuard {
    fn drop(&mut self) {
        if self.armed {
            warn!("worker {} exited abnormally", self.worker);
            let _ = self.events.send(WorkerEvent::WorkerDied {
                worker: self.worker,
            });
        }
    }
}

fn run(
    worker: WorkerId,
    ctrl: Receiver<WorkerMsg>,
    table: TaskTable,
    events: Sender<WorkerEvent>,
) {
    let mut guard = DeathGuard {
        worker,
        events: events.clone(),
        armed: true,
    };
    let mut registry = ChannelRegistry::new();

    while let Ok(msg) = ctrl.recv() {
        match msg {
            WorkerMsg::Register { id, chan } => {
                debug!("worker {worker}: register channel {id:?}");
                registry.insert(id, chan);
            }
            WorkerMsg::Execute { task } => {
                let task_id = task.id;
                let outcome = invoke(&table, &registry, &task);
                if events
                    .send(WorkerEvent::TaskDone {
                        worker,
                        task_id,
                        outcome,
                    })
                    .is_err()
                {
                    break; // dispatcher is gone
                }
            }
            WorkerMsg::Shutdown => break,
        }
    }

    guard.armed = false;
}

/// Look the entry up and run it. A panic in the body unwinds through here;
/// the pool turns the resulting death event into `WorkerFailure` for the
/// assigned task.
fn invoke(table: &TaskTable, registry: &ChannelRegistry, task: &Task) -> Result<Value> {
    let body = table
        .read()
        .unwrap()
        .get(&task.entry)
        .cloned()
        .ok_or_else(|| Error::UnknownTask(task.entry.clone()))?;
    match body {
        TaskBody::Plain(f) => f(task.args.clone()).map_err(Error::Task),
        TaskBody::Shared(f) => f(registry, task.args.clone()).map_err(Error::Task),
    }
}
