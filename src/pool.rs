// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Worker pool: a bounded set of worker threads, a FIFO pending queue, and
// a dispatcher that pairs tasks with idle workers, correlates replies by
// task id, replays channel registrations to replacement workers, and fails
// what cannot run any more.
//
// The dispatcher is one thread owning all pool state; the host talks to it
// through a command channel and workers report through an event channel.
// Exactly one of resolve/reject happens per submission handle.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{select, Receiver, Sender};
use log::{debug, error, warn};
use serde::Serialize;
use serde_json::Value;

use crate::channel::{ChanInner, Channel};
use crate::codec::Codec;
use crate::error::{Error, Result};
use crate::task::{Task, TaskBody, TaskHandle, TaskResult, TaskTable};
use crate::worker::{ChannelRegistry, Worker, WorkerEvent, WorkerId, WorkerMsg};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Pool construction parameters.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Upper bound on live workers; the pool starts at the bound.
    pub workers: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: num_cpus::get(),
        }
    }
}

// ---------------------------------------------------------------------------
// Host-side commands
// ---------------------------------------------------------------------------

enum HostCmd {
    Submit {
        task: Task,
        handle: Sender<Result<Value>>,
    },
    RegisterChannel {
        id: String,
        chan: Arc<ChanInner>,
    },
    Terminate {
        done: Sender<()>,
    },
}

// ---------------------------------------------------------------------------
// Pool — public handle
// ---------------------------------------------------------------------------

/// Supervisor of a bounded worker set and a pending-task queue.
///
/// Construction creates an owned pool; there is no process-wide instance.
/// Task bodies are registered by stable identifier before submission;
/// channel registrations are broadcast to every worker and replayed to
/// replacements.
pub struct Pool {
    cmds: Sender<HostCmd>,
    table: TaskTable,
    next_task: AtomicU64,
    worker_count: Arc<AtomicUsize>,
    pending_count: Arc<AtomicUsize>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl Pool {
    /// Create a pool with one worker per host CPU.
    pub fn new() -> Result<Self> {
        Self::with_config(PoolConfig::default())
    }

    /// Create a pool with an explicit worker bound (floored at 1).
    pub fn with_config(cfg: PoolConfig) -> Result<Self> {
        let bound = cfg.workers.max(1);
        let table: TaskTable = Arc::new(RwLock::new(HashMap::new()));
        let worker_count = Arc::new(AtomicUsize::new(0));
        let pending_count = Arc::new(AtomicUsize::new(0));

        let (cmd_tx, cmd_rx) = crossbeam_channel::unbounded();
        let (evt_tx, evt_rx) = crossbeam_channel::unbounded();

        let mut dispatcher = Dispatcher {
            bound,
            table: Arc::clone(&table),
            events_tx: evt_tx,
            events_rx: evt_rx,
            cmds: cmd_rx,
            workers: HashMap::new(),
            idle: VecDeque::new(),
            pending: VecDeque::new(),
            assigned: HashMap::new(),
            handles: HashMap::new(),
            history: Vec::new(),
            next_worker: 0,
            worker_count: Arc::clone(&worker_count),
            pending_count: Arc::clone(&pending_count),
        };
        dispatcher.fill_to_bound()?;

        let join = thread::Builder::new()
            .name("libchan-pool".into())
            .spawn(move || dispatcher.run())
            .map_err(|e| Error::Spawn(e.to_string()))?;

        Ok(Self {
            cmds: cmd_tx,
            table,
            next_task: AtomicU64::new(1),
            worker_count,
            pending_count,
            dispatcher: Mutex::new(Some(join)),
        })
    }

    /// Register a plain task body under `name`. Visible to every worker,
    /// current and future. Re-registration replaces the body.
    pub fn register_task<F>(&self, name: &str, f: F)
    where
        F: Fn(Value) -> TaskResult + Send + Sync + 'static,
    {
        self.table
            .write()
            .unwrap()
            .insert(name.to_string(), TaskBody::Plain(Arc::new(f)));
    }

    /// Register a task body that receives the worker's channel registry as
    /// its first argument. The distinct entry point is what marks a task as
    /// channel-using — bodies are never inspected.
    pub fn register_shared_task<F>(&self, name: &str, f: F)
    where
        F: Fn(&ChannelRegistry, Value) -> TaskResult + Send + Sync + 'static,
    {
        self.table
            .write()
            .unwrap()
            .insert(name.to_string(), TaskBody::Shared(Arc::new(f)));
    }

    /// Record `(id, channel)` in the registration history and broadcast it
    /// to every current worker. Replacement workers receive the full
    /// history before their first task.
    pub fn register_channel<T, C: Codec>(&self, id: &str, chan: &Channel<T, C>) -> Result<()> {
        self.cmds
            .send(HostCmd::RegisterChannel {
                id: id.to_string(),
                chan: Arc::clone(chan.inner()),
            })
            .map_err(|_| Error::Shutdown)
    }

    /// Submit `entry` with `args` for execution on some idle worker.
    /// Returns a completion handle correlated by a fresh unique id.
    pub fn submit<A: Serialize>(&self, entry: &str, args: &A) -> Result<TaskHandle> {
        let args = serde_json::to_value(args).map_err(|e| Error::Serialization(e.to_string()))?;
        let id = self.next_task.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = crossbeam_channel::bounded(1);
        self.cmds
            .send(HostCmd::Submit {
                task: Task {
                    id,
                    entry: entry.to_string(),
                    args,
                },
                handle: tx,
            })
            .map_err(|_| Error::Shutdown)?;
        Ok(TaskHandle::new(id, rx))
    }

    /// Advisory: live worker count.
    pub fn worker_count(&self) -> usize {
        self.worker_count.load(Ordering::Relaxed)
    }

    /// Advisory: queued-but-undispatched task count.
    pub fn pending_count(&self) -> usize {
        self.pending_count.load(Ordering::Relaxed)
    }

    /// Shut every worker down, await their termination, and fail all
    /// pending submissions with [`Error::Shutdown`]. Idempotent.
    pub fn terminate(&self) -> Result<()> {
        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        if self.cmds.send(HostCmd::Terminate { done: done_tx }).is_ok() {
            let _ = done_rx.recv();
        }
        if let Some(join) = self.dispatcher.lock().unwrap().take() {
            let _ = join.join();
        }
        Ok(())
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        let _ = self.terminate();
    }
}

// ---------------------------------------------------------------------------
// Dispatcher — the pool's single owning thread
// ---------------------------------------------------------------------------

struct Dispatcher {
    bound: usize,
    table: TaskTable,
    events_tx: Sender<WorkerEvent>,
    events_rx: Receiver<WorkerEvent>,
    cmds: Receiver<HostCmd>,
    workers: HashMap<WorkerId, Worker>,
    idle: VecDeque<WorkerId>,
    pending: VecDeque<Task>,
    /// worker → the task id it is currently running.
    assigned: HashMap<WorkerId, u64>,
    handles: HashMap<u64, Sender<Result<Value>>>,
    /// Append-only registration record, replayed to new workers.
    history: Vec<(String, Arc<ChanInner>)>,
    next_worker: WorkerId,
    worker_count: Arc<AtomicUsize>,
    pending_count: Arc<AtomicUsize>,
}

impl Dispatcher {
    fn run(&mut self) {
        // Local receiver clones keep the select free of `self` borrows.
        let cmds = self.cmds.clone();
        let events = self.events_rx.clone();
        loop {
            select! {
                recv(cmds) -> cmd => match cmd {
                    Ok(HostCmd::Submit { task, handle }) => {
                        debug!("submit task {} ({:?})", task.id, task.entry);
                        self.handles.insert(task.id, handle);
                        self.pending.push_back(task);
                        // Lazy replacement: restore the bound while work
                        // exists.
                        if let Err(e) = self.fill_to_bound() {
                            error!("worker replacement failed: {e}");
                        }
                        self.pump();
                    }
                    Ok(HostCmd::RegisterChannel { id, chan }) => {
                        self.register_channel(id, chan);
                    }
                    Ok(HostCmd::Terminate { done }) => {
                        self.shutdown();
                        let _ = done.send(());
                        return;
                    }
                    // Host handle dropped without terminate().
                    Err(_) => {
                        self.shutdown();
                        return;
                    }
                },
                recv(events) -> evt => if let Ok(evt) = evt {
                    self.on_event(evt);
                },
            }
            self.pending_count
                .store(self.pending.len(), Ordering::Relaxed);
        }
    }

    fn on_event(&mut self, evt: WorkerEvent) {
        match evt {
            WorkerEvent::TaskDone {
                worker,
                task_id,
                outcome,
            } => {
                self.assigned.remove(&worker);
                if let Some(handle) = self.handles.remove(&task_id) {
                    let _ = handle.send(outcome);
                }
                if self.workers.contains_key(&worker) {
                    self.idle.push_back(worker);
                }
                self.pump();
            }
            WorkerEvent::WorkerDied { worker } => self.on_worker_died(worker),
        }
    }

    fn register_channel(&mut self, id: String, chan: Arc<ChanInner>) {
        debug!("register channel {id:?} with {} workers", self.workers.len());
        self.history.push((id.clone(), Arc::clone(&chan)));
        for w in self.workers.values() {
            if w.ctrl
                .send(WorkerMsg::Register {
                    id: id.clone(),
                    chan: Arc::clone(&chan),
                })
                .is_err()
            {
                // Worker already gone; its death event will clean up and
                // the replacement replays the history anyway.
                warn!("worker {} unreachable during registration", w.id);
            }
        }
    }

    /// Pair pending tasks with idle workers while both exist.
    fn pump(&mut self) {
        while !self.pending.is_empty() && !self.idle.is_empty() {
            let worker = match self.idle.pop_front() {
                Some(w) => w,
                None => break,
            };
            let task = match self.pending.pop_front() {
                Some(t) => t,
                None => break,
            };
            let task_id = task.id;
            let sent = match self.workers.get(&worker) {
                Some(w) => w.ctrl.send(WorkerMsg::Execute { task: task.clone() }).is_ok(),
                None => false,
            };
            if sent {
                self.assigned.insert(worker, task_id);
            } else {
                // Transport to this worker failed; put the task back and let
                // the death event remove the worker.
                warn!("dispatch to worker {worker} failed, requeueing task {task_id}");
                self.pending.push_front(task);
            }
        }
        self.pending_count
            .store(self.pending.len(), Ordering::Relaxed);
    }

    /// Spawn workers until the bound is met. Each new worker receives the
    /// full registration history before it is marked idle.
    fn fill_to_bound(&mut self) -> Result<()> {
        while self.workers.len() < self.bound {
            let id = self.next_worker;
            self.next_worker += 1;
            let worker = Worker::spawn(id, Arc::clone(&self.table), self.events_tx.clone())?;
            for (chan_id, chan) in &self.history {
                let _ = worker.ctrl.send(WorkerMsg::Register {
                    id: chan_id.clone(),
                    chan: Arc::clone(chan),
                });
            }
            debug!("worker {id} up ({} registrations replayed)", self.history.len());
            self.workers.insert(id, worker);
            self.idle.push_back(id);
        }
        self.worker_count
            .store(self.workers.len(), Ordering::Relaxed);
        Ok(())
    }

    fn on_worker_died(&mut self, worker: WorkerId) {
        warn!("worker {worker} died");
        if let Some(w) = self.workers.remove(&worker) {
            let _ = w.join.join();
        }
        self.idle.retain(|id| *id != worker);
        self.worker_count
            .store(self.workers.len(), Ordering::Relaxed);

        // The in-flight task cannot complete any more.
        if let Some(task_id) = self.assigned.remove(&worker) {
            if let Some(handle) = self.handles.remove(&task_id) {
                let _ = handle.send(Err(Error::WorkerFailure));
            }
        }

        // Replace immediately while work is queued; otherwise the next
        // submission restores the bound.
        if !self.pending.is_empty() {
            if let Err(e) = self.fill_to_bound() {
                error!("worker replacement failed: {e}");
            }
            self.pump();
        }
    }

    fn shutdown(&mut self) {
        debug!("pool terminating: {} workers, {} pending", self.workers.len(), self.pending.len());
        let mut joins = Vec::new();
        for (_, w) in self.workers.drain() {
            let _ = w.ctrl.send(WorkerMsg::Shutdown);
            joins.push(w.join);
        }
        for j in joins {
            let _ = j.join();
        }
        self.idle.clear();
        self.worker_count.store(0, Ordering::Relaxed);

        // Workers finish the task in front of the shutdown message; deliver
        // those outcomes before failing what never ran.
        while let Ok(evt) = self.events_rx.try_recv() {
            if let WorkerEvent::TaskDone {
                worker,
                task_id,
                outcome,
            } = evt
            {
                self.assigned.remove(&worker);
                if let Some(handle) = self.handles.remove(&task_id) {
                    let _ = handle.send(outcome);
                }
            }
        }
        for task in self.pending.drain(..) {
            if let Some(handle) = self.handles.remove(&task.id) {
                let _ = handle.send(Err(Error::Shutdown));
            }
        }
        self.pending_count.store(0, Ordering::Relaxed);
        // Any handle still unresolved rejects via disconnect when the map
        // drops with the dispatcher.
    }
}
