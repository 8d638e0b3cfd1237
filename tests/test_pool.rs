// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Worker pool behaviour: dispatch and correlation, WaitGroup aggregation,
// worker replacement, registration replay, and teardown.

use std::collections::HashSet;
use std::thread;
use std::time::Duration;

use libchan::{Channel, Error, Pool, PoolConfig, WaitGroup};
use serde_json::{json, Value};

fn arg_u64(args: &Value) -> Result<u64, String> {
    args.get(0)
        .and_then(|v| v.as_u64())
        .ok_or_else(|| "expected one integer argument".to_string())
}

// Scenario: 4 workers, 10 squaring tasks, every reply correlated once.
#[test]
fn fan_out_squares() {
    let pool = Pool::with_config(PoolConfig { workers: 4 }).expect("pool");
    pool.register_task("square", |args| {
        let n = arg_u64(&args)?;
        Ok(json!(n * n))
    });

    let handles: Vec<_> = (1..=10u64)
        .map(|n| pool.submit("square", &(n,)).expect("submit"))
        .collect();

    let ids: HashSet<u64> = handles.iter().map(|h| h.id()).collect();
    assert_eq!(ids.len(), 10, "task ids must be unique");

    let mut results: Vec<u64> = handles
        .into_iter()
        .map(|h| h.wait().expect("task").as_u64().unwrap())
        .collect();
    results.sort_unstable();
    assert_eq!(results, vec![1, 4, 9, 16, 25, 36, 49, 64, 81, 100]);

    pool.terminate().expect("terminate");
}

#[test]
fn single_worker_serialises_tasks() {
    let pool = Pool::with_config(PoolConfig { workers: 1 }).expect("pool");
    pool.register_task("echo", |args| Ok(args));

    for n in 0..3 {
        let h = pool.submit("echo", &(n,)).expect("submit");
        assert_eq!(h.wait().expect("task"), json!([n]));
    }
    pool.terminate().expect("terminate");
}

#[test]
fn task_error_rejects_handle() {
    let pool = Pool::with_config(PoolConfig { workers: 2 }).expect("pool");
    pool.register_task("fail", |_| Err("nope".to_string()));

    let err = pool.submit("fail", &()).expect("submit").wait().unwrap_err();
    assert_eq!(err, Error::Task("nope".to_string()));
    pool.terminate().expect("terminate");
}

#[test]
fn unknown_entry_rejects_handle() {
    let pool = Pool::with_config(PoolConfig { workers: 1 }).expect("pool");
    let err = pool
        .submit("never-registered", &())
        .expect("submit")
        .wait()
        .unwrap_err();
    assert_eq!(err, Error::UnknownTask("never-registered".to_string()));
    pool.terminate().expect("terminate");
}

// WaitGroup: ordered results on success, first observed failure otherwise.
#[test]
fn wait_group_collects_in_order() {
    let pool = Pool::with_config(PoolConfig { workers: 4 }).expect("pool");
    pool.register_task("ident", |args| {
        thread::sleep(Duration::from_millis(10));
        Ok(args)
    });

    let mut group = WaitGroup::new();
    for n in 0..4 {
        group.add(pool.submit("ident", &(n,)).expect("submit"));
    }
    let results = group.wait().expect("wait");
    assert_eq!(results, vec![json!([0]), json!([1]), json!([2]), json!([3])]);

    // Empty and reusable afterwards.
    assert_eq!(group.count(), 0);
    group.add(pool.submit("ident", &(9,)).expect("submit"));
    assert_eq!(group.wait().expect("wait"), vec![json!([9])]);

    pool.terminate().expect("terminate");
}

#[test]
fn wait_group_propagates_first_failure() {
    let pool = Pool::with_config(PoolConfig { workers: 2 }).expect("pool");
    pool.register_task("ok_after_50ms", |_| {
        thread::sleep(Duration::from_millis(50));
        Ok(json!("ok"))
    });
    pool.register_task("boom_after_10ms", |_| {
        thread::sleep(Duration::from_millis(10));
        Err("boom".to_string())
    });

    let mut group = WaitGroup::new();
    group.add(pool.submit("ok_after_50ms", &()).expect("submit"));
    group.add(pool.submit("boom_after_10ms", &()).expect("submit"));

    assert_eq!(group.wait().unwrap_err(), Error::Task("boom".to_string()));
    pool.terminate().expect("terminate");
}

// A panicking task body is an abnormal worker exit, not a task error.
#[test]
fn worker_death_fails_inflight_task() {
    let pool = Pool::with_config(PoolConfig { workers: 2 }).expect("pool");
    pool.register_task("explode", |_| panic!("forced worker exit"));
    pool.register_task("square", |args| {
        let n = arg_u64(&args)?;
        Ok(json!(n * n))
    });

    let err = pool
        .submit("explode", &())
        .expect("submit")
        .wait()
        .unwrap_err();
    assert_eq!(err, Error::WorkerFailure);

    // The pool keeps working and restores its bound on the next submission.
    let h = pool.submit("square", &(6,)).expect("submit");
    assert_eq!(h.wait().expect("task"), json!(36));
    assert_eq!(pool.worker_count(), 2);

    pool.terminate().expect("terminate");
}

// Scenario: registration replay — a channel registered before a worker dies
// is resolvable by the replacement.
#[test]
fn registration_replay_after_worker_death() {
    let pool = Pool::with_config(PoolConfig { workers: 2 }).expect("pool");

    let results: Channel<u64> = Channel::bounded(8, 64).expect("channel");
    pool.register_channel("results", &results).expect("register");

    pool.register_task("explode", |_| panic!("forced worker exit"));
    pool.register_shared_task("push_double", |registry, args| {
        let n = arg_u64(&args)?;
        let out: Channel<u64> = registry.channel("results").map_err(|e| e.to_string())?;
        out.send(&(n * 2)).map_err(|e| e.to_string())?;
        Ok(json!(n * 2))
    });

    // Kill both initial workers so every later task runs on a replacement.
    for _ in 0..2 {
        let err = pool
            .submit("explode", &())
            .expect("submit")
            .wait()
            .unwrap_err();
        assert_eq!(err, Error::WorkerFailure);
    }

    let mut group = WaitGroup::new();
    for n in 1..=4u64 {
        group.add(pool.submit("push_double", &(n,)).expect("submit"));
    }
    group.wait().expect("replacement workers resolve the lookup");

    results.close();
    let mut got: Vec<u64> = results.iter().map(|r| r.expect("recv")).collect();
    got.sort_unstable();
    assert_eq!(got, vec![2, 4, 6, 8]);

    pool.terminate().expect("terminate");
}

#[test]
fn channels_broadcast_to_current_workers() {
    let pool = Pool::with_config(PoolConfig { workers: 2 }).expect("pool");
    let nums: Channel<u64> = Channel::bounded(16, 64).expect("channel");
    pool.register_channel("nums", &nums).expect("register");

    pool.register_shared_task("emit", |registry, args| {
        let n = arg_u64(&args)?;
        let out: Channel<u64> = registry.channel("nums").map_err(|e| e.to_string())?;
        out.send(&n).map_err(|e| e.to_string())?;
        Ok(Value::Null)
    });

    let mut group = WaitGroup::new();
    for n in 0..5u64 {
        group.add(pool.submit("emit", &(n,)).expect("submit"));
    }
    group.wait().expect("wait");

    nums.close();
    let mut got: Vec<u64> = nums.iter().map(|r| r.expect("recv")).collect();
    got.sort_unstable();
    assert_eq!(got, vec![0, 1, 2, 3, 4]);

    pool.terminate().expect("terminate");
}

// Re-registering an id replaces the handle in every worker's registry.
#[test]
fn re_registration_replaces_channel() {
    let pool = Pool::with_config(PoolConfig { workers: 1 }).expect("pool");
    pool.register_shared_task("emit", |registry, args| {
        let n = arg_u64(&args)?;
        let out: Channel<u64> = registry.channel("out").map_err(|e| e.to_string())?;
        out.send(&n).map_err(|e| e.to_string())?;
        Ok(Value::Null)
    });

    let first: Channel<u64> = Channel::bounded(4, 64).expect("channel");
    let second: Channel<u64> = Channel::bounded(4, 64).expect("channel");
    pool.register_channel("out", &first).expect("register");
    pool.register_channel("out", &second).expect("re-register");

    pool.submit("emit", &(7u64,))
        .expect("submit")
        .wait()
        .expect("task");

    assert!(!first.has_data());
    assert_eq!(second.try_recv().expect("try_recv"), Some(7));

    pool.terminate().expect("terminate");
}

#[test]
fn unknown_channel_is_a_task_error() {
    let pool = Pool::with_config(PoolConfig { workers: 1 }).expect("pool");
    pool.register_shared_task("lookup", |registry, _| {
        registry
            .channel::<u64>("missing")
            .map(|_| Value::Null)
            .map_err(|e| e.to_string())
    });

    let err = pool.submit("lookup", &()).expect("submit").wait().unwrap_err();
    assert!(matches!(err, Error::Task(_)));
    // The worker survives a failed lookup.
    assert_eq!(pool.worker_count(), 1);
    pool.terminate().expect("terminate");
}

// Teardown: the running task finishes, queued tasks fail with Shutdown.
#[test]
fn terminate_fails_pending_tasks() {
    let pool = Pool::with_config(PoolConfig { workers: 1 }).expect("pool");
    pool.register_task("sleepy", |args| {
        thread::sleep(Duration::from_millis(200));
        Ok(args)
    });

    let running = pool.submit("sleepy", &(0,)).expect("submit");
    let queued: Vec<_> = (1..3)
        .map(|n| pool.submit("sleepy", &(n,)).expect("submit"))
        .collect();

    // Let the first task reach the worker before tearing down.
    thread::sleep(Duration::from_millis(50));
    pool.terminate().expect("terminate");

    assert_eq!(running.wait().expect("running task"), json!([0]));
    for h in queued {
        assert_eq!(h.wait().unwrap_err(), Error::Shutdown);
    }
}

#[test]
fn submit_after_terminate_is_shutdown() {
    let pool = Pool::with_config(PoolConfig { workers: 1 }).expect("pool");
    pool.terminate().expect("terminate");
    assert_eq!(pool.submit("anything", &()).unwrap_err(), Error::Shutdown);
}
