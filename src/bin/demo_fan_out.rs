// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Usage:
//   demo_fan_out [tasks]
//
// Fans a batch of squaring tasks over the worker pool, collects the
// results through a WaitGroup, and drains a shared results channel that
// the task bodies write into.

use libchan::{Channel, Pool, WaitGroup};

fn main() {
    env_logger::init();

    let tasks: u64 = std::env::args()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(10);

    let pool = Pool::new().expect("create pool");
    println!("pool up with {} workers", pool.worker_count());

    let results: Channel<u64> = Channel::bounded(tasks.max(1) as u32, 64).expect("create channel");
    pool.register_channel("squares", &results)
        .expect("register channel");

    pool.register_shared_task("square", |registry, args| {
        let n = args
            .get(0)
            .and_then(|v| v.as_u64())
            .ok_or("expected one integer argument")?;
        let out: Channel<u64> = registry.channel("squares").map_err(|e| e.to_string())?;
        out.send(&(n * n)).map_err(|e| e.to_string())?;
        Ok(serde_json::json!(n * n))
    });

    let mut group = WaitGroup::new();
    for n in 1..=tasks {
        group.add(pool.submit("square", &(n,)).expect("submit"));
    }

    let replies = group.wait().expect("wait");
    println!("replies: {replies:?}");

    results.close();
    let via_channel: Vec<u64> = results.iter().map(|r| r.expect("recv")).collect();
    println!("channel:  {via_channel:?}");

    pool.terminate().expect("terminate");
}
