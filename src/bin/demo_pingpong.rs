// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Usage:
//   demo_pingpong [rounds]
//
// Two threads exchange counters over a pair of rendezvous channels. Each
// hand-off blocks until the other side is ready, so the printed sequence
// strictly alternates.

use std::thread;

use libchan::Channel;

fn main() {
    env_logger::init();

    let rounds: u64 = std::env::args()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(10);

    let ping: Channel<u64> = Channel::rendezvous(64).expect("create ping");
    let pong: Channel<u64> = Channel::rendezvous(64).expect("create pong");

    let ping2 = ping.clone();
    let pong2 = pong.clone();
    let echo = thread::spawn(move || {
        for n in ping2.iter() {
            let n = n.expect("recv ping");
            println!("pong <- {n}");
            pong2.send(&(n + 1)).expect("send pong");
        }
        pong2.close();
    });

    let mut n = 0u64;
    for _ in 0..rounds {
        println!("ping -> {n}");
        ping.send(&n).expect("send ping");
        n = pong.recv().expect("recv pong");
    }
    ping.close();

    echo.join().unwrap();
    println!("done after {rounds} rounds, final counter {n}");
}
