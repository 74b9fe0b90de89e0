//! Standalone pipe throughput benchmark.
//!
//! Measures sustained one-way throughput for several capacities and chunk
//! sizes, plus ping-pong latency over a duplex pair.
//!
//! Run with: cargo test --release -p bytepipe pipe_bench -- --ignored --nocapture

use std::thread;
use std::time::Instant;

use bytepipe::{Mode, PipeError, channel, duplex};

/// Total bytes moved per throughput measurement.
const TOTAL: usize = 64 * 1024 * 1024;

/// Round trips per latency measurement.
const ROUND_TRIPS: u32 = 100_000;

#[test]
#[ignore]
fn pipe_bench() {
    println!("\n============================================================");
    println!("  PIPE THROUGHPUT BENCHMARK");
    println!("============================================================\n");

    for capacity in [4 * 1024, 64 * 1024, 1024 * 1024] {
        for chunk in [256, 4 * 1024, 64 * 1024] {
            bench_throughput(capacity, chunk);
        }
    }

    println!("\n--- Ping-pong latency (duplex, 32-byte messages) ---");
    bench_ping_pong();

    println!("\n============================================================");
    println!("  BENCHMARK COMPLETE");
    println!("============================================================\n");
}

fn bench_throughput(capacity: usize, chunk_size: usize) {
    let (mut rx, mut tx) = channel(capacity, Mode::Spsc);

    let writer = thread::spawn(move || {
        let chunk = vec![0xA5u8; chunk_size];
        let mut sent = 0;
        while sent < TOTAL {
            let n = chunk.len().min(TOTAL - sent);
            tx.write(&chunk[..n]).unwrap();
            sent += n;
        }
    });

    let start = Instant::now();
    let mut chunk = vec![0u8; chunk_size];
    let mut received = 0;
    while received < TOTAL {
        match rx.read(&mut chunk) {
            Ok(n) => received += n,
            Err(PipeError::Closed { done }) => {
                received += done;
                break;
            }
            Err(e) => panic!("read failed: {e}"),
        }
    }
    let elapsed = start.elapsed();
    writer.join().unwrap();

    assert_eq!(received, TOTAL);
    let gib_per_sec = TOTAL as f64 / elapsed.as_secs_f64() / (1u64 << 30) as f64;
    println!(
        "cap {:>8}  chunk {:>6}  {:>8.2?}  {:>6.2} GiB/s",
        capacity, chunk_size, elapsed, gib_per_sec
    );
}

fn bench_ping_pong() {
    let (a, b) = duplex(4096, Mode::Spsc);

    let echo = thread::spawn(move || {
        let (mut rx, mut tx) = b.into_split();
        let mut msg = [0u8; 32];
        for _ in 0..ROUND_TRIPS {
            rx.read(&mut msg).unwrap();
            tx.write(&msg).unwrap();
        }
    });

    let (mut rx, mut tx) = a.into_split();
    let msg = [0x5Au8; 32];
    let mut back = [0u8; 32];

    let start = Instant::now();
    for _ in 0..ROUND_TRIPS {
        tx.write(&msg).unwrap();
        rx.read(&mut back).unwrap();
    }
    let elapsed = start.elapsed();
    echo.join().unwrap();

    println!(
        "{ROUND_TRIPS} round trips in {:.2?}  ({:.0} ns/rt)",
        elapsed,
        elapsed.as_nanos() as f64 / f64::from(ROUND_TRIPS)
    );
}
