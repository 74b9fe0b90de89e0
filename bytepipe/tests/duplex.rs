//! Full-duplex connection behavior over a pair of pipes.

use std::thread;
use std::time::Duration;

use minstant::Instant;

use bytepipe::{Mode, PipeError, duplex};

fn pattern(len: usize) -> Vec<u8> {
    let mut state = 0xDEAD_BEEF_u32;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state >> 16) as u8
        })
        .collect()
}

#[test]
fn full_duplex_echo() {
    const TOTAL: usize = 10 * 1024;

    let (a, b) = duplex(32, Mode::Spsc);
    let data = pattern(TOTAL);

    // Endpoint B echoes everything it reads back to A until end-of-stream:
    // its writer half is the sink for its own reader half.
    let echo = thread::spawn(move || {
        let (mut rx, mut tx) = b.into_split();
        rx.write_to(&mut tx).unwrap()
    });

    // Endpoint A writes from one thread and reads its own bytes back on
    // another; a single thread would deadlock once both pipes fill.
    let (mut a_rx, a_tx) = a.into_split();
    let outbound = data.clone();
    let producer = thread::spawn(move || {
        let mut a_tx = a_tx;
        a_tx.write(&outbound).unwrap();
        // Dropping a_tx closes A→B; the echo loop then winds down.
    });

    let mut received = vec![0u8; TOTAL];
    a_rx.read(&mut received).unwrap();

    producer.join().unwrap();
    assert_eq!(echo.join().unwrap(), TOTAL as u64);
    assert_eq!(received, data);
}

#[test]
fn per_direction_deadlines() {
    let (mut a, mut b) = duplex(8, Mode::Spsc);

    // Read deadline on an idle inbound pipe fires...
    a.set_read_deadline(Some(Instant::now() + Duration::from_millis(20)));
    let mut buf = [0u8; 1];
    assert_eq!(a.read(&mut buf), Err(PipeError::TimedOut { done: 0 }));

    // ...while the write direction is unaffected.
    assert_eq!(a.write(&[7]), Ok(1));
    assert_eq!(b.read(&mut buf), Ok(1));
    assert_eq!(buf[0], 7);
}

#[test]
fn write_deadline_fires_when_peer_stalls() {
    let (mut a, _b) = duplex(8, Mode::Spsc);

    a.set_write_deadline(Some(Instant::now() + Duration::from_millis(20)));
    // The peer never reads: 8 bytes land, the rest times out.
    assert_eq!(a.write(&[0u8; 12]), Err(PipeError::TimedOut { done: 8 }));
}

#[test]
fn set_deadline_covers_both_directions() {
    let (mut a, _b) = duplex(8, Mode::Spsc);
    a.set_deadline(Some(Instant::now() + Duration::from_millis(15)));

    let mut buf = [0u8; 1];
    assert_eq!(a.read(&mut buf), Err(PipeError::TimedOut { done: 0 }));
    assert_eq!(a.write(&[0u8; 12]), Err(PipeError::TimedOut { done: 8 }));
}

#[test]
fn close_with_in_flight_data_still_drains() {
    let (mut a, mut b) = duplex(32, Mode::Spsc);

    a.write(b"last words").unwrap();
    a.close();

    // The buffered bytes are delivered in full before end-of-stream.
    let mut buf = [0u8; 10];
    assert_eq!(b.read(&mut buf), Ok(10));
    assert_eq!(&buf, b"last words");
    assert_eq!(b.read(&mut buf), Err(PipeError::Closed { done: 0 }));
}

#[test]
fn synchronized_endpoints_accept_multiple_writers() {
    let (mut a, b) = duplex(64, Mode::SyncWriters);

    let (_b_rx, b_tx) = b.into_split();
    let mut handles = Vec::new();
    for id in 0..4u8 {
        let mut tx = b_tx.clone_handle();
        handles.push(thread::spawn(move || {
            tx.write(&[id; 16]).unwrap();
        }));
    }
    drop(b_tx);

    let mut buf = [0u8; 64];
    a.read(&mut buf).unwrap();
    for h in handles {
        h.join().unwrap();
    }

    let mut counts = [0usize; 4];
    for &byte in &buf {
        counts[byte as usize] += 1;
    }
    assert!(counts.iter().all(|&c| c == 16));
}
