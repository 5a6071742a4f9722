/*!
 * Rendezvous Channel Integration Tests
 *
 * Producer/consumer handoff under thread interleavings
 */

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use timer_device::core::sync::{RendezvousChannel, WaitError};

#[test]
fn test_every_signal_is_consumed_once() {
    // Producer signals only after the previous completion was consumed, so
    // every cycle must be observed exactly once regardless of who runs first.
    const CYCLES: u64 = 500;

    let channel = Arc::new(RendezvousChannel::new());
    let consumed = Arc::new(AtomicU64::new(0));

    let producer = {
        let channel = channel.clone();
        let consumed = consumed.clone();
        thread::spawn(move || {
            for cycle in 0..CYCLES {
                while consumed.load(Ordering::SeqCst) < cycle {
                    thread::yield_now();
                }
                channel.signal();
            }
        })
    };

    for _ in 0..CYCLES {
        channel
            .wait_and_consume_timeout(Duration::from_secs(5))
            .expect("completion was lost");
        consumed.fetch_add(1, Ordering::SeqCst);
    }

    producer.join().unwrap();
    assert_eq!(consumed.load(Ordering::SeqCst), CYCLES);
    assert!(!channel.is_signalled());
}

#[test]
fn test_repeated_signals_coalesce() {
    // The flag is a boolean: two signals before a read are one completion
    let channel = RendezvousChannel::new();
    channel.signal();
    channel.signal();

    assert!(channel.wait_and_consume_timeout(Duration::ZERO).is_ok());
    assert_eq!(
        channel.wait_and_consume_timeout(Duration::from_millis(20)),
        Err(WaitError::Timeout(Duration::from_millis(20)))
    );
}

#[test]
fn test_stale_tag_never_satisfies_next_cycle() {
    let channel = RendezvousChannel::new();
    for tag in 1..=20u64 {
        // Each cycle's producer fires but nobody reads it
        channel.expect_tag(tag);
        channel.signal_tagged(tag);
    }

    assert!(channel.expect_tag(21));
    assert!(matches!(
        channel.wait_and_consume_timeout(Duration::from_millis(20)),
        Err(WaitError::Timeout(_))
    ));

    channel.signal_tagged(21);
    assert!(channel.wait_and_consume_timeout(Duration::ZERO).is_ok());
}

#[test]
fn test_signal_races_wait_entry() {
    // Signal lands at varying offsets around the consumer entering wait
    for offset_us in [0u64, 10, 50, 100, 500, 1_000] {
        let channel = Arc::new(RendezvousChannel::new());
        let producer = {
            let channel = channel.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_micros(offset_us));
                channel.signal();
            })
        };

        assert!(channel
            .wait_and_consume_timeout(Duration::from_secs(2))
            .is_ok());
        producer.join().unwrap();
    }
}
