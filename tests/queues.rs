//! End-to-end queue scenarios: ordered single-pair streaming, fan-in /
//! fan-out under close, and capacity boundaries.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use corral::queue::{CondvarSlot, FutexSlot, YieldSlot};
use corral::{ConcurrentQueue, MpmcQueue, PopError, SpscQueue, SynchQueue};

#[test]
fn spsc_stream_is_ordered_and_complete() {
    const TOTAL: u32 = 1_000_000;

    let queue = Arc::new(SpscQueue::<u32>::with_capacity(1024).unwrap());
    let consumer = {
        let queue = queue.clone();
        thread::spawn(move || {
            let mut expected = 0u32;
            loop {
                match queue.wait_pop() {
                    Ok(value) => {
                        assert_eq!(value, expected);
                        expected += 1;
                    }
                    Err(PopError::Closed) => break,
                    Err(err) => panic!("unexpected pop failure: {err}"),
                }
            }
            expected
        })
    };

    for i in 0..TOTAL {
        queue.wait_push(i).unwrap();
    }
    queue.close();

    assert_eq!(consumer.join().unwrap(), TOTAL);
    assert!(queue.is_empty());
}

#[test]
fn mpmc_fan_in_fan_out_preserves_the_multiset() {
    const PRODUCERS: usize = 8;
    const CONSUMERS: usize = 4;
    const PER_PRODUCER: usize = 100_000;

    let queue = Arc::new(MpmcQueue::<String, FutexSlot>::with_capacity(1024).unwrap());

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|_| {
            let queue = queue.clone();
            thread::spawn(move || {
                for _ in 0..PER_PRODUCER {
                    queue.wait_push(String::from("abc")).unwrap();
                }
            })
        })
        .collect();

    let consumers: Vec<_> = (0..CONSUMERS)
        .map(|_| {
            let queue = queue.clone();
            thread::spawn(move || {
                let mut count = 0usize;
                loop {
                    match queue.wait_pop() {
                        Ok(value) => {
                            assert_eq!(value, "abc");
                            count += 1;
                        }
                        Err(PopError::Closed) => return count,
                        Err(err) => panic!("unexpected pop failure: {err}"),
                    }
                }
            })
        })
        .collect();

    for producer in producers {
        producer.join().unwrap();
    }
    queue.close();

    let total: usize = consumers.into_iter().map(|c| c.join().unwrap()).sum();
    assert_eq!(total, PRODUCERS * PER_PRODUCER);
}

#[test]
fn mpmc_per_producer_order_is_preserved() {
    const PRODUCERS: u32 = 4;
    const PER_PRODUCER: u32 = 50_000;

    let queue = Arc::new(MpmcQueue::<(u32, u32), YieldSlot>::with_capacity(256).unwrap());

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|id| {
            let queue = queue.clone();
            thread::spawn(move || {
                for seq in 0..PER_PRODUCER {
                    queue.wait_push((id, seq)).unwrap();
                }
            })
        })
        .collect();

    let consumers: Vec<_> = (0..2)
        .map(|_| {
            let queue = queue.clone();
            thread::spawn(move || {
                let mut seen: Vec<(u32, u32)> = Vec::new();
                while let Ok(pair) = queue.wait_pop() {
                    seen.push(pair);
                }
                seen
            })
        })
        .collect();

    for producer in producers {
        producer.join().unwrap();
    }
    queue.close();

    // Within one consumer, the sequence numbers of any single producer
    // must come out ascending; together the streams form the full
    // multiset.
    let mut counts: HashMap<u32, u32> = HashMap::new();
    for consumer in consumers {
        let seen = consumer.join().unwrap();
        let mut last: HashMap<u32, u32> = HashMap::new();
        for (id, seq) in seen {
            if let Some(prev) = last.insert(id, seq) {
                assert!(prev < seq, "producer {id} reordered: {prev} then {seq}");
            }
            *counts.entry(id).or_default() += 1;
        }
    }
    for id in 0..PRODUCERS {
        assert_eq!(counts[&id], PER_PRODUCER);
    }
}

#[test]
fn push_blocks_at_capacity_until_a_pop() {
    let queue = Arc::new(MpmcQueue::<u32>::with_capacity(16).unwrap());
    for i in 0..16 {
        queue.wait_push(i).unwrap();
    }
    assert!(queue.try_push(16).unwrap_err().is_full());

    let blocked = {
        let queue = queue.clone();
        thread::spawn(move || queue.wait_push(16))
    };
    thread::sleep(Duration::from_millis(100));
    assert!(!blocked.is_finished());

    assert_eq!(queue.wait_pop().unwrap(), 0);
    blocked.join().unwrap().unwrap();
}

#[test]
fn several_capacities_round_trip() {
    for exponent in [4, 5, 7, 10] {
        let capacity = 1u32 << exponent;
        let queue = MpmcQueue::<u32, CondvarSlot>::with_capacity(capacity).unwrap();
        for i in 0..capacity {
            queue.wait_push(i).unwrap();
        }
        for i in 0..capacity {
            assert_eq!(queue.wait_pop().unwrap(), i);
        }
    }
}

#[test]
fn synch_queue_slow_producer_stays_ordered() {
    let queue = Arc::new(SynchQueue::<u32>::new());
    let producer = {
        let queue = queue.clone();
        thread::spawn(move || {
            for i in 0..10 {
                queue.push(i).unwrap();
                thread::sleep(Duration::from_millis(1));
            }
            queue.close();
        })
    };

    let mut seen = Vec::new();
    loop {
        match queue.wait_pop() {
            Ok(value) => seen.push(value),
            Err(PopError::Closed) => break,
            Err(err) => panic!("unexpected pop failure: {err}"),
        }
    }
    producer.join().unwrap();
    assert_eq!(seen, (0..10).collect::<Vec<_>>());
}

#[test]
fn is_empty_after_quiescent_drain_means_all_consumed() {
    let queue = Arc::new(MpmcQueue::<u64>::with_capacity(64).unwrap());
    let handles: Vec<_> = (0..4)
        .map(|id| {
            let queue = queue.clone();
            thread::spawn(move || {
                for i in 0..1_000u64 {
                    queue.wait_push(id * 1_000 + i).unwrap();
                }
            })
        })
        .collect();

    let drained = {
        let queue = queue.clone();
        thread::spawn(move || {
            let mut sum = 0u64;
            while let Ok(v) = queue.wait_pop() {
                sum += v;
            }
            sum
        })
    };

    for handle in handles {
        handle.join().unwrap();
    }
    queue.close();
    let sum = drained.join().unwrap();
    assert!(queue.is_empty());
    assert_eq!(sum, (0..4_000u64).sum());
}
