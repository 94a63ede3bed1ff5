//! Bounded producer/consumer ring built from two semaphores and a mutex
//! (spec §8 end-to-end scenario 4), the classic use of [`Semaphore`]
//! alongside [`Mutex`].

mod common;

use sequential_test::sequential;

use common::with_runtime;
use std::cell::UnsafeCell;
use std::sync::Arc;
use uthread::sync::{Mutex, MutexKind, Semaphore};
use uthread::thread::{self, attr::ThreadAttr};
use uthread::RuntimeConfig;

const CAPACITY: usize = 4;
const ITEMS: u32 = 50;

struct Ring {
    mutex: Mutex,
    empty_slots: Semaphore,
    filled_slots: Semaphore,
    buf: UnsafeCell<[u32; CAPACITY]>,
    head: UnsafeCell<usize>,
    tail: UnsafeCell<usize>,
    sum: UnsafeCell<u64>,
}
unsafe impl Sync for Ring {}
unsafe impl Send for Ring {}

#[test]
#[sequential]
fn producer_and_consumer_agree_on_every_item() {
    with_runtime(RuntimeConfig::new(), |_rt| {
        let ring = Arc::new(Ring {
            mutex: Mutex::new(MutexKind::Normal),
            empty_slots: Semaphore::new(CAPACITY as u32),
            filled_slots: Semaphore::new(0),
            buf: UnsafeCell::new([0; CAPACITY]),
            head: UnsafeCell::new(0),
            tail: UnsafeCell::new(0),
            sum: UnsafeCell::new(0),
        });

        let producer_ring = Arc::clone(&ring);
        let producer = thread::spawn(ThreadAttr::new(), move || {
            for item in 1..=ITEMS {
                producer_ring.empty_slots.wait().unwrap();
                producer_ring.mutex.lock().unwrap();
                unsafe {
                    let tail = &mut *producer_ring.tail.get();
                    (*producer_ring.buf.get())[*tail] = item;
                    *tail = (*tail + 1) % CAPACITY;
                }
                producer_ring.mutex.unlock().unwrap();
                producer_ring.filled_slots.post();
            }
        })
        .expect("spawn producer");

        let consumer_ring = Arc::clone(&ring);
        let consumer = thread::spawn(ThreadAttr::new(), move || {
            for _ in 0..ITEMS {
                consumer_ring.filled_slots.wait().unwrap();
                consumer_ring.mutex.lock().unwrap();
                let item = unsafe {
                    let head = &mut *consumer_ring.head.get();
                    let item = (*consumer_ring.buf.get())[*head];
                    *head = (*head + 1) % CAPACITY;
                    item
                };
                consumer_ring.mutex.unlock().unwrap();
                unsafe {
                    *consumer_ring.sum.get() += item as u64;
                }
                consumer_ring.empty_slots.post();
            }
        })
        .expect("spawn consumer");

        producer.join().expect("join producer");
        consumer.join().expect("join consumer");

        let expected: u64 = (1..=ITEMS as u64).sum();
        assert_eq!(unsafe { *ring.sum.get() }, expected);
    });
}
