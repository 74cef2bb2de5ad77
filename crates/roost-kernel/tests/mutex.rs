//! Cross-thread mutex behavior.

use roost_kernel::{interrupt, kernel, mutex, KernelError, MutexAttrs, MutexDef, Timeout};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

fn setup() {
    let _ = env_logger::builder().is_test(true).try_init();
    kernel::start().expect("kernel start");
}

#[test]
fn one_holder_at_a_time() {
    setup();
    let lock = mutex::new(MutexAttrs::empty()).unwrap();
    let counter = Arc::new(AtomicU64::new(0));

    let mut workers = Vec::new();
    for _ in 0..4 {
        let counter = Arc::clone(&counter);
        workers.push(thread::spawn(move || {
            for _ in 0..25 {
                mutex::acquire(lock, Timeout::Forever).unwrap();
                // Unsynchronized read-modify-write: only mutual exclusion
                // keeps the updates from being lost.
                let seen = counter.load(Ordering::Relaxed);
                thread::sleep(Duration::from_millis(1));
                counter.store(seen + 1, Ordering::Relaxed);
                mutex::release(lock).unwrap();
            }
        }));
    }
    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(counter.load(Ordering::Relaxed), 4 * 25);
    mutex::delete(lock).unwrap();
}

#[test]
fn blocked_acquire_returns_on_release_not_timeout() {
    setup();
    let lock = mutex::new(MutexAttrs::empty()).unwrap();
    mutex::acquire(lock, Timeout::Forever).unwrap();

    let waiter = thread::spawn(move || {
        let begun = Instant::now();
        let result = mutex::acquire(lock, Timeout::Millis(5_000));
        (result, begun.elapsed())
    });

    thread::sleep(Duration::from_millis(150));
    mutex::release(lock).unwrap();

    let (result, waited) = waiter.join().unwrap();
    assert_eq!(result, Ok(()));
    // Bounded by the release, not by the 5s timeout.
    assert!(waited >= Duration::from_millis(100));
    assert!(waited < Duration::from_millis(3_000));

    // The waiter is the owner now; releasing from here is refused.
    assert_eq!(mutex::release(lock), Err(KernelError::Resource));
}

#[test]
fn recursive_owner_reacquires_without_blocking() {
    setup();
    let lock = mutex::new(MutexAttrs::RECURSIVE).unwrap();

    mutex::acquire(lock, Timeout::Forever).unwrap();
    mutex::acquire(lock, Timeout::POLL).unwrap();

    // One release keeps it held: an outside acquire still times out.
    mutex::release(lock).unwrap();
    let outside = thread::spawn(move || mutex::acquire(lock, Timeout::POLL));
    assert_eq!(outside.join().unwrap(), Err(KernelError::Timeout));

    // Final release frees it for another thread.
    mutex::release(lock).unwrap();
    let outside = thread::spawn(move || {
        mutex::acquire(lock, Timeout::POLL)?;
        mutex::release(lock)
    });
    assert_eq!(outside.join().unwrap(), Ok(()));

    // Releasing an unheld mutex changes nothing.
    assert_eq!(mutex::release(lock), Err(KernelError::Resource));
    mutex::delete(lock).unwrap();
}

#[test]
fn release_by_non_owner_is_refused() {
    setup();
    let lock = mutex::new(MutexAttrs::empty()).unwrap();
    mutex::acquire(lock, Timeout::Forever).unwrap();

    let intruder = thread::spawn(move || mutex::release(lock));
    assert_eq!(intruder.join().unwrap(), Err(KernelError::Resource));

    // Still held by this thread.
    let outside = thread::spawn(move || mutex::acquire(lock, Timeout::POLL));
    assert_eq!(outside.join().unwrap(), Err(KernelError::Timeout));

    mutex::release(lock).unwrap();
    mutex::delete(lock).unwrap();
}

#[test]
fn delete_while_held_is_refused_and_mutex_survives() {
    setup();
    let lock = mutex::new(MutexAttrs::empty()).unwrap();
    mutex::acquire(lock, Timeout::Forever).unwrap();

    assert_eq!(mutex::delete(lock), Err(KernelError::Resource));

    // Fully usable afterwards.
    mutex::release(lock).unwrap();
    mutex::acquire(lock, Timeout::POLL).unwrap();
    mutex::release(lock).unwrap();
    assert_eq!(mutex::delete(lock), Ok(()));
}

#[test]
fn interrupt_context_excludes_every_operation() {
    setup();
    let lock = mutex::new(MutexAttrs::RECURSIVE).unwrap();
    mutex::acquire(lock, Timeout::Forever).unwrap();

    {
        let _isr = interrupt::IsrScope::enter();
        assert_eq!(
            mutex::new(MutexAttrs::empty()).unwrap_err(),
            KernelError::Isr
        );
        assert_eq!(mutex::acquire(lock, Timeout::POLL), Err(KernelError::Isr));
        assert_eq!(mutex::release(lock), Err(KernelError::Isr));
        assert_eq!(mutex::delete(lock), Err(KernelError::Isr));
    }

    // No state was touched: still held exactly once.
    mutex::release(lock).unwrap();
    assert_eq!(mutex::release(lock), Err(KernelError::Resource));
    mutex::delete(lock).unwrap();
}

#[test]
fn legacy_create_rejects_configuration() {
    setup();
    let def = MutexDef;
    assert_eq!(mutex::create(Some(&def)).unwrap_err(), KernelError::Parameter);

    // The no-configuration call produces a plain non-recursive mutex.
    let lock = mutex::create(None).unwrap();
    mutex::acquire(lock, Timeout::Forever).unwrap();
    assert_eq!(mutex::acquire(lock, Timeout::POLL), Err(KernelError::Timeout));
    mutex::release(lock).unwrap();
    mutex::delete(lock).unwrap();
}

#[test]
fn stale_handle_fails_every_operation() {
    setup();
    let lock = mutex::new(MutexAttrs::empty()).unwrap();
    mutex::delete(lock).unwrap();

    assert_eq!(
        mutex::acquire(lock, Timeout::Forever),
        Err(KernelError::Parameter)
    );
    assert_eq!(mutex::release(lock), Err(KernelError::Parameter));
    assert_eq!(mutex::delete(lock), Err(KernelError::Parameter));
}

#[test]
fn contended_handoff_is_fifo() {
    setup();
    let lock = mutex::new(MutexAttrs::empty()).unwrap();
    mutex::acquire(lock, Timeout::Forever).unwrap();

    let (order_tx, order_rx) = mpsc::channel();
    let mut waiters = Vec::new();
    for rank in 0..3u32 {
        let order_tx = order_tx.clone();
        waiters.push(thread::spawn(move || {
            // Stagger the parks so the queue order is known.
            thread::sleep(Duration::from_millis(100 + u64::from(rank) * 200));
            mutex::acquire(lock, Timeout::Forever).unwrap();
            order_tx.send(rank).unwrap();
            mutex::release(lock).unwrap();
        }));
    }
    drop(order_tx);

    // Let all three park, then start the handoff chain.
    thread::sleep(Duration::from_millis(900));
    mutex::release(lock).unwrap();

    let order: Vec<u32> = order_rx.iter().collect();
    assert_eq!(order, vec![0, 1, 2]);
    for waiter in waiters {
        waiter.join().unwrap();
    }
    mutex::delete(lock).unwrap();
}
