//! Counting semaphore: a bounded unit pool with a FIFO queue of blocked
//! acquirers. The `*_nolock` entry points serve callers that already hold
//! the global monitor; the mutex component acquires its internal binary
//! semaphore through them.

use crate::error::KernelError;
use crate::interrupt;
use crate::types::{SemaphoreHandle, Timeout};
use log::error;
use std::sync::MutexGuard;

use super::wait::{self, QueueId, WaitQueue};
use super::{monitor, KernelState};

pub(crate) struct Semaphore {
    pub(crate) max_count: u32,
    pub(crate) count: u32,
    pub(crate) waiting: QueueId,
}

/// Creates a semaphore with `initial` of `max_count` units available.
pub fn new(max_count: u32, initial: u32) -> Result<SemaphoreHandle, KernelError> {
    if interrupt::is_active() {
        return Err(KernelError::Isr);
    }
    if max_count == 0 || initial > max_count {
        error!(
            "semaphore::new: invalid counts (max_count={}, initial={})",
            max_count, initial
        );
        return Err(KernelError::Parameter);
    }
    let mut state = monitor().lock();
    Ok(new_nolock(&mut state, max_count, initial))
}

pub(crate) fn new_nolock(
    state: &mut KernelState,
    max_count: u32,
    initial: u32,
) -> SemaphoreHandle {
    let waiting = state.new_queue();
    let handle = SemaphoreHandle::new(state.alloc_id());
    state.semaphores.insert(
        handle,
        Semaphore {
            max_count,
            count: initial,
            waiting,
        },
    );
    handle
}

/// Takes one unit, waiting up to `timeout` for one to become available.
pub fn acquire(handle: SemaphoreHandle, timeout: Timeout) -> Result<(), KernelError> {
    if interrupt::is_active() {
        return Err(KernelError::Isr);
    }
    let state = monitor().lock();
    let (state, result) = acquire_nolock(state, handle, timeout);
    drop(state);
    result
}

/// Acquire path for callers already holding the monitor. A grant received
/// through the wakeup primitive is a unit transferred directly; the count
/// is not decremented again.
pub(crate) fn acquire_nolock<'m>(
    mut state: MutexGuard<'m, KernelState>,
    handle: SemaphoreHandle,
    timeout: Timeout,
) -> (MutexGuard<'m, KernelState>, Result<(), KernelError>) {
    let waiting = match state.semaphores.get_mut(&handle) {
        Some(sem) => {
            if sem.count > 0 {
                sem.count -= 1;
                return (state, Ok(()));
            }
            sem.waiting
        }
        None => {
            error!("semaphore::acquire: stale handle {}", handle.val());
            return (state, Err(KernelError::Parameter));
        }
    };
    let (state, outcome) = wait::block_current(state, Some(waiting), timeout);
    (state, outcome.map(|_payload| ()))
}

/// Returns one unit. With waiters queued the unit is handed straight to the
/// head waiter and the count is untouched.
pub fn release(handle: SemaphoreHandle) -> Result<(), KernelError> {
    if interrupt::is_active() {
        return Err(KernelError::Isr);
    }
    let mut state = monitor().lock();
    release_nolock(&mut state, handle)
}

/// A release that would push the count past `max_count` is refused.
pub(crate) fn release_nolock(
    state: &mut KernelState,
    handle: SemaphoreHandle,
) -> Result<(), KernelError> {
    let (waiting, count, max_count) = match state.semaphores.get(&handle) {
        Some(sem) => (sem.waiting, sem.count, sem.max_count),
        None => {
            error!("semaphore::release: stale handle {}", handle.val());
            return Err(KernelError::Parameter);
        }
    };
    if wait::wake_first(state, waiting, Ok(()), None) {
        return Ok(());
    }
    if count >= max_count {
        return Err(KernelError::Resource);
    }
    if let Some(sem) = state.semaphores.get_mut(&handle) {
        sem.count = count + 1;
    }
    Ok(())
}

/// Destroys the semaphore.
pub fn delete(handle: SemaphoreHandle) -> Result<(), KernelError> {
    if interrupt::is_active() {
        return Err(KernelError::Isr);
    }
    let mut state = monitor().lock();
    delete_nolock(&mut state, handle)
}

/// Refused while acquirers are still parked: their queue and slots must
/// outlive them, and each waiter leaves only by grant or timeout.
pub(crate) fn delete_nolock(
    state: &mut KernelState,
    handle: SemaphoreHandle,
) -> Result<(), KernelError> {
    let waiting = match state.semaphores.get(&handle) {
        Some(sem) => sem.waiting,
        None => {
            error!("semaphore::delete: stale handle {}", handle.val());
            return Err(KernelError::Parameter);
        }
    };
    if state
        .queues
        .get(&waiting)
        .and_then(WaitQueue::peek_head)
        .is_some()
    {
        return Err(KernelError::Resource);
    }
    state.queues.remove(&waiting);
    state.semaphores.remove(&handle);
    Ok(())
}

/// Units currently available. Readable from interrupt context.
pub fn count(handle: SemaphoreHandle) -> Result<u32, KernelError> {
    let state = monitor().lock();
    match state.semaphores.get(&handle) {
        Some(sem) => Ok(sem.count),
        None => Err(KernelError::Parameter),
    }
}
