//! Recursive mutex. Ownership and recursion accounting live here; mutual
//! exclusion itself is delegated to an internally owned binary semaphore,
//! so blocked acquirers queue and wake through the same primitives as
//! everything else.

use crate::error::KernelError;
use crate::interrupt;
use crate::types::{MutexHandle, SemaphoreHandle, Timeout};
use bitflags::bitflags;
use log::error;
use std::thread::{self, ThreadId};

use super::{monitor, semaphore};

bitflags! {
    /// Mutex attribute word, bit-compatible with the wrapped API.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MutexAttrs: u32 {
        /// The owner may acquire again without blocking.
        const RECURSIVE = 0x0000_0001;
    }
}

/// Legacy creation definition. The deprecated entry point only ever
/// accepted the no-configuration case, represented here by `None`.
#[derive(Debug, Default, Clone, Copy)]
pub struct MutexDef;

/// Invariants: `owner` is `None` exactly when `count` is 0, and `count`
/// exceeds 1 only when the mutex was created recursive.
pub(crate) struct MutexControl {
    pub(crate) owner: Option<ThreadId>,
    pub(crate) count: u32,
    pub(crate) recursive: bool,
    pub(crate) sem: SemaphoreHandle,
}

/// Creates an unheld mutex.
pub fn new(attrs: MutexAttrs) -> Result<MutexHandle, KernelError> {
    if interrupt::is_active() {
        return Err(KernelError::Isr);
    }
    let mut state = monitor().lock();
    // Binary semaphore, created released: the first acquire takes the unit.
    let sem = semaphore::new_nolock(&mut state, 1, 1);
    let handle = MutexHandle::new(state.alloc_id());
    state.mutexes.insert(
        handle,
        MutexControl {
            owner: None,
            count: 0,
            recursive: attrs.contains(MutexAttrs::RECURSIVE),
            sem,
        },
    );
    Ok(handle)
}

/// Deprecated creation entry point, narrowed to the safe default: only the
/// no-configuration call is honored.
pub fn create(definition: Option<&MutexDef>) -> Result<MutexHandle, KernelError> {
    if definition.is_some() {
        error!("mutex::create: legacy definitions are not supported");
        return Err(KernelError::Parameter);
    }
    new(MutexAttrs::empty())
}

/// Locks the mutex, waiting up to `timeout`. Re-acquisition by the current
/// owner is O(1) and never blocks when the mutex was created recursive.
pub fn acquire(handle: MutexHandle, timeout: Timeout) -> Result<(), KernelError> {
    if interrupt::is_active() {
        return Err(KernelError::Isr);
    }
    let caller = thread::current().id();
    let mut state = monitor().lock();
    let sem = match state.mutexes.get_mut(&handle) {
        Some(mutex) => {
            if mutex.recursive && mutex.count > 0 && mutex.owner == Some(caller) {
                mutex.count += 1;
                return Ok(());
            }
            mutex.sem
        }
        None => {
            error!("mutex::acquire: stale handle {}", handle.val());
            return Err(KernelError::Parameter);
        }
    };
    let (mut state, result) = semaphore::acquire_nolock(state, sem, timeout);
    if result.is_ok() {
        match state.mutexes.get_mut(&handle) {
            Some(mutex) => {
                mutex.owner = Some(caller);
                mutex.count = 1;
            }
            // Delete refuses while acquirers are parked, so the registry
            // miss can only mean the handle went stale underneath us.
            None => return Err(KernelError::Parameter),
        }
    }
    result
}

/// Unlocks one level. Only the owning thread may release; the mutex is
/// handed to the head waiter once the last level is released.
pub fn release(handle: MutexHandle) -> Result<(), KernelError> {
    if interrupt::is_active() {
        return Err(KernelError::Isr);
    }
    let caller = thread::current().id();
    let mut state = monitor().lock();
    let sem = match state.mutexes.get_mut(&handle) {
        Some(mutex) => {
            if mutex.owner != Some(caller) {
                return Err(KernelError::Resource);
            }
            if mutex.recursive && mutex.count > 1 {
                mutex.count -= 1;
                return Ok(());
            }
            mutex.sem
        }
        None => {
            error!("mutex::release: stale handle {}", handle.val());
            return Err(KernelError::Parameter);
        }
    };
    semaphore::release_nolock(&mut state, sem)?;
    if let Some(mutex) = state.mutexes.get_mut(&handle) {
        mutex.owner = None;
        mutex.count = 0;
    }
    Ok(())
}

/// Destroys the mutex. Refused while held or while acquirers are parked on
/// the internal semaphore; a refused delete leaves the mutex fully usable.
pub fn delete(handle: MutexHandle) -> Result<(), KernelError> {
    if interrupt::is_active() {
        return Err(KernelError::Isr);
    }
    let mut state = monitor().lock();
    let sem = match state.mutexes.get(&handle) {
        Some(mutex) => {
            if mutex.count != 0 {
                return Err(KernelError::Resource);
            }
            mutex.sem
        }
        None => {
            error!("mutex::delete: stale handle {}", handle.val());
            return Err(KernelError::Parameter);
        }
    };
    semaphore::delete_nolock(&mut state, sem)?;
    state.mutexes.remove(&handle);
    Ok(())
}
