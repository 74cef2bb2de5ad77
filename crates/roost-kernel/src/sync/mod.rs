//! The synchronization engine: one process-wide monitor serializing every
//! mutation of wait queues, semaphores, and mutexes.

pub mod mutex;
pub mod semaphore;
pub(crate) mod wait;

use crate::types::{MutexHandle, SemaphoreHandle};
use mutex::MutexControl;
use semaphore::Semaphore;
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::{Mutex as StdMutex, MutexGuard, OnceLock, PoisonError};
use wait::{QueueId, WaitQueue, WaitSlot, WaitToken};

/// Every queue, semaphore, and mutex in the process, plus the arena of
/// parked calls. Only ever touched under the global monitor.
pub(crate) struct KernelState {
    pub(crate) semaphores: HashMap<SemaphoreHandle, Semaphore>,
    pub(crate) mutexes: HashMap<MutexHandle, MutexControl>,
    pub(crate) queues: HashMap<QueueId, WaitQueue>,
    pub(crate) slots: HashMap<WaitToken, WaitSlot>,
    next_id: NonZeroU32,
}

impl KernelState {
    fn new() -> Self {
        Self {
            semaphores: HashMap::new(),
            mutexes: HashMap::new(),
            queues: HashMap::new(),
            slots: HashMap::new(),
            next_id: NonZeroU32::MIN,
        }
    }

    /// Ids are handed out once and never reused, so the handle of a deleted
    /// object can never alias a live one; a stale handle misses its registry
    /// and fails with a parameter error deterministically.
    pub(crate) fn alloc_id(&mut self) -> NonZeroU32 {
        let id = self.next_id;
        self.next_id = id.checked_add(1).unwrap_or(NonZeroU32::MIN);
        id
    }

    pub(crate) fn new_queue(&mut self) -> QueueId {
        let id = QueueId::new(self.alloc_id());
        self.queues.insert(id, WaitQueue::new());
        id
    }

    pub(crate) fn new_slot(&mut self) -> WaitToken {
        let token = WaitToken::new(self.alloc_id());
        self.slots.insert(token, WaitSlot::new());
        token
    }
}

/// The global monitor. One lock for all kernel objects: the target
/// workloads are embedded control tasks with modest concurrency, and a
/// single lock removes any per-object ordering protocol.
pub(crate) struct Monitor {
    state: StdMutex<KernelState>,
}

impl Monitor {
    fn new() -> Self {
        Self {
            state: StdMutex::new(KernelState::new()),
        }
    }

    /// The critical sections in this crate do not panic, so a poisoned lock
    /// still holds consistent state; keep serving callers.
    pub(crate) fn lock(&self) -> MutexGuard<'_, KernelState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

static MONITOR: OnceLock<Monitor> = OnceLock::new();

pub(crate) fn monitor() -> &'static Monitor {
    MONITOR.get_or_init(Monitor::new)
}
