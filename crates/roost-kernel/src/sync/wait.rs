//! Wait queues and the timed-block / wakeup primitives.
//!
//! A blocking call allocates a slot in the arena, enqueues its token, and
//! parks on the slot's private condvar. Wakers grant a result into the slot
//! and signal it; the waiter dequeues itself on its own return path. Both
//! sides run under the global monitor, which is surrendered only while the
//! waiter is actually suspended.

use crate::error::KernelError;
use crate::types::Timeout;
use std::any::Any;
use std::collections::VecDeque;
use std::num::NonZeroU32;
use std::sync::{Arc, Condvar, MutexGuard};
use std::time::{Duration, Instant};

use super::KernelState;

/// Opaque payload handed from a waker to the waiter it grants.
pub(crate) type Payload = Box<dyn Any + Send>;

/// Identifies one parked call in the wait-slot arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct WaitToken(NonZeroU32);

impl WaitToken {
    pub(crate) fn new(id: NonZeroU32) -> Self {
        Self(id)
    }
}

/// Identifies one wait queue in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct QueueId(NonZeroU32);

impl QueueId {
    pub(crate) fn new(id: NonZeroU32) -> Self {
        Self(id)
    }
}

/// Record of one blocking call. Lives in the arena from the moment the
/// caller starts blocking until it stops, whatever the outcome.
pub(crate) struct WaitSlot {
    /// Result granted by the waker; meaningless until `signaled` is set.
    pub(crate) result: Result<(), KernelError>,
    pub(crate) payload: Option<Payload>,
    pub(crate) signaled: bool,
    /// Private wake signal; no two slots share one.
    pub(crate) signal: Arc<Condvar>,
}

impl WaitSlot {
    pub(crate) fn new() -> Self {
        Self {
            result: Ok(()),
            payload: None,
            signaled: false,
            signal: Arc::new(Condvar::new()),
        }
    }
}

/// FIFO list of parked calls; insertion order is wake order. No entry
/// appears twice, and the queue does no locking of its own: all access
/// happens under the global monitor.
pub(crate) struct WaitQueue {
    entries: VecDeque<WaitToken>,
}

impl WaitQueue {
    pub(crate) fn new() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }

    pub(crate) fn enqueue_tail(&mut self, token: WaitToken) {
        self.entries.push_back(token);
    }

    /// Removes `token` wherever it sits. Idempotent: removing an absent
    /// token is a no-op.
    pub(crate) fn remove(&mut self, token: WaitToken) -> bool {
        if let Some(pos) = self.entries.iter().position(|&t| t == token) {
            self.entries.remove(pos);
            true
        } else {
            false
        }
    }

    /// Non-removing look at the head entry.
    pub(crate) fn peek_head(&self) -> Option<WaitToken> {
        self.entries.front().copied()
    }

    fn iter(&self) -> impl Iterator<Item = WaitToken> + '_ {
        self.entries.iter().copied()
    }
}

fn slot_signaled(state: &KernelState, token: WaitToken) -> bool {
    state.slots.get(&token).is_some_and(|slot| slot.signaled)
}

/// Timed-wait primitive. Takes the held monitor guard, parks the calling
/// thread until a waker signals its slot or the timeout elapses, and hands
/// the guard back reacquired. On every exit path the token is removed from
/// its queue and the slot from the arena.
pub(crate) fn block_current<'m>(
    mut state: MutexGuard<'m, KernelState>,
    queue: Option<QueueId>,
    timeout: Timeout,
) -> (MutexGuard<'m, KernelState>, Result<Option<Payload>, KernelError>) {
    let token = state.new_slot();
    // Keeps the signal reachable while the guard cycles through the condvar.
    let signal = match state.slots.get(&token) {
        Some(slot) => Arc::clone(&slot.signal),
        None => return (state, Err(KernelError::Internal)),
    };
    if let Some(qid) = queue {
        match state.queues.get_mut(&qid) {
            Some(q) => q.enqueue_tail(token),
            None => {
                state.slots.remove(&token);
                return (state, Err(KernelError::Internal));
            }
        }
    }

    // The signaled check precedes the deadline check, so a grant that lands
    // just before expiry wins and the unit is never lost. The loop also
    // absorbs spurious wakes.
    let parked = match timeout {
        Timeout::Forever => loop {
            if slot_signaled(&state, token) {
                break Ok(());
            }
            match signal.wait(state) {
                Ok(guard) => state = guard,
                Err(poison) => {
                    state = poison.into_inner();
                    break Err(KernelError::Internal);
                }
            }
        },
        Timeout::Millis(ms) => {
            let deadline = Instant::now() + Duration::from_millis(u64::from(ms));
            loop {
                if slot_signaled(&state, token) {
                    break Ok(());
                }
                let now = Instant::now();
                if now >= deadline {
                    break Err(KernelError::Timeout);
                }
                match signal.wait_timeout(state, deadline - now) {
                    Ok((guard, _)) => state = guard,
                    Err(poison) => {
                        state = poison.into_inner().0;
                        break Err(KernelError::Internal);
                    }
                }
            }
        }
    };

    if let Some(qid) = queue {
        if let Some(q) = state.queues.get_mut(&qid) {
            q.remove(token);
        }
    }
    let outcome = match (parked, state.slots.remove(&token)) {
        (Err(err), _) => Err(err),
        (Ok(()), Some(slot)) => slot.result.map(|()| slot.payload),
        (Ok(()), None) => Err(KernelError::Internal),
    };
    (state, outcome)
}

/// Wakeup primitive. Caller holds the monitor. Grants `result` and
/// `payload` to the first entry in `queue` not already granted, signals it
/// awake, and reports whether anyone was granted. Dequeuing stays the
/// waiter's job on its own return path; skipping granted entries keeps two
/// back-to-back wakeups from landing on the same waiter.
pub(crate) fn wake_first(
    state: &mut KernelState,
    queue: QueueId,
    result: Result<(), KernelError>,
    payload: Option<Payload>,
) -> bool {
    let Some(q) = state.queues.get(&queue) else {
        return false;
    };
    let slots = &state.slots;
    let Some(token) = q.iter().find(|t| slots.get(t).is_some_and(|s| !s.signaled)) else {
        return false;
    };
    let Some(slot) = state.slots.get_mut(&token) else {
        return false;
    };
    slot.result = result;
    slot.payload = payload;
    slot.signaled = true;
    slot.signal.notify_one();
    true
}
