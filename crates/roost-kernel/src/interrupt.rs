//! Interrupt-context predicate.
//!
//! "Interrupt context" is a logical mode in which suspension is forbidden;
//! every blocking or mutating primitive refuses to run in it. On the host it
//! is a property of the executing thread, flipped by the integration layer
//! around dispatching a simulated interrupt handler.

use std::cell::Cell;

thread_local! {
    static ISR_ACTIVE: Cell<bool> = Cell::new(false);
}

/// True while the current thread is executing in interrupt context.
pub fn is_active() -> bool {
    ISR_ACTIVE.with(|flag| flag.get())
}

/// Marks the current thread as inside (or outside) interrupt context.
pub fn set_active(active: bool) {
    ISR_ACTIVE.with(|flag| flag.set(active));
}

/// Interrupt context scoped to the guard's lifetime; the previous mode is
/// restored on drop.
#[must_use]
pub struct IsrScope {
    prev: bool,
}

impl IsrScope {
    pub fn enter() -> Self {
        let prev = is_active();
        set_active(true);
        Self { prev }
    }
}

impl Drop for IsrScope {
    fn drop(&mut self) {
        set_active(self.prev);
    }
}
