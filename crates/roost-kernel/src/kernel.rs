//! Kernel facade: bring-up and tick accounting.

use crate::error::KernelError;
use crate::interrupt;
use crate::sync::{monitor, wait};
use crate::time;
use crate::types::Timeout;
use log::info;

/// One-time kernel bring-up: the global monitor and the tick clock.
/// Idempotent: a later call keeps the original tick epoch.
pub fn start() -> Result<(), KernelError> {
    monitor();
    time::init();
    info!("kernel started");
    Ok(())
}

/// Milliseconds since `start`, wrapping at 32 bits; 0 before `start`.
pub fn tick_count() -> u32 {
    time::tick_count()
}

/// Suspends the calling thread for `ms` milliseconds.
pub fn delay(ms: u32) -> Result<(), KernelError> {
    if interrupt::is_active() {
        return Err(KernelError::Isr);
    }
    let state = monitor().lock();
    let (state, outcome) = wait::block_current(state, None, Timeout::Millis(ms));
    drop(state);
    match outcome {
        // Nothing can signal a queue-less slot; expiry is the normal exit.
        Err(KernelError::Timeout) | Ok(_) => Ok(()),
        Err(err) => Err(err),
    }
}
