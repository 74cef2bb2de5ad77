use std::sync::OnceLock;
use std::time::Instant;

/// Monotonic tick clock; one tick is one millisecond.
pub(crate) struct TickClock {
    epoch: Instant,
}

impl TickClock {
    fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }

    /// Wraps at 32 bits, matching the tick counter of the wrapped API.
    fn now_ticks(&self) -> u32 {
        self.epoch.elapsed().as_millis() as u32
    }
}

static CLOCK: OnceLock<TickClock> = OnceLock::new();

/// Pins the tick epoch. Idempotent: later calls keep the first epoch.
pub(crate) fn init() {
    CLOCK.get_or_init(TickClock::new);
}

/// Ticks since `init`, or 0 if the clock was never started.
pub(crate) fn tick_count() -> u32 {
    CLOCK.get().map(TickClock::now_ticks).unwrap_or(0)
}
