#![forbid(unsafe_code)]

/*
 *     ______   __  __     __         ______     ______
 *    /\  == \ /\ \/\ \   /\ \       /\  ___\   /\  ___\
 *    \ \  _-/ \ \ \_\ \  \ \ \____  \ \___  \  \ \  __\
 *     \ \_\    \ \_____\  \ \_____\  \/\_____\  \ \_____\
 *      \/_/     \/_____/   \/_____/   \/_____/   \/_____/
 *
 * Author: Colin MacRitchie / Ripple Group
 */
//! Monotonic microsecond clock sources for tick accounting.
//!
//! The executor reads the clock between task dispatches and attributes the
//! deltas to category budgets. Readings are wall-clock microseconds from an
//! arbitrary origin; only differences are meaningful. Consumers must tolerate
//! retrograde readings (a negative delta reads as zero) and must not assume
//! resolution finer than tens of microseconds.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Monotonic microsecond source consulted by the executor.
pub trait TickClock: Send {
    /// Current reading, in microseconds from an arbitrary origin.
    fn now_micros(&self) -> u64;
}

/// Steady wall-clock source backed by [`Instant`].
pub struct MonotonicClock {
    /// Origin of the microsecond scale.
    origin: Instant,
}

impl MonotonicClock {
    /// Creates a clock with its origin at the moment of construction.
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TickClock for MonotonicClock {
    #[inline]
    fn now_micros(&self) -> u64 {
        #[allow(clippy::cast_possible_truncation)] /* ~584k years of micros */
        let micros = self.origin.elapsed().as_micros() as u64;
        micros
    }
}

/// Manually driven clock for deterministic tests.
///
/// Clones share the same reading, so a task body can advance the clock the
/// scheduler is observing to simulate its own cost.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use frame_pulse::{ManualClock, TickClock};
///
/// let clock = ManualClock::new();
/// let observer = clock.clone();
/// clock.advance(Duration::from_micros(250));
/// assert_eq!(observer.now_micros(), 250);
/// ```
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    /// Creates a clock reading zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves the reading forward.
    pub fn advance(&self, by: Duration) {
        #[allow(clippy::cast_possible_truncation)]
        let micros = by.as_micros() as u64;
        self.now.fetch_add(micros, Ordering::SeqCst);
    }

    /// Sets the reading to an absolute value, possibly backwards.
    pub fn set_micros(&self, micros: u64) {
        self.now.store(micros, Ordering::SeqCst);
    }
}

impl TickClock for ManualClock {
    #[inline]
    fn now_micros(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}
