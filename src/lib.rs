//! Frame-budgeted cooperative task scheduler for interactive real-time loops.
//!
//! This crate shares one bounded per-tick time window across many short
//! deferred tasks. Producers submit through [`Sender`]s (or straight through
//! [`TickScheduler::add_task`]); the host loop calls
//! [`TickScheduler::execute_tick`] once per frame with a wall-clock window.
//! Every tick finishes all [`Priority::Immediate`] work, spends per-category
//! budgets on deferred work, round-robins leftover window across categories,
//! and drops [`Priority::SkipAfter16Frames`] work older than sixteen frames.
//!
//! ```
//! use std::time::Duration;
//! use frame_pulse::{Priority, SchedulerConfig, SenderMultiCast, TickScheduler};
//!
//! let scheduler = TickScheduler::new(SchedulerConfig::default());
//! scheduler.set_budget(0, Duration::from_micros(30));
//! scheduler.set_budget(1, Duration::from_micros(30));
//!
//! let mut on_frame = SenderMultiCast::new();
//! on_frame.register(|dt: u64| { let _ = dt; }, 0, Priority::CanWait);
//! on_frame.register(|dt: u64| { let _ = dt; }, 1, Priority::CanWait);
//!
//! on_frame.send(&scheduler, 16).unwrap();
//! scheduler.execute_tick(Duration::from_micros(100));
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

//     ______   __  __     __         ______     ______
//    /\  == \ /\ \/\ \   /\ \       /\  ___\   /\  ___\
//    \ \  _-/ \ \ \_\ \  \ \ \____  \ \___  \  \ \  __\
//     \ \_\    \ \_____\  \ \_____\  \/\_____\  \ \_____\
//      \/_/     \/_____/   \/_____/   \/_____/   \/_____/
//
// Author: Colin MacRitchie / Ripple Group
// Frame-budgeted task dispatch for game and UI tick loops
/// Monotonic clock sources for tick accounting
pub mod clock;
mod inbox;
/// Fixed-capacity task arena and index-linked chains
pub mod pool;
/// Tick executor and scheduling surface
pub mod scheduler;
/// Single- and multi-cast task senders
pub mod sender;
/// Statistics collection and per-tick reporting
pub mod stats;
/// Task identity, priority classes, and thunks
pub mod task;

// Public API exports
pub use clock::{ManualClock, MonotonicClock, TickClock};
pub use pool::{TaskChain, TaskCursor, TaskPool, TaskSlot, DEFAULT_POOL_CAPACITY};
pub use scheduler::{
    global, ScheduleError, SchedulerConfig, TickScheduler, DEFAULT_CATEGORY_BUDGET,
    DEFAULT_CATEGORY_COUNT,
};
pub use sender::{Sender, SenderMultiCast};
pub use stats::{CategoryTickStats, SchedulerStats, StatsSnapshot, TickSnapshot};
pub use task::{
    Category, Priority, TaskId, TaskInfo, TaskThunk, CATEGORY_UNKNOWN, SKIP_HORIZON_FRAMES,
};
