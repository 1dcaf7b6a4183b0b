//! Task identity, priority classes, and thunks.
//!
//! Every schedulable unit is addressed by a [`TaskInfo`]: a process-unique
//! [`TaskId`], a [`Category`] index, and a [`Priority`] class. The body of a
//! task is an opaque [`TaskThunk`] that has already captured its arguments.

#![forbid(unsafe_code)]

//     ______   __  __     __         ______     ______
//    /\  == \ /\ \/\ \   /\ \       /\  ___\   /\  ___\
//    \ \  _-/ \ \ \_\ \  \ \ \____  \ \___  \  \ \  __\
//     \ \_\    \ \_____\  \ \_____\  \/\_____\  \ \_____\
//      \/_/     \/_____/   \/_____/   \/_____/   \/_____/
//
// Author: Colin MacRitchie / Ripple Group
use std::sync::atomic::{AtomicU32, Ordering};

/// Category index type. Valid values are `[0, categories)` for the scheduler
/// the task is submitted to.
pub type Category = u16;

/// Conventional default category.
pub const CATEGORY_UNKNOWN: Category = 0;

/// Frame horizon after which an undispatched [`Priority::SkipAfter16Frames`]
/// task is dropped without running.
pub const SKIP_HORIZON_FRAMES: u32 = 16;

/// A task body: a zero-argument thunk with its arguments captured by value.
pub type TaskThunk = Box<dyn FnOnce() + Send + 'static>;

/* Process-wide id source. 0 is reserved as the invalid id. */
static NEXT_TASK_ID: AtomicU32 = AtomicU32::new(1);

/// Process-unique task/receiver identifier.
///
/// Allocated by an atomic fetch-add; `0` is reserved as *invalid*. The
/// counter wraps after `u32::MAX` allocations, at which point uniqueness is
/// no longer guaranteed against still-live early ids.
///
/// # Examples
///
/// ```
/// use frame_pulse::TaskId;
///
/// let a = TaskId::next();
/// let b = TaskId::next();
/// assert!(a.is_valid());
/// assert_ne!(a, b);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TaskId(u32);

impl TaskId {
    /// The reserved invalid id.
    pub const INVALID: Self = Self(0);

    /// Allocates a fresh id from the process-wide counter.
    #[inline]
    #[must_use]
    pub fn next() -> Self {
        let raw = NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed);
        if raw == 0 {
            /* Counter wrapped; 0 stays reserved. */
            return Self(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed));
        }
        Self(raw)
    }

    /// Returns `true` unless this is the reserved invalid id.
    #[inline]
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }

    /// Raw numeric value.
    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

/// Dispatch urgency classes, ordered lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    /// Deferred; dropped if not dispatched within
    /// [`SKIP_HORIZON_FRAMES`] frames of submission.
    SkipAfter16Frames,
    /// Deferred; never dropped by age, yields to time pressure.
    CanWait,
    /// Dispatched in the same tick it was submitted, regardless of budgets.
    Immediate,
}

impl Priority {
    /// Whether this class waits in the deferred (`can_wait`) chain.
    #[inline]
    #[must_use]
    pub const fn is_deferred(self) -> bool {
        !matches!(self, Self::Immediate)
    }

    /// Whether this class is subject to the frame-age drop rule.
    #[inline]
    #[must_use]
    pub const fn may_age_out(self) -> bool {
        matches!(self, Self::SkipAfter16Frames)
    }
}

/// The addressable identity of a logical task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskInfo {
    /// Process-unique identifier; shared by all tasks of one receiver.
    pub id: TaskId,
    /// Category the task is accounted under.
    pub category: Category,
    /// Dispatch urgency.
    pub priority: Priority,
}

impl TaskInfo {
    /// Builds an info with a freshly allocated id.
    #[must_use]
    pub fn fresh(category: Category, priority: Priority) -> Self {
        Self {
            id: TaskId::next(),
            category,
            priority,
        }
    }

    /// An info is valid iff its id is.
    #[inline]
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.id.is_valid()
    }
}

impl Default for TaskInfo {
    fn default() -> Self {
        Self {
            id: TaskId::INVALID,
            category: CATEGORY_UNKNOWN,
            priority: Priority::CanWait,
        }
    }
}
