#![forbid(unsafe_code)]
#![allow(clippy::cast_possible_truncation)] /* micros fit u64 for any realistic tick */

/*
 *     ______   __  __     __         ______     ______
 *    /\  == \ /\ \/\ \   /\ \       /\  ___\   /\  ___\
 *    \ \  _-/ \ \ \_\ \  \ \ \____  \ \___  \  \ \  __\
 *     \ \_\    \ \_____\  \ \_____\  \/\_____\  \ \_____\
 *      \/_/     \/_____/   \/_____/   \/_____/   \/_____/
 *
 * Author: Colin MacRitchie / Ripple Group
 */
/* Tick executor: frame-budgeted dispatch over per-category task chains. */
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::LazyLock;
use std::time::Duration;
use thiserror::Error;

use crate::clock::{MonotonicClock, TickClock};
use crate::inbox::{Inbox, Submission};
use crate::pool::{TaskChain, TaskPool, DEFAULT_POOL_CAPACITY};
use crate::stats::{CategoryTickStats, SchedulerStats, StatsSnapshot, TickSnapshot};
use crate::task::{Category, Priority, TaskInfo, TaskThunk, SKIP_HORIZON_FRAMES};

/// Default category count (category 0 is the conventional "unknown").
pub const DEFAULT_CATEGORY_COUNT: usize = 4;

/// Default per-category budget applied by [`SchedulerConfig::default`].
pub const DEFAULT_CATEGORY_BUDGET: Duration = Duration::from_micros(5_000);

/// Submission errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ScheduleError {
    /// The pool already holds `capacity` in-flight tasks.
    #[error("task pool exhausted ({capacity} tasks in flight)")]
    PoolExhausted {
        /// Pool capacity at construction.
        capacity: usize,
    },

    /// The task names a category the scheduler was not built with.
    #[error("category {category} out of range (scheduler has {categories})")]
    CategoryOutOfRange {
        /// Offending category index.
        category: Category,
        /// Category count of this scheduler.
        categories: usize,
    },

    /// The task carries the reserved invalid id.
    #[error("task info carries the invalid id")]
    InvalidTask,
}

/// Construction parameters for a [`TickScheduler`].
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Number of categories; valid indices are `[0, categories)`.
    pub categories: usize,

    /// Task pool capacity (maximum in-flight tasks).
    pub pool_capacity: usize,

    /// Budget seeded into every category; [`TickScheduler::set_budget`]
    /// overrides per category.
    pub default_budget: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            categories: DEFAULT_CATEGORY_COUNT,
            pool_capacity: DEFAULT_POOL_CAPACITY,
            default_budget: DEFAULT_CATEGORY_BUDGET,
        }
    }
}

/* Per-category pair of chains. Immediate work bypasses budgets; both
 * deferred priorities share `can_wait` and are told apart by the record's
 * own priority at dispatch time. */
#[derive(Debug, Clone, Copy, Default)]
struct CategoryBucket {
    immediate: TaskChain,
    can_wait: TaskChain,
}

impl CategoryBucket {
    fn chain_for(&mut self, priority: Priority) -> &mut TaskChain {
        if priority.is_deferred() {
            &mut self.can_wait
        } else {
            &mut self.immediate
        }
    }

    fn len(&self) -> usize {
        self.immediate.len() + self.can_wait.len()
    }
}

/* Executor-owned state, guarded by the core mutex. */
struct Core {
    pool: TaskPool,
    buckets: Vec<CategoryBucket>,
    budgets: Vec<Duration>,
    frame: u32,
    last_idx: usize, /* round-robin cursor of the bonus pass */
    clock: Box<dyn TickClock>,
    last_snapshot: Option<TickSnapshot>,
}

/// Cooperative, frame-budgeted task scheduler.
///
/// Producers submit through `&self` (the calls only stage work in a
/// lock-free inbox), so a running task delegate may submit or cancel; the
/// effects become visible on the next tick. [`TickScheduler::execute_tick`]
/// is the single consumer and must not be re-entered.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use frame_pulse::{Priority, SchedulerConfig, Sender, TickScheduler};
///
/// let scheduler = TickScheduler::new(SchedulerConfig::default());
/// scheduler.set_budget(0, Duration::from_micros(500));
///
/// let sender = Sender::new(|n: u32| { let _ = n; }, 0, Priority::CanWait);
/// sender.send(&scheduler, 7).unwrap();
///
/// scheduler.execute_tick(Duration::from_millis(50));
/// assert_eq!(scheduler.pending_tasks(), 0);
/// ```
pub struct TickScheduler {
    inbox: Inbox,
    core: Mutex<Core>,
    frame: AtomicU32, /* published for source_frame stamping */
    stats: SchedulerStats,
    categories: usize,
}

impl TickScheduler {
    /// Creates a scheduler with a [`MonotonicClock`].
    ///
    /// # Panics
    ///
    /// Panics if the config names zero categories or a zero/oversized pool.
    #[must_use]
    pub fn new(config: SchedulerConfig) -> Self {
        Self::with_clock(config, Box::new(MonotonicClock::new()))
    }

    /// Creates a scheduler reading time from `clock`.
    ///
    /// # Panics
    ///
    /// Panics if the config names zero categories or a zero/oversized pool.
    #[must_use]
    pub fn with_clock(config: SchedulerConfig, clock: Box<dyn TickClock>) -> Self {
        assert!(config.categories > 0, "scheduler needs at least one category");

        Self {
            inbox: Inbox::new(config.pool_capacity),
            core: Mutex::new(Core {
                pool: TaskPool::new(config.pool_capacity),
                buckets: vec![CategoryBucket::default(); config.categories],
                budgets: vec![config.default_budget; config.categories],
                frame: 0,
                last_idx: 0,
                clock,
                last_snapshot: None,
            }),
            frame: AtomicU32::new(0),
            stats: SchedulerStats::new(),
            categories: config.categories,
        }
    }

    /// Category count this scheduler was built with.
    #[inline]
    #[must_use]
    pub fn categories(&self) -> usize {
        self.categories
    }

    /// Current frame counter (increments at the end of each tick).
    #[inline]
    #[must_use]
    pub fn frame(&self) -> u32 {
        self.frame.load(Ordering::Acquire)
    }

    /// In-flight tasks: staged in the inbox plus queued in chains.
    #[inline]
    #[must_use]
    pub fn pending_tasks(&self) -> usize {
        self.inbox.in_flight()
    }

    /// Sets one category's per-tick budget. Takes effect on the next tick.
    ///
    /// # Panics
    ///
    /// Panics if `category` is out of range. Must not be called from inside
    /// a running task delegate.
    pub fn set_budget(&self, category: Category, budget: Duration) {
        assert!(
            (category as usize) < self.categories,
            "category {category} out of range ({} categories)",
            self.categories
        );
        self.core.lock().budgets[category as usize] = budget;
    }

    /// Reads one category's configured budget.
    ///
    /// # Panics
    ///
    /// Panics if `category` is out of range. Must not be called from inside
    /// a running task delegate.
    #[must_use]
    pub fn budget(&self, category: Category) -> Duration {
        assert!(
            (category as usize) < self.categories,
            "category {category} out of range ({} categories)",
            self.categories
        );
        self.core.lock().budgets[category as usize]
    }

    /// Submits a task for dispatch on a later tick (the next one, unless a
    /// tick is currently executing on this thread's behalf).
    ///
    /// # Errors
    ///
    /// [`ScheduleError::InvalidTask`] for the reserved id,
    /// [`ScheduleError::CategoryOutOfRange`] for an unknown category, and
    /// [`ScheduleError::PoolExhausted`] when `pool_capacity` tasks are
    /// already in flight.
    pub fn add_task(&self, info: TaskInfo, thunk: TaskThunk) -> Result<(), ScheduleError> {
        if !info.is_valid() {
            return Err(ScheduleError::InvalidTask);
        }
        if (info.category as usize) >= self.categories {
            return Err(ScheduleError::CategoryOutOfRange {
                category: info.category,
                categories: self.categories,
            });
        }
        let staged = self.inbox.submit(Submission {
            info,
            source_frame: self.frame(),
            thunk,
        });
        if let Err(err) = staged {
            #[cfg(feature = "tracing")]
            tracing::warn!(id = info.id.as_u32(), category = info.category, %err, "submission refused");
            return Err(err);
        }
        self.stats.record_submitted();
        Ok(())
    }

    /// Posts a deferred cancellation: at the start of the next tick, every
    /// queued record matching `info`'s id is removed without running.
    ///
    /// Cancelling an unknown or already-dispatched task is a silent no-op,
    /// and posting the same cancellation twice removes the task once.
    pub fn remove(&self, info: TaskInfo) {
        if info.is_valid() {
            self.inbox.post_removal(info);
        }
    }

    /// Runs one tick with the given whole-tick window.
    ///
    /// Phase 0 drains staged submissions and cancellations; phase 1 flushes
    /// every immediate chain unconditionally; phase 2 spends each category's
    /// budget on its deferred chain; phase 3 round-robins leftover window
    /// across categories; phase 4 publishes statistics and advances the
    /// frame.
    ///
    /// # Panics
    ///
    /// Panics when re-entered, including from a task delegate.
    pub fn execute_tick(&self, whole_tick: Duration) {
        let mut core = self
            .core
            .try_lock()
            .expect("execute_tick is not reentrant (called from a task delegate?)");
        core.run_tick(&self.inbox, &self.stats, whole_tick);
        self.frame.store(core.frame, Ordering::Release);
    }

    /// Cumulative counters.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Report of the most recently completed tick, if any. Must not be
    /// called from inside a running task delegate.
    #[must_use]
    pub fn last_tick_snapshot(&self) -> Option<TickSnapshot> {
        self.core.lock().last_snapshot.clone()
    }
}

impl Core {
    fn run_tick(&mut self, inbox: &Inbox, stats: &SchedulerStats, whole_tick: Duration) {
        let tick_start = self.clock.now_micros();
        let whole_tick_us = u64::try_from(whole_tick.as_micros()).unwrap_or(u64::MAX);

        /* Phase 0: staged submissions land first so that a cancellation
         * posted after a send finds its target. */
        self.drain_submissions(inbox);
        self.apply_removals(inbox, stats);

        let n = self.buckets.len();
        let mut local = self.budgets.clone();
        let mut rows = vec![CategoryTickStats::default(); n];

        let Core {
            pool,
            buckets,
            frame,
            last_idx,
            clock,
            ..
        } = self;
        let frame = *frame;

        /* Phase 1: immediates are unconditional; one clock delta per
         * category is charged against its local budget. */
        let mut mark = tick_start;
        for (c, bucket) in buckets.iter_mut().enumerate() {
            let mut ran = 0u32;
            while let Some(idx) = pool.pop_front(&mut bucket.immediate) {
                let thunk = pool.take_thunk(idx);
                pool.release(idx);
                inbox.task_retired();
                if let Some(thunk) = thunk {
                    thunk();
                }
                ran += 1;
            }
            if ran > 0 {
                let now = clock.now_micros();
                let spent = Duration::from_micros(now.saturating_sub(mark));
                mark = now;
                local[c] = local[c].saturating_sub(spent);
                rows[c].done_base += ran;
                stats.record_immediate(u64::from(ran));
            }
        }

        /* Phase 2: spend category budgets on deferred work, in ascending
         * category order. Aged-out records are culled without charge. */
        for (c, bucket) in buckets.iter_mut().enumerate() {
            loop {
                let Some(head) = bucket.can_wait.front() else { break };
                if is_aged(pool, head, frame) {
                    cull(pool, &mut bucket.can_wait, inbox);
                    rows[c].skipped += 1;
                    stats.record_skipped(1);
                    continue;
                }
                if local[c].is_zero() {
                    break;
                }
                let before = clock.now_micros();
                if before.saturating_sub(tick_start) >= whole_tick_us {
                    break;
                }

                let idx = pool.pop_front(&mut bucket.can_wait).expect("head observed above");
                let thunk = pool.take_thunk(idx);
                pool.release(idx);
                inbox.task_retired();
                if let Some(thunk) = thunk {
                    thunk();
                }

                let after = clock.now_micros();
                local[c] = local[c].saturating_sub(Duration::from_micros(after.saturating_sub(before)));
                rows[c].done_base += 1;
                stats.record_base(1);
            }
        }

        /* Phase 3: bonus pass. Rotate the starting category so leftover
         * window is shared across ticks; a partial drain still counts as
         * that category's turn. */
        let base = *last_idx;
        'sweep: for offset in 1..=n {
            let idx = (base + offset) % n;
            loop {
                let Some(head) = buckets[idx].can_wait.front() else { break };
                if is_aged(pool, head, frame) {
                    cull(pool, &mut buckets[idx].can_wait, inbox);
                    rows[idx].skipped += 1;
                    stats.record_skipped(1);
                    continue;
                }
                let now = clock.now_micros();
                if now.saturating_sub(tick_start) >= whole_tick_us {
                    *last_idx = idx;
                    break 'sweep;
                }

                let slot = pool.pop_front(&mut buckets[idx].can_wait).expect("head observed above");
                let thunk = pool.take_thunk(slot);
                pool.release(slot);
                inbox.task_retired();
                if let Some(thunk) = thunk {
                    thunk();
                }
                rows[idx].done_bonus += 1;
                stats.record_bonus(1);
            }
            *last_idx = idx;
        }

        /* Phase 4: sample, publish, advance the frame. */
        for (c, bucket) in buckets.iter().enumerate() {
            rows[c].pending = bucket.len() as u32;
            rows[c].remaining_budget = local[c];
        }
        let snapshot = TickSnapshot {
            frame,
            categories: rows,
        };
        snapshot.emit();
        self.last_snapshot = Some(snapshot);
        stats.record_tick();
        self.frame = self.frame.wrapping_add(1);
    }

    fn drain_submissions(&mut self, inbox: &Inbox) {
        while let Some(submission) = inbox.pop_submission() {
            let Core { pool, buckets, .. } = self;
            let idx = pool
                .alloc(submission.info, submission.source_frame, submission.thunk)
                .expect("inbox gate reserved a pool slot");
            let chain = buckets[submission.info.category as usize].chain_for(submission.info.priority);
            pool.push_back(chain, idx);
        }
    }

    fn apply_removals(&mut self, inbox: &Inbox, stats: &SchedulerStats) {
        while let Some(target) = inbox.pop_removal() {
            let Core { pool, buckets, .. } = self;
            let Some(bucket) = buckets.get_mut(target.category as usize) else {
                continue; /* foreign info; ignore */
            };
            let chain = bucket.chain_for(target.priority);
            let mut cursor = pool.cursor(chain);
            let mut removed = 0u64;
            loop {
                let matched = match cursor.current() {
                    None => break,
                    Some(slot) => slot.info().id == target.id,
                };
                if matched {
                    let _ = cursor.remove();
                    removed += 1;
                } else {
                    cursor.advance();
                }
            }
            if removed > 0 {
                for _ in 0..removed {
                    inbox.task_retired();
                }
                stats.record_cancelled(removed);
            }
        }
    }
}

#[inline]
fn is_aged(pool: &TaskPool, idx: u16, frame: u32) -> bool {
    let slot = pool.slot(idx);
    slot.info().priority.may_age_out()
        && frame.wrapping_sub(slot.source_frame()) > SKIP_HORIZON_FRAMES
}

/* Drops the chain head without running it. */
fn cull(pool: &mut TaskPool, chain: &mut TaskChain, inbox: &Inbox) {
    let idx = pool.pop_front(chain).expect("cull requires a head");
    pool.release(idx);
    inbox.task_retired();
}

/* Process-wide default scheduler; a thin convenience over owning a
 * TickScheduler value and threading it through senders. */
static GLOBAL_SCHEDULER: LazyLock<TickScheduler> =
    LazyLock::new(|| TickScheduler::new(SchedulerConfig::default()));

/// Returns the process-wide scheduler, built lazily from
/// [`SchedulerConfig::default`].
#[must_use]
pub fn global() -> &'static TickScheduler {
    &GLOBAL_SCHEDULER
}
