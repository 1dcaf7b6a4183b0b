//! Single- and multi-cast task senders.
//!
//! A sender owns receivers: callables bound to a [`TaskInfo`] at
//! registration time. [`Sender`] holds at most one receiver,
//! [`SenderMultiCast`] any number. `send` binds the call's arguments **by
//! value** into one thunk per receiver and submits them, so a task never
//! borrows from the caller's stack; callers who want reference semantics
//! pass owned handles (`Arc<T>`) as the argument type.
//!
//! Senders do not own a scheduler. They are threaded one explicitly
//! (`send(&scheduler, args)`), which keeps them trivially testable; the
//! process-wide [`crate::scheduler::global`] instance serves when nothing
//! else is.

#![forbid(unsafe_code)]

use std::sync::Arc;

use crate::scheduler::{ScheduleError, TickScheduler};
use crate::task::{Category, Priority, TaskId, TaskInfo, TaskThunk};

/* A registered callable plus the identity its tasks will carry. */
struct Receiver<A> {
    info: TaskInfo,
    delegate: Arc<dyn Fn(A) + Send + Sync + 'static>,
}

impl<A> Clone for Receiver<A> {
    fn clone(&self) -> Self {
        Self {
            info: self.info,
            delegate: Arc::clone(&self.delegate),
        }
    }
}

impl<A: Clone + Send + 'static> Receiver<A> {
    fn bind(&self, args: A) -> TaskThunk {
        let delegate = Arc::clone(&self.delegate);
        Box::new(move || delegate(args))
    }
}

/// A sender with zero or one receiver.
///
/// Clones share the receiver and its id, so a copy refers to the same
/// logical receiver identity and can cancel tasks the original enqueued.
pub struct Sender<A> {
    receiver: Option<Receiver<A>>,
}

impl<A> Clone for Sender<A> {
    fn clone(&self) -> Self {
        Self {
            receiver: self.receiver.clone(),
        }
    }
}

impl<A> Default for Sender<A> {
    /// An empty sender; [`Sender::send`] on it is a no-op.
    fn default() -> Self {
        Self { receiver: None }
    }
}

impl<A: Clone + Send + 'static> Sender<A> {
    /// Creates a sender around `delegate` with a freshly allocated id.
    #[must_use]
    pub fn new(
        delegate: impl Fn(A) + Send + Sync + 'static,
        category: Category,
        priority: Priority,
    ) -> Self {
        Self {
            receiver: Some(Receiver {
                info: TaskInfo::fresh(category, priority),
                delegate: Arc::new(delegate),
            }),
        }
    }

    /// Binds `args` into a task for the receiver and submits it.
    ///
    /// Returns `Ok(false)` without submitting when the sender is empty.
    ///
    /// # Errors
    ///
    /// Propagates [`ScheduleError`] from the scheduler's submission gate.
    pub fn send(&self, scheduler: &TickScheduler, args: A) -> Result<bool, ScheduleError> {
        let Some(receiver) = &self.receiver else {
            return Ok(false);
        };
        scheduler.add_task(receiver.info, receiver.bind(args))?;
        Ok(true)
    }

    /// Posts a deferred cancellation for every not-yet-dispatched task this
    /// sender's id has enqueued.
    pub fn remove_pending_task(&self, scheduler: &TickScheduler) {
        if let Some(receiver) = &self.receiver {
            scheduler.remove(receiver.info);
        }
    }

    /// Drops the receiver, leaving the sender empty.
    pub fn reset(&mut self) {
        self.receiver = None;
    }

    /// Whether a receiver is present.
    #[inline]
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.receiver.is_some()
    }

    /// Identity tasks from this sender carry, if a receiver is present.
    #[must_use]
    pub fn info(&self) -> Option<TaskInfo> {
        self.receiver.as_ref().map(|r| r.info)
    }
}

/// A sender with any number of receivers.
pub struct SenderMultiCast<A> {
    receivers: Vec<Receiver<A>>,
}

impl<A> Clone for SenderMultiCast<A> {
    fn clone(&self) -> Self {
        Self {
            receivers: self.receivers.clone(),
        }
    }
}

impl<A> Default for SenderMultiCast<A> {
    fn default() -> Self {
        Self {
            receivers: Vec::new(),
        }
    }
}

impl<A> SenderMultiCast<A> {
    /// Creates a sender with no receivers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered receivers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.receivers.len()
    }

    /// `true` when no receiver is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.receivers.is_empty()
    }
}

impl<A: Clone + Send + 'static> SenderMultiCast<A> {
    /// Registers a receiver and returns the identity its tasks will carry.
    pub fn register(
        &mut self,
        delegate: impl Fn(A) + Send + Sync + 'static,
        category: Category,
        priority: Priority,
    ) -> TaskInfo {
        let info = TaskInfo::fresh(category, priority);
        self.receivers.push(Receiver {
            info,
            delegate: Arc::new(delegate),
        });
        info
    }

    /// Removes every receiver whose id matches; returns how many were
    /// removed. Unknown ids remove nothing and return 0.
    pub fn unregister(&mut self, id: TaskId) -> usize {
        let before = self.receivers.len();
        self.receivers.retain(|r| r.info.id != id);
        before - self.receivers.len()
    }

    /// Binds `args` once per receiver and submits one task each, in
    /// registration order. Returns the number of tasks enqueued.
    ///
    /// # Errors
    ///
    /// Stops at the first submission the scheduler refuses; earlier
    /// receivers' tasks stay enqueued.
    pub fn send(&self, scheduler: &TickScheduler, args: A) -> Result<usize, ScheduleError> {
        let mut enqueued = 0;
        for receiver in &self.receivers {
            scheduler.add_task(receiver.info, receiver.bind(args.clone()))?;
            enqueued += 1;
        }
        Ok(enqueued)
    }

    /// Posts deferred cancellations for all current receivers' pending
    /// tasks.
    pub fn remove_pending_tasks(&self, scheduler: &TickScheduler) {
        for receiver in &self.receivers {
            scheduler.remove(receiver.info);
        }
    }
}
