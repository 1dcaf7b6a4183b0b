/*
 *     ______   __  __     __         ______     ______
 *    /\  == \ /\ \/\ \   /\ \       /\  ___\   /\  ___\
 *    \ \  _-/ \ \ \_\ \  \ \ \____  \ \___  \  \ \  __\
 *     \ \_\    \ \_____\  \ \_____\  \/\_____\  \ \_____\
 *      \/_/     \/_____/   \/_____/   \/_____/   \/_____/
 *
 * Author: Colin MacRitchie / Ripple Group
 */
/* Lock-free staging of submissions and cancellations.
 *
 * Producers (senders, host code, running task delegates) reach the scheduler
 * through this inbox with `&self` only; the executor drains it at the start
 * of the next tick. That is what makes work enqueued by a running delegate
 * invisible to the tick that is executing it. The in-flight gate reserves a
 * pool slot per staged submission, so draining can never observe an empty
 * free chain. */

use crossbeam::queue::SegQueue;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::scheduler::ScheduleError;
use crate::task::{TaskInfo, TaskThunk};

pub(crate) struct Submission {
    pub info: TaskInfo,
    pub source_frame: u32,
    pub thunk: TaskThunk,
}

pub(crate) struct Inbox {
    submissions: SegQueue<Submission>,
    removals: SegQueue<TaskInfo>,
    in_flight: AtomicUsize, /* staged + pooled tasks */
    capacity: usize,
}

impl Inbox {
    pub fn new(capacity: usize) -> Self {
        Self {
            submissions: SegQueue::new(),
            removals: SegQueue::new(),
            in_flight: AtomicUsize::new(0),
            capacity,
        }
    }

    /* Reserves a pool slot, then stages the submission. */
    pub fn submit(&self, submission: Submission) -> Result<(), ScheduleError> {
        self.in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.capacity).then_some(n + 1)
            })
            .map_err(|_| ScheduleError::PoolExhausted {
                capacity: self.capacity,
            })?;
        self.submissions.push(submission);
        Ok(())
    }

    pub fn post_removal(&self, info: TaskInfo) {
        self.removals.push(info);
    }

    pub fn pop_submission(&self) -> Option<Submission> {
        self.submissions.pop()
    }

    pub fn pop_removal(&self) -> Option<TaskInfo> {
        self.removals.pop()
    }

    /* Called once per record leaving the pool: dispatched, aged out, or
     * cancelled. */
    pub fn task_retired(&self) {
        let previous = self.in_flight.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "retire without matching submit");
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{Priority, TaskInfo, CATEGORY_UNKNOWN};

    fn submission() -> Submission {
        Submission {
            info: TaskInfo::fresh(CATEGORY_UNKNOWN, Priority::CanWait),
            source_frame: 0,
            thunk: Box::new(|| {}),
        }
    }

    #[test]
    fn test_gate_refuses_over_capacity() {
        let inbox = Inbox::new(2);
        assert!(inbox.submit(submission()).is_ok());
        assert!(inbox.submit(submission()).is_ok());
        assert!(matches!(
            inbox.submit(submission()),
            Err(ScheduleError::PoolExhausted { capacity: 2 })
        ));
        assert_eq!(inbox.in_flight(), 2);
    }

    #[test]
    fn test_retire_frees_capacity() {
        let inbox = Inbox::new(1);
        assert!(inbox.submit(submission()).is_ok());
        let staged = inbox.pop_submission().unwrap();
        assert!(staged.info.is_valid());
        inbox.task_retired();
        assert!(inbox.submit(submission()).is_ok());
    }

    #[test]
    fn test_submission_order_is_fifo() {
        let inbox = Inbox::new(8);
        let mut ids = Vec::new();
        for _ in 0..4 {
            let sub = submission();
            ids.push(sub.info.id);
            inbox.submit(sub).unwrap();
        }
        let mut drained = Vec::new();
        while let Some(sub) = inbox.pop_submission() {
            drained.push(sub.info.id);
        }
        assert_eq!(drained, ids);
    }
}
