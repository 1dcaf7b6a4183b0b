//! Fixed-capacity task arena and index-linked chains.
//!
//! All task records live in one preallocated arena; nothing is allocated or
//! freed per task at steady state. Chains (the free list and every
//! per-category queue) are singly linked through `u16` slot indices with a
//! cached length, so a record moves between chains in O(1) without pointer
//! arithmetic. A record is always on exactly one chain.

#![forbid(unsafe_code)]

//     ______   __  __     __         ______     ______
//    /\  == \ /\ \/\ \   /\ \       /\  ___\   /\  ___\
//    \ \  _-/ \ \ \_\ \  \ \ \____  \ \___  \  \ \  __\
//     \ \_\    \ \_____\  \ \_____\  \/\_____\  \ \_____\
//      \/_/     \/_____/   \/_____/   \/_____/   \/_____/
//
// Author: Colin MacRitchie / Ripple Group
use crate::task::{TaskInfo, TaskThunk};

/// Default arena capacity: the maximum number of in-flight tasks.
pub const DEFAULT_POOL_CAPACITY: usize = 1024;

/* Sentinel index; no slot may occupy it. */
const NIL: u16 = u16::MAX;

/// One task record in the arena.
pub struct TaskSlot {
    info: TaskInfo,         /* identity while occupied */
    source_frame: u32,      /* frame counter at submission */
    thunk: Option<TaskThunk>,
    next: u16,              /* intrusive chain link */
}

impl TaskSlot {
    /// Identity of the occupying task.
    #[inline]
    #[must_use]
    pub fn info(&self) -> TaskInfo {
        self.info
    }

    /// Frame counter value captured at submission time.
    #[inline]
    #[must_use]
    pub fn source_frame(&self) -> u32 {
        self.source_frame
    }

    fn reset(&mut self) {
        self.info = TaskInfo::default();
        self.source_frame = 0;
        self.thunk = None;
        debug_assert_eq!(self.next, NIL, "reset slot must already be unlinked");
    }
}

/// A singly linked chain of slots: head, tail, and cached length.
#[derive(Debug, Clone, Copy)]
pub struct TaskChain {
    head: u16,
    tail: u16,
    len: u32,
}

impl TaskChain {
    /// The empty chain.
    pub const EMPTY: Self = Self {
        head: NIL,
        tail: NIL,
        len: 0,
    };

    /// Number of slots reachable from the head.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len as usize
    }

    /// `true` iff head and tail are both unset.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Index of the first slot, if any.
    #[inline]
    #[must_use]
    pub fn front(&self) -> Option<u16> {
        (self.len > 0).then_some(self.head)
    }
}

impl Default for TaskChain {
    fn default() -> Self {
        Self::EMPTY
    }
}

/* Chain primitives operate on the raw slot array so that the pool can link
 * its own free chain and caller-owned chains through the same code. */

fn chain_push_back(slots: &mut [TaskSlot], chain: &mut TaskChain, idx: u16) {
    debug_assert_eq!(slots[idx as usize].next, NIL, "pushed slot must be unlinked");
    if chain.len == 0 {
        chain.head = idx;
    } else {
        slots[chain.tail as usize].next = idx;
    }
    chain.tail = idx;
    chain.len += 1;
    debug_assert_eq!(slots[chain.tail as usize].next, NIL);
}

fn chain_push_front(slots: &mut [TaskSlot], chain: &mut TaskChain, idx: u16) {
    debug_assert_eq!(slots[idx as usize].next, NIL, "pushed slot must be unlinked");
    if chain.len == 0 {
        chain.tail = idx;
    } else {
        slots[idx as usize].next = chain.head;
    }
    chain.head = idx;
    chain.len += 1;
}

fn chain_pop_front(slots: &mut [TaskSlot], chain: &mut TaskChain) -> Option<u16> {
    if chain.len == 0 {
        return None;
    }
    let idx = chain.head;
    chain.head = slots[idx as usize].next;
    slots[idx as usize].next = NIL;
    chain.len -= 1;
    if chain.len == 0 {
        chain.head = NIL;
        chain.tail = NIL;
    }
    Some(idx)
}

/// Preallocated arena of [`TaskSlot`]s sharing one free chain.
///
/// Capacity is fixed at construction; exhaustion is surfaced by
/// [`TaskPool::alloc`] returning `None` and is treated as a caller error at
/// the scheduler's submission gate.
pub struct TaskPool {
    slots: Box<[TaskSlot]>,
    free: TaskChain,
}

impl TaskPool {
    /// Creates an arena with every slot on the free chain, threaded
    /// head-to-tail in index order.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero or exceeds the index range.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)] /* capacity bounded by NIL above */
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "pool capacity must be non-zero");
        assert!(
            capacity <= NIL as usize,
            "pool capacity {capacity} exceeds index range {}",
            NIL
        );

        let slots: Box<[TaskSlot]> = (0..capacity)
            .map(|i| TaskSlot {
                info: TaskInfo::default(),
                source_frame: 0,
                thunk: None,
                next: if i + 1 < capacity { (i + 1) as u16 } else { NIL },
            })
            .collect();

        let free = TaskChain {
            head: 0,
            tail: (capacity - 1) as u16,
            len: capacity as u32,
        };

        Self { slots, free }
    }

    /// Total slot count.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Slots currently on the free chain.
    #[inline]
    #[must_use]
    pub fn free_len(&self) -> usize {
        self.free.len()
    }

    /// Read access to a slot.
    ///
    /// # Panics
    ///
    /// Panics if `idx` is out of range.
    #[inline]
    #[must_use]
    pub fn slot(&self, idx: u16) -> &TaskSlot {
        &self.slots[idx as usize]
    }

    /// Takes a slot off the free chain and fills it.
    ///
    /// Returns `None` when the arena is exhausted. The returned slot is
    /// unlinked; the caller is expected to push it onto a chain.
    pub fn alloc(&mut self, info: TaskInfo, source_frame: u32, thunk: TaskThunk) -> Option<u16> {
        let idx = chain_pop_front(&mut self.slots, &mut self.free)?;
        let slot = &mut self.slots[idx as usize];
        slot.info = info;
        slot.source_frame = source_frame;
        slot.thunk = Some(thunk);
        Some(idx)
    }

    /// Resets an unlinked slot and returns it to the front of the free chain.
    pub fn release(&mut self, idx: u16) {
        self.slots[idx as usize].reset();
        chain_push_front(&mut self.slots, &mut self.free, idx);
    }

    /// Takes the slot's thunk, leaving `None` behind.
    pub fn take_thunk(&mut self, idx: u16) -> Option<TaskThunk> {
        self.slots[idx as usize].thunk.take()
    }

    /// Appends an unlinked slot to a chain.
    pub fn push_back(&mut self, chain: &mut TaskChain, idx: u16) {
        chain_push_back(&mut self.slots, chain, idx);
    }

    /// Prepends an unlinked slot to a chain.
    pub fn push_front(&mut self, chain: &mut TaskChain, idx: u16) {
        chain_push_front(&mut self.slots, chain, idx);
    }

    /// Detaches the first slot of a chain. The returned slot has its link
    /// cleared.
    pub fn pop_front(&mut self, chain: &mut TaskChain) -> Option<u16> {
        chain_pop_front(&mut self.slots, chain)
    }

    /// Starts an in-place traversal of `chain` that can return removed
    /// records to the free chain.
    pub fn cursor<'a>(&'a mut self, chain: &'a mut TaskChain) -> TaskCursor<'a> {
        let cur = chain.front().unwrap_or(NIL);
        TaskCursor {
            pool: self,
            chain,
            prev: NIL,
            cur,
        }
    }
}

/// Forward-only traversal of a chain with removal.
///
/// The cursor keeps an explicit predecessor index, so unlinking the current
/// record (including the tail) needs no address arithmetic. After
/// [`TaskCursor::remove`] the cursor already rests on the logical next
/// record; no separate advance is required.
pub struct TaskCursor<'a> {
    pool: &'a mut TaskPool,
    chain: &'a mut TaskChain,
    prev: u16, /* NIL while the cursor is at the head */
    cur: u16,
}

impl TaskCursor<'_> {
    /// The record under the cursor, or `None` past the end.
    #[inline]
    #[must_use]
    pub fn current(&self) -> Option<&TaskSlot> {
        (self.cur != NIL).then(|| &self.pool.slots[self.cur as usize])
    }

    /// Steps to the next record.
    pub fn advance(&mut self) {
        if self.cur != NIL {
            self.prev = self.cur;
            self.cur = self.pool.slots[self.cur as usize].next;
        }
    }

    /// Unlinks the current record, resets it onto the free chain, and leaves
    /// the cursor on the record that followed it.
    ///
    /// Returns the removed record's thunk so the caller can decide whether it
    /// still runs. Returns `None` past the end of the chain.
    pub fn remove(&mut self) -> Option<TaskThunk> {
        if self.cur == NIL {
            return None;
        }
        let idx = self.cur;
        let TaskPool { slots, free } = &mut *self.pool;

        let next = slots[idx as usize].next;
        if self.prev == NIL {
            self.chain.head = next;
        } else {
            slots[self.prev as usize].next = next;
        }
        if self.chain.tail == idx {
            self.chain.tail = self.prev;
        }
        self.chain.len -= 1;
        slots[idx as usize].next = NIL;

        let thunk = slots[idx as usize].thunk.take();
        slots[idx as usize].reset();
        chain_push_front(slots, free, idx);

        self.cur = next;
        thunk
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{Priority, TaskInfo, CATEGORY_UNKNOWN};

    fn info() -> TaskInfo {
        TaskInfo::fresh(CATEGORY_UNKNOWN, Priority::CanWait)
    }

    fn noop() -> TaskThunk {
        Box::new(|| {})
    }

    #[test]
    fn test_new_pool_is_all_free() {
        let pool = TaskPool::new(8);
        assert_eq!(pool.capacity(), 8);
        assert_eq!(pool.free_len(), 8);
    }

    #[test]
    #[should_panic(expected = "pool capacity must be non-zero")]
    fn test_zero_capacity_is_rejected() {
        let _ = TaskPool::new(0);
    }

    #[test]
    fn test_alloc_release_accounting() {
        let mut pool = TaskPool::new(4);
        let mut chain = TaskChain::EMPTY;

        let a = pool.alloc(info(), 0, noop()).unwrap();
        let b = pool.alloc(info(), 0, noop()).unwrap();
        pool.push_back(&mut chain, a);
        pool.push_back(&mut chain, b);

        assert_eq!(pool.free_len(), 2);
        assert_eq!(chain.len(), 2);
        assert_eq!(pool.free_len() + chain.len(), pool.capacity());

        let popped = pool.pop_front(&mut chain).unwrap();
        assert_eq!(popped, a);
        pool.release(popped);
        assert_eq!(pool.free_len(), 3);
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn test_exhaustion_returns_none() {
        let mut pool = TaskPool::new(2);
        let mut chain = TaskChain::EMPTY;

        for _ in 0..2 {
            let idx = pool.alloc(info(), 0, noop()).unwrap();
            pool.push_back(&mut chain, idx);
        }
        assert!(pool.alloc(info(), 0, noop()).is_none());

        let idx = pool.pop_front(&mut chain).unwrap();
        pool.release(idx);
        assert!(pool.alloc(info(), 0, noop()).is_some());
    }

    #[test]
    fn test_fifo_order() {
        let mut pool = TaskPool::new(8);
        let mut chain = TaskChain::EMPTY;

        let mut submitted = Vec::new();
        for _ in 0..5 {
            let task = info();
            let idx = pool.alloc(task, 0, noop()).unwrap();
            pool.push_back(&mut chain, idx);
            submitted.push(task.id);
        }

        let mut popped = Vec::new();
        while let Some(idx) = pool.pop_front(&mut chain) {
            popped.push(pool.slot(idx).info().id);
            pool.release(idx);
        }
        assert_eq!(popped, submitted);
        assert!(chain.is_empty());
        assert_eq!(pool.free_len(), pool.capacity());
    }

    #[test]
    fn test_push_front_precedes() {
        let mut pool = TaskPool::new(4);
        let mut chain = TaskChain::EMPTY;

        let back = pool.alloc(info(), 0, noop()).unwrap();
        pool.push_back(&mut chain, back);
        let front = pool.alloc(info(), 0, noop()).unwrap();
        pool.push_front(&mut chain, front);

        assert_eq!(chain.front(), Some(front));
        assert_eq!(pool.pop_front(&mut chain), Some(front));
        assert_eq!(pool.pop_front(&mut chain), Some(back));
    }

    #[test]
    fn test_pop_clears_link() {
        let mut pool = TaskPool::new(4);
        let mut chain = TaskChain::EMPTY;

        let a = pool.alloc(info(), 0, noop()).unwrap();
        let b = pool.alloc(info(), 0, noop()).unwrap();
        pool.push_back(&mut chain, a);
        pool.push_back(&mut chain, b);

        let popped = pool.pop_front(&mut chain).unwrap();
        /* The detached record must be reusable on another chain at once. */
        let mut other = TaskChain::EMPTY;
        pool.push_back(&mut other, popped);
        assert_eq!(other.len(), 1);
    }

    #[test]
    fn test_cursor_removes_matching_records() {
        let mut pool = TaskPool::new(8);
        let mut chain = TaskChain::EMPTY;

        let keep_a = info();
        let target = info();
        let keep_b = info();
        for task in [keep_a, target, keep_b, target] {
            let idx = pool.alloc(task, 0, noop()).unwrap();
            pool.push_back(&mut chain, idx);
        }

        let mut cursor = pool.cursor(&mut chain);
        let mut removed = 0;
        loop {
            let matched = match cursor.current() {
                None => break,
                Some(slot) => slot.info().id == target.id,
            };
            if matched {
                assert!(cursor.remove().is_some());
                removed += 1;
            } else {
                cursor.advance();
            }
        }

        assert_eq!(removed, 2);
        assert_eq!(chain.len(), 2);
        assert_eq!(pool.free_len(), 6);

        let first = pool.pop_front(&mut chain).unwrap();
        assert_eq!(pool.slot(first).info().id, keep_a.id);
        pool.release(first);
        let second = pool.pop_front(&mut chain).unwrap();
        assert_eq!(pool.slot(second).info().id, keep_b.id);
        pool.release(second);
    }

    #[test]
    fn test_cursor_tail_removal_fixes_tail() {
        let mut pool = TaskPool::new(4);
        let mut chain = TaskChain::EMPTY;

        let first = info();
        let last = info();
        for task in [first, last] {
            let idx = pool.alloc(task, 0, noop()).unwrap();
            pool.push_back(&mut chain, idx);
        }

        let mut cursor = pool.cursor(&mut chain);
        loop {
            let matched = match cursor.current() {
                None => break,
                Some(slot) => slot.info().id == last.id,
            };
            if matched {
                cursor.remove();
            } else {
                cursor.advance();
            }
        }
        assert_eq!(chain.len(), 1);

        /* Tail must now point at the survivor: push_back goes after it. */
        let appended = pool.alloc(info(), 0, noop()).unwrap();
        pool.push_back(&mut chain, appended);
        assert_eq!(pool.pop_front(&mut chain).map(|i| pool.slot(i).info().id), Some(first.id));
    }

    #[test]
    fn test_cursor_removing_sole_record_empties_chain() {
        let mut pool = TaskPool::new(2);
        let mut chain = TaskChain::EMPTY;

        let idx = pool.alloc(info(), 0, noop()).unwrap();
        pool.push_back(&mut chain, idx);

        let mut cursor = pool.cursor(&mut chain);
        assert!(cursor.remove().is_some());
        assert!(cursor.current().is_none());

        assert!(chain.is_empty());
        assert_eq!(chain.front(), None);
        assert_eq!(pool.free_len(), pool.capacity());
    }

    #[test]
    fn test_cursor_remove_past_end_is_none() {
        let mut pool = TaskPool::new(2);
        let mut chain = TaskChain::EMPTY;
        let mut cursor = pool.cursor(&mut chain);
        assert!(cursor.remove().is_none());
    }
}
