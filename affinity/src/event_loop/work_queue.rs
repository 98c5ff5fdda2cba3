// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Thread-safe two-lane queue feeding the pump. See [`WorkQueue`].

use super::{Priority, WorkItem};
use std::{collections::VecDeque,
          sync::{Condvar, Mutex, MutexGuard, PoisonError}};

/// Multi-producer, single-consumer queue of [`WorkItem`]s.
///
/// Any thread may [`push()`]; only the pump calls [`wait_pop()`] and
/// [`close_and_drain()`]. Each lane is FIFO, so items from one posting thread are
/// dequeued in submission order within their priority.
///
/// No user code ever runs while the lock is held, so a poisoned mutex can only come from
/// a panic inside this file. The guard is recovered with [`PoisonError::into_inner()`]
/// rather than propagated.
///
/// [`close_and_drain()`]: Self::close_and_drain
/// [`push()`]: Self::push
/// [`wait_pop()`]: Self::wait_pop
#[derive(Debug, Default)]
pub(crate) struct WorkQueue {
    state: Mutex<QueueState>,
    available: Condvar,
}

#[derive(Debug, Default)]
struct QueueState {
    immediate: VecDeque<WorkItem>,
    normal: VecDeque<WorkItem>,
    closed: bool,
}

impl WorkQueue {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueues `item`. Hands the item back if the queue is closed.
    pub fn push(&self, item: WorkItem) -> Result<(), WorkItem> {
        let mut state = self.lock();
        if state.closed {
            return Err(item);
        }
        match item.priority {
            Priority::Immediate => state.immediate.push_back(item),
            Priority::Normal => state.normal.push_back(item),
        }
        drop(state);
        self.available.notify_one();
        Ok(())
    }

    /// Blocks until an item is available, [`Priority::Immediate`] first. Returns [`None`]
    /// once the queue is closed.
    pub fn wait_pop(&self) -> Option<WorkItem> {
        let mut state = self.lock();
        loop {
            if state.closed {
                return None;
            }
            if let Some(item) = state.immediate.pop_front() {
                return Some(item);
            }
            if let Some(item) = state.normal.pop_front() {
                return Some(item);
            }
            state = self
                .available
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Rejects all future pushes and returns everything still pending.
    ///
    /// The caller drops the returned items outside of the lock, since dropping a closure
    /// runs arbitrary destructors (including result carriers that wake other threads).
    pub fn close_and_drain(&self) -> Vec<WorkItem> {
        let mut state = self.lock();
        state.closed = true;
        let mut pending: Vec<WorkItem> = state.immediate.drain(..).collect();
        pending.extend(state.normal.drain(..));
        drop(state);
        self.available.notify_all();
        pending
    }

    #[must_use]
    pub fn is_closed(&self) -> bool { self.lock().closed }

    #[must_use]
    pub fn len(&self) -> usize {
        let state = self.lock();
        state.immediate.len() + state.normal.len()
    }
}
