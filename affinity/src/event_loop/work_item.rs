// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Units of work posted to an event loop. See [`WorkItem`] and [`Priority`].

use super::LoopContext;
use std::fmt::{Debug, Formatter, Result};

/// A closure that runs on the loop thread with exclusive access to the loop's
/// [`LoopContext`].
pub type Job = Box<dyn FnOnce(&mut LoopContext) + Send + 'static>;

/// Dequeue priority of a [`WorkItem`].
///
/// The pump always drains [`Immediate`] items before [`Normal`] ones. [`Immediate`] is
/// what shutdown requests use, so that a stop request preempts any backlog of normal
/// work that is still pending.
///
/// [`Immediate`]: Self::Immediate
/// [`Normal`]: Self::Normal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Priority {
    #[default]
    Normal,
    Immediate,
}

/// What the pump does with a [`WorkItem`] once it is dequeued.
pub(crate) enum WorkKind {
    /// Run the closure. Any result carrier is captured inside it.
    Run(Job),
    /// Exit the pump.
    Shutdown,
}

/// A closure plus its [`Priority`] tag.
///
/// Result carriers (for blocking marshal or the scheduler adapter) are captured by the
/// closure itself. If the item is discarded without running, dropping the closure drops
/// the carrier, which is how waiters learn that their item will never run.
pub struct WorkItem {
    pub priority: Priority,
    pub(crate) kind: WorkKind,
}

impl WorkItem {
    /// Wraps `job` with the given `priority`.
    pub fn new(priority: Priority, job: impl FnOnce(&mut LoopContext) + Send + 'static) -> Self {
        Self {
            priority,
            kind: WorkKind::Run(Box::new(job)),
        }
    }

    /// The request that makes the pump exit. Always [`Priority::Immediate`].
    pub(crate) fn shutdown() -> Self {
        Self {
            priority: Priority::Immediate,
            kind: WorkKind::Shutdown,
        }
    }

    #[must_use]
    pub fn is_shutdown(&self) -> bool { matches!(self.kind, WorkKind::Shutdown) }
}

impl Debug for WorkItem {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        f.debug_struct("WorkItem")
            .field("priority", &self.priority)
            .field("is_shutdown", &self.is_shutdown())
            .finish()
    }
}
