// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! The capability to post work to a running event loop. See [`EventLoopHandle`].

use super::{EventLoopError, LoopContext, Priority, UnobservedFailure, UnobservedFailureSink,
            WorkItem, WorkQueue};
use crate::DEBUG_AFFINITY_LOOP;
use std::{fmt::{Debug, Formatter},
          sync::{Arc,
                 atomic::{AtomicUsize, Ordering}},
          thread::ThreadId};

/// The value delivered by a [`ReadinessFuture`], and the only capability needed to post
/// work to that loop.
///
/// A handle is immutable and cheap to [`Clone`] (it is an [`Arc`]). Every operation that
/// puts work onto a loop takes a handle explicitly; there is no per-thread "current
/// loop" lookup.
///
/// Two handles compare equal when they refer to the same loop.
///
/// [`ReadinessFuture`]: super::ReadinessFuture
#[derive(Clone)]
pub struct EventLoopHandle {
    inner: Arc<HandleInner>,
}

struct HandleInner {
    name: String,
    thread_id: ThreadId,
    queue: Arc<WorkQueue>,
    unobserved_failure_count: AtomicUsize,
    unobserved_failure_sink: Option<UnobservedFailureSink>,
}

impl EventLoopHandle {
    /// Called on the loop thread itself, so `thread_id` is the loop's.
    pub(crate) fn new(
        name: String,
        thread_id: ThreadId,
        queue: Arc<WorkQueue>,
        unobserved_failure_sink: Option<UnobservedFailureSink>,
    ) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                name,
                thread_id,
                queue,
                unobserved_failure_count: AtomicUsize::new(0),
                unobserved_failure_sink,
            }),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str { &self.inner.name }

    /// The id of the OS thread that runs this loop's pump.
    #[must_use]
    pub fn thread_id(&self) -> ThreadId { self.inner.thread_id }

    /// Whether the caller is running on this loop's thread.
    #[must_use]
    pub fn is_loop_thread(&self) -> bool { std::thread::current().id() == self.inner.thread_id }

    /// Whether the loop has stopped accepting work.
    #[must_use]
    pub fn is_closed(&self) -> bool { self.inner.queue.is_closed() }

    /// Number of work items waiting to run.
    #[must_use]
    pub fn pending_count(&self) -> usize { self.inner.queue.len() }

    /// Number of fire-and-forget work items that panicked on this loop so far.
    #[must_use]
    pub fn unobserved_failure_count(&self) -> usize {
        self.inner.unobserved_failure_count.load(Ordering::SeqCst)
    }

    /// Fire-and-forget marshal with [`Priority::Normal`].
    ///
    /// Returns as soon as the item is queued. The poster never observes the outcome; a
    /// panic inside `job` is reported as an [`UnobservedFailure`] instead.
    ///
    /// # Errors
    ///
    /// Returns [`EventLoopError::LoopClosed`] if the loop no longer accepts work.
    pub fn post(
        &self,
        job: impl FnOnce(&mut LoopContext) + Send + 'static,
    ) -> Result<(), EventLoopError> {
        self.post_with_priority(Priority::Normal, job)
    }

    /// Fire-and-forget marshal with an explicit [`Priority`].
    ///
    /// # Errors
    ///
    /// Returns [`EventLoopError::LoopClosed`] if the loop no longer accepts work.
    pub fn post_with_priority(
        &self,
        priority: Priority,
        job: impl FnOnce(&mut LoopContext) + Send + 'static,
    ) -> Result<(), EventLoopError> {
        self.post_item(WorkItem::new(priority, job))
    }

    /// Queues an already built [`WorkItem`].
    ///
    /// # Errors
    ///
    /// Returns [`EventLoopError::LoopClosed`] if the loop no longer accepts work. The
    /// rejected item is dropped.
    pub fn post_item(&self, item: WorkItem) -> Result<(), EventLoopError> {
        self.inner.queue.push(item).map_err(|rejected| {
            DEBUG_AFFINITY_LOOP.then(|| {
                // % is Display, ? is Debug.
                tracing::debug!(
                    message = "🚫 Rejected work item, loop is closed",
                    loop_name = %self.inner.name,
                    item = ?rejected,
                );
            });
            EventLoopError::LoopClosed {
                name: self.inner.name.clone(),
            }
        })
    }

    /// Queues the [`Priority::Immediate`] shutdown request. Returns `false` if the loop
    /// was already closed.
    pub(crate) fn request_shutdown(&self) -> bool {
        self.inner.queue.push(WorkItem::shutdown()).is_ok()
    }

    pub(crate) fn queue(&self) -> &WorkQueue { &self.inner.queue }

    /// Reports a panic from a fire-and-forget item. Runs on the loop thread.
    pub(crate) fn report_unobserved_failure(&self, message: String) {
        self.inner
            .unobserved_failure_count
            .fetch_add(1, Ordering::SeqCst);

        tracing::error!(
            message = "💥 Fire-and-forget work item panicked",
            loop_name = %self.inner.name,
            panic = %message,
        );

        if let Some(sink) = self.inner.unobserved_failure_sink.as_ref() {
            sink(UnobservedFailure {
                loop_name: self.inner.name.clone(),
                message,
            });
        }
    }
}

impl PartialEq for EventLoopHandle {
    fn eq(&self, other: &Self) -> bool { Arc::ptr_eq(&self.inner, &other.inner) }
}

impl Eq for EventLoopHandle {}

impl Debug for EventLoopHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLoopHandle")
            .field("name", &self.inner.name)
            .field("thread_id", &self.inner.thread_id)
            .field("pending", &self.pending_count())
            .field("closed", &self.is_closed())
            .finish()
    }
}
