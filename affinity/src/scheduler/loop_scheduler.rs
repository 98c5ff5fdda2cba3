// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! A generic task scheduler backed by an event loop. See [`LoopScheduler`] and
//! [`TaskHandle`].

use crate::{EventLoopError, EventLoopHandle, panic_message};
use std::{future::Future,
          panic::{AssertUnwindSafe, catch_unwind},
          pin::Pin,
          task::{Context, Poll},
          thread::ThreadId};
use tokio::sync::oneshot;

/// Errors observed through a [`TaskHandle`] or a [`SchedulerFuture`].
///
/// [`SchedulerFuture`]: super::SchedulerFuture
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, miette::Diagnostic)]
pub enum SchedulerError {
    /// The work item was discarded (the loop shut down or was already closed) before it
    /// ran.
    #[error("The event loop shut down before the task ran")]
    #[diagnostic(code(affinity_groups::scheduler::cancelled))]
    Cancelled,

    #[error("Task panicked on the event loop: {message}")]
    #[diagnostic(code(affinity_groups::scheduler::task_panicked))]
    TaskPanicked { message: String },
}

/// The scheduler representing one event loop's execution context.
///
/// Other code that only knows how to "run this task somewhere" can target a loop through
/// this type without knowing anything about [`LoopContext`] or [`WorkItem`]s. Every task
/// submitted here runs on the loop's own thread, serialized with all other work items.
///
/// Get one from [`to_task_scheduler()`] (from any thread) or from
/// [`LoopContext::scheduler()`] (inside a work item).
///
/// [`LoopContext::scheduler()`]: crate::LoopContext::scheduler
/// [`LoopContext`]: crate::LoopContext
/// [`WorkItem`]: crate::WorkItem
/// [`to_task_scheduler()`]: super::to_task_scheduler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopScheduler {
    handle: EventLoopHandle,
}

impl LoopScheduler {
    pub(crate) fn new(handle: EventLoopHandle) -> Self { Self { handle } }

    #[must_use]
    pub fn handle(&self) -> &EventLoopHandle { &self.handle }

    /// The thread every task submitted to this scheduler runs on.
    #[must_use]
    pub fn thread_id(&self) -> ThreadId { self.handle.thread_id() }

    /// Runs `task` on the loop without a way to observe its outcome.
    ///
    /// # Errors
    ///
    /// Returns [`EventLoopError::LoopClosed`] if the loop no longer accepts work.
    pub fn execute(&self, task: impl FnOnce() + Send + 'static) -> Result<(), EventLoopError> {
        self.handle.post(move |_| task())
    }

    /// Runs `task` on the loop and returns a handle to await its result.
    ///
    /// The returned [`TaskHandle`] yields [`SchedulerError::Cancelled`] if the task never
    /// runs, and [`SchedulerError::TaskPanicked`] if it panics. The task runs whether or
    /// not the handle is kept; use [`execute()`] when the result isn't needed.
    ///
    /// [`execute()`]: Self::execute
    #[must_use = "dropping the handle discards the task's result, use `execute()` instead"]
    pub fn spawn<T>(&self, task: impl FnOnce() -> T + Send + 'static) -> TaskHandle<T>
    where
        T: Send + 'static,
    {
        let (sender, receiver) = oneshot::channel();
        let posted = self.handle.post(move |_| {
            let outcome = catch_unwind(AssertUnwindSafe(task)).map_err(|payload| {
                SchedulerError::TaskPanicked {
                    message: panic_message(payload.as_ref()),
                }
            });
            // The caller may have dropped the TaskHandle.
            drop(sender.send(outcome));
        });
        if let Err(error) = posted {
            // The rejected closure (and its sender) is already dropped, so the handle
            // resolves to Cancelled.
            tracing::warn!(message = "Task not scheduled", error = %error);
        }
        TaskHandle { receiver }
    }
}

/// Awaitable result of [`LoopScheduler::spawn()`].
#[derive(Debug)]
#[must_use = "dropping the handle discards the task's result"]
pub struct TaskHandle<T> {
    receiver: oneshot::Receiver<Result<T, SchedulerError>>,
}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T, SchedulerError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().receiver)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(SchedulerError::Cancelled)))
    }
}
