// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Adapts a running loop into a [`LoopScheduler`]. See [`to_task_scheduler()`].

use super::{LoopScheduler, SchedulerError};
use crate::{DEBUG_AFFINITY_LOOP, EventLoopHandle, Priority};
use std::{future::Future,
          pin::Pin,
          task::{Context, Poll}};
use tokio::sync::oneshot;

/// [`to_task_scheduler_with_priority()`] with [`Priority::Normal`].
pub fn to_task_scheduler(handle: &EventLoopHandle) -> SchedulerFuture {
    to_task_scheduler_with_priority(handle, Priority::Normal)
}

/// Posts a work item that captures the loop's own scheduler when it runs, and returns a
/// future of that scheduler.
///
/// The call never blocks. The future completes with [`SchedulerError::Cancelled`] if the
/// work item is discarded (the loop shuts down first) or rejected (the loop is already
/// closed), rather than hanging.
///
/// Called on the loop thread itself, the future is resolved right away with the loop's
/// scheduler. A posted request could only run after the current item, so waiting on it
/// there would never return.
pub fn to_task_scheduler_with_priority(
    handle: &EventLoopHandle,
    priority: Priority,
) -> SchedulerFuture {
    let (sender, receiver) = oneshot::channel();

    if handle.is_loop_thread() {
        drop(sender.send(LoopScheduler::new(handle.clone())));
        return SchedulerFuture { receiver };
    }

    let posted = handle.post_with_priority(priority, move |context| {
        drop(sender.send(context.scheduler()));
    });

    if let Err(error) = posted {
        DEBUG_AFFINITY_LOOP.then(|| {
            tracing::debug!(
                message = "Scheduler request rejected, future completes cancelled",
                error = %error,
            );
        });
    }

    SchedulerFuture { receiver }
}

/// Future returned by [`to_task_scheduler()`].
#[derive(Debug)]
#[must_use = "dropping the future discards the scheduler it resolves to"]
pub struct SchedulerFuture {
    receiver: oneshot::Receiver<LoopScheduler>,
}

impl SchedulerFuture {
    /// Blocks the calling thread until the scheduler is available.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Cancelled`] if the request never ran.
    ///
    /// Futures created on the loop thread are already resolved. A future created on
    /// another thread and then waited on from inside one of the loop's own work items
    /// blocks forever, since the request queued behind that item.
    ///
    /// # Panics
    ///
    /// Panics if called from inside an async execution context (a tokio runtime
    /// thread). `.await` the future there instead.
    pub fn wait(self) -> Result<LoopScheduler, SchedulerError> {
        self.receiver
            .blocking_recv()
            .map_err(|_| SchedulerError::Cancelled)
    }
}

impl Future for SchedulerFuture {
    type Output = Result<LoopScheduler, SchedulerError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().receiver)
            .poll(cx)
            .map(|received| received.map_err(|_| SchedulerError::Cancelled))
    }
}
