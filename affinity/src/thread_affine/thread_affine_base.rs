// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Blocking and fire-and-forget marshaling onto a loop. See [`dispatch_and_wait()`] and
//! [`ThreadAffineBase`].

use crate::{DEBUG_AFFINITY_AFFINE, EventLoopError, EventLoopHandle, LoopContext,
            panic_message};
use std::{panic::{AssertUnwindSafe, catch_unwind},
          sync::mpsc};

/// Blocking marshal: runs `work` on the loop behind `handle` and blocks the calling
/// thread until it returns.
///
/// Items dispatched from one thread run in the order that thread dispatched them. No
/// order is promised between different dispatching threads beyond the loop running one
/// item at a time.
///
/// There is no timeout. If `work` never returns, neither does this call.
///
/// # Errors
///
/// - [`EventLoopError::WorkPanicked`] if `work` panicked on the loop. The panic is caught
///   there, so the loop keeps running.
/// - [`EventLoopError::LoopShutDown`] if the loop shut down before running `work`.
/// - [`EventLoopError::LoopClosed`] if the loop no longer accepts work.
/// - [`EventLoopError::ReentrantDispatch`] if called from the loop's own thread, which
///   would otherwise wait on itself forever.
///
/// If `work` returns a [`Result`], it is handed back as the `Ok` value unchanged, so the
/// caller sees the original error.
pub fn dispatch_and_wait<T, W>(handle: &EventLoopHandle, work: W) -> Result<T, EventLoopError>
where
    T: Send + 'static,
    W: FnOnce(&mut LoopContext) -> T + Send + 'static,
{
    if handle.is_loop_thread() {
        return Err(EventLoopError::ReentrantDispatch {
            name: handle.name().to_string(),
        });
    }

    // Capacity 1: the loop never blocks handing back the single result.
    let (sender, receiver) = mpsc::sync_channel::<Result<T, String>>(1);

    handle.post(move |context| {
        let outcome = catch_unwind(AssertUnwindSafe(|| work(context)))
            .map_err(|payload| panic_message(payload.as_ref()));
        // The receiver only goes away if the caller's thread died.
        drop(sender.send(outcome));
    })?;

    match receiver.recv() {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(message)) => {
            DEBUG_AFFINITY_AFFINE.then(|| {
                tracing::debug!(
                    message = "Dispatched work panicked",
                    loop_name = %handle.name(),
                    panic = %message,
                );
            });
            Err(EventLoopError::WorkPanicked {
                name: handle.name().to_string(),
                message,
            })
        }
        // The item was dropped without running: discarded at shutdown.
        Err(_) => Err(EventLoopError::LoopShutDown {
            name: handle.name().to_string(),
        }),
    }
}

/// Binds a loop handle for types whose state lives on that loop.
///
/// Thread-affine wrappers like [`ThreadAffineProxy`] compose this to get both marshaling
/// flavors without repeating the handle plumbing.
///
/// [`ThreadAffineProxy`]: super::ThreadAffineProxy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadAffineBase {
    handle: EventLoopHandle,
}

impl ThreadAffineBase {
    #[must_use]
    pub fn new(handle: EventLoopHandle) -> Self { Self { handle } }

    #[must_use]
    pub fn handle(&self) -> &EventLoopHandle { &self.handle }

    /// See [`dispatch_and_wait()`].
    ///
    /// # Errors
    ///
    /// Same as [`dispatch_and_wait()`].
    pub fn dispatch_and_wait<T, W>(&self, work: W) -> Result<T, EventLoopError>
    where
        T: Send + 'static,
        W: FnOnce(&mut LoopContext) -> T + Send + 'static,
    {
        dispatch_and_wait(&self.handle, work)
    }

    /// Fire-and-forget marshal. See [`EventLoopHandle::post()`].
    ///
    /// # Errors
    ///
    /// Returns [`EventLoopError::LoopClosed`] if the loop no longer accepts work.
    pub fn post(
        &self,
        work: impl FnOnce(&mut LoopContext) + Send + 'static,
    ) -> Result<(), EventLoopError> {
        self.handle.post(work)
    }
}
