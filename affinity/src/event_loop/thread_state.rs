// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Lifecycle state of an event loop thread. See [`ThreadState`] and [`ShutdownFlag`].

use super::WorkQueue;
use crate::DEBUG_AFFINITY_LOOP;
use std::sync::{Arc,
                atomic::{AtomicBool, Ordering}};

/// The OS thread state of an [`EventLoopThread`], as seen from the thread that owns it.
///
/// ```text
/// Unstarted ──start()──► Running ──stop_async()──► ShuttingDown ──join()──► Stopped
///                           │                                                  ▲
///                           └──────────────stop()──────────────────────────────┘
/// ```
///
/// [`EventLoopThread`]: super::EventLoopThread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    Unstarted,
    Running,
    /// Shutdown was requested or the pump has exited, but the OS thread may still be
    /// alive.
    ShuttingDown,
    /// The OS thread has exited.
    Stopped,
}

/// Set once shutdown is requested by the owner or the pump has exited.
///
/// [`AtomicBool`] is lock-free, so the owner can query it while the loop thread is
/// flipping it, with no lock ordering to worry about.
#[derive(Debug, Default)]
pub struct ShutdownFlag {
    is_shutting_down: AtomicBool,
}

impl ShutdownFlag {
    pub fn mark(&self) { self.is_shutting_down.store(true, Ordering::SeqCst); }

    #[must_use]
    pub fn is_set(&self) -> bool { self.is_shutting_down.load(Ordering::SeqCst) }
}

/// [RAII] guard held by the loop thread while the pump runs.
///
/// On drop (normal exit or unwinding) it closes the queue, so no poster can block on a
/// loop that will never run its item, and it drops every pending item, which releases
/// their result carriers.
///
/// [RAII]: https://en.wikipedia.org/wiki/Resource_acquisition_is_initialization
#[allow(missing_debug_implementations)]
pub(crate) struct PumpExitGuard {
    pub loop_name: String,
    pub queue: Arc<WorkQueue>,
    pub shutdown_flag: Arc<ShutdownFlag>,
}

impl Drop for PumpExitGuard {
    fn drop(&mut self) {
        self.shutdown_flag.mark();
        let discarded = self.queue.close_and_drain();
        let discarded_count = discarded.len();
        drop(discarded);

        DEBUG_AFFINITY_LOOP.then(|| {
            tracing::debug!(
                message = "🛑 Pump exited",
                loop_name = %self.loop_name,
                discarded_count,
            );
        });
    }
}
