// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Public error and report types for the event loop. See [`EventLoopError`],
//! [`InitFailure`], and [`UnobservedFailure`].

use std::{any::Any, sync::Arc};

/// Errors from [`EventLoopThread`] lifecycle calls and from posting work to a loop.
///
/// Lifecycle misuse fails fast with a dedicated variant, so that calling things out of
/// order never deadlocks and never silently no-ops:
///
/// | Variant               | Cause                                                        |
/// | :-------------------- | :----------------------------------------------------------- |
/// | [`NotStarted`]        | `stop()`, `stop_async()` or `join()` before `start()`         |
/// | [`AlreadyStarted`]    | `start()` called a second time                               |
/// | [`SelfJoin`]          | `stop()` or `join()` called on the loop's own thread         |
/// | [`ReentrantDispatch`] | Blocking marshal called on the loop's own thread             |
///
/// [`AlreadyStarted`]: Self::AlreadyStarted
/// [`EventLoopThread`]: super::EventLoopThread
/// [`NotStarted`]: Self::NotStarted
/// [`ReentrantDispatch`]: Self::ReentrantDispatch
/// [`SelfJoin`]: Self::SelfJoin
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum EventLoopError {
    #[error("Event loop thread '{name}' was never started")]
    #[diagnostic(
        code(affinity_groups::event_loop::not_started),
        help("Call `start()` before `stop()`, `stop_async()` or `join()`.")
    )]
    NotStarted { name: String },

    #[error("Event loop thread '{name}' was already started")]
    #[diagnostic(
        code(affinity_groups::event_loop::already_started),
        help("An `EventLoopThread` can only be started once. Create a new one instead.")
    )]
    AlreadyStarted { name: String },

    #[error("Event loop thread '{name}' can't be stopped or joined from its own thread")]
    #[diagnostic(
        code(affinity_groups::event_loop::self_join),
        help("Use `stop_async()` from inside the loop, and join from another thread.")
    )]
    SelfJoin { name: String },

    /// [`std::thread::Builder::spawn()`] failed.
    #[error("Failed to spawn event loop thread")]
    #[diagnostic(
        code(affinity_groups::event_loop::thread_spawn),
        help("The system may have reached its thread limit - check `ulimit -u`.")
    )]
    ThreadSpawn(#[source] std::io::Error),

    #[error(transparent)]
    #[diagnostic(transparent)]
    InitFailed(#[from] InitFailure),

    /// The loop no longer accepts work items.
    #[error("Event loop '{name}' is closed and no longer accepts work")]
    #[diagnostic(code(affinity_groups::event_loop::loop_closed))]
    LoopClosed { name: String },

    /// The work item was accepted but discarded by shutdown before it ran.
    #[error("Event loop '{name}' shut down before the work item ran")]
    #[diagnostic(code(affinity_groups::event_loop::loop_shut_down))]
    LoopShutDown { name: String },

    #[error("Blocking dispatch onto event loop '{name}' from its own thread")]
    #[diagnostic(
        code(affinity_groups::event_loop::reentrant_dispatch),
        help(
            "The loop runs one work item at a time, so waiting on itself would \
             deadlock. Access the `LoopContext` directly inside the work item."
        )
    )]
    ReentrantDispatch { name: String },

    /// A blocking-marshaled work item panicked on the loop thread.
    #[error("Work item panicked on event loop '{name}': {message}")]
    #[diagnostic(code(affinity_groups::event_loop::work_panicked))]
    WorkPanicked { name: String, message: String },

    /// A loop-owned object was looked up after it was removed.
    #[error("Loop-owned object #{id} is missing from event loop '{name}'")]
    #[diagnostic(code(affinity_groups::event_loop::object_missing))]
    ObjectMissing { name: String, id: u64 },

    #[error("Event loop thread '{name}' panicked outside of a work item")]
    #[diagnostic(code(affinity_groups::event_loop::thread_panicked))]
    ThreadPanicked { name: String },
}

/// Why an event loop failed to become ready.
///
/// This is the failure side of the [`ReadinessFuture`]. It is [`Clone`] so that every
/// holder of the readiness future observes the same outcome.
///
/// [`ReadinessFuture`]: super::ReadinessFuture
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, miette::Diagnostic)]
#[error("Event loop '{name}' failed to initialize: {reason}")]
#[diagnostic(
    code(affinity_groups::event_loop::init_failed),
    help("The pre-start action returned an error or panicked. The thread has exited.")
)]
pub struct InitFailure {
    pub name: String,
    pub reason: String,
}

/// A failure inside a fire-and-forget work item, which no poster is waiting on.
///
/// The pump catches the panic, logs it, bumps the handle's counter and hands this report
/// to the sink configured via [`EventLoopThreadBuilder::on_unobserved_failure()`].
///
/// [`EventLoopThreadBuilder::on_unobserved_failure()`]:
///     super::EventLoopThreadBuilder::on_unobserved_failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnobservedFailure {
    pub loop_name: String,
    pub message: String,
}

/// Callback that receives [`UnobservedFailure`] reports on the loop thread.
pub type UnobservedFailureSink = Arc<dyn Fn(UnobservedFailure) + Send + Sync + 'static>;

/// Extracts a readable message from a panic payload.
#[must_use]
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(it) = payload.downcast_ref::<&'static str>() {
        (*it).to_string()
    } else if let Some(it) = payload.downcast_ref::<String>() {
        it.clone()
    } else {
        "Box<dyn Any>".to_string()
    }
}
