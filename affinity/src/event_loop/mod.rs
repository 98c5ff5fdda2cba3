// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Dedicated event loop threads and the queue that feeds them.
//!
//! # The Pattern
//!
//! An [`EventLoopThread`] owns one OS thread that runs a serial pump. Other threads never
//! touch the loop's state; they hand it closures ([`WorkItem`]s) through an
//! [`EventLoopHandle`], and the pump runs those closures one at a time on its own thread:
//!
//! ```text
//!  any thread                          loop thread
//! ┌──────────────┐   post(job)      ┌──────────────────────────────┐
//! │ handle.post  │ ───────────────► │ WorkQueue (Immediate, Normal)│
//! └──────────────┘                  │        │ wait_pop()          │
//! ┌──────────────┐ dispatch_and_wait│        ▼                     │
//! │ blocked on   │ ───────────────► │ job(&mut LoopContext)        │
//! │ result       │ ◄─────────────── │        │                     │
//! └──────────────┘     result       │ LoopContext owns the objects │
//!                                   └──────────────────────────────┘
//! ```
//!
//! The [`LoopContext`] lives on the loop thread's stack and is passed by `&mut` to each
//! job, so objects stored there are touched by exactly one thread. The one-at-a-time
//! pump is the mutual exclusion; no other lock guards those objects.
//!
//! # Startup
//!
//! 1. [`EventLoopThread::start()`] spawns the thread.
//! 2. The thread runs the optional pre-start action, builds its work queue,
//!    [`EventLoopHandle`] and [`LoopContext`].
//! 3. It resolves the [`ReadinessFuture`] with the handle (or with an [`InitFailure`]),
//!    then enters the pump.
//!
//! # Shutdown
//!
//! The shutdown request is a [`WorkItem`] with [`Priority::Immediate`], so it is
//! dequeued ahead of any pending [`Priority::Normal`] items. When the pump sees it, it
//! exits, closes the queue, and drops whatever was still pending. Dropping a pending
//! item drops its result carrier, so blocking callers get
//! [`EventLoopError::LoopShutDown`] and scheduler futures complete cancelled, instead of
//! hanging forever.

/// Enable chatty debug logs for loop startup, shutdown, and rejected posts.
pub const DEBUG_AFFINITY_LOOP: bool = false;

// Attach sources.
pub mod event_loop_handle;
pub mod event_loop_thread;
pub mod loop_context;
pub mod loop_types;
pub mod readiness;
pub mod thread_state;
pub mod work_item;
mod work_queue;

// Re-export.
pub use event_loop_handle::*;
pub use event_loop_thread::*;
pub use loop_context::*;
pub use loop_types::*;
pub use readiness::*;
pub use thread_state::*;
pub use work_item::*;
pub(crate) use work_queue::*;

#[cfg(test)]
mod tests;
