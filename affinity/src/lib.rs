// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! # affinity_groups
//!
//! Keep an object on one dedicated thread, and still use it safely from every other
//! thread.
//!
//! Some state must only ever be touched by one thread: UI toolkits, single-threaded
//! runtimes, handles that are `!Send`, or simply state you'd rather never lock. This
//! crate gives such state a home, an [`EventLoopThread`], and a small set of ways for
//! other threads to reach it:
//!
//! | You want to...                              | Use                                |
//! | ------------------------------------------- | ---------------------------------- |
//! | run a closure on the loop and get a result  | [`dispatch_and_wait()`]            |
//! | run a closure on the loop and move on       | [`EventLoopHandle::post()`]        |
//! | wrap an object as a typed get/set property  | [`ThreadAffineProxy`]              |
//! | observe that property's values              | [`ThreadAffineProxy::stream()`]    |
//! | hand the loop to code that wants a scheduler| [`to_task_scheduler()`]            |
//!
//! # Example
//!
//! ```
//! use affinity_groups::{EventLoopThread, ThreadAffine, ThreadAffineProxy};
//! use std::{cell::Cell, rc::Rc};
//!
//! // Not Send: it can only live on one thread.
//! struct Counter(Rc<Cell<u32>>);
//!
//! impl ThreadAffine for Counter {
//!     type Value = u32;
//!     fn get(&self) -> u32 { self.0.get() }
//!     fn set(&mut self, value: u32) { self.0.set(value) }
//! }
//!
//! let mut event_loop = EventLoopThread::new();
//! event_loop.start()?;
//! let handle = event_loop.readiness().wait()?;
//!
//! let counter = ThreadAffineProxy::new(&handle, || Counter(Rc::new(Cell::new(0))))?;
//! counter.set(1)?;
//! assert_eq!(counter.get()?, 1);
//!
//! let mut values = counter.stream()?;
//! counter.set(2)?;
//! assert_eq!(values.blocking_recv(), Some(1));
//! assert_eq!(values.blocking_recv(), Some(2));
//!
//! event_loop.stop()?;
//! # Ok::<(), miette::Report>(())
//! ```
//!
//! # Logging
//!
//! Everything logs through [`tracing`]. See [`mod@log`] to install a subscriber.

// Enforce strict error handling in production library code only. Tests and doc tests
// are allowed to use .unwrap() (workspace `Cargo.toml` config allows it).
#![cfg_attr(not(test), deny(clippy::unwrap_in_result))]

// Attach modules.
pub mod event_loop;
pub mod log;
pub mod scheduler;
pub mod thread_affine;

// Re-export.
pub use event_loop::*;
pub use log::*;
pub use scheduler::*;
pub use thread_affine::*;
