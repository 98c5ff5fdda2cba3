// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Scheduler adapter: turn a running event loop into a generic task scheduler.

// Attach sources.
pub mod loop_scheduler;
pub mod to_task_scheduler;

// Re-export.
pub use loop_scheduler::*;
pub use to_task_scheduler::*;
