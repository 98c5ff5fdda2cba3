// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Objects confined to one event loop, and the ways other threads reach them.
//!
//! - [`dispatch_and_wait()`] is the blocking marshal every other piece is built on.
//! - [`ThreadAffineProxy`] wraps a [`ThreadAffine`] object with get, set, and a lazy
//!   replay stream of its property.
//! - [`ReplaySubject`] is the stream itself.

/// Enable debug logs for dispatch failures and proxy teardown.
pub const DEBUG_AFFINITY_AFFINE: bool = false;

// Attach sources.
pub mod replay_subject;
pub mod thread_affine_base;
pub mod thread_affine_proxy;

// Re-export.
pub use replay_subject::*;
pub use thread_affine_base::*;
pub use thread_affine_proxy::*;
