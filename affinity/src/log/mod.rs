// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Tracing setup for programs and tests that use event loops.
//!
//! Every loop logs through [`tracing`]; nothing is printed unless a subscriber is
//! installed. Loop threads are spawned by this crate, so a thread-local subscriber
//! installed by the caller won't see their events. Use
//! [`TracingConfig::install_global()`] to capture them.

// Attach sources.
pub mod rolling_file_appender_impl;
pub mod tracing_config;
pub mod tracing_init;

// Re-export.
pub use tracing_config::*;
pub use tracing_init::*;
