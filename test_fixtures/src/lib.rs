// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Test fixtures for the `affinity_groups` crate.
//!
//! - [`OfferConcurrencyStressTest`] and [`stress_test()`] repeat a setup, action,
//!   teardown cycle back-to-back to shake out start/stop races.
//! - [`try_create_temp_dir()`] gives each test its own scratch folder, removed on drop.

// Attach sources.
pub mod concurrency_stress;
pub mod temp_dir;

// Re-export.
pub use concurrency_stress::*;
pub use temp_dir::*;
