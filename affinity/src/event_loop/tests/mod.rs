// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Tests that drive real loop threads.
//!
//! - [`lifecycle_tests`]: start, stop, join, dispose, readiness, misuse errors.
//! - [`pump_tests`]: priorities, discarding at shutdown, unobserved failures.
//! - [`stress_tests`]: start/stop cycles repeated back-to-back.

mod stress_tests;

use crate::{EventLoopError, EventLoopHandle, EventLoopThread, ThreadState};
use std::{sync::mpsc, thread, time::Duration};

/// Upper bound for anything that should finish "right away".
pub(super) const TIMEOUT: Duration = Duration::from_secs(5);

pub(super) fn started(event_loop: &mut EventLoopThread) -> EventLoopHandle {
    event_loop.start().unwrap();
    event_loop.readiness().wait_timeout(TIMEOUT).unwrap().unwrap()
}

/// Runs `stop()` on a helper thread so that a hang fails the test instead of blocking
/// the whole run. Returns the state observed right after `stop()` returned.
pub(super) fn stop_within_timeout(
    mut event_loop: EventLoopThread,
) -> Result<ThreadState, EventLoopError> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let result = event_loop.stop().map(|()| event_loop.thread_state());
        tx.send(result).unwrap();
    });
    rx.recv_timeout(TIMEOUT).unwrap()
}

/// Blocks the pump inside a work item until the returned sender is used (or dropped).
pub(super) fn park_pump(handle: &EventLoopHandle) -> mpsc::Sender<()> {
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let (parked_tx, parked_rx) = mpsc::channel::<()>();
    handle
        .post(move |_| {
            parked_tx.send(()).unwrap();
            // Err means the test dropped the sender, which releases too.
            drop(release_rx.recv());
        })
        .unwrap();
    parked_rx.recv_timeout(TIMEOUT).unwrap();
    release_tx
}
