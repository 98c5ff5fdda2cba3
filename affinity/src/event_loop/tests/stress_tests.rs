// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Start/stop cycles repeated [`DEFAULT_STRESS_REPETITIONS`] times, back-to-back, both
//! after readiness and racing it.

use super::{TIMEOUT, started};
use crate::{EventLoopThread, ThreadAffine, ThreadAffineProxy, ThreadState};
use affinity_test_fixtures::{DEFAULT_STRESS_REPETITIONS, OfferConcurrencyStressTest,
                             stress_test};
use pretty_assertions::assert_eq;

/// Holds one loop per repetition.
#[derive(Debug, Default)]
struct LoopFixture {
    event_loop: Option<EventLoopThread>,
}

impl LoopFixture {
    fn event_loop(&mut self) -> &mut EventLoopThread {
        self.event_loop.get_or_insert_with(EventLoopThread::new)
    }
}

impl OfferConcurrencyStressTest for LoopFixture {
    fn setup(&mut self) { self.event_loop = Some(EventLoopThread::new()); }

    fn teardown(&mut self) {
        if let Some(mut event_loop) = self.event_loop.take() {
            event_loop.dispose().unwrap();
        }
    }
}

fn start_then_running(fixture: &mut LoopFixture) {
    let event_loop = fixture.event_loop();
    let readiness = event_loop.readiness();
    event_loop.start().unwrap();

    assert!(readiness.wait_timeout(TIMEOUT).unwrap().is_ok());
    assert_eq!(event_loop.thread_state(), ThreadState::Running);
}

fn start_stop_then_stopped(fixture: &mut LoopFixture) {
    let event_loop = fixture.event_loop();
    started(event_loop);

    event_loop.stop().unwrap();

    assert_eq!(event_loop.thread_state(), ThreadState::Stopped);
}

fn start_stop_without_waiting_then_stopped(fixture: &mut LoopFixture) {
    let event_loop = fixture.event_loop();
    event_loop.start().unwrap();

    event_loop.stop().unwrap();

    assert_eq!(event_loop.thread_state(), ThreadState::Stopped);
    assert!(event_loop.readiness().wait().unwrap().is_closed());
}

fn start_stop_async_join_then_stopped(fixture: &mut LoopFixture) {
    let event_loop = fixture.event_loop();
    event_loop.start().unwrap();

    event_loop.stop_async().unwrap();
    event_loop.join().unwrap();

    assert_eq!(event_loop.thread_state(), ThreadState::Stopped);
}

#[test]
fn test_start_then_running() { start_then_running(&mut LoopFixture::default()); }

#[test]
fn test_stress_start_then_running() {
    let report = LoopFixture::default().stress_test(start_then_running);
    assert_eq!(report.repetitions, DEFAULT_STRESS_REPETITIONS);
}

#[test]
fn test_start_stop_then_stopped() { start_stop_then_stopped(&mut LoopFixture::default()); }

#[test]
fn test_stress_start_stop_then_stopped() {
    let report = LoopFixture::default().stress_test(start_stop_then_stopped);
    assert_eq!(report.repetitions, DEFAULT_STRESS_REPETITIONS);
}

#[test]
fn test_start_stop_without_waiting_then_stopped() {
    start_stop_without_waiting_then_stopped(&mut LoopFixture::default());
}

#[test]
fn test_stress_start_stop_without_waiting_then_stopped() {
    let report = LoopFixture::default().stress_test(start_stop_without_waiting_then_stopped);
    assert_eq!(report.repetitions, DEFAULT_STRESS_REPETITIONS);
}

#[test]
fn test_stress_start_stop_async_join_then_stopped() {
    let report = LoopFixture::default().stress_test(start_stop_async_join_then_stopped);
    assert_eq!(report.repetitions, DEFAULT_STRESS_REPETITIONS);
}

#[test]
fn test_stress_proxy_round_trip_across_loop_lifetimes() {
    struct Slot(u64);

    impl ThreadAffine for Slot {
        type Value = u64;
        fn get(&self) -> u64 { self.0 }
        fn set(&mut self, value: u64) { self.0 = value; }
    }

    let report = stress_test(
        || {
            let mut event_loop = EventLoopThread::new();
            let handle = started(&mut event_loop);
            (event_loop, handle)
        },
        |(_, handle)| {
            let proxy = ThreadAffineProxy::new(handle, || Slot(0)).unwrap();
            proxy.set(1).unwrap();
            assert_eq!(proxy.get().unwrap(), 1);
        },
        |(mut event_loop, _)| {
            event_loop.stop().unwrap();
            assert_eq!(event_loop.thread_state(), ThreadState::Stopped);
        },
        DEFAULT_STRESS_REPETITIONS,
    );
    assert_eq!(report.repetitions, DEFAULT_STRESS_REPETITIONS);
}
