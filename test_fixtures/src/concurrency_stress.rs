// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Repeat a test case many times, back-to-back, to surface races that a single run
//! would almost never hit.
//!
//! Start/stop races in thread lifecycles are timing dependent: a single passing run
//! proves little. Running setup, action and teardown [`DEFAULT_STRESS_REPETITIONS`]
//! times with no pause in between gives the scheduler many chances to interleave the
//! spawning thread and the new thread differently.
//!
//! Two flavors:
//! 1. [`OfferConcurrencyStressTest`] for a fixture struct that owns the state under test.
//! 2. [`stress_test()`] for closures, where setup returns the state and teardown consumes
//!    it.

use std::{panic::{AssertUnwindSafe, catch_unwind, resume_unwind},
          time::{Duration, Instant}};

/// How many times a case is repeated unless told otherwise.
pub const DEFAULT_STRESS_REPETITIONS: usize = 1000;

/// What a completed stress run did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StressReport {
    pub repetitions: usize,
    pub elapsed: Duration,
}

/// A test fixture that can be set up and torn down over and over.
pub trait OfferConcurrencyStressTest {
    fn setup(&mut self);

    fn teardown(&mut self);

    /// Runs `test_case` [`DEFAULT_STRESS_REPETITIONS`] times, each wrapped in
    /// [`setup()`] and [`teardown()`].
    ///
    /// [`setup()`]: Self::setup
    /// [`teardown()`]: Self::teardown
    fn stress_test(&mut self, test_case: impl FnMut(&mut Self)) -> StressReport
    where
        Self: Sized,
    {
        self.stress_test_with_repetitions(test_case, DEFAULT_STRESS_REPETITIONS)
    }

    /// Like [`stress_test()`] with an explicit count.
    ///
    /// If `test_case` panics, [`teardown()`] still runs for that repetition, then the
    /// panic continues, so the test fails and reports which repetition broke.
    ///
    /// [`stress_test()`]: Self::stress_test
    /// [`teardown()`]: Self::teardown
    fn stress_test_with_repetitions(
        &mut self,
        mut test_case: impl FnMut(&mut Self),
        repetitions: usize,
    ) -> StressReport
    where
        Self: Sized,
    {
        let start = Instant::now();
        for repetition in 0..repetitions {
            self.setup();
            let outcome = catch_unwind(AssertUnwindSafe(|| test_case(self)));
            self.teardown();
            if let Err(payload) = outcome {
                report_failed_repetition(repetition, repetitions);
                resume_unwind(payload);
            }
        }
        finish(repetitions, start)
    }
}

/// Runs `setup`, `action` and `teardown` `repetitions` times, back-to-back with no
/// pause.
///
/// `setup` builds the state for one repetition, `action` exercises it, and `teardown`
/// consumes it. If `action` panics the state is dropped (not torn down) and the panic
/// continues.
pub fn stress_test<S>(
    mut setup: impl FnMut() -> S,
    mut action: impl FnMut(&mut S),
    mut teardown: impl FnMut(S),
    repetitions: usize,
) -> StressReport {
    let start = Instant::now();
    for repetition in 0..repetitions {
        let mut state = setup();
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| action(&mut state))) {
            report_failed_repetition(repetition, repetitions);
            resume_unwind(payload);
        }
        teardown(state);
    }
    finish(repetitions, start)
}

fn report_failed_repetition(repetition: usize, repetitions: usize) {
    tracing::error!(
        message = "Stress test case failed",
        repetition = repetition + 1,
        repetitions,
    );
}

fn finish(repetitions: usize, start: Instant) -> StressReport {
    let report = StressReport {
        repetitions,
        elapsed: start.elapsed(),
    };
    tracing::debug!(
        message = "Stress test finished",
        repetitions = report.repetitions,
        elapsed = ?report.elapsed,
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct Recorder {
        live: bool,
        events: Vec<&'static str>,
    }

    impl OfferConcurrencyStressTest for Recorder {
        fn setup(&mut self) {
            assert!(!self.live);
            self.live = true;
            self.events.push("setup");
        }

        fn teardown(&mut self) {
            self.live = false;
            self.events.push("teardown");
        }
    }

    #[test]
    fn test_default_repetitions() {
        let mut recorder = Recorder::default();
        let mut runs = 0;

        let report = recorder.stress_test(|it| {
            assert!(it.live);
            runs += 1;
        });

        assert_eq!(runs, DEFAULT_STRESS_REPETITIONS);
        assert_eq!(report.repetitions, DEFAULT_STRESS_REPETITIONS);
        assert_eq!(recorder.events.len(), 2 * DEFAULT_STRESS_REPETITIONS);
    }

    #[test]
    fn test_each_repetition_is_wrapped_in_setup_and_teardown() {
        let mut recorder = Recorder::default();

        recorder.stress_test_with_repetitions(|it| it.events.push("case"), 2);

        assert_eq!(
            recorder.events,
            vec!["setup", "case", "teardown", "setup", "case", "teardown"]
        );
    }

    #[test]
    fn test_teardown_runs_before_a_failing_case_propagates() {
        let mut recorder = Recorder::default();

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            recorder.stress_test_with_repetitions(
                |it| {
                    if it.events.len() > 4 {
                        panic!("third repetition fails");
                    }
                },
                10,
            );
        }));

        assert!(outcome.is_err());
        assert!(!recorder.live);
        assert_eq!(recorder.events.last(), Some(&"teardown"));
        assert_eq!(recorder.events.len(), 6);
    }

    #[test]
    fn test_free_function_threads_state_through() {
        let mut torn_down = Vec::new();
        let mut next = 0;

        let report = stress_test(
            || {
                next += 1;
                next
            },
            |state| *state *= 10,
            |state| torn_down.push(state),
            3,
        );

        assert_eq!(report.repetitions, 3);
        assert_eq!(torn_down, vec![10, 20, 30]);
    }
}
