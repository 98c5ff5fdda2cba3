// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! One-shot readiness signal for an event loop thread. See [`ReadinessFuture`].

use super::{EventLoopHandle, InitFailure};
use std::{fmt::{Debug, Formatter},
          future::{Future, IntoFuture},
          pin::Pin,
          sync::{Arc, Condvar, Mutex, OnceLock, PoisonError},
          time::Duration};
use tokio::sync::Notify;

/// What a [`ReadinessFuture`] resolves to: the loop's handle, or why it never got one.
pub type ReadinessOutcome = Result<EventLoopHandle, InitFailure>;

/// A clonable, set-once signal that the event loop is initialized and accepting work.
///
/// It is allocated when the [`EventLoopThread`] is constructed and resolved exactly once
/// by the loop thread (or by [`start()`] itself if the OS thread can't be spawned). Every
/// clone observes the same outcome.
///
/// Waiting works from both worlds:
///
/// | Caller           | API                                  |
/// | :--------------- | :----------------------------------- |
/// | Blocking thread  | [`wait()`], [`wait_timeout()`]       |
/// | Async task       | `readiness.await`, [`ready()`]       |
/// | Polling          | [`try_get()`], [`is_resolved()`]     |
///
/// The outcome lives in a [`OnceLock`], so reads after resolution are lock-free, and a
/// second resolve attempt is rejected rather than overwriting the first. The [`Condvar`]
/// parks blocking waiters, and the [`Notify`] wakes async ones.
///
/// [`EventLoopThread`]: super::EventLoopThread
/// [`is_resolved()`]: Self::is_resolved
/// [`ready()`]: Self::ready
/// [`start()`]: super::EventLoopThread::start
/// [`try_get()`]: Self::try_get
/// [`wait()`]: Self::wait
/// [`wait_timeout()`]: Self::wait_timeout
#[derive(Clone)]
pub struct ReadinessFuture {
    inner: Arc<ReadinessCell>,
}

#[derive(Default)]
struct ReadinessCell {
    outcome: OnceLock<ReadinessOutcome>,
    parked: Mutex<()>,
    resolved: Condvar,
    notify: Notify,
}

impl ReadinessFuture {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(ReadinessCell::default()),
        }
    }

    /// Stores `outcome` and wakes every waiter. Returns `false` if already resolved, in
    /// which case `outcome` is dropped.
    pub(crate) fn resolve(&self, outcome: ReadinessOutcome) -> bool {
        if self.inner.outcome.set(outcome).is_err() {
            return false;
        }
        {
            // Taking the lock orders this notify after any waiter that checked the
            // outcome under the lock and is about to park.
            let _parked = self
                .inner
                .parked
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            self.inner.resolved.notify_all();
        }
        self.inner.notify.notify_waiters();
        true
    }

    #[must_use]
    pub fn is_resolved(&self) -> bool { self.inner.outcome.get().is_some() }

    /// Returns the outcome without waiting, or [`None`] if not resolved yet.
    #[must_use]
    pub fn try_get(&self) -> Option<ReadinessOutcome> { self.inner.outcome.get().cloned() }

    /// Blocks the calling thread until the loop is ready or failed to initialize.
    ///
    /// # Errors
    ///
    /// Returns the [`InitFailure`] if the pre-start action failed or the thread could not
    /// be spawned.
    pub fn wait(&self) -> ReadinessOutcome {
        let mut parked = self
            .inner
            .parked
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(outcome) = self.inner.outcome.get() {
                return outcome.clone();
            }
            parked = self
                .inner
                .resolved
                .wait(parked)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Like [`wait()`] but gives up after `timeout`, returning [`None`].
    ///
    /// [`wait()`]: Self::wait
    #[must_use]
    pub fn wait_timeout(&self, timeout: Duration) -> Option<ReadinessOutcome> {
        let parked = self
            .inner
            .parked
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let (_parked, _) = self
            .inner
            .resolved
            .wait_timeout_while(parked, timeout, |_| self.inner.outcome.get().is_none())
            .unwrap_or_else(PoisonError::into_inner);
        self.try_get()
    }

    /// Waits asynchronously for the outcome.
    ///
    /// # Errors
    ///
    /// Returns the [`InitFailure`] if the loop failed to initialize.
    pub async fn ready(&self) -> ReadinessOutcome {
        loop {
            if let Some(outcome) = self.try_get() {
                return outcome;
            }

            // Register interest before the second check, so a resolve that lands in
            // between is not missed.
            let notified = self.inner.notify.notified();

            if let Some(outcome) = self.try_get() {
                return outcome;
            }

            notified.await;
        }
    }
}

impl IntoFuture for ReadinessFuture {
    type Output = ReadinessOutcome;
    type IntoFuture = Pin<Box<dyn Future<Output = ReadinessOutcome> + Send>>;

    fn into_future(self) -> Self::IntoFuture { Box::pin(async move { self.ready().await }) }
}

impl Debug for ReadinessFuture {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadinessFuture")
            .field("outcome", &self.inner.outcome.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn failure(reason: &str) -> InitFailure {
        InitFailure {
            name: "test-loop".into(),
            reason: reason.into(),
        }
    }

    #[test]
    fn test_resolves_exactly_once() {
        let readiness = ReadinessFuture::new();
        assert!(!readiness.is_resolved());
        assert!(readiness.try_get().is_none());

        assert!(readiness.resolve(Err(failure("first"))));
        assert!(!readiness.resolve(Err(failure("second"))));

        assert_eq!(readiness.wait().unwrap_err(), failure("first"));
        assert_eq!(readiness.clone().wait().unwrap_err(), failure("first"));
    }

    #[test]
    fn test_wait_timeout_returns_none_when_unresolved() {
        let readiness = ReadinessFuture::new();
        assert!(readiness.wait_timeout(Duration::from_millis(10)).is_none());
    }

    #[test]
    fn test_blocking_wait_is_woken_by_resolve_from_another_thread() {
        let readiness = ReadinessFuture::new();
        let resolver = {
            let readiness = readiness.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                readiness.resolve(Err(failure("late")));
            })
        };

        assert_eq!(readiness.wait().unwrap_err(), failure("late"));
        resolver.join().unwrap();
    }

    #[tokio::test]
    async fn test_await_is_woken_by_resolve_from_another_thread() {
        let readiness = ReadinessFuture::new();
        let resolver = {
            let readiness = readiness.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                readiness.resolve(Err(failure("async")));
            })
        };

        let outcome = tokio::time::timeout(Duration::from_secs(5), readiness.clone())
            .await
            .expect("readiness should resolve");
        assert_eq!(outcome.unwrap_err(), failure("async"));
        resolver.join().unwrap();
    }
}
