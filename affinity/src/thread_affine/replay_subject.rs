// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! See [`ReplaySubject`].

use std::{pin::Pin,
          sync::{Arc, Mutex, MutexGuard, PoisonError},
          task::{Context, Poll}};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

/// Publish-subscribe channel that replays the latest value to each new subscriber, then
/// delivers every later value to it exactly once, in publish order.
///
/// The subscriber list is the only part shared across threads and sits behind a
/// [`Mutex`]. Each subscriber gets its own unbounded queue, so a slow subscriber never
/// blocks the publisher or loses values.
pub struct ReplaySubject<V> {
    inner: Arc<Mutex<SubjectState<V>>>,
}

struct SubjectState<V> {
    latest: V,
    subscribers: Vec<UnboundedSender<V>>,
}

impl<V> Clone for ReplaySubject<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V: Clone + Send + 'static> ReplaySubject<V> {
    #[must_use]
    pub fn new(initial: V) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SubjectState {
                latest: initial,
                subscribers: Vec::new(),
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, SubjectState<V>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes `value` the latest and sends it to every live subscriber. Subscribers that
    /// were dropped are pruned.
    pub fn publish(&self, value: V) {
        let mut state = self.state();
        state
            .subscribers
            .retain(|subscriber| subscriber.send(value.clone()).is_ok());
        state.latest = value;
    }

    /// The latest value is queued for the new subscriber before this returns, under the
    /// same lock as [`publish()`], so nothing published concurrently can slip in ahead of
    /// it or be missed.
    ///
    /// [`publish()`]: Self::publish
    #[must_use]
    pub fn subscribe(&self) -> Subscription<V> {
        let mut state = self.state();
        let (sender, receiver) = unbounded_channel();
        if sender.send(state.latest.clone()).is_ok() {
            state.subscribers.push(sender);
        }
        Subscription { receiver }
    }

    #[must_use]
    pub fn latest(&self) -> V { self.state().latest.clone() }

    #[must_use]
    pub fn subscriber_count(&self) -> usize { self.state().subscribers.len() }
}

impl<V> std::fmt::Debug for ReplaySubject<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplaySubject").finish_non_exhaustive()
    }
}

/// Receiving end of [`ReplaySubject::subscribe()`].
///
/// Ends (yields [`None`]) once the subject is dropped and every queued value has been
/// received. Implements [`futures_core::Stream`].
#[derive(Debug)]
pub struct Subscription<V> {
    receiver: UnboundedReceiver<V>,
}

impl<V> Subscription<V> {
    pub async fn recv(&mut self) -> Option<V> { self.receiver.recv().await }

    /// Returns the next queued value without waiting.
    pub fn try_recv(&mut self) -> Option<V> { self.receiver.try_recv().ok() }

    /// # Panics
    ///
    /// Panics if called from inside an async execution context. Use [`recv()`] there.
    ///
    /// [`recv()`]: Self::recv
    pub fn blocking_recv(&mut self) -> Option<V> { self.receiver.blocking_recv() }
}

impl<V> futures_core::Stream for Subscription<V> {
    type Item = V;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<V>> {
        self.get_mut().receiver.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_subscriber_gets_latest_then_later_values_in_order() {
        let subject = ReplaySubject::new(0);
        subject.publish(1);

        let mut subscription = subject.subscribe();
        subject.publish(2);
        subject.publish(3);

        assert_eq!(subscription.try_recv(), Some(1));
        assert_eq!(subscription.try_recv(), Some(2));
        assert_eq!(subscription.try_recv(), Some(3));
        assert_eq!(subscription.try_recv(), None);
        assert_eq!(subject.latest(), 3);
    }

    #[test]
    fn test_each_subscriber_gets_its_own_replay() {
        let subject = ReplaySubject::new("a".to_string());
        let mut first = subject.subscribe();
        subject.publish("b".into());
        let mut second = subject.subscribe();

        assert_eq!(first.try_recv().as_deref(), Some("a"));
        assert_eq!(first.try_recv().as_deref(), Some("b"));
        assert_eq!(second.try_recv().as_deref(), Some("b"));
        assert_eq!(second.try_recv(), None);
    }

    #[test]
    fn test_dropped_subscribers_are_pruned_and_subject_drop_ends_streams() {
        let subject = ReplaySubject::new(0_u8);
        let dropped = subject.subscribe();
        let mut kept = subject.subscribe();
        assert_eq!(subject.subscriber_count(), 2);

        drop(dropped);
        subject.publish(1);
        assert_eq!(subject.subscriber_count(), 1);

        drop(subject);
        assert_eq!(kept.blocking_recv(), Some(0));
        assert_eq!(kept.blocking_recv(), Some(1));
        assert_eq!(kept.blocking_recv(), None);
    }

    #[tokio::test]
    async fn test_subscription_is_a_stream() {
        use futures_util::StreamExt;

        let subject = ReplaySubject::new(10_i32);
        let subscription = subject.subscribe();
        subject.publish(11);
        drop(subject);

        let received: Vec<i32> = subscription.collect().await;
        assert_eq!(received, vec![10, 11]);
    }
}
