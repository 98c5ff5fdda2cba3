// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Safe cross-thread access to an object that must stay on one loop. See
//! [`ThreadAffineProxy`].

use super::{ReplaySubject, Subscription, ThreadAffineBase};
use crate::{DEBUG_AFFINITY_AFFINE, EventLoopError, EventLoopHandle, SlotKey};
use std::fmt::{Debug, Formatter};

/// An object whose state may only be touched by the loop that owns it, exposing one
/// typed property.
///
/// Implementors don't need to be [`Send`] or [`Sync`]: the object is created on the
/// loop and never leaves it. Only [`Self::Value`] crosses threads.
pub trait ThreadAffine: 'static {
    type Value: Clone + Send + 'static;

    fn get(&self) -> Self::Value;

    fn set(&mut self, value: Self::Value);
}

/// What the loop stores for one proxy: the object, and its stream once someone asked for
/// it.
struct AffineCell<T: ThreadAffine> {
    object: T,
    subject: Option<ReplaySubject<T::Value>>,
}

impl<T: ThreadAffine> AffineCell<T> {
    /// Runs on the loop thread only.
    fn apply(&mut self, value: T::Value) {
        match self.subject.as_ref() {
            Some(subject) => {
                self.object.set(value.clone());
                subject.publish(value);
            }
            None => self.object.set(value),
        }
    }

    /// Runs on the loop thread only, as a single work item, which is why the check and
    /// the create can't race.
    fn subscribe(&mut self) -> Subscription<T::Value> {
        let Self { object, subject } = self;
        subject
            .get_or_insert_with(|| ReplaySubject::new(object.get()))
            .subscribe()
    }
}

/// A [`Send`] + [`Sync`] handle to a [`ThreadAffine`] object living on an event loop.
///
/// | Operation     | Marshal         | Returns                                   |
/// | ------------- | --------------- | ----------------------------------------- |
/// | [`new()`]     | blocking        | once the object exists on the loop        |
/// | [`get()`]     | blocking        | the value read on the loop thread         |
/// | [`set()`]     | fire-and-forget | immediately; applied later, in order      |
/// | [`stream()`]  | blocking        | a replay [`Subscription`]                 |
/// | [`invoke()`]  | blocking        | the result of a read-only query           |
///
/// Sets issued by one thread are applied in the order they were issued, since they are
/// queued work items on a single serial loop. A [`get()`] issued after a [`set()`] from
/// the same thread therefore observes that set.
///
/// The replay stream is created lazily, inside the loop, the first time [`stream()`] is
/// called, seeded with the current value. From then on every [`set()`] publishes the new
/// value into it. Each subscriber first receives the value current at the moment it
/// subscribed.
///
/// Dropping the proxy posts removal of the object from the loop. That ends every open
/// [`Subscription`] once its queued values are drained.
///
/// [`get()`]: Self::get
/// [`invoke()`]: Self::invoke
/// [`new()`]: Self::new
/// [`set()`]: Self::set
/// [`stream()`]: Self::stream
pub struct ThreadAffineProxy<T: ThreadAffine> {
    base: ThreadAffineBase,
    key: SlotKey<AffineCell<T>>,
}

impl<T: ThreadAffine> ThreadAffineProxy<T> {
    /// Creates the object on the loop behind `handle` and waits for it to exist.
    ///
    /// # Errors
    ///
    /// - [`EventLoopError::WorkPanicked`] if `create` panicked.
    /// - Any other error of [`dispatch_and_wait()`].
    ///
    /// [`dispatch_and_wait()`]: super::dispatch_and_wait
    pub fn new(
        handle: &EventLoopHandle,
        create: impl FnOnce() -> T + Send + 'static,
    ) -> Result<Self, EventLoopError> {
        let base = ThreadAffineBase::new(handle.clone());
        let key = base.dispatch_and_wait(move |context| {
            context.insert(AffineCell {
                object: create(),
                subject: None,
            })
        })?;
        Ok(Self { base, key })
    }

    /// Like [`new()`] with a fallible factory. The factory's own error is returned as
    /// is.
    ///
    /// # Errors
    ///
    /// The factory's error, or an [`EventLoopError`] wrapped in a [`miette::Report`].
    ///
    /// [`new()`]: Self::new
    pub fn try_new(
        handle: &EventLoopHandle,
        create: impl FnOnce() -> miette::Result<T> + Send + 'static,
    ) -> miette::Result<Self> {
        let base = ThreadAffineBase::new(handle.clone());
        let key = base.dispatch_and_wait(move |context| {
            create().map(|object| {
                context.insert(AffineCell {
                    object,
                    subject: None,
                })
            })
        })??;
        Ok(Self { base, key })
    }

    #[must_use]
    pub fn handle(&self) -> &EventLoopHandle { self.base.handle() }

    /// Reads the property on the loop thread.
    ///
    /// # Errors
    ///
    /// Any error of [`dispatch_and_wait()`], or [`EventLoopError::ObjectMissing`].
    ///
    /// [`dispatch_and_wait()`]: super::dispatch_and_wait
    pub fn get(&self) -> Result<T::Value, EventLoopError> {
        let key = self.key;
        self.base
            .dispatch_and_wait(move |context| context.get(&key).map(|cell| cell.object.get()))?
            .ok_or_else(|| self.object_missing())
    }

    /// Queues the property write and returns immediately. Publishes to the stream, if
    /// one was created, once applied.
    ///
    /// A panic in [`ThreadAffine::set()`] is reported as an unobserved failure on the
    /// loop.
    ///
    /// # Errors
    ///
    /// Returns [`EventLoopError::LoopClosed`] if the loop no longer accepts work.
    pub fn set(&self, value: T::Value) -> Result<(), EventLoopError> {
        let key = self.key;
        let loop_name = self.handle().name().to_string();
        self.base.post(move |context| match context.get_mut(&key) {
            Some(cell) => cell.apply(value),
            None => {
                tracing::warn!(
                    message = "Dropped property write, object is gone",
                    loop_name = %loop_name,
                    slot = key.id(),
                );
            }
        })
    }

    /// Subscribes to the property's values: first the value current at subscription
    /// time, then every later set, in order.
    ///
    /// # Errors
    ///
    /// Any error of [`dispatch_and_wait()`], or [`EventLoopError::ObjectMissing`].
    ///
    /// [`dispatch_and_wait()`]: super::dispatch_and_wait
    pub fn stream(&self) -> Result<Subscription<T::Value>, EventLoopError> {
        let key = self.key;
        self.base
            .dispatch_and_wait(move |context| context.get_mut(&key).map(AffineCell::subscribe))?
            .ok_or_else(|| self.object_missing())
    }

    /// Runs a read-only `query` against the object on the loop thread.
    ///
    /// # Errors
    ///
    /// Any error of [`dispatch_and_wait()`], or [`EventLoopError::ObjectMissing`].
    ///
    /// [`dispatch_and_wait()`]: super::dispatch_and_wait
    pub fn invoke<R>(
        &self,
        query: impl FnOnce(&T) -> R + Send + 'static,
    ) -> Result<R, EventLoopError>
    where
        R: Send + 'static,
    {
        let key = self.key;
        self.base
            .dispatch_and_wait(move |context| context.get(&key).map(|cell| query(&cell.object)))?
            .ok_or_else(|| self.object_missing())
    }

    fn object_missing(&self) -> EventLoopError {
        EventLoopError::ObjectMissing {
            name: self.handle().name().to_string(),
            id: self.key.id(),
        }
    }
}

impl<T: ThreadAffine> Drop for ThreadAffineProxy<T> {
    fn drop(&mut self) {
        let key = self.key;
        let removed = self.base.post(move |context| drop(context.remove(&key)));
        if let Err(error) = removed {
            // The loop is gone, and with it the object.
            DEBUG_AFFINITY_AFFINE.then(|| {
                tracing::debug!(
                    message = "Skipped object removal",
                    slot = key.id(),
                    error = %error,
                );
            });
        }
    }
}

impl<T: ThreadAffine> Debug for ThreadAffineProxy<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadAffineProxy")
            .field("loop", &self.handle().name())
            .field("slot", &self.key)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EventLoopThread, dispatch_and_wait};
    use pretty_assertions::assert_eq;
    use std::{marker::PhantomData,
              rc::Rc,
              sync::mpsc,
              thread::{self, ThreadId},
              time::Duration};

    const TIMEOUT: Duration = Duration::from_secs(5);

    /// Not [`Send`], and panics if touched off its owning thread.
    struct Property<V> {
        value: V,
        owner: ThreadId,
        _not_send: PhantomData<Rc<()>>,
    }

    impl<V> Property<V> {
        fn new(value: V) -> Self {
            Self {
                value,
                owner: thread::current().id(),
                _not_send: PhantomData,
            }
        }

        fn check_owner(&self) {
            assert_eq!(thread::current().id(), self.owner, "touched off its loop");
        }
    }

    impl<V: Clone + Send + 'static> ThreadAffine for Property<V> {
        type Value = V;

        fn get(&self) -> V {
            self.check_owner();
            self.value.clone()
        }

        fn set(&mut self, value: V) {
            self.check_owner();
            self.value = value;
        }
    }

    fn started() -> (EventLoopThread, EventLoopHandle) {
        let mut event_loop = EventLoopThread::new();
        event_loop.start().unwrap();
        let handle = event_loop.readiness().wait().unwrap();
        (event_loop, handle)
    }

    /// Stops on another thread so a hang fails the test instead of blocking it.
    fn stop_within_timeout(mut event_loop: EventLoopThread) {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || tx.send(event_loop.stop().map(|()| event_loop.thread_state())));
        let state = rx.recv_timeout(TIMEOUT).unwrap().unwrap();
        assert_eq!(state, crate::ThreadState::Stopped);
    }

    #[test]
    fn test_set_get_and_stream_walkthrough() {
        let (event_loop, handle) = started();
        let proxy = ThreadAffineProxy::new(&handle, || Property::new(0)).unwrap();

        proxy.set(1).unwrap();
        assert_eq!(proxy.get().unwrap(), 1);
        assert_eq!(proxy.invoke(|it| it.owner).unwrap(), handle.thread_id());

        let mut stream = proxy.stream().unwrap();
        assert_eq!(stream.blocking_recv(), Some(1));

        proxy.set(2).unwrap();
        assert_eq!(stream.blocking_recv(), Some(2));

        stop_within_timeout(event_loop);
    }

    #[test]
    fn test_stream_replays_current_value_then_later_sets_in_order() {
        let (event_loop, handle) = started();
        let proxy = ThreadAffineProxy::new(&handle, || Property::new(-1_i64)).unwrap();

        for it in 0..100 {
            proxy.set(it).unwrap();
        }
        let mut stream = proxy.stream().unwrap();
        for it in 100..200 {
            proxy.set(it).unwrap();
        }

        let received: Vec<i64> = (0..101).map(|_| stream.blocking_recv().unwrap()).collect();
        assert_eq!(received, (99..200).collect::<Vec<_>>());
        assert_eq!(stream.try_recv(), None);

        stop_within_timeout(event_loop);
    }

    #[test]
    fn test_stream_is_created_once_and_shared_by_subscribers() {
        let (event_loop, handle) = started();
        let proxy = ThreadAffineProxy::new(&handle, || Property::new("a".to_string())).unwrap();

        let mut first = proxy.stream().unwrap();
        proxy.set("b".into()).unwrap();
        let mut second = proxy.stream().unwrap();
        proxy.set("c".into()).unwrap();
        // Round trip, so both sets were applied.
        assert_eq!(proxy.get().unwrap(), "c");

        let drain = |subscription: &mut Subscription<String>| {
            std::iter::from_fn(|| subscription.try_recv()).collect::<Vec<_>>()
        };
        assert_eq!(drain(&mut first), vec!["a", "b", "c"]);
        assert_eq!(drain(&mut second), vec!["b", "c"]);

        stop_within_timeout(event_loop);
    }

    #[test]
    fn test_concurrent_first_stream_access_creates_a_single_subject() {
        let (event_loop, handle) = started();
        let proxy = std::sync::Arc::new(ThreadAffineProxy::new(&handle, || Property::new(7)).unwrap());

        let subscribers: Vec<_> = (0..8)
            .map(|_| {
                let proxy = proxy.clone();
                thread::spawn(move || proxy.stream().unwrap())
            })
            .collect();
        let mut streams: Vec<_> = subscribers.into_iter().map(|it| it.join().unwrap()).collect();

        proxy.set(8).unwrap();
        for stream in &mut streams {
            assert_eq!(stream.blocking_recv(), Some(7));
            assert_eq!(stream.blocking_recv(), Some(8));
        }

        stop_within_timeout(event_loop);
    }

    #[tokio::test]
    async fn test_stream_can_be_consumed_asynchronously() {
        use futures_util::StreamExt;

        let (event_loop, handle) = started();
        let proxy = ThreadAffineProxy::new(&handle, || Property::new(0_u32)).unwrap();
        let stream = proxy.stream().unwrap();
        for it in 1..=3 {
            proxy.set(it).unwrap();
        }

        let received = tokio::time::timeout(TIMEOUT, stream.take(4).collect::<Vec<_>>())
            .await
            .unwrap();
        assert_eq!(received, vec![0, 1, 2, 3]);

        drop(proxy);
        tokio::task::spawn_blocking(move || stop_within_timeout(event_loop))
            .await
            .unwrap();
    }

    #[test]
    fn test_failed_creation_surfaces_to_the_constructor() {
        let (event_loop, handle) = started();

        let panicked = ThreadAffineProxy::<Property<u8>>::new(&handle, || panic!("no object"));
        assert!(matches!(
            panicked,
            Err(EventLoopError::WorkPanicked { ref message, .. }) if message == "no object"
        ));

        let failed = ThreadAffineProxy::<Property<u8>>::try_new(&handle, || {
            Err(miette::miette!("factory said no"))
        });
        assert_eq!(failed.unwrap_err().to_string(), "factory said no");

        let created = ThreadAffineProxy::try_new(&handle, || Ok(Property::new(3_u8))).unwrap();
        assert_eq!(created.get().unwrap(), 3);

        stop_within_timeout(event_loop);
    }

    #[test]
    fn test_drop_removes_the_object_from_the_loop_and_ends_streams() {
        let (event_loop, handle) = started();
        let proxy = ThreadAffineProxy::new(&handle, || Property::new(5)).unwrap();
        let mut stream = proxy.stream().unwrap();
        assert_eq!(dispatch_and_wait(&handle, |context| context.len()).unwrap(), 1);

        drop(proxy);

        assert_eq!(dispatch_and_wait(&handle, |context| context.len()).unwrap(), 0);
        assert_eq!(stream.blocking_recv(), Some(5));
        assert_eq!(stream.blocking_recv(), None);

        stop_within_timeout(event_loop);
    }

    #[test]
    fn test_proxy_outliving_its_loop_reports_closed_loop() {
        let (event_loop, handle) = started();
        let proxy = ThreadAffineProxy::new(&handle, || Property::new(1)).unwrap();
        stop_within_timeout(event_loop);

        assert!(matches!(proxy.get(), Err(EventLoopError::LoopClosed { .. })));
        assert!(matches!(proxy.set(2), Err(EventLoopError::LoopClosed { .. })));
        assert!(matches!(proxy.stream(), Err(EventLoopError::LoopClosed { .. })));
        // Drop must not panic either.
        drop(proxy);
    }
}
