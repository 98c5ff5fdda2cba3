// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Loop-owned state that only work items can reach. See [`LoopContext`] and
//! [`SlotKey`].

use super::EventLoopHandle;
use crate::LoopScheduler;
use std::{any::Any,
          collections::HashMap,
          fmt::{Debug, Formatter},
          marker::PhantomData,
          thread::ThreadId};

/// The execution context of one event loop, handed by `&mut` to every work item.
///
/// It lives on the loop thread's stack for the whole life of the pump and is never
/// shared, so anything stored in it is exclusively owned by the loop thread. This is
/// what makes an object "thread-affine": other threads can only hold a [`SlotKey`] to it
/// and must post a work item to touch it.
///
/// Because the values never leave the loop thread, they don't need to be [`Send`].
/// A value inserted here is dropped on the loop thread, either by [`remove()`] or when
/// the loop exits.
///
/// [`remove()`]: Self::remove
pub struct LoopContext {
    handle: EventLoopHandle,
    slots: HashMap<u64, Box<dyn Any>>,
    next_slot_id: u64,
}

/// A typed key to a value stored in a [`LoopContext`].
///
/// The key itself is [`Send`] + [`Sync`] + [`Copy`] regardless of `S`, since it carries
/// no data of type `S`. Only the loop can resolve it.
pub struct SlotKey<S> {
    id: u64,
    _marker: PhantomData<fn() -> S>,
}

impl<S> SlotKey<S> {
    #[must_use]
    pub fn id(&self) -> u64 { self.id }
}

impl<S> Clone for SlotKey<S> {
    fn clone(&self) -> Self { *self }
}

impl<S> Copy for SlotKey<S> {}

impl<S> PartialEq for SlotKey<S> {
    fn eq(&self, other: &Self) -> bool { self.id == other.id }
}

impl<S> Eq for SlotKey<S> {}

impl<S> Debug for SlotKey<S> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SlotKey").field(&self.id).finish()
    }
}

impl LoopContext {
    pub(crate) fn new(handle: EventLoopHandle) -> Self {
        Self {
            handle,
            slots: HashMap::new(),
            next_slot_id: 0,
        }
    }

    /// The handle of the loop this context belongs to.
    #[must_use]
    pub fn handle(&self) -> &EventLoopHandle { &self.handle }

    #[must_use]
    pub fn thread_id(&self) -> ThreadId { self.handle.thread_id() }

    /// The scheduler representing this execution context.
    #[must_use]
    pub fn scheduler(&self) -> LoopScheduler { LoopScheduler::new(self.handle.clone()) }

    /// Moves `value` into loop-owned storage.
    pub fn insert<S: 'static>(&mut self, value: S) -> SlotKey<S> {
        let id = self.next_slot_id;
        self.next_slot_id += 1;
        self.slots.insert(id, Box::new(value));
        SlotKey {
            id,
            _marker: PhantomData,
        }
    }

    #[must_use]
    pub fn get<S: 'static>(&self, key: &SlotKey<S>) -> Option<&S> {
        self.slots.get(&key.id).and_then(|it| it.downcast_ref::<S>())
    }

    pub fn get_mut<S: 'static>(&mut self, key: &SlotKey<S>) -> Option<&mut S> {
        self.slots.get_mut(&key.id).and_then(|it| it.downcast_mut::<S>())
    }

    /// Takes the value out of loop-owned storage.
    pub fn remove<S: 'static>(&mut self, key: &SlotKey<S>) -> Option<S> {
        let boxed = self.slots.remove(&key.id)?;
        boxed.downcast::<S>().ok().map(|it| *it)
    }

    #[must_use]
    pub fn contains<S: 'static>(&self, key: &SlotKey<S>) -> bool { self.get(key).is_some() }

    /// Number of values currently owned by the loop.
    #[must_use]
    pub fn len(&self) -> usize { self.slots.len() }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.slots.is_empty() }
}

impl Debug for LoopContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopContext")
            .field("handle", &self.handle)
            .field("slots", &self.slots.len())
            .finish()
    }
}
