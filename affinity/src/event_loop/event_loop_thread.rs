// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! A dedicated OS thread running a serial event loop. See [`EventLoopThread`] and
//! [`EventLoopThreadBuilder`].

use super::{EventLoopError, EventLoopHandle, InitFailure, LoopContext, PumpExitGuard,
            ReadinessFuture, ShutdownFlag, ThreadState, UnobservedFailure,
            UnobservedFailureSink, WorkKind, WorkQueue, panic_message};
use crate::DEBUG_AFFINITY_LOOP;
use std::{fmt::{Debug, Formatter},
          panic::{AssertUnwindSafe, catch_unwind},
          sync::{Arc,
                 atomic::{AtomicU64, Ordering}},
          thread::{self, JoinHandle}};

/// Counter used to give every loop thread a distinct default name.
static NEXT_LOOP_ID: AtomicU64 = AtomicU64::new(0);

/// Action run on the new thread before the loop is initialized. An [`Err`] (or a panic)
/// becomes the failure outcome of the [`ReadinessFuture`].
pub type PreStartAction = Box<dyn FnOnce() -> miette::Result<()> + Send + 'static>;

/// Everything the spawned thread needs. Moved into the thread by [`start()`].
///
/// [`start()`]: EventLoopThread::start
#[derive(Default)]
pub struct EventLoopConfig {
    pub stack_size: Option<usize>,
    pub pre_start: Option<PreStartAction>,
    pub unobserved_failure_sink: Option<UnobservedFailureSink>,
}

impl Debug for EventLoopConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLoopConfig")
            .field("stack_size", &self.stack_size)
            .field("pre_start", &self.pre_start.is_some())
            .field(
                "unobserved_failure_sink",
                &self.unobserved_failure_sink.is_some(),
            )
            .finish()
    }
}

/// Builds an [`EventLoopThread`]. Nothing is spawned until [`EventLoopThread::start()`].
#[derive(Debug, Default)]
pub struct EventLoopThreadBuilder {
    name: Option<String>,
    config: EventLoopConfig,
}

impl EventLoopThreadBuilder {
    /// Name of the OS thread, also used in logs and errors.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Stack size hint in bytes for the OS thread.
    #[must_use]
    pub fn stack_size(mut self, bytes: usize) -> Self {
        self.config.stack_size = Some(bytes);
        self
    }

    /// Action executed on the new thread before the loop becomes ready.
    #[must_use]
    pub fn pre_start(
        mut self,
        action: impl FnOnce() -> miette::Result<()> + Send + 'static,
    ) -> Self {
        self.config.pre_start = Some(Box::new(action));
        self
    }

    /// Receives a report, on the loop thread, whenever a fire-and-forget work item
    /// panics.
    #[must_use]
    pub fn on_unobserved_failure(
        mut self,
        sink: impl Fn(UnobservedFailure) + Send + Sync + 'static,
    ) -> Self {
        self.config.unobserved_failure_sink = Some(Arc::new(sink));
        self
    }

    #[must_use]
    pub fn build(self) -> EventLoopThread {
        let name = self.name.unwrap_or_else(|| {
            format!(
                "affinity-loop-{}",
                NEXT_LOOP_ID.fetch_add(1, Ordering::SeqCst)
            )
        });
        EventLoopThread {
            name,
            readiness: ReadinessFuture::new(),
            shutdown_flag: Arc::new(ShutdownFlag::default()),
            lifecycle: Lifecycle::Unstarted(self.config),
        }
    }
}

enum Lifecycle {
    Unstarted(EventLoopConfig),
    Running(JoinHandle<()>),
    /// Joined, or the spawn failed so there is nothing to join.
    Finished,
}

/// Owns a dedicated OS thread that runs a single-threaded, cooperative message pump.
///
/// The pump executes posted [`WorkItem`]s strictly one at a time, to completion, until
/// it processes the [`Priority::Immediate`] shutdown request.
///
/// # Lifecycle
///
/// | Call           | Before `start()` | Running                        | After exit       |
/// | :------------- | :--------------- | :----------------------------- | :--------------- |
/// | [`start()`]    | spawns thread    | [`AlreadyStarted`]             | [`AlreadyStarted`] |
/// | [`stop()`]     | [`NotStarted`]   | shutdown + join                | `Ok(())`         |
/// | [`stop_async()`] | [`NotStarted`] | posts shutdown, returns        | `Ok(())`         |
/// | [`join()`]     | [`NotStarted`]   | blocks until thread exits      | `Ok(())`         |
/// | [`dispose()`]  | `Ok(())`         | same as [`stop()`]             | `Ok(())`         |
///
/// [`Drop`] calls [`dispose()`], or only [`stop_async()`] when it runs on the loop thread
/// itself.
///
/// # Readiness
///
/// The [`ReadinessFuture`] exists from construction on, and is resolved exactly once:
/// with the [`EventLoopHandle`] once the loop accepts work, or with an [`InitFailure`]
/// if the pre-start action fails or panics (or the OS thread can't be spawned). Failures
/// never escape onto the thread that called [`start()`].
///
/// # Example
///
/// ```
/// use affinity_groups::{EventLoopThread, ThreadState, dispatch_and_wait};
///
/// let mut event_loop = EventLoopThread::new();
/// event_loop.start().unwrap();
/// let handle = event_loop.readiness().wait().unwrap();
/// assert_eq!(event_loop.thread_state(), ThreadState::Running);
///
/// let on_loop = dispatch_and_wait(&handle, |_ctx| std::thread::current().id()).unwrap();
/// assert_eq!(on_loop, handle.thread_id());
///
/// event_loop.stop().unwrap();
/// assert_eq!(event_loop.thread_state(), ThreadState::Stopped);
/// ```
///
/// [`AlreadyStarted`]: EventLoopError::AlreadyStarted
/// [`NotStarted`]: EventLoopError::NotStarted
/// [`Priority::Immediate`]: super::Priority::Immediate
/// [`WorkItem`]: super::WorkItem
/// [`dispose()`]: Self::dispose
/// [`join()`]: Self::join
/// [`start()`]: Self::start
/// [`stop()`]: Self::stop
/// [`stop_async()`]: Self::stop_async
pub struct EventLoopThread {
    name: String,
    readiness: ReadinessFuture,
    shutdown_flag: Arc<ShutdownFlag>,
    lifecycle: Lifecycle,
}

impl EventLoopThread {
    /// A loop with a generated name, no pre-start action, and the OS default stack size.
    #[must_use]
    pub fn new() -> Self { Self::builder().build() }

    #[must_use]
    pub fn builder() -> EventLoopThreadBuilder { EventLoopThreadBuilder::default() }

    #[must_use]
    pub fn name(&self) -> &str { &self.name }

    /// The one-shot readiness signal. Clone it freely.
    #[must_use]
    pub fn readiness(&self) -> ReadinessFuture { self.readiness.clone() }

    /// The loop's handle, if it is already ready.
    #[must_use]
    pub fn handle(&self) -> Option<EventLoopHandle> {
        self.readiness.try_get().and_then(Result::ok)
    }

    #[must_use]
    pub fn thread_state(&self) -> ThreadState {
        match &self.lifecycle {
            Lifecycle::Unstarted(_) => ThreadState::Unstarted,
            Lifecycle::Finished => ThreadState::Stopped,
            Lifecycle::Running(join_handle) => {
                if join_handle.is_finished() {
                    ThreadState::Stopped
                } else if self.shutdown_flag.is_set() {
                    ThreadState::ShuttingDown
                } else {
                    ThreadState::Running
                }
            }
        }
    }

    /// Spawns the OS thread.
    ///
    /// Returns right away; wait on [`readiness()`] to learn when the loop accepts work.
    ///
    /// # Errors
    ///
    /// - [`EventLoopError::AlreadyStarted`] if called more than once.
    /// - [`EventLoopError::ThreadSpawn`] if the OS refuses to spawn the thread. The
    ///   readiness future is resolved with a failure in that case too.
    ///
    /// [`readiness()`]: Self::readiness
    pub fn start(&mut self) -> Result<(), EventLoopError> {
        let config = match std::mem::replace(&mut self.lifecycle, Lifecycle::Finished) {
            Lifecycle::Unstarted(config) => config,
            other => {
                self.lifecycle = other;
                return Err(EventLoopError::AlreadyStarted {
                    name: self.name.clone(),
                });
            }
        };

        let EventLoopConfig {
            stack_size,
            pre_start,
            unobserved_failure_sink,
        } = config;

        let mut builder = thread::Builder::new().name(self.name.clone());
        if let Some(bytes) = stack_size {
            builder = builder.stack_size(bytes);
        }

        let spawn_result = {
            let name = self.name.clone();
            let readiness = self.readiness.clone();
            let shutdown_flag = Arc::clone(&self.shutdown_flag);
            builder.spawn(move || {
                run_loop_thread(
                    name,
                    pre_start,
                    unobserved_failure_sink,
                    &readiness,
                    shutdown_flag,
                );
            })
        };

        match spawn_result {
            Ok(join_handle) => {
                DEBUG_AFFINITY_LOOP.then(|| {
                    tracing::debug!(message = "🚀 Spawned event loop thread", loop_name = %self.name);
                });
                self.lifecycle = Lifecycle::Running(join_handle);
                Ok(())
            }
            Err(error) => {
                tracing::error!(
                    message = "Failed to spawn event loop thread",
                    loop_name = %self.name,
                    error = %error,
                );
                self.readiness.resolve(Err(InitFailure {
                    name: self.name.clone(),
                    reason: error.to_string(),
                }));
                self.shutdown_flag.mark();
                Err(EventLoopError::ThreadSpawn(error))
            }
        }
    }

    /// Posts the shutdown request, waits for the pump to exit, and joins the thread.
    ///
    /// When this returns `Ok`, the OS thread has fully exited. Idempotent once started.
    ///
    /// # Errors
    ///
    /// - [`EventLoopError::NotStarted`] if [`start()`] was never called.
    /// - [`EventLoopError::SelfJoin`] if called from the loop thread itself.
    /// - [`EventLoopError::ThreadPanicked`] if the thread died outside of a work item.
    ///
    /// [`start()`]: Self::start
    pub fn stop(&mut self) -> Result<(), EventLoopError> {
        self.check_not_on_loop_thread()?;
        self.stop_async()?;
        self.join()
    }

    /// Posts the [`Priority::Immediate`] shutdown request and returns without joining.
    ///
    /// Call [`join()`] to know when the thread has exited. If the loop is not ready yet,
    /// this first waits for readiness (the pre-start action), since there is no queue to
    /// post to before that.
    ///
    /// # Errors
    ///
    /// Returns [`EventLoopError::NotStarted`] if [`start()`] was never called.
    ///
    /// [`Priority::Immediate`]: super::Priority::Immediate
    /// [`join()`]: Self::join
    /// [`start()`]: Self::start
    pub fn stop_async(&mut self) -> Result<(), EventLoopError> {
        match &self.lifecycle {
            Lifecycle::Unstarted(_) => {
                return Err(EventLoopError::NotStarted {
                    name: self.name.clone(),
                });
            }
            Lifecycle::Finished => return Ok(()),
            Lifecycle::Running(_) => {}
        }

        if self.shutdown_flag.is_set() {
            return Ok(());
        }

        // A failed init means the thread is already on its way out.
        if let Ok(handle) = self.readiness.wait() {
            let accepted = handle.request_shutdown();
            DEBUG_AFFINITY_LOOP.then(|| {
                tracing::debug!(
                    message = "✋ Requested event loop shutdown",
                    loop_name = %self.name,
                    accepted,
                );
            });
        }
        self.shutdown_flag.mark();
        Ok(())
    }

    /// Blocks until the OS thread exits. Idempotent.
    ///
    /// This does not request shutdown by itself; use [`stop()`] or [`stop_async()`].
    ///
    /// # Errors
    ///
    /// - [`EventLoopError::NotStarted`] if [`start()`] was never called.
    /// - [`EventLoopError::SelfJoin`] if called from the loop thread itself.
    /// - [`EventLoopError::ThreadPanicked`] if the thread died outside of a work item.
    ///
    /// [`start()`]: Self::start
    /// [`stop()`]: Self::stop
    /// [`stop_async()`]: Self::stop_async
    pub fn join(&mut self) -> Result<(), EventLoopError> {
        self.check_not_on_loop_thread()?;
        match std::mem::replace(&mut self.lifecycle, Lifecycle::Finished) {
            Lifecycle::Unstarted(config) => {
                self.lifecycle = Lifecycle::Unstarted(config);
                Err(EventLoopError::NotStarted {
                    name: self.name.clone(),
                })
            }
            Lifecycle::Finished => Ok(()),
            Lifecycle::Running(join_handle) => {
                let result = join_handle.join();
                DEBUG_AFFINITY_LOOP.then(|| {
                    tracing::debug!(message = "🏁 Joined event loop thread", loop_name = %self.name);
                });
                result.map_err(|_| EventLoopError::ThreadPanicked {
                    name: self.name.clone(),
                })
            }
        }
    }

    /// Same as [`stop()`], except that it is a no-op if the loop was never started. Safe
    /// to call any number of times.
    ///
    /// # Errors
    ///
    /// See [`stop()`].
    ///
    /// [`stop()`]: Self::stop
    pub fn dispose(&mut self) -> Result<(), EventLoopError> {
        match self.lifecycle {
            Lifecycle::Unstarted(_) | Lifecycle::Finished => Ok(()),
            Lifecycle::Running(_) => self.stop(),
        }
    }

    fn is_on_loop_thread(&self) -> bool {
        match &self.lifecycle {
            Lifecycle::Running(join_handle) => {
                join_handle.thread().id() == thread::current().id()
            }
            Lifecycle::Unstarted(_) | Lifecycle::Finished => false,
        }
    }

    fn check_not_on_loop_thread(&self) -> Result<(), EventLoopError> {
        if self.is_on_loop_thread() {
            return Err(EventLoopError::SelfJoin {
                name: self.name.clone(),
            });
        }
        Ok(())
    }
}

impl Default for EventLoopThread {
    fn default() -> Self { Self::new() }
}

impl Drop for EventLoopThread {
    /// Disposes the loop. When the last owner is dropped inside one of the loop's own
    /// work items, joining would wait on itself, so the shutdown request is only posted.
    /// The pump exits after the current item and the thread is detached.
    fn drop(&mut self) {
        let result = if self.is_on_loop_thread() {
            DEBUG_AFFINITY_LOOP.then(|| {
                tracing::debug!(
                    message = "Dropped on its own loop thread, detaching after shutdown",
                    loop_name = %self.name,
                );
            });
            self.stop_async()
        } else {
            self.dispose()
        };
        if let Err(error) = result {
            tracing::error!(
                message = "Failed to dispose event loop thread",
                loop_name = %self.name,
                error = ?error,
            );
        }
    }
}

impl Debug for EventLoopThread {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLoopThread")
            .field("name", &self.name)
            .field("state", &self.thread_state())
            .field("readiness", &self.readiness)
            .finish()
    }
}

/// Body of the spawned thread: pre-start action, loop context, readiness, pump.
fn run_loop_thread(
    name: String,
    pre_start: Option<PreStartAction>,
    unobserved_failure_sink: Option<UnobservedFailureSink>,
    readiness: &ReadinessFuture,
    shutdown_flag: Arc<ShutdownFlag>,
) {
    let span = tracing::debug_span!("event_loop", loop_name = %name);
    let _entered = span.enter();

    let init_result = catch_unwind(AssertUnwindSafe(|| match pre_start {
        Some(action) => action(),
        None => Ok(()),
    }));

    let failure_reason = match init_result {
        Ok(Ok(())) => None,
        Ok(Err(report)) => Some(
            report
                .chain()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(": "),
        ),
        Err(payload) => Some(panic_message(payload.as_ref())),
    };

    if let Some(reason) = failure_reason {
        tracing::error!(
            message = "Event loop failed to initialize",
            loop_name = %name,
            reason = %reason,
        );
        shutdown_flag.mark();
        readiness.resolve(Err(InitFailure { name, reason }));
        return;
    }

    let queue = Arc::new(WorkQueue::default());
    let handle = EventLoopHandle::new(
        name.clone(),
        thread::current().id(),
        Arc::clone(&queue),
        unobserved_failure_sink,
    );
    let mut context = LoopContext::new(handle.clone());

    let _exit_guard = PumpExitGuard {
        loop_name: name,
        queue,
        shutdown_flag,
    };

    readiness.resolve(Ok(handle.clone()));
    run_pump(&mut context, &handle);
    // _exit_guard drops here (or during unwinding), closing and draining the queue.
    // Then the context drops, and with it every loop-owned value, on this thread.
}

/// Executes work items one at a time until the shutdown request is dequeued.
///
/// A panic inside a work item is caught, so that one bad item can't take the loop down.
/// Blocking-marshaled items catch their own panics and send them to their caller, so
/// whatever reaches this point had no one waiting for it.
fn run_pump(context: &mut LoopContext, handle: &EventLoopHandle) {
    while let Some(item) = handle.queue().wait_pop() {
        match item.kind {
            WorkKind::Shutdown => break,
            WorkKind::Run(job) => {
                if let Err(payload) = catch_unwind(AssertUnwindSafe(|| job(context))) {
                    handle.report_unobserved_failure(panic_message(payload.as_ref()));
                }
            }
        }
    }
}
