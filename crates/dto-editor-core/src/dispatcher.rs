//! The interactive-thread dispatcher.
//!
//! A [`Dispatcher`] is created on the thread that owns user-interface state
//! (the *interactive thread*). Other threads reach that thread through a
//! [`DispatcherProxy`]: they post closures, and the interactive thread runs
//! them in FIFO order whenever it pumps the dispatcher.
//!
//! The host decides how the dispatcher is pumped. A GUI shell drains it from
//! its event loop with [`Dispatcher::process_pending`]; a headless tool or a
//! test can block in [`Dispatcher::run`] or [`Dispatcher::run_until`].
//!
//! # Example
//!
//! ```
//! use dto_editor_core::Dispatcher;
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicBool, Ordering};
//! use std::time::Duration;
//!
//! let dispatcher = Dispatcher::new();
//! let proxy = dispatcher.proxy();
//! let done = Arc::new(AtomicBool::new(false));
//!
//! let done_clone = done.clone();
//! std::thread::spawn(move || {
//!     // Background work, then hand the result back
//!     proxy.post(move || done_clone.store(true, Ordering::SeqCst)).ok();
//! });
//!
//! assert!(dispatcher.run_until(|| done.load(Ordering::SeqCst), Duration::from_secs(5)));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::ThreadId;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, unbounded};

use crate::error::DispatchError;
use crate::invocation::{QueuedInvocation, completion_pair};
use crate::thread_check::ThreadAffinity;

/// Events carried by the dispatcher queue.
#[derive(Debug)]
enum DispatchEvent {
    /// Run a closure on the interactive thread.
    Invoke(QueuedInvocation),
    /// Stop a blocking [`Dispatcher::run`].
    Quit,
}

/// Owner of the interactive thread's work queue.
///
/// The dispatcher is bound to the thread that created it. Pumping methods
/// assert that binding in debug builds.
pub struct Dispatcher {
    sender: Sender<DispatchEvent>,
    receiver: Receiver<DispatchEvent>,
    affinity: ThreadAffinity,
    quit_requested: Arc<AtomicBool>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    /// Create a dispatcher bound to the current thread.
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        let affinity = ThreadAffinity::current();
        tracing::debug!(
            target: "dto_editor_core::dispatcher",
            thread = ?affinity.thread_id(),
            "dispatcher created"
        );
        Self {
            sender,
            receiver,
            affinity,
            quit_requested: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Get a cloneable, thread-safe handle for posting work to this dispatcher.
    pub fn proxy(&self) -> DispatcherProxy {
        DispatcherProxy {
            sender: self.sender.clone(),
            affinity: self.affinity,
            quit_requested: self.quit_requested.clone(),
        }
    }

    /// The interactive thread this dispatcher is bound to.
    pub fn thread_id(&self) -> ThreadId {
        self.affinity.thread_id()
    }

    /// Number of queued events not yet processed.
    pub fn pending_count(&self) -> usize {
        self.receiver.len()
    }

    /// Whether a quit has been requested through a proxy.
    pub fn quit_requested(&self) -> bool {
        self.quit_requested.load(Ordering::Acquire)
    }

    /// Run every event that is currently queued, without blocking.
    ///
    /// Invocations posted while draining are also run. Returns the number of
    /// invocations executed.
    pub fn process_pending(&self) -> usize {
        self.affinity
            .debug_assert_same_thread_with_msg("Dispatcher pumped off the interactive thread");

        let mut processed = 0;
        loop {
            match self.receiver.try_recv() {
                Ok(event) => processed += self.handle(event),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        if processed > 0 {
            tracing::trace!(target: "dto_editor_core::dispatcher", processed, "drained queue");
        }
        processed
    }

    /// Wait up to `timeout` for at least one event, then drain the queue.
    ///
    /// Returns the number of invocations executed.
    pub fn process_for(&self, timeout: Duration) -> usize {
        self.affinity
            .debug_assert_same_thread_with_msg("Dispatcher pumped off the interactive thread");

        match self.receiver.recv_timeout(timeout) {
            Ok(event) => self.handle(event) + self.process_pending(),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => 0,
        }
    }

    /// Pump the dispatcher until `condition` holds or `timeout` elapses.
    ///
    /// The condition is checked before waiting and after every event, so it
    /// can observe state mutated by the invocations themselves. Returns
    /// `true` if the condition was met.
    pub fn run_until<F>(&self, mut condition: F, timeout: Duration) -> bool
    where
        F: FnMut() -> bool,
    {
        self.affinity
            .debug_assert_same_thread_with_msg("Dispatcher pumped off the interactive thread");

        // A timeout too large to represent as an instant waits without bound.
        let deadline = Instant::now().checked_add(timeout);
        loop {
            if condition() {
                return true;
            }
            let received = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return condition();
                    }
                    self.receiver.recv_timeout(remaining).ok()
                }
                None => self.receiver.recv().ok(),
            };
            match received {
                Some(event) => {
                    self.handle(event);
                }
                None => return condition(),
            }
        }
    }

    /// Block and process events until a quit is requested.
    pub fn run(&self) {
        self.affinity
            .debug_assert_same_thread_with_msg("Dispatcher pumped off the interactive thread");
        tracing::debug!(target: "dto_editor_core::dispatcher", "dispatcher running");

        while !self.quit_requested() {
            match self.receiver.recv() {
                Ok(event) => {
                    self.handle(event);
                }
                Err(_) => break,
            }
        }

        tracing::debug!(target: "dto_editor_core::dispatcher", "dispatcher stopped");
    }

    /// Handle one event, returning the number of invocations executed.
    fn handle(&self, event: DispatchEvent) -> usize {
        match event {
            DispatchEvent::Invoke(invocation) => {
                invocation.execute();
                1
            }
            DispatchEvent::Quit => {
                self.quit_requested.store(true, Ordering::Release);
                0
            }
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("thread", &self.affinity.thread_id())
            .field("pending", &self.pending_count())
            .finish()
    }
}

/// A thread-safe handle for posting work to a [`Dispatcher`].
#[derive(Clone)]
pub struct DispatcherProxy {
    sender: Sender<DispatchEvent>,
    affinity: ThreadAffinity,
    quit_requested: Arc<AtomicBool>,
}

static_assertions::assert_impl_all!(DispatcherProxy: Send, Sync);

impl DispatcherProxy {
    /// The interactive thread the target dispatcher is bound to.
    pub fn thread_id(&self) -> ThreadId {
        self.affinity.thread_id()
    }

    /// Check whether the caller is running on the interactive thread.
    pub fn is_interactive_thread(&self) -> bool {
        self.affinity.is_same_thread()
    }

    /// Queue a closure to run on the interactive thread.
    ///
    /// The closure is always queued, even when called from the interactive
    /// thread itself, so it never runs re-entrantly inside the caller.
    pub fn post<F>(&self, f: F) -> Result<(), DispatchError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.sender
            .send(DispatchEvent::Invoke(QueuedInvocation::new(f)))
            .map_err(|_| DispatchError::Disconnected)
    }

    /// Run a closure on the interactive thread and wait for it to finish.
    ///
    /// Called from the interactive thread, the closure runs immediately;
    /// queuing it would deadlock.
    pub fn post_blocking<F>(&self, f: F) -> Result<(), DispatchError>
    where
        F: FnOnce() + Send + 'static,
    {
        if self.is_interactive_thread() {
            f();
            return Ok(());
        }

        let (handle, waiter) = completion_pair();
        self.sender
            .send(DispatchEvent::Invoke(QueuedInvocation::with_completion(
                f, handle,
            )))
            .map_err(|_| DispatchError::Disconnected)?;
        waiter.wait();
        Ok(())
    }

    /// Ask a blocking [`Dispatcher::run`] to return.
    pub fn quit(&self) -> Result<(), DispatchError> {
        self.sender
            .send(DispatchEvent::Quit)
            .map_err(|_| DispatchError::Disconnected)
    }

    /// Whether a quit has already been processed by the dispatcher.
    pub fn quit_requested(&self) -> bool {
        self.quit_requested.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for DispatcherProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatcherProxy")
            .field("thread", &self.affinity.thread_id())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_post_and_process() {
        let dispatcher = Dispatcher::new();
        let proxy = dispatcher.proxy();
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let counter_clone = counter.clone();
            proxy
                .post(move || {
                    counter_clone.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        }

        // Nothing runs until the dispatcher is pumped
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(dispatcher.pending_count(), 3);

        assert_eq!(dispatcher.process_pending(), 3);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert_eq!(dispatcher.pending_count(), 0);
    }

    #[test]
    fn test_fifo_order() {
        let dispatcher = Dispatcher::new();
        let proxy = dispatcher.proxy();
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..10 {
            let order_clone = order.clone();
            proxy.post(move || order_clone.lock().push(i)).unwrap();
        }

        dispatcher.process_pending();
        assert_eq!(*order.lock(), (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_posted_from_background_runs_on_interactive_thread() {
        let dispatcher = Dispatcher::new();
        let proxy = dispatcher.proxy();
        let ran_on = Arc::new(Mutex::new(None));

        let ran_on_clone = ran_on.clone();
        std::thread::spawn(move || {
            proxy
                .post(move || {
                    *ran_on_clone.lock() = Some(std::thread::current().id());
                })
                .unwrap();
        })
        .join()
        .unwrap();

        assert_eq!(dispatcher.process_for(Duration::from_secs(1)), 1);
        assert_eq!(*ran_on.lock(), Some(std::thread::current().id()));
    }

    #[test]
    fn test_run_until_times_out() {
        let dispatcher = Dispatcher::new();
        let start = Instant::now();
        assert!(!dispatcher.run_until(|| false, Duration::from_millis(30)));
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_run_until_observes_invocations() {
        let dispatcher = Dispatcher::new();
        let proxy = dispatcher.proxy();
        let flag = Arc::new(AtomicBool::new(false));

        let flag_clone = flag.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            proxy.post(move || flag_clone.store(true, Ordering::SeqCst)).unwrap();
        });

        assert!(dispatcher.run_until(|| flag.load(Ordering::SeqCst), Duration::from_secs(5)));
    }

    #[test]
    fn test_run_until_without_deadline() {
        let dispatcher = Dispatcher::new();
        let proxy = dispatcher.proxy();
        let flag = Arc::new(AtomicBool::new(false));

        let flag_clone = flag.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            proxy.post(move || flag_clone.store(true, Ordering::SeqCst)).unwrap();
        });

        assert!(dispatcher.run_until(|| flag.load(Ordering::SeqCst), Duration::MAX));
    }

    #[test]
    fn test_run_stops_on_quit() {
        let dispatcher = Dispatcher::new();
        let proxy = dispatcher.proxy();
        let counter = Arc::new(AtomicUsize::new(0));

        let counter_clone = counter.clone();
        std::thread::spawn(move || {
            proxy
                .post(move || {
                    counter_clone.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
            proxy.quit().unwrap();
        });

        dispatcher.run();
        assert!(dispatcher.quit_requested());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_post_blocking_from_background() {
        let dispatcher = Dispatcher::new();
        let proxy = dispatcher.proxy();
        let value = Arc::new(AtomicUsize::new(0));
        let observed_after_return = Arc::new(AtomicUsize::new(0));

        let value_clone = value.clone();
        let observed_clone = observed_after_return.clone();
        let handle = std::thread::spawn(move || {
            let inner = value_clone.clone();
            proxy
                .post_blocking(move || {
                    inner.store(42, Ordering::SeqCst);
                })
                .unwrap();
            observed_clone.store(value_clone.load(Ordering::SeqCst), Ordering::SeqCst);
        });

        assert!(dispatcher.run_until(|| value.load(Ordering::SeqCst) == 42, Duration::from_secs(5)));
        handle.join().unwrap();
        assert_eq!(observed_after_return.load(Ordering::SeqCst), 42);
    }

    #[test]
    fn test_post_blocking_on_interactive_thread_runs_inline() {
        let dispatcher = Dispatcher::new();
        let proxy = dispatcher.proxy();
        let flag = Arc::new(AtomicBool::new(false));

        let flag_clone = flag.clone();
        proxy
            .post_blocking(move || flag_clone.store(true, Ordering::SeqCst))
            .unwrap();

        assert!(flag.load(Ordering::SeqCst));
        assert_eq!(dispatcher.pending_count(), 0);
    }

    #[test]
    fn test_post_after_dispatcher_dropped() {
        let dispatcher = Dispatcher::new();
        let proxy = dispatcher.proxy();
        drop(dispatcher);

        assert_eq!(proxy.post(|| {}), Err(DispatchError::Disconnected));
        assert_eq!(proxy.quit(), Err(DispatchError::Disconnected));
    }

    #[test]
    fn test_proxy_reports_interactive_thread() {
        let dispatcher = Dispatcher::new();
        let proxy = dispatcher.proxy();
        assert!(proxy.is_interactive_thread());
        assert_eq!(proxy.thread_id(), dispatcher.thread_id());

        let remote = std::thread::spawn(move || proxy.is_interactive_thread())
            .join()
            .unwrap();
        assert!(!remote);
    }
}
