//! Deferred invocations delivered to the interactive thread.
//!
//! A [`QueuedInvocation`] wraps a closure that was created on some thread
//! (typically a background worker) and must be executed on the interactive
//! thread. The [`Dispatcher`](crate::Dispatcher) owns the queue; this module
//! only defines the unit of work and the completion handshake used by
//! blocking posts.

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

/// A type-erased invocation that can be executed later.
pub struct QueuedInvocation {
    /// The actual invocation closure.
    invoke: Box<dyn FnOnce() + Send>,
    /// Optional completion notifier for blocking posts.
    completion: Option<CompletionHandle>,
}

impl QueuedInvocation {
    /// Create a new queued invocation.
    pub fn new<F>(invoke: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            invoke: Box::new(invoke),
            completion: None,
        }
    }

    /// Create a new queued invocation with a completion handle for blocking.
    pub fn with_completion<F>(invoke: F, completion: CompletionHandle) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            invoke: Box::new(invoke),
            completion: Some(completion),
        }
    }

    /// Execute the invocation.
    pub fn execute(self) {
        (self.invoke)();
        if let Some(completion) = self.completion {
            completion.signal_done();
        }
    }
}

impl std::fmt::Debug for QueuedInvocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueuedInvocation")
            .field("blocking", &self.completion.is_some())
            .finish()
    }
}

/// Sender half of a completion pair.
///
/// Dropping the handle without executing the invocation (for example when the
/// dispatcher is torn down with work still queued) also releases the waiter.
pub struct CompletionHandle {
    inner: Arc<CompletionState>,
}

impl CompletionHandle {
    fn signal_done(&self) {
        let mut done = self.inner.done.lock();
        *done = true;
        self.inner.condvar.notify_all();
    }
}

impl Drop for CompletionHandle {
    fn drop(&mut self) {
        self.signal_done();
    }
}

/// A waiter for blocking on invocation completion.
pub struct CompletionWaiter {
    inner: Arc<CompletionState>,
}

impl CompletionWaiter {
    /// Wait for the invocation to complete.
    ///
    /// # Warning
    ///
    /// Waiting on the interactive thread for an invocation queued to that same
    /// thread deadlocks: nobody is left to pump the dispatcher.
    pub fn wait(self) {
        let mut done = self.inner.done.lock();
        while !*done {
            self.inner.condvar.wait(&mut done);
        }
    }
}

struct CompletionState {
    done: Mutex<bool>,
    condvar: Condvar,
}

/// Create a completion handle/waiter pair for blocking invocations.
pub fn completion_pair() -> (CompletionHandle, CompletionWaiter) {
    let state = Arc::new(CompletionState {
        done: Mutex::new(false),
        condvar: Condvar::new(),
    });

    (
        CompletionHandle {
            inner: state.clone(),
        },
        CompletionWaiter { inner: state },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[test]
    fn test_execute() {
        let executed = Arc::new(AtomicBool::new(false));

        let executed_clone = executed.clone();
        let invocation = QueuedInvocation::new(move || {
            executed_clone.store(true, Ordering::SeqCst);
        });

        invocation.execute();
        assert!(executed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_completion_with_invocation() {
        let executed = Arc::new(AtomicBool::new(false));
        let (handle, waiter) = completion_pair();

        let executed_clone = executed.clone();
        let invocation = QueuedInvocation::with_completion(
            move || {
                executed_clone.store(true, Ordering::SeqCst);
            },
            handle,
        );

        // Simulate the interactive thread in another thread
        let thread = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            invocation.execute();
        });

        waiter.wait();
        thread.join().unwrap();

        assert!(executed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_dropped_invocation_releases_waiter() {
        let (handle, waiter) = completion_pair();
        let invocation = QueuedInvocation::with_completion(|| {}, handle);
        drop(invocation);

        // Returns instead of blocking forever
        waiter.wait();
    }
}
