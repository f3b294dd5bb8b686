//! Background execution substrates.
//!
//! Workers do not create threads themselves; they hand a [`Job`] to an
//! [`Executor`]. Two executors are provided:
//!
//! - [`ThreadSpawner`]: one dedicated, named OS thread per job. There is no
//!   upper bound on the number of simultaneous jobs. This is the default for
//!   [`WorkerManager`](crate::WorkerManager).
//! - [`ThreadPool`]: a rayon work-stealing pool with a fixed number of
//!   threads. Jobs beyond the thread count wait in rayon's queue.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use dto_editor_core::threadpool::{Executor, ThreadPool, ThreadPoolConfig};
//! use dto_editor_core::{Dispatcher, WorkerManagerBuilder};
//!
//! let pool = ThreadPool::new(ThreadPoolConfig::with_threads(2))?;
//! pool.execute(Box::new(|| tracing::info!("on a pool thread")))?;
//!
//! let dispatcher = Dispatcher::new();
//! let manager = WorkerManagerBuilder::new()
//!     .executor(Arc::new(pool))
//!     .build::<dto_editor_core::BoxedTask>(dispatcher.proxy());
//! assert_eq!(manager.executor_name(), "rayon");
//! # Ok::<(), dto_editor_core::ThreadPoolError>(())
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::thread;

use rayon::{ThreadPool as RayonThreadPool, ThreadPoolBuilder};

use crate::error::ThreadPoolError;

/// Decrements an active-job counter when dropped, including on unwind
/// and when a job closure is discarded without running.
struct ActiveGuard(Arc<AtomicUsize>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// A unit of background work handed to an [`Executor`].
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Something that can run a [`Job`] off the interactive thread.
pub trait Executor: Send + Sync {
    /// Schedule `job` for execution.
    ///
    /// On error the job has not run and will not run.
    fn execute(&self, job: Job) -> Result<(), ThreadPoolError>;

    /// Short name used in log output.
    fn name(&self) -> &str;
}

/// Configuration for [`ThreadSpawner`].
#[derive(Debug, Clone)]
pub struct ThreadSpawnerConfig {
    /// Name prefix for spawned threads; an index is appended.
    pub name_prefix: String,
    /// Stack size for spawned threads in bytes. `None` uses the default.
    pub stack_size: Option<usize>,
}

impl Default for ThreadSpawnerConfig {
    fn default() -> Self {
        Self {
            name_prefix: "dto-worker".to_string(),
            stack_size: None,
        }
    }
}

impl ThreadSpawnerConfig {
    /// Create a configuration with the given thread name prefix.
    pub fn with_name(name_prefix: impl Into<String>) -> Self {
        Self {
            name_prefix: name_prefix.into(),
            ..Default::default()
        }
    }
}

/// Runs every job on its own freshly spawned thread.
#[derive(Debug)]
pub struct ThreadSpawner {
    config: ThreadSpawnerConfig,
    spawned: AtomicU64,
    active: Arc<AtomicUsize>,
}

impl Default for ThreadSpawner {
    fn default() -> Self {
        Self::new(ThreadSpawnerConfig::default())
    }
}

impl ThreadSpawner {
    /// Create a spawner with the given configuration.
    pub fn new(config: ThreadSpawnerConfig) -> Self {
        Self {
            config,
            spawned: AtomicU64::new(0),
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of jobs currently running.
    pub fn active_jobs(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Total number of threads spawned so far.
    pub fn spawned_count(&self) -> u64 {
        self.spawned.load(Ordering::Relaxed)
    }
}

impl Executor for ThreadSpawner {
    fn execute(&self, job: Job) -> Result<(), ThreadPoolError> {
        let index = self.spawned.fetch_add(1, Ordering::Relaxed);
        let mut builder =
            thread::Builder::new().name(format!("{}-{}", self.config.name_prefix, index));
        if let Some(stack_size) = self.config.stack_size {
            builder = builder.stack_size(stack_size);
        }

        self.active.fetch_add(1, Ordering::AcqRel);
        let active = ActiveGuard(self.active.clone());
        let spawned = builder.spawn(move || {
            let _active = active;
            job();
        });

        match spawned {
            // Detached: completion is reported by the job itself.
            Ok(_handle) => Ok(()),
            Err(err) => {
                tracing::error!(target: "dto_editor_core::threadpool", error = %err, "failed to spawn job thread");
                Err(ThreadPoolError::SpawnFailed(err.to_string()))
            }
        }
    }

    fn name(&self) -> &str {
        &self.config.name_prefix
    }
}

/// Configuration for creating a [`ThreadPool`].
#[derive(Debug, Clone)]
pub struct ThreadPoolConfig {
    /// Number of worker threads. `None` means use the number of CPU cores.
    pub num_threads: Option<usize>,
    /// Name prefix for worker threads.
    pub thread_name: String,
    /// Stack size for worker threads in bytes.
    pub stack_size: Option<usize>,
}

impl Default for ThreadPoolConfig {
    fn default() -> Self {
        Self {
            num_threads: None,
            thread_name: "dto-pool".to_string(),
            stack_size: None,
        }
    }
}

impl ThreadPoolConfig {
    /// Create a new configuration with custom thread count.
    pub fn with_threads(num_threads: usize) -> Self {
        Self {
            num_threads: Some(num_threads),
            ..Default::default()
        }
    }
}

/// A work-stealing thread pool built on rayon.
pub struct ThreadPool {
    pool: RayonThreadPool,
    active_tasks: Arc<AtomicUsize>,
}

impl ThreadPool {
    /// Create a new thread pool with the given configuration.
    pub fn new(config: ThreadPoolConfig) -> Result<Self, ThreadPoolError> {
        let thread_name = config.thread_name;
        let mut builder = ThreadPoolBuilder::new()
            .thread_name(move |index| format!("{}-{}", thread_name, index))
            .panic_handler(|_| {
                tracing::error!(target: "dto_editor_core::threadpool", "job panicked on pool thread");
            });

        if let Some(num_threads) = config.num_threads {
            builder = builder.num_threads(num_threads);
        }

        if let Some(stack_size) = config.stack_size {
            builder = builder.stack_size(stack_size);
        }

        let pool = builder
            .build()
            .map_err(|e| ThreadPoolError::CreationFailed(e.to_string()))?;

        Ok(Self {
            pool,
            active_tasks: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Get the number of threads in the pool.
    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Get the number of queued or running jobs.
    pub fn active_tasks(&self) -> usize {
        self.active_tasks.load(Ordering::Acquire)
    }
}

impl Executor for ThreadPool {
    fn execute(&self, job: Job) -> Result<(), ThreadPoolError> {
        self.active_tasks.fetch_add(1, Ordering::AcqRel);
        let active = ActiveGuard(self.active_tasks.clone());
        self.pool.spawn(move || {
            let _active = active;
            job();
        });
        Ok(())
    }

    fn name(&self) -> &str {
        "rayon"
    }
}

impl std::fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadPool")
            .field("num_threads", &self.num_threads())
            .field("active_tasks", &self.active_tasks())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;
    use std::sync::Barrier;
    use std::time::Duration;

    #[test]
    fn test_thread_spawner_names_threads() {
        let spawner = ThreadSpawner::new(ThreadSpawnerConfig::with_name("spawn-test"));
        let (sender, receiver) = bounded(1);

        spawner
            .execute(Box::new(move || {
                let name = thread::current().name().map(str::to_string);
                sender.send(name).unwrap();
            }))
            .unwrap();

        let name = receiver.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(name.as_deref(), Some("spawn-test-0"));
        assert_eq!(spawner.spawned_count(), 1);
        assert_eq!(spawner.name(), "spawn-test");
    }

    #[test]
    fn test_thread_spawner_runs_jobs_concurrently() {
        let spawner = ThreadSpawner::default();
        let barrier = Arc::new(Barrier::new(3));

        for _ in 0..2 {
            let barrier = barrier.clone();
            spawner
                .execute(Box::new(move || {
                    barrier.wait();
                }))
                .unwrap();
        }

        // Both jobs must be running at once to pass the barrier
        barrier.wait();
    }

    #[test]
    fn test_pool_as_executor() {
        let pool = ThreadPool::new(ThreadPoolConfig::with_threads(2)).unwrap();
        let (sender, receiver) = bounded(1);

        pool.execute(Box::new(move || sender.send(7).unwrap())).unwrap();

        assert_eq!(receiver.recv_timeout(Duration::from_secs(5)), Ok(7));
        assert_eq!(Executor::name(&pool), "rayon");
        assert_eq!(pool.num_threads(), 2);
    }

    #[test]
    fn test_pool_survives_panicking_job() {
        fn boom() {
            panic!("boom");
        }

        let pool = ThreadPool::new(ThreadPoolConfig::with_threads(1)).unwrap();
        pool.execute(Box::new(boom)).unwrap();

        let (sender, receiver) = bounded(1);
        pool.execute(Box::new(move || sender.send(5).unwrap())).unwrap();
        assert_eq!(receiver.recv_timeout(Duration::from_secs(5)), Ok(5));

        // The guard runs after the send; give it a moment on the pool thread
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while pool.active_tasks() != 0 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(pool.active_tasks(), 0);
    }
}
