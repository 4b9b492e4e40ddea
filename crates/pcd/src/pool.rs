//! Bounded worker pool for oracle calls.
//!
//! Tasks started on a `Batch` run on a dedicated tokio runtime; a semaphore
//! caps how many execute at once. `join_all` always waits for every task,
//! so a failure never leaves proof work running in the background.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::runtime::{Builder, Runtime};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{OracleError, PoolError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Runtime worker threads.
    pub workers: usize,
    /// Oracle calls allowed in flight at once.
    pub permits: usize,
    /// Run every task inline on the caller.
    pub debug: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        let n = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4);
        Self { workers: n, permits: n, debug: false }
    }
}

pub struct WorkerPool {
    runtime: Option<Runtime>,
    permits: Arc<Semaphore>,
}

impl WorkerPool {
    pub fn new(cfg: PoolConfig) -> Result<Self, PoolError> {
        let runtime = if cfg.debug {
            None
        } else {
            Some(
                Builder::new_multi_thread()
                    .worker_threads(cfg.workers.max(1))
                    .thread_name("proof-worker")
                    .enable_all()
                    .build()?,
            )
        };
        Ok(Self { runtime, permits: Arc::new(Semaphore::new(cfg.permits.max(1))) })
    }

    /// Synchronous pool; every task runs on the thread that starts it.
    pub fn inline() -> Self { Self { runtime: None, permits: Arc::new(Semaphore::new(1)) } }

    pub fn is_debug(&self) -> bool { self.runtime.is_none() }

    pub fn batch<T: Send + 'static>(&self) -> Batch<'_, T> { Batch { pool: self, tasks: Vec::new() } }
}

/// Position of a task's result in the vector returned by `join_all`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TaskHandle(usize);

impl TaskHandle {
    pub fn index(&self) -> usize { self.0 }
}

enum Task<T> {
    Done(Result<T, OracleError>),
    Running(JoinHandle<Result<T, OracleError>>),
}

pub struct Batch<'p, T> {
    pool: &'p WorkerPool,
    tasks: Vec<Task<T>>,
}

impl<'p, T: Send + 'static> Batch<'p, T> {
    pub fn start<F>(&mut self, f: F) -> TaskHandle
    where
        F: FnOnce() -> Result<T, OracleError> + Send + 'static,
    {
        let handle = TaskHandle(self.tasks.len());
        let task = match &self.pool.runtime {
            None => Task::Done(run_guarded(f)),
            Some(rt) => {
                let permits = self.pool.permits.clone();
                Task::Running(rt.spawn(async move {
                    let _permit = permits
                        .acquire_owned()
                        .await
                        .map_err(|e| OracleError::Unavailable(e.to_string()))?;
                    match tokio::task::spawn_blocking(move || run_guarded(f)).await {
                        Ok(r) => r,
                        Err(e) => Err(OracleError::Unavailable(format!("proof task aborted: {}", e))),
                    }
                }))
            }
        };
        self.tasks.push(task);
        handle
    }

    pub fn len(&self) -> usize { self.tasks.len() }

    pub fn is_empty(&self) -> bool { self.tasks.is_empty() }

    /// Wait for every task. Succeeds only if all of them did.
    pub fn join_all(self) -> Result<Vec<T>, PoolError> {
        let total = self.tasks.len();
        let outcomes: Vec<Result<T, OracleError>> = match &self.pool.runtime {
            None => self
                .tasks
                .into_iter()
                .map(|t| match t {
                    Task::Done(r) => r,
                    Task::Running(_) => Err(OracleError::Unavailable("task spawned without runtime".into())),
                })
                .collect(),
            Some(rt) => rt.block_on(async move {
                let mut out = Vec::with_capacity(total);
                for t in self.tasks {
                    out.push(match t {
                        Task::Done(r) => r,
                        Task::Running(h) => match h.await {
                            Ok(r) => r,
                            Err(e) => Err(OracleError::Unavailable(format!("proof task aborted: {}", e))),
                        },
                    });
                }
                out
            }),
        };

        let mut results = Vec::with_capacity(total);
        let mut failed = 0;
        let mut first = None;
        for r in outcomes {
            match r {
                Ok(v) => results.push(v),
                Err(e) => {
                    failed += 1;
                    first.get_or_insert(e);
                }
            }
        }
        match first {
            None => {
                debug!(total, "proof batch complete");
                Ok(results)
            }
            Some(first) => {
                warn!(failed, total, %first, "proof batch failed");
                Err(PoolError::Failed { failed, total, first })
            }
        }
    }
}

fn run_guarded<T, F>(f: F) -> Result<T, OracleError>
where
    F: FnOnce() -> Result<T, OracleError>,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(r) => r,
        Err(panic) => {
            let msg = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".into());
            Err(OracleError::Unavailable(format!("proof task panicked: {}", msg)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inline_pool_reports_every_failure() {
        let pool = WorkerPool::inline();
        let mut batch = pool.batch::<u32>();
        batch.start(|| Ok(1));
        batch.start(|| Err(OracleError::InvalidProof("bad".into())));
        batch.start(|| panic!("boom"));
        match batch.join_all() {
            Err(PoolError::Failed { failed, total, first }) => {
                assert_eq!((failed, total), (2, 3));
                assert_eq!(first, OracleError::InvalidProof("bad".into()));
            }
            other => panic!("unexpected: {:?}", other.map(|v| v.len())),
        }
    }

    #[test]
    fn handles_index_results_in_start_order() {
        let pool = WorkerPool::new(PoolConfig { workers: 2, permits: 1, debug: false }).unwrap();
        let mut batch = pool.batch();
        let handles: Vec<TaskHandle> = (0..8u64).map(|i| batch.start(move || Ok(i * i))).collect();
        let out = batch.join_all().unwrap();
        for (i, h) in handles.iter().enumerate() {
            assert_eq!(out[h.index()], (i * i) as u64);
        }
    }
}
