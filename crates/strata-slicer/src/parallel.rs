//! Bounded data-parallel execution with cancellation.
//!
//! Pipeline steps never see the parallel primitive directly; they hand a
//! work list and a closure to [`Executor::for_each`], which may run it
//! sequentially or on a bounded rayon pool. Output is collected in input
//! order, so a single-threaded run produces identical results.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::prelude::*;

use crate::error::{Result, SlicerError};

/// Shared cancellation flag, polled between work units and between steps.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    /// A token that never cancels unless [`cancel`](Self::cancel) is called.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// True once cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Error out if cancellation was requested.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(SlicerError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Bounded parallel executor for pipeline steps.
#[derive(Debug, Clone)]
pub struct Executor {
    threads: usize,
    token: CancellationToken,
}

impl Executor {
    /// An executor bounded to at most `threads` workers.
    pub fn new(threads: usize, token: CancellationToken) -> Self {
        Self {
            threads: threads.max(1),
            token,
        }
    }

    /// The cancellation token work should poll.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Map `op` over `items`, in input order.
    ///
    /// Runs sequentially for a single thread, on a scoped rayon pool
    /// otherwise. Cancellation is observed between work units; remaining
    /// units are skipped and `Cancelled` is returned.
    pub fn map<T, R, F>(&self, items: Vec<T>, op: F) -> Result<Vec<R>>
    where
        T: Send,
        R: Send,
        F: Fn(T) -> R + Send + Sync,
    {
        self.token.check()?;
        if self.threads == 1 || items.len() <= 1 {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                self.token.check()?;
                out.push(op(item));
            }
            return Ok(out);
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .build()
            .map_err(|e| SlicerError::InvalidPrint(format!("thread pool: {e}")))?;
        let token = &self.token;
        let out: Vec<Option<R>> = pool.install(|| {
            items
                .into_par_iter()
                .map(|item| {
                    if token.is_cancelled() {
                        None
                    } else {
                        Some(op(item))
                    }
                })
                .collect()
        });
        out.into_iter()
            .map(|r| r.ok_or(SlicerError::Cancelled))
            .collect()
    }

    /// Run `op` for each item, discarding results.
    pub fn for_each<T, F>(&self, items: Vec<T>, op: F) -> Result<()>
    where
        T: Send,
        F: Fn(T) + Send + Sync,
    {
        self.map(items, op).map(|_| ())
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::new(
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            CancellationToken::new(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_preserves_order() {
        let exec = Executor::new(4, CancellationToken::new());
        let out = exec.map((0..100).collect(), |i| i * 2).unwrap();
        assert_eq!(out, (0..100).map(|i| i * 2).collect::<Vec<_>>());
    }

    #[test]
    fn test_single_thread_matches_parallel() {
        let serial = Executor::new(1, CancellationToken::new());
        let parallel = Executor::new(8, CancellationToken::new());
        let items: Vec<i64> = (0..50).collect();
        assert_eq!(
            serial.map(items.clone(), |i| i * i).unwrap(),
            parallel.map(items, |i| i * i).unwrap()
        );
    }

    #[test]
    fn test_cancellation() {
        let token = CancellationToken::new();
        token.cancel();
        let exec = Executor::new(2, token);
        assert!(matches!(
            exec.map(vec![1, 2, 3], |i| i),
            Err(SlicerError::Cancelled)
        ));
    }
}
