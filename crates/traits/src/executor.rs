//! Executor trait for running independent render jobs.
//!
//! Batch rendering hands each metadata document to an executor. Jobs share
//! nothing but the stylesheet cache, so any scheduling strategy works as
//! long as results come back in input order.

use std::fmt::Debug;

/// A strategy for running a batch of independent jobs.
///
/// # Implementations
///
/// - `SyncExecutor`: Sequential, on the calling thread (always available)
/// - `RayonExecutor`: Work-stealing thread pool (in `metadoc-executor`)
pub trait Executor: Send + Sync + Debug {
    /// Run `f` over every job. Results are returned in the same order as
    /// the input jobs.
    fn execute_all<T, R, F>(&self, jobs: Vec<T>, f: F) -> Vec<R>
    where
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(T) -> R + Send + Sync + Clone + 'static;

    /// How many jobs may run at once. 1 for sequential executors.
    fn parallelism(&self) -> usize;

    fn name(&self) -> &'static str;
}

/// Runs jobs one after another on the calling thread.
#[derive(Debug, Clone, Default)]
pub struct SyncExecutor;

impl SyncExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl Executor for SyncExecutor {
    fn execute_all<T, R, F>(&self, jobs: Vec<T>, f: F) -> Vec<R>
    where
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(T) -> R + Send + Sync + Clone + 'static,
    {
        jobs.into_iter().map(f).collect()
    }

    fn parallelism(&self) -> usize {
        1
    }

    fn name(&self) -> &'static str {
        "SyncExecutor"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_executor_preserves_order() {
        let executor = SyncExecutor::new();
        let results = executor.execute_all(vec!["a", "bb", "ccc"], |s| s.len());
        assert_eq!(results, vec![1, 2, 3]);
    }

    #[test]
    fn test_sync_executor_fallible_jobs() {
        let executor = SyncExecutor::new();
        let results: Vec<Result<u32, String>> = executor.execute_all(vec!["1", "x", "3"], |s| {
            s.parse::<u32>().map_err(|e| e.to_string())
        });
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
        assert_eq!(results[2], Ok(3));
    }

    #[test]
    fn test_sync_executor_empty_batch() {
        let executor = SyncExecutor::new();
        let results: Vec<usize> = executor.execute_all(Vec::<&str>::new(), |s| s.len());
        assert!(results.is_empty());
        assert_eq!(executor.parallelism(), 1);
    }
}
