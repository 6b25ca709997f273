//! Rayon-backed executor.

use metadoc_traits::Executor;
use rayon::prelude::*;

/// Runs render jobs on rayon's global thread pool.
///
/// The pool size comes from rayon's global configuration (defaults to the
/// number of CPU cores). Configure it with `rayon::ThreadPoolBuilder`
/// before the first executor is created.
#[derive(Debug, Clone)]
pub struct RayonExecutor {
    num_threads: usize,
}

impl RayonExecutor {
    pub fn new() -> Self {
        Self {
            num_threads: rayon::current_num_threads(),
        }
    }
}

impl Default for RayonExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl Executor for RayonExecutor {
    fn execute_all<T, R, F>(&self, jobs: Vec<T>, f: F) -> Vec<R>
    where
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(T) -> R + Send + Sync + Clone + 'static,
    {
        // Indexed parallel iterators collect in input order.
        jobs.into_par_iter().map(f).collect()
    }

    fn parallelism(&self) -> usize {
        self.num_threads
    }

    fn name(&self) -> &'static str {
        "RayonExecutor"
    }
}
