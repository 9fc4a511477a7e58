//! Bounded worker pools for the per-tile stages.
//!
//! Per-tile work is dominated by external I/O and GDAL subprocesses, so the
//! pool is a fraction of the cores rather than all of them.

use crate::error::Result;
use log::debug;
use rayon::{ThreadPool, ThreadPoolBuilder};

pub const MIN_CORE_FRACTION: f64 = 0.25;
pub const MAX_CORE_FRACTION: f64 = 0.5;

/// Number of workers for `cores` CPUs. An explicit thread count wins;
/// otherwise `fraction` (clamped to [0.25, 0.5]) of the cores, at least one.
pub fn worker_count(cores: usize, fraction: f64, threads: Option<usize>) -> usize {
    if let Some(n) = threads {
        return n.max(1);
    }
    let fraction = if fraction.is_nan() {
        MAX_CORE_FRACTION
    } else {
        fraction.clamp(MIN_CORE_FRACTION, MAX_CORE_FRACTION)
    };
    ((cores as f64 * fraction).floor() as usize).max(1)
}

pub struct WorkerPool {
    pool: ThreadPool,
    workers: usize,
}

impl WorkerPool {
    pub fn new(workers: usize) -> Result<Self> {
        let workers = workers.max(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("tile-worker-{}", i))
            .build()?;
        debug!("Worker pool with {} threads", workers);
        Ok(Self { pool, workers })
    }

    /// Pool sized from the machine's core count.
    pub fn for_machine(fraction: f64, threads: Option<usize>) -> Result<Self> {
        Self::new(worker_count(num_cpus::get(), fraction, threads))
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run `op` inside the pool; rayon parallel iterators used by `op` are
    /// bounded by the pool's thread count.
    pub fn install<OP, R>(&self, op: OP) -> R
    where
        OP: FnOnce() -> R + Send,
        R: Send,
    {
        self.pool.install(op)
    }
}
