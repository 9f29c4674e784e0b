//! Index-range work dispatcher
//!
//! Runs `job(i)` for every `i` in `[0, count)` on `threads - 1` pool workers
//! plus the calling thread. All of them pull indices from one shared atomic
//! cursor, and every index writes only its own result slot.
//!
//! Failures do not stop sibling threads mid-job. Once one job fails no new
//! indices are claimed, and after every worker has joined the failure with
//! the lowest index is returned.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::OnceLock;

use crate::error::{ExportError, Result};

fn worker_error(index: usize, error: ExportError) -> ExportError {
    ExportError::Worker {
        index,
        source: Box::new(error),
    }
}

/// Run `job` over `[0, count)` and collect the results in index order
pub fn parallel_for<T, F>(threads: usize, count: usize, job: F) -> Result<Vec<T>>
where
    T: Send + Sync,
    F: Fn(usize) -> Result<T> + Sync,
{
    if threads <= 1 || count <= 1 {
        return (0..count)
            .map(|i| job(i).map_err(|e| worker_error(i, e)))
            .collect();
    }

    let workers = (threads - 1).min(count - 1);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("spmdl-worker-{}", i))
        .build()
        .map_err(|e| ExportError::Config(format!("failed to start worker pool: {}", e)))?;

    let cursor = AtomicUsize::new(0);
    let failed = AtomicBool::new(false);
    let slots: Vec<OnceLock<Result<T>>> = (0..count).map(|_| OnceLock::new()).collect();

    let run = || {
        while !failed.load(Ordering::Relaxed) {
            let index = cursor.fetch_add(1, Ordering::Relaxed);
            if index >= count {
                break;
            }
            let result = job(index);
            if result.is_err() {
                failed.store(true, Ordering::Relaxed);
            }
            // Each index is claimed exactly once, so the slot is always empty here
            let _ = slots[index].set(result);
        }
    };

    pool.in_place_scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|_| run());
        }
        run();
    });

    let mut results = Vec::with_capacity(count);
    for (index, slot) in slots.into_iter().enumerate() {
        match slot.into_inner() {
            Some(Ok(value)) => results.push(value),
            Some(Err(error)) => return Err(worker_error(index, error)),
            // Unclaimed after a failure; the failure itself is at a later index
            None => {}
        }
    }
    Ok(results)
}
