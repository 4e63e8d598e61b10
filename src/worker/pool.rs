//! Shared-queue parallel task executor
//!
//! Executes a batch of integration tasks across a pool of threads. The pool
//! uses a shared next-index counter rather than static chunking: per-task
//! cost scales with interval length and step, so equal-count chunks do not
//! give equal wall time, and dynamic claiming keeps every core busy until
//! the queue drains.
//!
//! Output order matches input order; results are paired to their slot by the
//! claimed index. A task that fails validation or integration becomes a
//! failed [`TaskResult`] and never aborts the rest of the batch.

use std::sync::mpsc;
use std::sync::Mutex;
use std::thread;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::protocol::{Task, TaskResult};
use crate::quadrature::IntegrationMethod;

/// Fixed-size pool of compute threads.
pub struct WorkerPool {
    num_threads: u32,
}

impl WorkerPool {
    /// Creates a pool with the given thread count.
    pub fn new(num_threads: u32) -> Result<Self> {
        if num_threads == 0 {
            anyhow::bail!("worker pool needs at least one thread");
        }
        Ok(Self { num_threads })
    }

    pub fn num_threads(&self) -> u32 {
        self.num_threads
    }

    /// Runs every task in `tasks` in parallel and returns one result per
    /// task, in input order.
    ///
    /// The method reference is shared by all threads for the duration of the
    /// call; the pool never outlives it.
    pub fn execute(
        &self,
        method: &(dyn IntegrationMethod + Send + Sync),
        tasks: &[Task],
    ) -> Vec<TaskResult> {
        if tasks.is_empty() {
            warn!("no tasks to execute");
            return Vec::new();
        }

        info!(
            tasks = tasks.len(),
            threads = self.num_threads,
            method = method.name(),
            "starting parallel execution"
        );

        let next_index = Mutex::new(0usize);
        let mut slots: Vec<Option<TaskResult>> = Vec::new();
        slots.resize_with(tasks.len(), || None);

        let (tx, rx) = mpsc::channel();

        thread::scope(|scope| {
            for _ in 0..self.num_threads {
                let tx = tx.clone();
                let next_index = &next_index;
                scope.spawn(move || worker_loop(method, tasks, next_index, tx));
            }
            drop(tx);

            // Claimed indices are unique, so each slot is written once.
            for (index, result) in rx {
                slots[index] = Some(result);
            }
        });

        let results: Vec<TaskResult> = slots
            .into_iter()
            .map(|slot| slot.expect("every claimed task yields a result"))
            .collect();

        let successful = results.iter().filter(|r| r.success).count();
        info!(
            successful,
            failed = results.len() - successful,
            "parallel execution completed"
        );

        results
    }
}

fn worker_loop(
    method: &(dyn IntegrationMethod + Send + Sync),
    tasks: &[Task],
    next_index: &Mutex<usize>,
    tx: mpsc::Sender<(usize, TaskResult)>,
) {
    loop {
        // Claim the next unprocessed task; the critical section is only the
        // counter increment.
        let index = {
            let mut guard = next_index.lock().unwrap();
            if *guard >= tasks.len() {
                break;
            }
            let index = *guard;
            *guard += 1;
            index
        };

        let result = execute_task(method, &tasks[index]);
        if tx.send((index, result)).is_err() {
            break;
        }
    }
}

/// Runs a single task, converting any failure into a failed result.
pub fn execute_task(method: &(dyn IntegrationMethod + Send + Sync), task: &Task) -> TaskResult {
    debug!(
        id = task.id,
        begin = task.begin,
        end = task.end,
        step = task.step,
        "executing task"
    );

    if let Err(e) = task.validate() {
        warn!(id = task.id, error = %e, "task rejected");
        return TaskResult::failure(task.id, e.to_string());
    }

    match method.integrate(task.begin, task.end, task.step) {
        Ok(value) => TaskResult::success(task.id, value),
        Err(e) => {
            warn!(id = task.id, error = %e, "task failed");
            TaskResult::failure(task.id, e.to_string())
        }
    }
}
