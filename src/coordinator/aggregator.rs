//! Result aggregation
//!
//! Collects result batches from the receiver tasks, folds successful values
//! into the running sum, and lets the run driver block until every expected
//! result has arrived or a timeout fires. A batch is folded atomically, so
//! concurrent batches from different workers never interleave their effect
//! on the counters.

use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use tracing::{debug, error, info};

use crate::protocol::{ResultBatch, TaskResult};

#[derive(Default)]
struct AggregateState {
    sum: f64,
    received: usize,
    successful: usize,
    failed: usize,
    results: Vec<TaskResult>,
}

/// Thread-safe sum of per-task integrals with a bounded wait.
pub struct ResultAggregator {
    expected: usize,
    state: Mutex<AggregateState>,
    complete: Condvar,
}

impl ResultAggregator {
    /// Creates an aggregator expecting `expected` individual task results.
    pub fn new(expected: usize) -> Self {
        info!(expected, "result aggregator initialized");
        Self {
            expected,
            state: Mutex::new(AggregateState {
                results: Vec::with_capacity(expected),
                ..Default::default()
            }),
            complete: Condvar::new(),
        }
    }

    /// Folds one worker's batch into the aggregate and wakes any waiter.
    pub fn add_batch(&self, batch: &ResultBatch) {
        let mut state = self.state.lock().unwrap();

        debug!(
            client = batch.client_id,
            results = batch.results.len(),
            seconds = batch.total_time_seconds,
            "folding result batch"
        );

        for result in &batch.results {
            if result.success {
                state.sum += result.value;
                state.successful += 1;
            } else {
                state.failed += 1;
                error!(
                    task = result.task_id,
                    error = %result.error_message,
                    "task failed"
                );
            }
            state.results.push(result.clone());
        }
        state.received += batch.results.len();

        info!(
            received = state.received,
            expected = self.expected,
            "aggregation progress"
        );

        self.complete.notify_all();
    }

    /// Blocks until every expected result has arrived or `timeout` elapses.
    /// A zero timeout waits forever. Returns whether the count was reached.
    pub fn wait_all(&self, timeout: Duration) -> bool {
        let mut state = self.state.lock().unwrap();

        if timeout.is_zero() {
            while state.received < self.expected {
                state = self.complete.wait(state).unwrap();
            }
            return true;
        }

        let deadline = Instant::now() + timeout;
        while state.received < self.expected {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .complete
                .wait_timeout(state, deadline - now)
                .unwrap();
            state = guard;
        }
        true
    }

    /// The running sum of successful values. Meaningful as the final
    /// integral only once every expected result has been received.
    pub fn final_sum(&self) -> f64 {
        self.state.lock().unwrap().sum
    }

    pub fn received(&self) -> usize {
        self.state.lock().unwrap().received
    }

    pub fn successful(&self) -> usize {
        self.state.lock().unwrap().successful
    }

    pub fn failed(&self) -> usize {
        self.state.lock().unwrap().failed
    }

    pub fn expected(&self) -> usize {
        self.expected
    }

    /// Logs the per-run result block.
    pub fn log_summary(&self) {
        let state = self.state.lock().unwrap();
        info!("=== Integration Results ===");
        info!("Total tasks: {}", self.expected);
        info!("Received: {}", state.received);
        info!("Successful: {}", state.successful);
        info!("Errors: {}", state.failed);
        info!("Final result: {:.15}", state.sum);
        info!("===========================");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn batch(client_id: u64, results: Vec<TaskResult>) -> ResultBatch {
        ResultBatch {
            client_id,
            results,
            total_time_seconds: 0.1,
        }
    }

    #[test]
    fn sums_successful_results_only() {
        let aggregator = ResultAggregator::new(3);
        aggregator.add_batch(&batch(
            1,
            vec![
                TaskResult::success(1, 0.5),
                TaskResult::failure(2, "invalid integration parameters".to_string()),
                TaskResult::success(3, 0.25),
            ],
        ));

        assert_eq!(aggregator.received(), 3);
        assert_eq!(aggregator.successful(), 2);
        assert_eq!(aggregator.failed(), 1);
        assert!((aggregator.final_sum() - 0.75).abs() < 1e-15);
    }

    #[test]
    fn sum_is_order_independent() {
        let values = [0.1, 0.7, 0.2, 0.4];

        let forward = ResultAggregator::new(4);
        for (i, v) in values.iter().enumerate() {
            forward.add_batch(&batch(1, vec![TaskResult::success(i as u64, *v)]));
        }

        let reverse = ResultAggregator::new(4);
        for (i, v) in values.iter().enumerate().rev() {
            reverse.add_batch(&batch(2, vec![TaskResult::success(i as u64, *v)]));
        }

        // Commutative up to floating-point associativity.
        assert!((forward.final_sum() - reverse.final_sum()).abs() < 1e-12);
    }

    #[test]
    fn wait_all_returns_once_the_count_is_reached() {
        let aggregator = Arc::new(ResultAggregator::new(2));

        let adder = {
            let aggregator = Arc::clone(&aggregator);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                aggregator.add_batch(&batch(1, vec![TaskResult::success(1, 1.0)]));
                thread::sleep(Duration::from_millis(20));
                aggregator.add_batch(&batch(2, vec![TaskResult::success(2, 2.0)]));
            })
        };

        // Zero timeout means wait forever.
        assert!(aggregator.wait_all(Duration::ZERO));
        assert_eq!(aggregator.received(), 2);
        assert!((aggregator.final_sum() - 3.0).abs() < 1e-15);

        adder.join().unwrap();
    }

    #[test]
    fn wait_all_times_out_when_results_are_missing() {
        let aggregator = ResultAggregator::new(2);
        aggregator.add_batch(&batch(1, vec![TaskResult::success(1, 1.0)]));

        let started = Instant::now();
        assert!(!aggregator.wait_all(Duration::from_millis(50)));
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn zero_expected_is_immediately_complete() {
        let aggregator = ResultAggregator::new(0);
        assert!(aggregator.wait_all(Duration::ZERO));
        assert!(aggregator.wait_all(Duration::from_millis(10)));
        assert_eq!(aggregator.final_sum(), 0.0);
    }

    #[test]
    fn batches_fold_atomically_under_contention() {
        let aggregator = Arc::new(ResultAggregator::new(100));

        let mut handles = Vec::new();
        for client in 0..10u64 {
            let aggregator = Arc::clone(&aggregator);
            handles.push(thread::spawn(move || {
                let results: Vec<TaskResult> = (0..10)
                    .map(|i| TaskResult::success(client * 10 + i, 0.01))
                    .collect();
                aggregator.add_batch(&batch(client, results));
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert!(aggregator.wait_all(Duration::from_secs(1)));
        assert_eq!(aggregator.received(), 100);
        assert_eq!(aggregator.successful(), 100);
        assert!((aggregator.final_sum() - 1.0).abs() < 1e-9);
    }
}
