//! Capacity-weighted task partitioner
//!
//! Splits the integration range across the frozen worker set in proportion
//! to each worker's reported core count, then splits every worker's share
//! into one task per core. Per-task granularity equal to one core lets each
//! worker's compute pool fill all of its cores without any rebalancing over
//! the network.
//!
//! The emitted tasks tile the range contiguously: adjacent tasks share their
//! boundary point, and the very last task's end is forced to the exact upper
//! limit so accumulated floating-point drift can never leave a sliver of the
//! range uncovered.

use anyhow::Result;
use tracing::{debug, info};

use super::registry::ClientInfo;
use crate::protocol::{Task, TaskBatch};

/// One worker's slice of the partition.
pub struct ClientAssignment {
    pub client_id: u64,
    pub batch: TaskBatch,
}

/// Complete partition of a run's integration range.
pub struct Partition {
    /// Assignments in the same order as the client snapshot.
    pub assignments: Vec<ClientAssignment>,
    /// Total task count across all assignments (= total cores).
    pub total_tasks: usize,
}

/// Partitions `[lower, upper]` across `clients`.
///
/// Task ids are assigned sequentially from 1 across the whole partition, and
/// every task carries the original step.
pub fn partition(
    clients: &[ClientInfo],
    lower: f64,
    upper: f64,
    step: f64,
) -> Result<Partition> {
    if clients.is_empty() {
        anyhow::bail!("no clients to partition work across");
    }

    if let Some(client) = clients.iter().find(|c| c.cpu_cores() == 0) {
        anyhow::bail!("client {} reports zero cores", client.id);
    }

    let total_cores: u64 = clients.iter().map(|c| u64::from(c.cpu_cores())).sum();

    info!(
        lower,
        upper,
        step,
        clients = clients.len(),
        total_cores,
        "partitioning integration range"
    );

    let total_range = upper - lower;
    let mut cursor = lower;
    let mut next_task_id: u64 = 1;

    let mut assignments = Vec::with_capacity(clients.len());

    for (client_index, client) in clients.iter().enumerate() {
        let num_tasks = client.cpu_cores();
        let client_share = total_range * f64::from(num_tasks) / total_cores as f64;
        let task_width = client_share / f64::from(num_tasks);

        let mut batch = TaskBatch {
            tasks: Vec::with_capacity(num_tasks as usize),
        };

        for task_index in 0..num_tasks {
            let last_of_run =
                client_index == clients.len() - 1 && task_index == num_tasks - 1;
            let end = if last_of_run {
                // Exact upper limit, overriding accumulated drift.
                upper
            } else {
                cursor + task_width
            };

            batch.tasks.push(Task {
                id: next_task_id,
                begin: cursor,
                end,
                step,
            });

            next_task_id += 1;
            cursor = end;
        }

        debug!(
            client = client.id,
            tasks = batch.tasks.len(),
            from = batch.tasks.first().map(|t| t.begin).unwrap_or(lower),
            to = batch.tasks.last().map(|t| t.end).unwrap_or(lower),
            "assigned range"
        );

        assignments.push(ClientAssignment {
            client_id: client.id,
            batch,
        });
    }

    let total_tasks = total_cores as usize;
    info!(total_tasks, "partition created");

    Ok(Partition {
        assignments,
        total_tasks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Architecture, OsType, SystemInfo};

    fn clients(core_counts: &[u32]) -> Vec<ClientInfo> {
        core_counts
            .iter()
            .enumerate()
            .map(|(i, &cores)| ClientInfo {
                id: i as u64 + 1,
                system_info: SystemInfo {
                    os_type: OsType::Linux,
                    architecture: Architecture::X64,
                    cpu_cores: cores,
                    total_ram_mb: 2048,
                },
            })
            .collect()
    }

    fn all_tasks(partition: &Partition) -> Vec<Task> {
        partition
            .assignments
            .iter()
            .flat_map(|a| a.batch.tasks.iter().copied())
            .collect()
    }

    #[test]
    fn task_count_equals_total_cores() {
        let partition = partition(&clients(&[3, 5, 2]), 2.0, 3.0, 0.01).unwrap();
        assert_eq!(partition.total_tasks, 10);
        assert_eq!(all_tasks(&partition).len(), 10);
    }

    #[test]
    fn tasks_tile_the_range_without_gaps() {
        let partition = partition(&clients(&[4, 1, 7]), 2.0, 100.0, 0.01).unwrap();
        let tasks = all_tasks(&partition);

        assert_eq!(tasks[0].begin, 2.0);
        for pair in tasks.windows(2) {
            // Adjacent tasks share their boundary exactly.
            assert_eq!(pair[0].end.to_bits(), pair[1].begin.to_bits());
            assert!(pair[0].begin < pair[0].end);
        }
    }

    #[test]
    fn last_task_ends_exactly_at_the_upper_limit() {
        // 0.1 is not exactly representable, so the running cursor drifts;
        // the final end must still be bit-equal to the limit.
        let partition = partition(&clients(&[3, 3, 3]), 0.1, 0.9, 0.001).unwrap();
        let tasks = all_tasks(&partition);
        assert_eq!(tasks.last().unwrap().end.to_bits(), 0.9f64.to_bits());
    }

    #[test]
    fn ids_are_sequential_across_the_whole_partition() {
        let partition = partition(&clients(&[2, 2, 2]), 2.0, 3.0, 0.01).unwrap();
        let ids: Vec<u64> = all_tasks(&partition).iter().map(|t| t.id).collect();
        assert_eq!(ids, (1..=6).collect::<Vec<_>>());
    }

    #[test]
    fn shares_are_proportional_to_cores() {
        let partition = partition(&clients(&[1, 3]), 2.0, 6.0, 0.01).unwrap();

        let spans: Vec<f64> = partition
            .assignments
            .iter()
            .map(|a| {
                let first = a.batch.tasks.first().unwrap();
                let last = a.batch.tasks.last().unwrap();
                last.end - first.begin
            })
            .collect();

        // Worker shares are 1/4 and 3/4 of the 4.0-wide range, within one
        // task width of drift.
        let task_width = 1.0;
        assert!((spans[0] - 1.0).abs() < task_width);
        assert!((spans[1] - 3.0).abs() < task_width);
    }

    #[test]
    fn every_task_carries_the_original_step() {
        let partition = partition(&clients(&[2, 5]), 2.0, 3.0, 0.0125).unwrap();
        assert!(all_tasks(&partition)
            .iter()
            .all(|t| t.step.to_bits() == 0.0125f64.to_bits()));
    }

    #[test]
    fn single_client_gets_everything() {
        let partition = partition(&clients(&[4]), 1.5, 2.5, 0.01).unwrap();
        assert_eq!(partition.assignments.len(), 1);

        let tasks = &partition.assignments[0].batch.tasks;
        assert_eq!(tasks.len(), 4);
        assert_eq!(tasks[0].begin, 1.5);
        assert_eq!(tasks[3].end.to_bits(), 2.5f64.to_bits());
    }

    #[test]
    fn emitted_tasks_pass_validation() {
        let partition = partition(&clients(&[2, 3]), 1.1, 9.7, 0.001).unwrap();
        assert!(all_tasks(&partition).iter().all(|t| t.validate().is_ok()));
    }

    #[test]
    fn empty_client_list_is_rejected() {
        assert!(partition(&[], 2.0, 3.0, 0.01).is_err());
    }

    #[test]
    fn zero_core_clients_are_rejected() {
        assert!(partition(&clients(&[2, 0]), 2.0, 3.0, 0.01).is_err());
    }
}
