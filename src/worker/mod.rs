//! Worker process
//!
//! A worker connects to the coordinator once, introduces itself with a
//! handshake carrying its hardware summary, blocks until its task batch
//! arrives, fans the tasks out across its local compute pool, reports the
//! results with the execution wall time, and waits for the stop command
//! before closing the socket.
//!
//! Any I/O or protocol failure aborts the worker; there is no reconnect.

pub mod pool;

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::net::TcpStream;
use tokio::task;
use tracing::{info, warn};

use crate::protocol::{
    read_frame, write_frame, Command, CommandType, HandshakeRequest, HandshakeResponse,
    ResultBatch, SystemInfo, TaskBatch,
};
use crate::quadrature::IntegrationMethod;
use crate::util::system::collect_system_info;
use pool::WorkerPool;

/// Worker protocol driver.
pub struct Worker {
    server_addr: String,
    method: Arc<dyn IntegrationMethod + Send + Sync>,
    system_info: SystemInfo,
    pool: WorkerPool,
    client_id: u64,
}

impl Worker {
    /// Prepares a worker: probes the host, sizes the compute pool, and
    /// records the integration method it will run.
    ///
    /// `threads` overrides the detected logical core count. The override is
    /// also what gets reported to the coordinator, so the capacity used for
    /// partitioning always matches the parallelism actually available.
    pub fn new(
        server_addr: String,
        method: Arc<dyn IntegrationMethod + Send + Sync>,
        threads: Option<u32>,
    ) -> Result<Self> {
        let mut system_info = collect_system_info();
        if let Some(threads) = threads {
            if threads == 0 {
                anyhow::bail!("thread count must be at least 1");
            }
            system_info.cpu_cores = threads;
        }

        info!("system information: {}", system_info);
        info!(method = method.name(), "integration method selected");

        let pool = WorkerPool::new(system_info.cpu_cores)?;

        Ok(Self {
            server_addr,
            method,
            system_info,
            pool,
            client_id: 0,
        })
    }

    /// Runs the full protocol against the coordinator.
    pub async fn run(mut self) -> Result<()> {
        info!(server = %self.server_addr, "connecting to coordinator");
        let mut stream = TcpStream::connect(&self.server_addr)
            .await
            .with_context(|| format!("failed to connect to {}", self.server_addr))?;
        info!("connected");

        let request = HandshakeRequest {
            client_version: env!("CARGO_PKG_VERSION").to_string(),
            system_info: self.system_info.clone(),
        };
        write_frame(&mut stream, &request)
            .await
            .context("failed to send handshake request")?;

        let response: HandshakeResponse = read_frame(&mut stream)
            .await
            .context("failed to read handshake response")?;
        if !response.accepted {
            anyhow::bail!("handshake rejected by coordinator: {}", response.message);
        }
        self.client_id = response.assigned_client_id;
        info!(
            client_id = self.client_id,
            server_version = %response.server_version,
            "handshake completed"
        );

        info!("waiting for tasks");
        let batch: TaskBatch = read_frame(&mut stream)
            .await
            .context("failed to receive task batch")?;
        info!(tasks = batch.tasks.len(), "task batch received");

        if batch.tasks.is_empty() {
            warn!("empty task batch, nothing to execute");
            return Ok(());
        }

        // The pool blocks its calling thread while the batch runs, so it is
        // moved off the protocol task.
        let started = Instant::now();
        let method = Arc::clone(&self.method);
        let pool = self.pool;
        let results = task::spawn_blocking(move || pool.execute(method.as_ref(), &batch.tasks))
            .await
            .context("compute pool panicked")?;
        let elapsed = started.elapsed().as_secs_f64();
        info!(seconds = elapsed, "all tasks completed");

        let result_batch = ResultBatch {
            client_id: self.client_id,
            results,
            total_time_seconds: elapsed,
        };
        write_frame(&mut stream, &result_batch)
            .await
            .context("failed to send results")?;
        info!("results sent");

        let command: Command = read_frame(&mut stream)
            .await
            .context("failed to read final command")?;
        match command.command_type {
            CommandType::StopWork => {
                info!(message = %command.message, "stop command received")
            }
            other => warn!(command = ?other, "unexpected command, shutting down anyway"),
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Task;
    use crate::quadrature::{IntegrationMethod, SimpsonsRule};
    use tokio::net::TcpListener;

    fn spawn_worker(addr: String, threads: u32) -> tokio::task::JoinHandle<Result<()>> {
        tokio::spawn(async move {
            Worker::new(addr, Arc::new(SimpsonsRule), Some(threads))?
                .run()
                .await
        })
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn worker_walks_the_full_protocol() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let worker = spawn_worker(addr, 2);

        let (mut stream, _) = listener.accept().await.unwrap();

        let request: HandshakeRequest = read_frame(&mut stream).await.unwrap();
        assert_eq!(request.system_info.cpu_cores, 2);
        assert_eq!(request.client_version, env!("CARGO_PKG_VERSION"));

        write_frame(
            &mut stream,
            &HandshakeResponse {
                assigned_client_id: 5,
                server_version: "0.1.0".to_string(),
                accepted: true,
                message: "Connection accepted".to_string(),
            },
        )
        .await
        .unwrap();

        let batch = TaskBatch {
            tasks: vec![
                Task { id: 1, begin: 2.0, end: 2.5, step: 0.01 },
                Task { id: 2, begin: 2.5, end: 3.0, step: 0.01 },
            ],
        };
        write_frame(&mut stream, &batch).await.unwrap();

        let results: ResultBatch = read_frame(&mut stream).await.unwrap();
        assert_eq!(results.client_id, 5);
        assert_eq!(results.results.len(), 2);
        assert!(results.results.iter().all(|r| r.success));
        assert!(results.total_time_seconds >= 0.0);

        let total: f64 = results.results.iter().map(|r| r.value).sum();
        let expected = SimpsonsRule.integrate(2.0, 3.0, 0.01).unwrap();
        assert!((total - expected).abs() < 1e-9);

        write_frame(&mut stream, &Command::stop_work("Integration completed"))
            .await
            .unwrap();

        worker.await.unwrap().unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn worker_aborts_on_rejected_handshake() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let worker = spawn_worker(addr, 1);

        let (mut stream, _) = listener.accept().await.unwrap();
        let _request: HandshakeRequest = read_frame(&mut stream).await.unwrap();

        write_frame(
            &mut stream,
            &HandshakeResponse {
                assigned_client_id: 0,
                server_version: "0.1.0".to_string(),
                accepted: false,
                message: "Run already started".to_string(),
            },
        )
        .await
        .unwrap();

        let err = worker.await.unwrap().unwrap_err();
        assert!(err.to_string().contains("rejected"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn empty_task_batch_is_a_clean_exit() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let worker = spawn_worker(addr, 1);

        let (mut stream, _) = listener.accept().await.unwrap();
        let _request: HandshakeRequest = read_frame(&mut stream).await.unwrap();
        write_frame(
            &mut stream,
            &HandshakeResponse {
                assigned_client_id: 1,
                server_version: "0.1.0".to_string(),
                accepted: true,
                message: String::new(),
            },
        )
        .await
        .unwrap();

        write_frame(&mut stream, &TaskBatch::default()).await.unwrap();

        // The worker exits without sending a result batch; the next read on
        // the coordinator side sees the connection close.
        worker.await.unwrap().unwrap();
        let eof = read_frame::<ResultBatch, _>(&mut stream).await;
        assert!(eof.is_err());
    }
}
