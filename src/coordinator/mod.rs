//! Coordinator process
//!
//! The coordinator owns one run end to end: it accepts worker connections
//! and admits them through the handshake, freezes the worker set when the
//! operator signals start, partitions the integration range by reported
//! capacity, dispatches one task batch per worker, collects the result
//! batches, and publishes the aggregated integral before broadcasting the
//! stop command.
//!
//! Dispatch is transactional at the run level: either every batch goes out,
//! or the run aborts before any result is read. Collection is bounded by the
//! configured timeout; an incomplete run publishes nothing.

pub mod aggregator;
pub mod input;
pub mod partitioner;
pub mod registry;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{oneshot, Notify};
use tokio::task;
use tracing::{debug, error, info, warn};

use crate::config::{validator, CoordinatorConfig, IntegrationParameters};
use crate::protocol::{
    read_frame, write_frame, Command, HandshakeRequest, HandshakeResponse, ResultBatch,
};
use aggregator::ResultAggregator;
use partitioner::Partition;
use registry::{ClientConnection, ClientRegistry};

/// Coordinator driver for a single run.
pub struct Coordinator {
    parameters: IntegrationParameters,
    collect_timeout: Duration,
    listener: TcpListener,
    registry: Arc<ClientRegistry>,
    shutdown: Arc<Notify>,
}

impl Coordinator {
    /// Binds the listener and prepares a run.
    ///
    /// Binding is separate from [`run`](Self::run) so callers can bind port
    /// 0 and read the actual address back.
    pub async fn bind(config: &CoordinatorConfig) -> Result<Self> {
        validator::validate_coordinator_config(config)?;

        let listener = TcpListener::bind(("0.0.0.0", config.port))
            .await
            .with_context(|| format!("failed to bind port {}", config.port))?;
        info!(addr = %listener.local_addr()?, "listening for workers");

        Ok(Self {
            parameters: config.parameters,
            collect_timeout: config.collect_timeout,
            listener,
            registry: Arc::new(ClientRegistry::new()),
            shutdown: Arc::new(Notify::new()),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn registry(&self) -> Arc<ClientRegistry> {
        Arc::clone(&self.registry)
    }

    /// Runs the coordinator until the integral is published or the run
    /// fails. `start` is the operator trigger; until it resolves, workers
    /// keep being admitted.
    pub async fn run(self, start: oneshot::Receiver<()>) -> Result<f64> {
        let params = self.parameters;
        info!(
            lower = params.lower_limit,
            upper = params.upper_limit,
            step = params.step,
            "integration run prepared"
        );

        let accept_task = tokio::spawn(accept_loop(
            self.listener,
            Arc::clone(&self.registry),
            Arc::clone(&self.shutdown),
        ));

        info!("waiting for workers to connect");
        let started = start.await.is_ok();

        // Freeze the worker set; the accept loop drops the listener when it
        // exits, unblocking any in-flight accept.
        self.registry.stop_accepting();
        self.shutdown.notify_one();
        if let Err(e) = accept_task.await {
            warn!(error = %e, "accept loop ended abnormally");
        }

        if !started {
            self.registry.clear();
            anyhow::bail!("run cancelled before start");
        }

        self.registry.log_clients();
        let infos = self.registry.snapshot_infos();
        let mut clients = self.registry.take_all();
        if clients.is_empty() {
            anyhow::bail!("no workers connected, cannot start integration");
        }

        info!("=== Starting integration ===");

        let partition = partitioner::partition(
            &infos,
            params.lower_limit,
            params.upper_limit,
            params.step,
        )?;
        let aggregator = Arc::new(ResultAggregator::new(partition.total_tasks));

        // Steps 4-6 abort straight to shutdown on failure; the stop
        // broadcast only happens for runs that reached collection.
        if let Err(e) = dispatch(&mut clients, &partition).await {
            self.registry.clear();
            return Err(e);
        }

        let receivers = spawn_receivers(clients, Arc::clone(&aggregator));

        let timeout = self.collect_timeout;
        let wait = Arc::clone(&aggregator);
        let complete = task::spawn_blocking(move || wait.wait_all(timeout))
            .await
            .context("aggregation wait interrupted")?;

        // Recover the connections from the receiver tasks. After a timeout a
        // receiver may still be blocked reading from a stuck worker; it gets
        // cancelled and its connection is dropped with it.
        let mut clients = Vec::with_capacity(receivers.len());
        for receiver in receivers {
            if !complete {
                receiver.abort();
            }
            match receiver.await {
                Ok(conn) => clients.push(conn),
                Err(e) if e.is_cancelled() => {
                    warn!("receiver cancelled with its worker still silent");
                }
                Err(e) => warn!(error = %e, "receiver task failed"),
            }
        }

        let outcome = if complete {
            let final_result = aggregator.final_sum();
            aggregator.log_summary();
            info!("========================================");
            info!("       INTEGRATION COMPLETED");
            info!("========================================");
            info!(
                "Integral of 1/ln(x) from {} to {}",
                params.lower_limit, params.upper_limit
            );
            info!("Result = {:.15}", final_result);
            info!("========================================");
            Ok(final_result)
        } else {
            error!(
                received = aggregator.received(),
                expected = aggregator.expected(),
                "timed out waiting for results; no result published"
            );
            Err(anyhow::anyhow!(
                "incomplete results: received {}/{}",
                aggregator.received(),
                aggregator.expected()
            ))
        };

        broadcast_stop(&mut clients).await;

        self.registry.clear();
        drop(clients);
        info!("coordinator shut down");

        outcome
    }
}

/// Accepts connections until the shutdown signal, spawning one handshake
/// handler per socket.
async fn accept_loop(listener: TcpListener, registry: Arc<ClientRegistry>, shutdown: Arc<Notify>) {
    loop {
        tokio::select! {
            _ = shutdown.notified() => {
                debug!("closing listener");
                break;
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        let registry = Arc::clone(&registry);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, peer, registry).await {
                                error!(%peer, error = %e, "handshake failed");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "accept failed");
                    }
                }
            }
        }
    }
}

/// Performs the handshake for one incoming connection and registers it.
///
/// A connection arriving after the registry froze is answered with a
/// rejection and dropped; it never enters the registry.
async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    registry: Arc<ClientRegistry>,
) -> Result<()> {
    info!(%peer, "new connection");

    let request: HandshakeRequest = read_frame(&mut stream)
        .await
        .context("failed to read handshake request")?;
    info!(
        %peer,
        version = %request.client_version,
        info = %request.system_info,
        "handshake received"
    );

    if request.system_info.cpu_cores == 0 {
        reject(&mut stream, "Reported zero cores").await?;
        warn!(%peer, "rejected worker reporting zero cores");
        return Ok(());
    }

    let id = registry.allocate_id();
    if id == 0 {
        reject(&mut stream, "Run already started").await?;
        warn!(%peer, "rejected late connection");
        return Ok(());
    }

    let response = HandshakeResponse {
        assigned_client_id: id,
        server_version: env!("CARGO_PKG_VERSION").to_string(),
        accepted: true,
        message: "Connection accepted".to_string(),
    };
    write_frame(&mut stream, &response)
        .await
        .context("failed to send handshake response")?;

    let connection = ClientConnection::new(stream, id, request.system_info);
    if registry.add(connection) {
        info!(client = id, %peer, "handshake completed");
    }
    Ok(())
}

async fn reject(stream: &mut TcpStream, message: &str) -> Result<()> {
    let response = HandshakeResponse {
        assigned_client_id: 0,
        server_version: env!("CARGO_PKG_VERSION").to_string(),
        accepted: false,
        message: message.to_string(),
    };
    write_frame(stream, &response)
        .await
        .context("failed to send rejection")?;
    Ok(())
}

/// Sends every worker its task batch. Any failure fails the whole run.
async fn dispatch(clients: &mut [ClientConnection], partition: &Partition) -> Result<()> {
    info!(clients = clients.len(), "dispatching task batches");

    for (conn, assignment) in clients.iter_mut().zip(&partition.assignments) {
        debug_assert_eq!(conn.id, assignment.client_id);

        info!(
            client = conn.id,
            tasks = assignment.batch.tasks.len(),
            "sending task batch"
        );
        write_frame(&mut conn.stream, &assignment.batch)
            .await
            .with_context(|| format!("failed to send tasks to client {}", conn.id))?;
        conn.task_sent = true;
    }

    info!("all task batches sent");
    Ok(())
}

/// Spawns one receiver per worker; each reads a single result batch into the
/// aggregator and then returns its connection.
///
/// A receiver hitting a socket error only logs it; the missing results
/// surface when the aggregator wait runs out.
fn spawn_receivers(
    clients: Vec<ClientConnection>,
    aggregator: Arc<ResultAggregator>,
) -> Vec<task::JoinHandle<ClientConnection>> {
    info!("waiting for results from workers");

    clients
        .into_iter()
        .map(|mut conn| {
            let aggregator = Arc::clone(&aggregator);
            tokio::spawn(async move {
                match read_frame::<ResultBatch, _>(&mut conn.stream).await {
                    Ok(batch) => {
                        conn.result_received = true;
                        info!(
                            client = conn.id,
                            results = batch.results.len(),
                            seconds = batch.total_time_seconds,
                            "result batch received"
                        );
                        aggregator.add_batch(&batch);
                    }
                    Err(e) => {
                        error!(client = conn.id, error = %e, "failed to receive results");
                    }
                }
                conn
            })
        })
        .collect()
}

/// Best-effort stop broadcast; send failures are logged, not fatal.
async fn broadcast_stop(clients: &mut [ClientConnection]) {
    info!("sending stop command to all workers");
    let stop = Command::stop_work("Integration completed");

    for conn in clients.iter_mut() {
        match write_frame(&mut conn.stream, &stop).await {
            Ok(()) => debug!(client = conn.id, "stop command sent"),
            Err(e) => warn!(client = conn.id, error = %e, "failed to send stop command"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{write_frame, SystemInfo, TaskBatch};
    use crate::quadrature::{IntegrationMethod, SimpsonsRule};
    use crate::util::system::collect_system_info;
    use crate::worker::Worker;
    use std::time::Instant;

    fn test_config(params: IntegrationParameters, collect_timeout: Duration) -> CoordinatorConfig {
        CoordinatorConfig {
            port: 0,
            parameters: params,
            collect_timeout,
        }
    }

    fn params_2_3() -> IntegrationParameters {
        IntegrationParameters {
            lower_limit: 2.0,
            upper_limit: 3.0,
            step: 0.01,
        }
    }

    async fn wait_for_clients(registry: &ClientRegistry, count: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while registry.client_count() < count {
            assert!(Instant::now() < deadline, "workers never registered");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn end_to_end_matches_the_single_process_result() {
        let coordinator = Coordinator::bind(&test_config(params_2_3(), Duration::from_secs(30)))
            .await
            .unwrap();
        let port = coordinator.local_addr().unwrap().port();
        let registry = coordinator.registry();

        let (start_tx, start_rx) = oneshot::channel();
        let run = tokio::spawn(coordinator.run(start_rx));

        let worker = Worker::new(
            format!("127.0.0.1:{port}"),
            Arc::new(SimpsonsRule),
            Some(2),
        )
        .unwrap();
        let worker = tokio::spawn(worker.run());

        wait_for_clients(&registry, 1).await;
        start_tx.send(()).unwrap();

        let total = run.await.unwrap().unwrap();
        worker.await.unwrap().unwrap();

        // The partition splits [2, 3] on the step grid, so the distributed
        // sum agrees with the contiguous computation to float associativity.
        let expected = SimpsonsRule.integrate(2.0, 3.0, 0.01).unwrap();
        assert!((total - expected).abs() < 1e-9);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn end_to_end_with_several_workers() {
        let coordinator = Coordinator::bind(&test_config(params_2_3(), Duration::from_secs(30)))
            .await
            .unwrap();
        let port = coordinator.local_addr().unwrap().port();
        let registry = coordinator.registry();

        let (start_tx, start_rx) = oneshot::channel();
        let run = tokio::spawn(coordinator.run(start_rx));

        let mut workers = Vec::new();
        for threads in [1u32, 2, 3] {
            let worker = Worker::new(
                format!("127.0.0.1:{port}"),
                Arc::new(SimpsonsRule),
                Some(threads),
            )
            .unwrap();
            workers.push(tokio::spawn(worker.run()));
        }

        wait_for_clients(&registry, 3).await;
        start_tx.send(()).unwrap();

        let total = run.await.unwrap().unwrap();
        for worker in workers {
            worker.await.unwrap().unwrap();
        }

        let expected = SimpsonsRule.integrate(2.0, 3.0, 0.01).unwrap();
        assert!(((total - expected) / expected).abs() < 1e-6);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn run_aborts_without_workers() {
        let coordinator = Coordinator::bind(&test_config(params_2_3(), Duration::from_secs(5)))
            .await
            .unwrap();

        let (start_tx, start_rx) = oneshot::channel();
        start_tx.send(()).unwrap();

        let err = coordinator.run(start_rx).await.unwrap_err();
        assert!(err.to_string().contains("no workers"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn dropping_the_start_signal_cancels_the_run() {
        let coordinator = Coordinator::bind(&test_config(params_2_3(), Duration::from_secs(5)))
            .await
            .unwrap();

        let (start_tx, start_rx) = oneshot::channel::<()>();
        drop(start_tx);

        let err = coordinator.run(start_rx).await.unwrap_err();
        assert!(err.to_string().contains("cancelled"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn stalled_worker_fails_the_run_after_the_timeout() {
        let coordinator =
            Coordinator::bind(&test_config(params_2_3(), Duration::from_millis(300)))
                .await
                .unwrap();
        let port = coordinator.local_addr().unwrap().port();
        let registry = coordinator.registry();

        let (start_tx, start_rx) = oneshot::channel();
        let run = tokio::spawn(coordinator.run(start_rx));

        // A hand-driven worker that completes the handshake and accepts its
        // batch but never reports results.
        let stalled = tokio::spawn(async move {
            let mut stream = TcpStream::connect(format!("127.0.0.1:{port}"))
                .await
                .unwrap();
            let request = HandshakeRequest {
                client_version: "0.1.0".to_string(),
                system_info: SystemInfo {
                    cpu_cores: 1,
                    ..collect_system_info()
                },
            };
            write_frame(&mut stream, &request).await.unwrap();
            let response: HandshakeResponse = read_frame(&mut stream).await.unwrap();
            assert!(response.accepted);

            let _batch: TaskBatch = read_frame(&mut stream).await.unwrap();
            // Hold the socket open without answering until the run is over.
            tokio::time::sleep(Duration::from_secs(10)).await;
            drop(stream);
        });

        wait_for_clients(&registry, 1).await;
        start_tx.send(()).unwrap();

        let err = run.await.unwrap().unwrap_err();
        assert!(err.to_string().contains("incomplete results"));

        stalled.abort();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn workers_connecting_after_start_are_rejected() {
        let coordinator = Coordinator::bind(&test_config(params_2_3(), Duration::from_secs(30)))
            .await
            .unwrap();
        let port = coordinator.local_addr().unwrap().port();
        let registry = coordinator.registry();

        let (start_tx, start_rx) = oneshot::channel();
        let run = tokio::spawn(coordinator.run(start_rx));

        let worker = Worker::new(
            format!("127.0.0.1:{port}"),
            Arc::new(SimpsonsRule),
            Some(1),
        )
        .unwrap();
        let worker = tokio::spawn(worker.run());

        wait_for_clients(&registry, 1).await;
        start_tx.send(()).unwrap();

        // After the freeze the listener is closed, so a late worker cannot
        // even establish TCP.
        let total = run.await.unwrap().unwrap();
        worker.await.unwrap().unwrap();
        assert!(total.is_finite());

        let late = TcpStream::connect(format!("127.0.0.1:{port}")).await;
        assert!(late.is_err());
    }
}
