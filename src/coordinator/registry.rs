//! Connected-worker registry
//!
//! Thread-safe table of workers admitted through the handshake. Ids are
//! handed out in strictly ascending order starting at 1; id 0 means the
//! registry was already frozen and the connection must be dropped. Once
//! [`ClientRegistry::stop_accepting`] is called the worker set is final for
//! the rest of the run.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use tokio::net::TcpStream;
use tracing::{info, warn};

use crate::protocol::SystemInfo;

/// One admitted worker: its socket, identity and per-run progress flags.
///
/// The socket has exactly one owner at a time. The handshake handler builds
/// the connection and hands it to the registry; the coordinator takes it
/// back for dispatch, lends it to a receiver task for collection, and writes
/// the final stop command after the receiver is done.
pub struct ClientConnection {
    pub id: u64,
    pub system_info: SystemInfo,
    pub stream: TcpStream,
    pub task_sent: bool,
    pub result_received: bool,
}

impl ClientConnection {
    pub fn new(stream: TcpStream, id: u64, system_info: SystemInfo) -> Self {
        Self {
            id,
            system_info,
            stream,
            task_sent: false,
            result_received: false,
        }
    }

    pub fn cpu_cores(&self) -> u32 {
        self.system_info.cpu_cores
    }
}

/// Identity and capacity of a registered worker, detached from its socket.
#[derive(Debug, Clone)]
pub struct ClientInfo {
    pub id: u64,
    pub system_info: SystemInfo,
}

impl ClientInfo {
    pub fn cpu_cores(&self) -> u32 {
        self.system_info.cpu_cores
    }
}

/// Mutex-protected ordered list of connections plus the admission state.
pub struct ClientRegistry {
    clients: Mutex<Vec<ClientConnection>>,
    accepting: AtomicBool,
    next_id: AtomicU64,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self {
            clients: Mutex::new(Vec::new()),
            accepting: AtomicBool::new(true),
            next_id: AtomicU64::new(1),
        }
    }

    /// Hands out the next client id, or 0 once the registry is frozen.
    pub fn allocate_id(&self) -> u64 {
        if !self.is_accepting() {
            return 0;
        }
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Inserts an admitted connection. Returns false (dropping the
    /// connection) if the registry was frozen after the id was allocated.
    pub fn add(&self, connection: ClientConnection) -> bool {
        if !self.is_accepting() {
            warn!(
                client = connection.id,
                "registry frozen, dropping late connection"
            );
            return false;
        }

        let mut clients = self.clients.lock().unwrap();
        info!(
            client = connection.id,
            cores = connection.cpu_cores(),
            "client registered"
        );
        clients.push(connection);

        let total_cores: u32 = clients.iter().map(|c| c.cpu_cores()).sum();
        info!(
            clients = clients.len(),
            total_cores, "registry updated"
        );
        true
    }

    pub fn get_info(&self, id: u64) -> Option<ClientInfo> {
        let clients = self.clients.lock().unwrap();
        clients.iter().find(|c| c.id == id).map(|c| ClientInfo {
            id: c.id,
            system_info: c.system_info.clone(),
        })
    }

    /// Ordered snapshot of the registered workers' identities.
    pub fn snapshot_infos(&self) -> Vec<ClientInfo> {
        let clients = self.clients.lock().unwrap();
        clients
            .iter()
            .map(|c| ClientInfo {
                id: c.id,
                system_info: c.system_info.clone(),
            })
            .collect()
    }

    /// Removes every connection from the registry, transferring socket
    /// ownership to the caller. Order is preserved.
    pub fn take_all(&self) -> Vec<ClientConnection> {
        let mut clients = self.clients.lock().unwrap();
        std::mem::take(&mut *clients)
    }

    pub fn remove(&self, id: u64) -> bool {
        let mut clients = self.clients.lock().unwrap();
        let before = clients.len();
        clients.retain(|c| c.id != id);
        let removed = clients.len() < before;
        if removed {
            info!(client = id, "client removed");
        } else {
            warn!(client = id, "client not found for removal");
        }
        removed
    }

    /// Drops every connection, closing the sockets.
    pub fn clear(&self) {
        let mut clients = self.clients.lock().unwrap();
        if !clients.is_empty() {
            info!(clients = clients.len(), "clearing registry");
        }
        clients.clear();
    }

    pub fn stop_accepting(&self) {
        self.accepting.store(false, Ordering::SeqCst);
        info!("stopped accepting new clients");
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    pub fn client_count(&self) -> usize {
        self.clients.lock().unwrap().len()
    }

    pub fn total_cores(&self) -> u32 {
        let clients = self.clients.lock().unwrap();
        clients.iter().map(|c| c.cpu_cores()).sum()
    }

    pub fn log_clients(&self) {
        let clients = self.clients.lock().unwrap();
        let total_cores: u32 = clients.iter().map(|c| c.cpu_cores()).sum();
        info!(clients = clients.len(), total_cores, "connected clients");
        for client in clients.iter() {
            info!(
                client = client.id,
                info = %client.system_info,
                "registered worker"
            );
        }
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}
